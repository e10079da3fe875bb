pub mod event_stream;
