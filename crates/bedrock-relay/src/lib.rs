//! bedrock-relay: a stateless proxy speaking the OpenAI Chat Completions
//! API northbound and Anthropic-on-Bedrock southbound.

pub mod aws;
pub mod client;
pub mod config;
pub mod llm;
pub mod models;
pub mod parse;
pub mod proxy;
pub mod telemetry;
