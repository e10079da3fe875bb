pub mod credentials;
pub mod sigv4;

pub use credentials::Credentials;
pub use sigv4::Signer;
