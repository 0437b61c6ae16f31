//! HTTP relay that forwards chat messages to Mistral with a server-held key.

pub mod error;
pub mod server;

pub use error::RelayError;
pub use server::{create_router, serve, RelayRequest, RELAY_PATH};
