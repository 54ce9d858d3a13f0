//! lookout-server: serves a debugger adapter to one CDP client over TCP.

pub mod error;
pub mod logging;
pub mod server;

pub use error::ServerError;
pub use server::{serve, serve_connection};
