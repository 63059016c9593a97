pub mod connection;
pub mod gateway;
pub mod server;

pub use server::{start, ServerConfig, ServerHandle};
