mod client;
mod error;
mod rest;
pub mod types;

pub use client::{AudioSender, Config, ConfigBuilder, LiveClient, ServerRx, connect, consts};
pub use error::GeminiError;
pub use rest::GenerateClient;
