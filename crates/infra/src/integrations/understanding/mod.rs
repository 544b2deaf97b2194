//! External understanding-service integration

pub mod client;
pub mod types;

pub use client::UnderstandingClient;
