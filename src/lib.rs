pub mod cli;
pub mod client;
pub mod protocol;

pub use cli::{Command, prompt};
pub use client::{Address, Client, ClientConfig, ClientError};
