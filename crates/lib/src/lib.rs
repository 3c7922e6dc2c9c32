//! toolchat core library: client side of a streaming, tool-calling chat backend:
//! event-stream decoding, answer segmentation, tool-call tracking, and the backend client
//! used by the CLI.

pub mod catalog;
pub mod chat;
pub mod client;
pub mod config;
pub mod session;
pub mod stream;
