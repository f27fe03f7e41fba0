//! Private two-person chat between Leo and Janice.
//!
//! The UI thread owns a [`chat::ChatState`] and talks to one
//! [`network::ChatClient`] per login over channels. The client drives a
//! [`network::Backend`]: hosted Supabase or the local SQLite stand-in.

pub mod chat;
pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod storage;
pub mod ui;

pub use error::{ChatError, ChatResult};
