//! Core domain + session logic for the voice-server chat bot.
//!
//! This crate is transport-agnostic. The server SDK sits behind
//! [`transport::Transport`]; AI, weather and quote services sit behind the
//! ports in [`ports`] and are implemented in adapter crates.

pub mod bot;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
mod handlers;
pub mod history;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod polls;
pub mod ports;
pub mod reassembler;
pub mod security;
pub mod session;
pub mod supervisor;
pub mod transport;
pub mod utils;

pub use errors::{Error, Result};
