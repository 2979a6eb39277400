//! Outbound text shaping.

pub mod split;

pub use split::split_message;
