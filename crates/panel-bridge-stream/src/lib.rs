//! Reconnecting websocket client for the panel's live console stream.

pub mod backoff;
pub mod client;
pub mod protocol;

pub use client::{LogSource, LogStreamClient, StreamError, StreamEvent, StreamHandle};
