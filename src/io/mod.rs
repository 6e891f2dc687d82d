// src/io/mod.rs
//
// Serial IO for marker-framed device streams: discovery, sessions,
// framing and the poll driver.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod serial;
mod types;

pub use types::{StopReason, StreamEvent};

/// Get current timestamp in microseconds since UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
