//! # deskcast-server
//!
//! Captures the local display on a fixed cadence, encodes each frame once
//! and streams it to every connected viewer over TCP.
//!
//! Without a platform capture backend the server streams a moving test
//! pattern, which is enough to exercise viewers end to end.

pub mod config;
pub mod service;
