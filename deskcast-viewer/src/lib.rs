//! # deskcast-viewer
//!
//! Connects to a deskcast broadcaster, decodes the stream and keeps the
//! newest frame fitted to a viewport. Runs headless: receive statistics
//! go to the log and the last frame can be saved as a JPEG on exit.

pub mod config;
pub mod headless;
