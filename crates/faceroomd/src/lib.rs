//! faceroomd — Live face recognition daemon.
//!
//! Streams annotated camera frames to any number of viewers, labels
//! enrolled faces and fires per-user sound alerts behind a cooldown.

pub mod alert;
pub mod config;
pub mod font;
pub mod mjpeg;
pub mod overlay;
pub mod pipeline;
pub mod service;
pub mod stream;

#[cfg(test)]
mod testing;

pub use service::Faceroom;
