//! facematch-gemini — Comparator client for the Gemini API.
//!
//! Sends both images and a fixed yes/no instruction to `generateContent`
//! and maps the answer strictly onto a verdict.

pub mod client;
pub mod config;
pub mod wire;

pub use client::GeminiComparator;
pub use config::{ConfigError, GeminiConfig};
