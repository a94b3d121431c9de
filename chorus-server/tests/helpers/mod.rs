//! Test Helper Utilities
//!
//! Shared utilities for testing chorus-server
#![allow(dead_code, unused_imports)]

pub mod audio_generator;
pub mod fake_process;
pub mod renderer_doubles;

// Re-export commonly used items
pub use audio_generator::{generate_test_wav, ToneConfig};
pub use fake_process::{FakeLauncher, FakeProcess};
pub use renderer_doubles::{fake_payload, DelayedRenderer};
