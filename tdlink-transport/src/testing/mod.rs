// ABOUTME: Testing utilities for transport-level scenarios.
// ABOUTME: Recording wrapper and transcript replay.

pub mod recording;

pub use recording::{Direction, Exchange, RecordingTransport, ReplayTransport};
