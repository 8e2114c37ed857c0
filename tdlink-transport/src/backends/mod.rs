// ABOUTME: Transport backend implementations.
// ABOUTME: Mock for tests, process for a JSON-lines bridge to the native client.

pub mod mock;
pub mod process;
