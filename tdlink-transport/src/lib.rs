// ABOUTME: Pluggable transport abstraction for the tdlink client.
// ABOUTME: Provides the Transport trait plus mock, process, and recording backends.

pub mod config;
pub mod registry;
pub mod traits;

pub mod backends;
pub mod testing;

pub use config::TransportConfig;
pub use registry::{TransportFactory, TransportRegistry};
pub use traits::{Payload, Transport};
