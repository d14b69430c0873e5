//! Consumer implementations
//!
//! Contains LogConsumer. The durable log writer lives in its own crate.

mod log;

pub use self::log::LogConsumer;
