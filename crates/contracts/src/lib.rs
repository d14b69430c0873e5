//! # Contracts
//!
//! Frozen interface contracts shared by the capture / buffer / upload crates.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Records carry a millisecond wall-clock timestamp supplied by a [`Clock`]
//! - Segment filenames embed local time at creation (`yyyyMMdd_HHmmss_SSS`)

mod config;
mod consumer;
mod error;
mod host;
mod pressure;
mod record;
mod segment;

pub use config::*;
pub use consumer::RecordConsumer;
pub use error::*;
pub use host::*;
pub use pressure::{PressureAware, PressureLevel};
pub use record::*;
pub use segment::*;
