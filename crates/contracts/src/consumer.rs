//! RecordConsumer trait - Dispatcher output interface

use crate::{ContractError, Record};

/// Record consumer trait
///
/// Everything registered with the dispatcher implements this trait. Calls
/// arrive on the dispatcher's worker thread, or on the producer thread when
/// the worker queue is saturated, so implementations must be `Send + Sync`.
pub trait RecordConsumer: Send + Sync {
    /// Consumer name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Accept one record
    ///
    /// # Errors
    /// Returns write error (should include context). The dispatcher logs it
    /// and keeps delivering to the remaining consumers.
    fn on_record(&self, record: &Record) -> Result<(), ContractError>;
}
