pub mod policy;
pub mod record;

pub use policy::{Decision, ThresholdPolicy};
pub use record::{ClassifyError, InstanceFamily, PriceRecord, RecordDecodeError};
