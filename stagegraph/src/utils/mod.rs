//! Id generation and timestamp handling.

pub mod timestamps;
mod uuid_utils;

pub use timestamps::{
    from_epoch_millis, parse_timestamp, timestamp_from_value, Timestamp, TimestampError,
};
pub use uuid_utils::{generate_monotonic_id, next_execution_id, next_stage_id};
