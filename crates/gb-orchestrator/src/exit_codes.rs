//! Process exit codes for the `engine_service` worker binary.

use gb_types::{EngineError, GbError};

pub const SUCCESS: i32 = 0;
pub const CONFIG_INVALID: i32 = 1;
pub const FEED_ERROR: i32 = 2;
pub const INTERNAL_ERROR: i32 = 3;
pub const CANCELED: i32 = 4;

pub fn for_error(error: &GbError) -> i32 {
    match error {
        GbError::Orchestrator(_) | GbError::Config(_) | GbError::Validation(_) => CONFIG_INVALID,
        GbError::Engine(EngineError::FeedError { .. }) => FEED_ERROR,
        GbError::Engine(EngineError::Canceled) => CANCELED,
        _ => INTERNAL_ERROR,
    }
}
