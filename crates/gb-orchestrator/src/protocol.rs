//! Wire messages exchanged between `RunManager` and the `engine_service`
//! worker process, framed with [`crate::ipc`].

use gb_types::Event;
use serde::{Deserialize, Serialize};

/// Sent once, manager to worker, as the first and only inbound frame.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub run_id: String,
    pub config: crate::config::RunConfig,
}

/// Sent worker to manager, zero or more times, as the run progresses.
#[derive(Debug, Serialize, Deserialize)]
pub enum WorkerMessage {
    Event(Event),
    Finished { bars_processed: usize },
    Failed { message: String },
}
