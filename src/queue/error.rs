//! Request queue error types.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Request queue '{0}' is shut down")]
    Closed(String),
    #[error("Queued task in '{0}' ended without producing a result")]
    TaskDropped(String),
}
