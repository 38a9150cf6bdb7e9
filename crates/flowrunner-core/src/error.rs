use thiserror::Error;

/// Failure modes named by §4.6: all of them are surfaced to the User State
/// Service, which logs and aborts the event rather than writing any state.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("flow not found: {0}")]
    FlowNotFound(String),

    #[error("current node not found: {0}")]
    CurrentNodeNotFound(String),

    #[error("next node not found: {0}")]
    NextNodeNotFound(String),

    #[error("node {0} has no outgoing edge")]
    NoOutgoingEdge(String),

    #[error("node processing failed: {0}")]
    NodeProcessingFailed(String),

    #[error("store error: {0}")]
    Store(#[from] flowrunner_store::StoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
