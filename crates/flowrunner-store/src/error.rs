use thiserror::Error;

/// Error kinds surfaced at the Store boundary. Mirrors the `not_found` /
/// `store_unavailable` split from the error-handling design: callers above
/// the store treat `NotFound` as a normal branch and everything else as an
/// aborted event.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("bson serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),

    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
