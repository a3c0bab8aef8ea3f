use thiserror::Error;

/// Errors surfaced by the core. Configuration errors are meant to be
/// unwrapped/panicked on at startup; the rest propagate to callers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "cuckoo insert failed: eviction chain exceeded max_kicks ({max_kicks}) \
         and the post-growth retry also failed"
    )]
    InsertFailure { max_kicks: u32 },

    #[error("allocation failed while rehashing/rebuilding: {0}")]
    AllocationFailure(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;
