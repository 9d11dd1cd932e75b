use fenceline_store::{BranchState, StoreError};

use crate::fence::Phase;

#[derive(Debug, thiserror::Error)]
pub enum FenceError {
    #[error("branch context is missing `{0}`")]
    MissingContext(&'static str),

    #[error("no fence record for global transaction `{global_tx_id}` branch `{branch_id}`")]
    RecordNotFound {
        global_tx_id: String,
        branch_id: String,
    },

    #[error("unexpected fence state {state} in phase {phase} for global transaction `{global_tx_id}` branch `{branch_id}`")]
    IllegalState {
        phase: Phase,
        state: BranchState,
        global_tx_id: String,
        branch_id: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serde_json `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("store `{0}`")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Any(#[from] anyhow::Error),
}

impl FenceError {
    /// Confirm after cancel, or cancel after confirm. Must be surfaced to
    /// the transaction manager and never retried by this layer.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, FenceError::IllegalState { .. })
    }

    /// A redelivered prepare trips the record uniqueness constraint; the
    /// branch is already durably fenced.
    pub fn is_already_prepared(&self) -> bool {
        matches!(self, FenceError::Store(StoreError::DuplicateRecord { .. }))
    }

    /// Failures that committed nothing and are safe to retry upstream.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FenceError::Store(err) if err.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, FenceError>;
