use crate::record::BranchState;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("fence record already exists for global transaction `{global_tx_id}` branch `{branch_id}`")]
    DuplicateRecord {
        global_tx_id: String,
        branch_id: String,
    },

    #[error("fence record for global transaction `{global_tx_id}` branch `{branch_id}` is not in state {expected}")]
    UnexpectedState {
        global_tx_id: String,
        branch_id: String,
        expected: BranchState,
    },

    #[cfg(feature = "pg")]
    #[error("sqlx `{0}`")]
    Sqlx(#[from] sqlx::Error),

    #[error("serde_json `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("{0}")]
    Any(#[from] anyhow::Error),
}

impl StoreError {
    /// Failures that committed nothing and are safe to retry upstream,
    /// e.g. lock timeouts or lost connections.
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "pg")]
            StoreError::Sqlx(err) => !matches!(err, sqlx::Error::RowNotFound),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
