use serde::{Deserialize, Serialize};

use crate::error::{FenceError, Result};

/// Identity of one branch of a distributed transaction, supplied by the
/// transaction-manager integration for every phase call.
///
/// An empty global transaction or branch id fails the phase before any
/// database transaction begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchContext {
    pub global_tx_id: String,
    pub branch_id: String,
    pub action_name: String,
}

impl BranchContext {
    pub fn new(
        global_tx_id: impl Into<String>,
        branch_id: impl Into<String>,
        action_name: impl Into<String>,
    ) -> Self {
        Self {
            global_tx_id: global_tx_id.into(),
            branch_id: branch_id.into(),
            action_name: action_name.into(),
        }
    }

    pub(crate) fn ensure(&self) -> Result<()> {
        if self.global_tx_id.is_empty() {
            return Err(FenceError::MissingContext("global_tx_id"));
        }

        if self.branch_id.is_empty() {
            return Err(FenceError::MissingContext("branch_id"));
        }

        Ok(())
    }
}
