use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Lifecycle state of one transaction branch.
///
/// `Init` is recorded by the prepare phase. `Committed` and `RolledBack`
/// are terminal: once reached, the branch never transitions again and
/// redelivered phases short-circuit on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "pg", derive(sqlx::Type))]
#[cfg_attr(feature = "pg", repr(i16))]
pub enum BranchState {
    Init = 0,
    Committed = 1,
    RolledBack = 2,
}

impl BranchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BranchState::Init)
    }
}

impl std::fmt::Display for BranchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            BranchState::Init => "init",
            BranchState::Committed => "committed",
            BranchState::RolledBack => "rolled_back",
        };

        f.write_str(state)
    }
}

/// One persisted row per `(global_tx_id, branch_id)` pair.
///
/// The row is created exactly once, either by the prepare phase in `Init`
/// state or synthesized directly in `RolledBack` state when a cancel
/// arrives for a branch that was never prepared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "pg", derive(sqlx::FromRow))]
pub struct FenceRecord {
    pub global_tx_id: String,
    pub branch_id: String,
    pub action_name: String,
    pub state: BranchState,
    pub log_detail: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FenceRecord {
    pub fn new(
        global_tx_id: impl Into<String>,
        branch_id: impl Into<String>,
        action_name: impl Into<String>,
        state: BranchState,
    ) -> Self {
        Self {
            global_tx_id: global_tx_id.into(),
            branch_id: branch_id.into(),
            action_name: action_name.into(),
            state,
            log_detail: Value::Null,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn detail<D: Serialize>(mut self, value: D) -> Result<Self> {
        self.log_detail = serde_json::to_value(&value)?;

        Ok(self)
    }

    /// Reads back the payload recorded during prepare. `None` when the
    /// phase produced no detail.
    pub fn to_detail<D: DeserializeOwned>(&self) -> Result<Option<D>> {
        if self.log_detail.is_null() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_value(self.log_detail.clone())?))
    }
}
