use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    engine::Engine,
    error::{Result, StoreError},
    record::{BranchState, FenceRecord},
};

type Rows = HashMap<(String, String), FenceRecord>;

/// In-memory fence record store.
///
/// Sessions serialize on one shared lock, coarser than a per-row lock but
/// with the same guarantees the controller relies on: writes stay staged
/// until commit, and a dropped session discards them.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore(Arc<Mutex<Rows>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemorySession {
    rows: OwnedMutexGuard<Rows>,
    staged: Rows,
}

#[async_trait]
impl Engine for MemoryStore {
    type Session = MemorySession;

    async fn begin(&self) -> Result<MemorySession> {
        let rows = self.0.clone().lock_owned().await;
        let staged = rows.clone();

        Ok(MemorySession { rows, staged })
    }

    async fn commit(&self, mut session: MemorySession) -> Result<()> {
        *session.rows = session.staged;

        Ok(())
    }

    async fn rollback(&self, _session: MemorySession) -> Result<()> {
        Ok(())
    }

    async fn create(&self, session: &mut MemorySession, record: FenceRecord) -> Result<()> {
        let key = (record.global_tx_id.clone(), record.branch_id.clone());

        if session.staged.contains_key(&key) {
            return Err(StoreError::DuplicateRecord {
                global_tx_id: key.0,
                branch_id: key.1,
            });
        }

        session.staged.insert(key, record);

        Ok(())
    }

    async fn get_for_update(
        &self,
        session: &mut MemorySession,
        global_tx_id: &'_ str,
        branch_id: &'_ str,
    ) -> Result<Option<FenceRecord>> {
        let key = (global_tx_id.to_owned(), branch_id.to_owned());

        Ok(session.staged.get(&key).cloned())
    }

    async fn update_state(
        &self,
        session: &mut MemorySession,
        global_tx_id: &'_ str,
        branch_id: &'_ str,
        from: BranchState,
        to: BranchState,
    ) -> Result<()> {
        let key = (global_tx_id.to_owned(), branch_id.to_owned());

        match session.staged.get_mut(&key) {
            Some(record) if record.state == from => {
                record.state = to;
                record.updated_at = Some(Utc::now());

                Ok(())
            }
            _ => Err(StoreError::UnexpectedState {
                global_tx_id: key.0,
                branch_id: key.1,
                expected: from,
            }),
        }
    }
}
