use async_trait::async_trait;

use crate::{
    error::Result,
    record::{BranchState, FenceRecord},
};

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "pg")]
mod pg;

#[cfg(feature = "memory")]
pub use memory::*;
#[cfg(feature = "pg")]
pub use pg::*;

/// Transactional access to the fence record table.
///
/// An engine never owns transaction boundaries on behalf of a phase: the
/// fence controller begins a session, runs the business callback and the
/// record operations inside it, then commits or rolls the whole session
/// back. `get_for_update` must hold an exclusive row lock until the
/// session ends so concurrent deliveries for one branch serialize.
#[async_trait]
pub trait Engine: Clone + Send + Sync + 'static {
    /// A live transaction. Dropping a session without committing must
    /// discard its writes and release its locks.
    type Session: Send;

    async fn begin(&self) -> Result<Self::Session>;

    async fn commit(&self, session: Self::Session) -> Result<()>;

    async fn rollback(&self, session: Self::Session) -> Result<()>;

    /// Inserts a new record. Fails with `StoreError::DuplicateRecord`
    /// when a row for the same `(global_tx_id, branch_id)` pair exists.
    async fn create(&self, session: &mut Self::Session, record: FenceRecord) -> Result<()>;

    /// Reads the record for a branch under an exclusive row lock.
    async fn get_for_update(
        &self,
        session: &mut Self::Session,
        global_tx_id: &'_ str,
        branch_id: &'_ str,
    ) -> Result<Option<FenceRecord>>;

    /// Transitions the branch from `from` to `to`. Fails with
    /// `StoreError::UnexpectedState` when the row is not in `from`.
    async fn update_state(
        &self,
        session: &mut Self::Session,
        global_tx_id: &'_ str,
        branch_id: &'_ str,
        from: BranchState,
        to: BranchState,
    ) -> Result<()>;
}
