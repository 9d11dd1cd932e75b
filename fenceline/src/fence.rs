use fenceline_store::{BranchState, Engine, FenceRecord};
use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::{
    context::BranchContext,
    error::{FenceError, Result},
    metrics,
};

/// TCC phases, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Confirm,
    Cancel,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Confirm => "confirm",
            Phase::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinates the three TCC phases against a fence record store.
///
/// Every phase runs inside one engine session: the fence record read or
/// written there, the business callback, and the state transition either
/// all commit or all roll back. Confirm and cancel take the record's row
/// lock first, so concurrent deliveries for one branch serialize and at
/// most one callback body runs at a time.
#[derive(Clone)]
pub struct Fence<E: Engine> {
    engine: E,
}

impl<E: Engine> Fence<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// First phase: run the tentative business write and durably record
    /// the branch in `Init` state, atomically.
    ///
    /// The callback's value is serialized into the record's log detail
    /// for the later phases to read back; return `()` when there is
    /// nothing to carry over. A redelivered prepare fails on the record
    /// uniqueness constraint, recognizable via
    /// [`FenceError::is_already_prepared`].
    pub async fn prepare<F, D>(&self, ctx: &BranchContext, prepare: F) -> Result<()>
    where
        D: Serialize,
        F: for<'a> FnOnce(&'a mut E::Session) -> BoxFuture<'a, Result<D>> + Send,
    {
        ctx.ensure()?;

        let mut session = self.engine.begin().await?;
        let outcome = self.run_prepare(ctx, &mut session, prepare).await;

        self.finish(Phase::Prepare, ctx, session, outcome).await
    }

    /// Second phase, success path: apply the tentative write for good.
    ///
    /// The callback receives the locked fence record, including the log
    /// detail produced by prepare. A redelivery for an already committed
    /// branch succeeds without invoking the callback again. Confirm never
    /// fabricates a record: an unknown branch fails with
    /// [`FenceError::RecordNotFound`], and a branch already rolled back
    /// fails with [`FenceError::IllegalState`].
    pub async fn confirm<F>(&self, ctx: &BranchContext, confirm: F) -> Result<()>
    where
        F: for<'a> FnOnce(FenceRecord, &'a mut E::Session) -> BoxFuture<'a, Result<()>> + Send,
    {
        ctx.ensure()?;

        let mut session = self.engine.begin().await?;
        let outcome = self.run_confirm(ctx, &mut session, confirm).await;

        self.finish(Phase::Confirm, ctx, session, outcome).await
    }

    /// Second phase, failure path: undo the tentative write.
    ///
    /// A cancel for a branch with no record means prepare was never
    /// delivered; the branch is marked rolled back directly so a late
    /// out-of-order prepare cannot resurrect it, and the callback is not
    /// invoked. A redelivery for an already rolled back branch succeeds.
    /// A branch already committed fails with
    /// [`FenceError::IllegalState`].
    pub async fn cancel<F>(&self, ctx: &BranchContext, cancel: F) -> Result<()>
    where
        F: for<'a> FnOnce(FenceRecord, &'a mut E::Session) -> BoxFuture<'a, Result<()>> + Send,
    {
        ctx.ensure()?;

        let mut session = self.engine.begin().await?;
        let outcome = self.run_cancel(ctx, &mut session, cancel).await;

        self.finish(Phase::Cancel, ctx, session, outcome).await
    }

    async fn run_prepare<F, D>(
        &self,
        ctx: &BranchContext,
        session: &mut E::Session,
        prepare: F,
    ) -> Result<()>
    where
        D: Serialize,
        F: for<'a> FnOnce(&'a mut E::Session) -> BoxFuture<'a, Result<D>> + Send,
    {
        let detail = prepare(session).await?;

        let mut record = FenceRecord::new(
            ctx.global_tx_id.as_str(),
            ctx.branch_id.as_str(),
            ctx.action_name.as_str(),
            BranchState::Init,
        );
        record.log_detail = serde_json::to_value(&detail)?;

        self.engine.create(session, record).await?;

        Ok(())
    }

    async fn run_confirm<F>(
        &self,
        ctx: &BranchContext,
        session: &mut E::Session,
        confirm: F,
    ) -> Result<()>
    where
        F: for<'a> FnOnce(FenceRecord, &'a mut E::Session) -> BoxFuture<'a, Result<()>> + Send,
    {
        let Some(record) = self
            .engine
            .get_for_update(session, &ctx.global_tx_id, &ctx.branch_id)
            .await?
        else {
            return Err(FenceError::RecordNotFound {
                global_tx_id: ctx.global_tx_id.clone(),
                branch_id: ctx.branch_id.clone(),
            });
        };

        match record.state {
            BranchState::Committed => {
                tracing::debug!(
                    global_tx_id = %ctx.global_tx_id,
                    branch_id = %ctx.branch_id,
                    "confirm redelivered for a committed branch",
                );

                Ok(())
            }
            BranchState::RolledBack => Err(FenceError::IllegalState {
                phase: Phase::Confirm,
                state: BranchState::RolledBack,
                global_tx_id: ctx.global_tx_id.clone(),
                branch_id: ctx.branch_id.clone(),
            }),
            BranchState::Init => {
                confirm(record, session).await?;

                self.engine
                    .update_state(
                        session,
                        &ctx.global_tx_id,
                        &ctx.branch_id,
                        BranchState::Init,
                        BranchState::Committed,
                    )
                    .await?;

                Ok(())
            }
        }
    }

    async fn run_cancel<F>(
        &self,
        ctx: &BranchContext,
        session: &mut E::Session,
        cancel: F,
    ) -> Result<()>
    where
        F: for<'a> FnOnce(FenceRecord, &'a mut E::Session) -> BoxFuture<'a, Result<()>> + Send,
    {
        let Some(record) = self
            .engine
            .get_for_update(session, &ctx.global_tx_id, &ctx.branch_id)
            .await?
        else {
            tracing::info!(
                global_tx_id = %ctx.global_tx_id,
                branch_id = %ctx.branch_id,
                "cancel before prepare, recording rollback",
            );

            let record = FenceRecord::new(
                ctx.global_tx_id.as_str(),
                ctx.branch_id.as_str(),
                ctx.action_name.as_str(),
                BranchState::RolledBack,
            );

            self.engine.create(session, record).await?;

            return Ok(());
        };

        match record.state {
            BranchState::RolledBack => {
                tracing::debug!(
                    global_tx_id = %ctx.global_tx_id,
                    branch_id = %ctx.branch_id,
                    "cancel redelivered for a rolled back branch",
                );

                Ok(())
            }
            BranchState::Committed => Err(FenceError::IllegalState {
                phase: Phase::Cancel,
                state: BranchState::Committed,
                global_tx_id: ctx.global_tx_id.clone(),
                branch_id: ctx.branch_id.clone(),
            }),
            BranchState::Init => {
                cancel(record, session).await?;

                self.engine
                    .update_state(
                        session,
                        &ctx.global_tx_id,
                        &ctx.branch_id,
                        BranchState::Init,
                        BranchState::RolledBack,
                    )
                    .await?;

                Ok(())
            }
        }
    }

    /// Commit-or-rollback tail shared by all phases. The session must end
    /// here on every path so the row lock is released.
    async fn finish(
        &self,
        phase: Phase,
        ctx: &BranchContext,
        session: E::Session,
        outcome: Result<()>,
    ) -> Result<()> {
        match outcome {
            Ok(()) => match self.engine.commit(session).await {
                Ok(()) => {
                    metrics::record_phase(phase);
                    tracing::info!(
                        phase = %phase,
                        global_tx_id = %ctx.global_tx_id,
                        branch_id = %ctx.branch_id,
                        action = %ctx.action_name,
                        "tcc phase finished",
                    );

                    Ok(())
                }
                Err(err) => {
                    metrics::record_fault(phase);

                    Err(err.into())
                }
            },
            Err(err) => {
                metrics::record_fault(phase);

                if let Err(rollback_err) = self.engine.rollback(session).await {
                    tracing::error!(phase = %phase, "fence rollback failed: {rollback_err}");
                }

                tracing::error!(
                    phase = %phase,
                    global_tx_id = %ctx.global_tx_id,
                    branch_id = %ctx.branch_id,
                    "tcc phase failed: {err}",
                );

                Err(err)
            }
        }
    }
}
