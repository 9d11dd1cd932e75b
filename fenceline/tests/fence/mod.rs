use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use fenceline::{BranchContext, Engine, Fence, FenceError, StoreError};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Debit {
    amount: u32,
}

fn ctx(global_tx_id: &str, branch_id: &str) -> BranchContext {
    BranchContext::new(global_tx_id, branch_id, "debit")
}

pub async fn test_prepare_confirm_roundtrip<E: Engine>(fence: &Fence<E>) -> anyhow::Result<()> {
    let ctx = ctx("tx-1", "b-1");
    let debited = Arc::new(AtomicUsize::new(0));

    fence
        .prepare(&ctx, |_tx| Box::pin(async { Ok(Debit { amount: 100 }) }))
        .await?;

    let counter = debited.clone();
    fence
        .confirm(&ctx, move |record, _tx| {
            Box::pin(async move {
                let detail = record.to_detail::<Debit>()?;
                assert_eq!(detail, Some(Debit { amount: 100 }));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .await?;

    // Redelivery is acknowledged without running the callback again.
    let counter = debited.clone();
    fence
        .confirm(&ctx, move |_record, _tx| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .await?;

    assert_eq!(debited.load(Ordering::SeqCst), 1);

    Ok(())
}

pub async fn test_prepare_redelivery<E: Engine>(fence: &Fence<E>) -> anyhow::Result<()> {
    let ctx = ctx("tx-redeliver", "b-1");

    fence
        .prepare(&ctx, |_tx| Box::pin(async { Ok(()) }))
        .await?;

    let err = fence
        .prepare(&ctx, |_tx| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();

    assert!(err.is_already_prepared());
    assert!(matches!(
        err,
        FenceError::Store(StoreError::DuplicateRecord { .. })
    ));

    Ok(())
}

pub async fn test_confirm_without_prepare<E: Engine>(fence: &Fence<E>) -> anyhow::Result<()> {
    let applied = Arc::new(AtomicUsize::new(0));

    let counter = applied.clone();
    let err = fence
        .confirm(&ctx("tx-stray", "b-1"), move |_record, _tx| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, FenceError::RecordNotFound { .. }));
    assert_eq!(applied.load(Ordering::SeqCst), 0);

    Ok(())
}

pub async fn test_cancel_without_prepare<E: Engine>(fence: &Fence<E>) -> anyhow::Result<()> {
    let ctx = ctx("tx-late", "b-1");
    let undone = Arc::new(AtomicUsize::new(0));

    // No record yet: the branch is fenced as rolled back and the callback
    // has nothing to undo.
    let counter = undone.clone();
    fence
        .cancel(&ctx, move |_record, _tx| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .await?;

    assert_eq!(undone.load(Ordering::SeqCst), 0);

    // Redelivery of the cancel is acknowledged.
    fence
        .cancel(&ctx, |_record, _tx| Box::pin(async { Ok(()) }))
        .await?;

    // The out-of-order prepare arriving afterwards must not resurrect
    // the branch.
    let err = fence
        .prepare(&ctx, |_tx| Box::pin(async { Ok(Debit { amount: 100 }) }))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FenceError::Store(StoreError::DuplicateRecord { .. })
    ));

    // And a confirm for it is rejected as a protocol violation.
    let err = fence
        .confirm(&ctx, |_record, _tx| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();

    assert!(err.is_protocol_violation());

    Ok(())
}

pub async fn test_cancel_idempotent<E: Engine>(fence: &Fence<E>) -> anyhow::Result<()> {
    let ctx = ctx("tx-undo", "b-1");
    let undone = Arc::new(AtomicUsize::new(0));

    fence
        .prepare(&ctx, |_tx| Box::pin(async { Ok(Debit { amount: 40 }) }))
        .await?;

    for _ in 0..3 {
        let counter = undone.clone();
        fence
            .cancel(&ctx, move |record, _tx| {
                Box::pin(async move {
                    assert_eq!(record.to_detail::<Debit>()?, Some(Debit { amount: 40 }));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .await?;
    }

    assert_eq!(undone.load(Ordering::SeqCst), 1);

    Ok(())
}

pub async fn test_terminal_states_exclude_each_other<E: Engine>(
    fence: &Fence<E>,
) -> anyhow::Result<()> {
    // Confirm, then cancel must be refused.
    let committed = ctx("tx-committed", "b-1");
    fence
        .prepare(&committed, |_tx| Box::pin(async { Ok(()) }))
        .await?;
    fence
        .confirm(&committed, |_record, _tx| Box::pin(async { Ok(()) }))
        .await?;

    let err = fence
        .cancel(&committed, |_record, _tx| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();

    assert!(err.is_protocol_violation());

    // Cancel, then confirm must be refused.
    let rolled_back = ctx("tx-rolled-back", "b-1");
    fence
        .prepare(&rolled_back, |_tx| Box::pin(async { Ok(()) }))
        .await?;
    fence
        .cancel(&rolled_back, |_record, _tx| Box::pin(async { Ok(()) }))
        .await?;

    let err = fence
        .confirm(&rolled_back, |_record, _tx| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();

    assert!(err.is_protocol_violation());

    Ok(())
}

pub async fn test_callback_failure_rolls_back<E: Engine>(fence: &Fence<E>) -> anyhow::Result<()> {
    let ctx = ctx("tx-fail", "b-1");

    // A failing prepare leaves no trace: the branch still reads as
    // unknown afterwards.
    let err = fence
        .prepare(&ctx, |_tx| {
            Box::pin(async { Err::<(), FenceError>(anyhow::anyhow!("insufficient funds").into()) })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, FenceError::Any(_)));

    let err = fence
        .confirm(&ctx, |_record, _tx| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();

    assert!(matches!(err, FenceError::RecordNotFound { .. }));

    // A fresh prepare goes through: nothing was committed above.
    fence
        .prepare(&ctx, |_tx| Box::pin(async { Ok(()) }))
        .await?;

    // A failing confirm keeps the branch in init state; the retry runs
    // the callback again and commits.
    let err = fence
        .confirm(&ctx, |_record, _tx| {
            Box::pin(async { Err::<(), FenceError>(anyhow::anyhow!("downstream timeout").into()) })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, FenceError::Any(_)));

    let applied = Arc::new(AtomicUsize::new(0));
    let counter = applied.clone();
    fence
        .confirm(&ctx, move |_record, _tx| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .await?;

    assert_eq!(applied.load(Ordering::SeqCst), 1);

    Ok(())
}

pub async fn test_missing_context<E: Engine>(fence: &Fence<E>) -> anyhow::Result<()> {
    let err = fence
        .prepare(&BranchContext::new("", "b-1", "debit"), |_tx| {
            Box::pin(async { Ok(()) })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, FenceError::MissingContext("global_tx_id")));

    let err = fence
        .confirm(&BranchContext::new("tx-1", "", "debit"), |_record, _tx| {
            Box::pin(async { Ok(()) })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, FenceError::MissingContext("branch_id")));

    Ok(())
}

pub async fn test_concurrent_confirm_cancel<E: Engine>(fence: &Fence<E>) -> anyhow::Result<()> {
    for round in 0..10 {
        let gid = format!("tx-race-{round}");
        let ctx = ctx(&gid, "b-1");

        fence
            .prepare(&ctx, |_tx| Box::pin(async { Ok(()) }))
            .await?;

        let applied = Arc::new(AtomicUsize::new(0));

        let confirm_fence = fence.clone();
        let confirm_ctx = ctx.clone();
        let confirm_applied = applied.clone();
        let confirm = tokio::spawn(async move {
            confirm_fence
                .confirm(&confirm_ctx, move |_record, _tx| {
                    Box::pin(async move {
                        confirm_applied.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                })
                .await
        });

        let cancel_fence = fence.clone();
        let cancel_ctx = ctx.clone();
        let cancel_applied = applied.clone();
        let cancel = tokio::spawn(async move {
            cancel_fence
                .cancel(&cancel_ctx, move |_record, _tx| {
                    Box::pin(async move {
                        cancel_applied.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                })
                .await
        });

        let confirm_res = confirm.await?;
        let cancel_res = cancel.await?;

        // Exactly one phase wins the row lock and applies its callback;
        // the loser observes the terminal state and reports the protocol
        // violation.
        assert_eq!(applied.load(Ordering::SeqCst), 1);
        assert!(confirm_res.is_ok() ^ cancel_res.is_ok());

        let err = match (confirm_res, cancel_res) {
            (Err(err), Ok(())) | (Ok(()), Err(err)) => err,
            _ => unreachable!(),
        };

        assert!(err.is_protocol_violation());
    }

    Ok(())
}
