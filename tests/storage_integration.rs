//! End-to-end persistence behavior against an in-memory store: import
//! idempotence, the completion lifecycle, cascades and the unique-violation
//! mapping.

use chainflow::errors::StoreError;
use chainflow::storage::{
    connect, NewAccount, NewSwap, OperationKind, ServiceUnitOfWork,
};

fn key(n: u64) -> String {
    format!("0x{n:064x}")
}

fn addr(n: u64) -> String {
    format!("0x{n:040x}")
}

#[tokio::test]
async fn account_lifecycle_flips_completed_once() -> eyre::Result<()> {
    let pool = connect("sqlite::memory:").await?;
    let mut uow = ServiceUnitOfWork::begin(&pool).await?;

    // One planned swap and one planned bridge.
    let account = uow
        .accounts()
        .add(&NewAccount::new(&key(1), &addr(1))?.with_planned(1, 0, 1, 0))
        .await?;
    assert!(!account.completed);

    let after_swap = uow
        .accounts()
        .decrement_planned(account.id, OperationKind::Swap)
        .await?;
    assert_eq!(after_swap.planned_swaps_count, 0);
    assert!(!after_swap.completed, "bridge still planned");

    let after_bridge = uow
        .accounts()
        .decrement_planned(account.id, OperationKind::Bridge)
        .await?;
    assert!(after_bridge.completed);
    assert!(after_bridge.all_counters_zero());

    // Further decrements change nothing.
    let again = uow
        .accounts()
        .decrement_planned(account.id, OperationKind::Bridge)
        .await?;
    assert_eq!(again.planned_bridges_count, 0);
    assert!(again.completed);

    uow.commit().await?;
    Ok(())
}

#[tokio::test]
async fn swap_record_and_counter_commit_atomically() -> eyre::Result<()> {
    let pool = connect("sqlite::memory:").await?;

    let account = {
        let mut uow = ServiceUnitOfWork::begin(&pool).await?;
        let account = uow
            .accounts()
            .add(&NewAccount::new(&key(2), &addr(2))?.with_planned(1, 0, 0, 0))
            .await?;
        uow.commit().await?;
        account
    };

    // A failed unit of work leaves both the record and the counter untouched.
    {
        let mut uow = ServiceUnitOfWork::begin(&pool).await?;
        uow.swaps()
            .add(&NewSwap {
                account_id: account.id,
                network: "zkSync Era".into(),
                src_amount: "0.005".into(),
                src_token: "ETH".into(),
                dst_amount: "14.925".into(),
                dst_token: "USDC".into(),
                volume_usd: 15.0,
                fee: "0.0002".into(),
                fee_in_usd: 0.6,
                platform: "SpaceFi".into(),
                tx_hash: "0xdead".into(),
            })
            .await?;
        uow.accounts()
            .decrement_planned(account.id, OperationKind::Swap)
            .await?;
        uow.rollback().await?;
    }
    {
        let mut uow = ServiceUnitOfWork::begin(&pool).await?;
        let fresh = uow.accounts().get_by_id(account.id).await?;
        assert_eq!(fresh.planned_swaps_count, 1);
        assert!(!fresh.completed);
        assert!(uow.swaps().get_all_by_account_id(account.id).await?.is_empty());
    }

    // The committed version lands both.
    {
        let mut uow = ServiceUnitOfWork::begin(&pool).await?;
        uow.swaps()
            .add(&NewSwap {
                account_id: account.id,
                network: "zkSync Era".into(),
                src_amount: "0.005".into(),
                src_token: "ETH".into(),
                dst_amount: "14.925".into(),
                dst_token: "USDC".into(),
                volume_usd: 15.0,
                fee: "0.0002".into(),
                fee_in_usd: 0.6,
                platform: "SpaceFi".into(),
                tx_hash: "0xbeef".into(),
            })
            .await?;
        let updated = uow
            .accounts()
            .decrement_planned(account.id, OperationKind::Swap)
            .await?;
        assert!(updated.completed);
        uow.commit().await?;
    }

    let mut uow = ServiceUnitOfWork::begin(&pool).await?;
    let swaps = uow.swaps().get_all_by_account_id(account.id).await?;
    assert_eq!(swaps.len(), 1);
    assert_eq!(swaps[0].tx_hash, "0xbeef");
    Ok(())
}

#[tokio::test]
async fn duplicate_key_import_is_reported_with_redaction() -> eyre::Result<()> {
    let pool = connect("sqlite::memory:").await?;
    let mut uow = ServiceUnitOfWork::begin(&pool).await?;

    let new = NewAccount::new(&key(3), &addr(3))?;
    uow.accounts().add(&new).await?;

    // Same key under a different address still violates uniqueness.
    let mut dup = NewAccount::new(&key(3), &addr(4))?;
    dup.account_name = Some("dup".into());
    let err = uow.accounts().add(&dup).await.unwrap_err();
    match err {
        StoreError::AccountExists { address, key_redacted } => {
            assert_eq!(address, addr(4));
            assert!(key_redacted.contains("***"));
            assert!(!key_redacted.contains(&key(3)[10..40]));
        }
        other => panic!("expected AccountExists, got {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn ready_query_gates_on_time_and_completion() -> eyre::Result<()> {
    let pool = connect("sqlite::memory:").await?;
    let now = chrono::Utc::now().naive_utc();
    let mut uow = ServiceUnitOfWork::begin(&pool).await?;

    let due = uow
        .accounts()
        .add(&NewAccount::new(&key(5), &addr(5))?.with_planned(1, 0, 0, 0))
        .await?;
    let deferred = uow
        .accounts()
        .add(&NewAccount::new(&key(6), &addr(6))?.with_planned(1, 0, 0, 0))
        .await?;
    uow.accounts()
        .set_next_action_time(deferred.id, now + chrono::Duration::hours(2))
        .await?;
    let done = uow
        .accounts()
        .add(&NewAccount::new(&key(7), &addr(7))?.with_planned(1, 0, 0, 0))
        .await?;
    uow.accounts()
        .decrement_planned(done.id, OperationKind::Swap)
        .await?;

    let ready = uow.accounts().get_all_ready(now).await?;
    let ids: Vec<i64> = ready.iter().map(|a| a.id).collect();
    assert!(ids.contains(&due.id));
    assert!(!ids.contains(&deferred.id), "future next_action_time");
    assert!(!ids.contains(&done.id), "completed account");
    Ok(())
}
