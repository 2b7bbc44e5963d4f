use std::{sync::Arc, time::Duration};

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use uuid::Uuid;

use engine::{Engine, EngineError, Money, RetryPolicy, TransferCmd};
use migration::MigratorTrait;

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

async fn engine_with_file_db(
    retry: RetryPolicy,
) -> (Engine, DatabaseConnection, std::path::PathBuf) {
    let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/test_dbs");
    std::fs::create_dir_all(&root).unwrap();

    let path = root.join(format!("ledger_{}.db", Uuid::new_v4()));
    let url = format!("sqlite:{}?mode=rwc", path.display());

    let db = Database::connect(&url).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .retry_policy(retry)
        .build()
        .await
        .unwrap();

    (engine, db, path)
}

fn money(value: &str) -> Money {
    value.parse().unwrap()
}

async fn wallet(engine: &Engine, opening: &str) -> Uuid {
    engine.create_wallet(None, opening).await.unwrap()
}

async fn overwrite_balance(db: &DatabaseConnection, wallet_id: Uuid, balance: &str) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE wallets SET balance = ? WHERE id = ?",
        vec![balance.into(), wallet_id.to_string().into()],
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn send_moves_money_and_records_transfer() {
    let (engine, _db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0.00").await;

    let id = engine.send(TransferCmd::new(a, b, "30.00")).await.unwrap();

    let from = engine.balance(a).await.unwrap();
    let to = engine.balance(b).await.unwrap();
    assert_eq!(from.balance.to_string(), "70.00");
    assert_eq!(to.balance.to_string(), "30.00");

    let history = engine.history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    let transfer = &history[0];
    assert_eq!(transfer.id, id);
    assert_eq!(transfer.from, a);
    assert_eq!(transfer.to, b);
    assert_eq!(transfer.amount, money("30"));
    assert_eq!(from.updated_at, transfer.transferred_at);
    assert_eq!(to.updated_at, transfer.transferred_at);

    assert_eq!(engine.transfer(id).await.unwrap(), *transfer);
}

#[tokio::test]
async fn insufficient_funds_changes_nothing() {
    let (engine, _db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0.00").await;

    let err = engine
        .send(TransferCmd::new(a, b, "1000.00"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));

    assert_eq!(engine.wallet_balance(a).await.unwrap(), money("100"));
    assert_eq!(engine.wallet_balance(b).await.unwrap(), money("0"));
    assert!(engine.history(10).await.unwrap().is_empty());
    assert!(!engine.is_halted());
}

#[tokio::test]
async fn whole_balance_can_be_sent() {
    let (engine, _db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0").await;

    engine.send(TransferCmd::new(a, b, "100")).await.unwrap();

    assert!(engine.wallet_balance(a).await.unwrap().is_zero());
    assert_eq!(engine.wallet_balance(b).await.unwrap(), money("100.00"));
}

#[tokio::test]
async fn invalid_amounts_are_rejected() {
    let (engine, _db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0.00").await;

    for amount in ["-5.00", "abc", "0", "1e3"] {
        let err = engine
            .send(TransferCmd::new(a, b, amount))
            .await
            .unwrap_err();
        assert!(
            matches!(err, EngineError::InvalidAmount(_)),
            "{amount:?} gave {err:?}"
        );
    }

    assert_eq!(engine.wallet_balance(a).await.unwrap(), money("100"));
    assert!(engine.history(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_wallets_are_reported() {
    let (engine, _db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let missing = Uuid::new_v4();

    let err = engine
        .send(TransferCmd::new(a, missing, "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
    let err = engine
        .send(TransferCmd::new(missing, a, "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
    let err = engine.balance(missing).await.unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
    let err = engine.transfer(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));

    assert_eq!(engine.wallet_balance(a).await.unwrap(), money("100"));
}

#[tokio::test]
async fn self_transfer_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;

    let err = engine.send(TransferCmd::new(a, a, "1")).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransfer(_)));
}

#[tokio::test]
async fn duplicate_wallet_id_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    let id = Uuid::new_v4();
    engine.create_wallet(Some(id), "1").await.unwrap();

    let err = engine.create_wallet(Some(id), "2").await.unwrap_err();
    assert!(matches!(err, EngineError::ExistingKey(_)));
    let err = engine.create_wallet(None, "-1").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));
    assert_eq!(engine.wallet_count().await.unwrap(), 1);
}

#[tokio::test]
async fn seed_wallets_creates_funded_wallets() {
    let (engine, _db) = engine_with_db().await;

    let ids = engine.seed_wallets(3, "100.00").await.unwrap();

    assert_eq!(ids.len(), 3);
    assert_eq!(engine.wallet_count().await.unwrap(), 3);
    for id in ids {
        let wallet = engine.balance(id).await.unwrap();
        assert_eq!(wallet.balance.to_string(), "100.00");
        assert_eq!(wallet.opening_balance, wallet.balance);
    }
    assert!(matches!(
        engine.seed_wallets(0, "1").await,
        Err(EngineError::InvalidCount(_))
    ));
}

#[tokio::test]
async fn concurrent_overdraft_only_one_wins() {
    let (engine, db, path) = engine_with_file_db(RetryPolicy::default()).await;
    let engine = Arc::new(engine);
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0.00").await;

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.send(TransferCmd::new(a, b, "60.00")).await }
    });
    let second = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.send(TransferCmd::new(a, b, "60.00")).await }
    });
    let results = [first.await.unwrap(), second.await.unwrap()];

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(EngineError::InsufficientFunds(_))))
    );
    assert_eq!(engine.wallet_balance(a).await.unwrap(), money("40"));
    assert_eq!(engine.wallet_balance(b).await.unwrap(), money("60"));
    assert_eq!(engine.history(10).await.unwrap().len(), 1);
    assert!(engine.reconcile().await.unwrap().is_clean());

    drop(engine);
    drop(db);
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn concurrent_sends_never_overdraw() {
    let (engine, _db) = engine_with_db().await;
    let engine = Arc::new(engine);
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0.00").await;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.send(TransferCmd::new(a, b, "15.00")).await })
        })
        .collect();

    let mut succeeded = 0usize;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => assert!(matches!(err, EngineError::InsufficientFunds(_))),
        }
    }

    // floor(100 / 15)
    assert_eq!(succeeded, 6);
    assert_eq!(engine.wallet_balance(a).await.unwrap(), money("10"));
    assert_eq!(engine.wallet_balance(b).await.unwrap(), money("90"));
    assert_eq!(engine.history(100).await.unwrap().len(), succeeded);
    assert!(engine.reconcile().await.unwrap().is_clean());
}

#[tokio::test]
async fn history_is_newest_first_and_stable() {
    let (engine, _db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "100.00").await;

    let mut sent = Vec::new();
    for (from, to, amount) in [(a, b, "1"), (b, a, "2"), (a, b, "3"), (b, a, "4")] {
        sent.push(engine.send(TransferCmd::new(from, to, amount)).await.unwrap());
    }

    let all = engine.history(100).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(
        all.windows(2)
            .all(|w| w[0].transferred_at >= w[1].transferred_at)
    );
    let mut expected = all.clone();
    expected.sort_by(|x, y| {
        (y.transferred_at, y.id.to_string()).cmp(&(x.transferred_at, x.id.to_string()))
    });
    assert_eq!(all, expected);
    let mut listed: Vec<Uuid> = all.iter().map(|t| t.id).collect();
    listed.sort();
    sent.sort();
    assert_eq!(listed, sent);

    let latest_two = engine.history(2).await.unwrap();
    assert_eq!(latest_two, all[..2].to_vec());
    assert_eq!(engine.history(100).await.unwrap(), all);

    assert!(matches!(
        engine.history(0).await,
        Err(EngineError::InvalidCount(_))
    ));
    assert!(matches!(
        engine.history(-1).await,
        Err(EngineError::InvalidCount(_))
    ));
}

#[tokio::test]
async fn history_on_empty_log_is_empty() {
    let (engine, _db) = engine_with_db().await;
    assert!(engine.history(5).await.unwrap().is_empty());
}

#[tokio::test]
async fn history_pages_walk_every_transfer_once() {
    let (engine, _db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0.00").await;
    for _ in 0..7 {
        engine.send(TransferCmd::new(a, b, "1.00")).await.unwrap();
    }

    let mut walked = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let page = engine.history_page(3, cursor.as_deref()).await.unwrap();
        pages += 1;
        walked.extend(page.transfers);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(walked, engine.history(100).await.unwrap());

    let err = engine.history_page(3, Some("bogus")).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidCursor(_)));
}

#[tokio::test]
async fn idempotent_replay_moves_money_once() {
    let (engine, _db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0.00").await;

    let cmd = TransferCmd::new(a, b, "25.00").idempotency_key("order-1");
    let first = engine.send(cmd.clone()).await.unwrap();
    let replay = engine.send(cmd).await.unwrap();

    assert_eq!(first, replay);
    assert_eq!(engine.wallet_balance(a).await.unwrap(), money("75"));
    assert_eq!(engine.history(10).await.unwrap().len(), 1);

    let err = engine
        .send(TransferCmd::new(a, b, "26.00").idempotency_key("order-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExistingKey(_)));
    assert_eq!(engine.wallet_balance(a).await.unwrap(), money("75"));
}

#[tokio::test]
async fn amounts_that_would_round_are_rejected() {
    let (engine, _db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0").await;
    let tiny = "0.0000000000000000000000000001";

    for _ in 0..3 {
        let err = engine
            .send(TransferCmd::new(a, b, tiny))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)), "{err:?}");
    }
    assert_eq!(engine.wallet_balance(a).await.unwrap().to_string(), "100.00");
    assert!(engine.wallet_balance(b).await.unwrap().is_zero());
    assert!(engine.history(10).await.unwrap().is_empty());
    assert!(!engine.is_halted());

    // The same amount moves exactly between wallets that can hold it.
    let c = wallet(&engine, "0.0000000000000000000000000005").await;
    engine.send(TransferCmd::new(c, b, tiny)).await.unwrap();
    assert_eq!(
        engine.wallet_balance(c).await.unwrap(),
        money("0.0000000000000000000000000004")
    );
    assert_eq!(engine.wallet_balance(b).await.unwrap(), money(tiny));
    assert!(engine.reconcile().await.unwrap().is_clean());
}

#[tokio::test]
async fn reconcile_is_clean_after_activity() {
    let (engine, _db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "50.00").await;
    let c = wallet(&engine, "0").await;

    engine.send(TransferCmd::new(a, b, "10.50")).await.unwrap();
    engine.send(TransferCmd::new(b, c, "60.50")).await.unwrap();
    engine.send(TransferCmd::new(c, a, "0.01")).await.unwrap();

    let report = engine.reconcile().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.wallets_checked, 3);
    assert_eq!(report.transfers_checked, 3);
    assert!(!engine.is_halted());
}

#[tokio::test]
async fn balance_drift_halts_the_engine() {
    let (engine, db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0.00").await;
    engine.send(TransferCmd::new(a, b, "30.00")).await.unwrap();

    overwrite_balance(&db, b, "31.00").await;

    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.drift.len(), 1);
    assert_eq!(report.drift[0].wallet_id, b);
    assert_eq!(report.drift[0].stored, money("31"));
    assert_eq!(report.drift[0].expected, money("30"));
    assert!(engine.is_halted());

    let err = engine.send(TransferCmd::new(a, b, "1")).await.unwrap_err();
    assert_eq!(err, EngineError::Halted);
    // Reads keep working.
    assert_eq!(engine.wallet_balance(a).await.unwrap(), money("70"));
}

#[tokio::test]
async fn corrupted_balance_halts_the_engine() {
    let (engine, db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0.00").await;
    let c = wallet(&engine, "10.00").await;

    overwrite_balance(&db, a, "garbage").await;

    let err = engine.send(TransferCmd::new(a, b, "1")).await.unwrap_err();
    assert!(matches!(err, EngineError::Corrupted(_)));
    assert!(engine.is_halted());

    // Unrelated wallets are refused as well until restart.
    let err = engine.send(TransferCmd::new(c, b, "1")).await.unwrap_err();
    assert_eq!(err, EngineError::Halted);
    assert_eq!(engine.wallet_balance(c).await.unwrap(), money("10"));
}

#[tokio::test]
async fn negative_stored_balance_is_corruption() {
    let (engine, db) = engine_with_db().await;
    let a = wallet(&engine, "100.00").await;
    overwrite_balance(&db, a, "-1.00").await;

    let err = engine.balance(a).await.unwrap_err();
    assert!(matches!(err, EngineError::Corrupted(_)));
    assert!(engine.is_halted());
}

#[tokio::test]
async fn missing_schema_is_reported_at_build() {
    let db = Database::connect("sqlite::memory:").await.unwrap();

    let err = Engine::builder().database(db).build().await.unwrap_err();
    assert!(matches!(err, EngineError::Corrupted(_)));
}

#[tokio::test]
async fn concurrent_sends_on_file_db_keep_the_ledger_consistent() {
    let retry = RetryPolicy::new(50, Duration::from_millis(1), Duration::from_millis(20));
    let (engine, db, path) = engine_with_file_db(retry).await;
    let engine = Arc::new(engine);
    let a = wallet(&engine, "100.00").await;
    let b = wallet(&engine, "0.00").await;
    let c = wallet(&engine, "0.00").await;

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let to = if i % 2 == 0 { b } else { c };
            tokio::spawn(async move { engine.send(TransferCmd::new(a, to, "10.00")).await })
        })
        .collect();

    let mut succeeded = 0usize;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => assert!(
                matches!(
                    err,
                    EngineError::InsufficientFunds(_) | EngineError::Transient { .. }
                ),
                "unexpected error: {err:?}"
            ),
        }
    }

    assert!(succeeded <= 10);
    let remaining = engine.wallet_balance(a).await.unwrap();
    assert!(!remaining.is_negative());
    let spent = Money::from(rust_decimal::Decimal::from(succeeded as u64 * 10));
    assert_eq!(remaining.checked_add(spent).unwrap(), money("100"));
    assert_eq!(engine.history(100).await.unwrap().len(), succeeded);
    assert!(engine.reconcile().await.unwrap().is_clean());

    drop(engine);
    drop(db);
    let _ = std::fs::remove_file(path);
}
