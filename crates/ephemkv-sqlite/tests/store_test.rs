//! Integration tests for the SQLite ephemeral store

use ephemkv_sqlite::{EphemeralOps, EphemkvError, SqliteEphemeralStore, StoreConfig, SweepErrors};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn create_test_store(ttl: Duration) -> (SqliteEphemeralStore, SweepErrors) {
    SqliteEphemeralStore::initialize(ttl).unwrap()
}

#[tokio::test]
async fn test_put_then_get() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));

    let key = store.put("a@b.com").unwrap();
    assert_eq!(store.get(&key).unwrap().as_deref(), Some("a@b.com"));
    // Reads are not destructive
    assert_eq!(store.get(&key).unwrap().as_deref(), Some("a@b.com"));

    store.close().unwrap();
}

#[tokio::test]
async fn test_keys_are_pairwise_distinct() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));

    let keys: HashSet<String> = (0..500).map(|_| store.put("same value").unwrap()).collect();
    assert_eq!(keys.len(), 500);
}

#[tokio::test]
async fn test_delete_unknown_key_is_not_an_error() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));

    assert!(!store.delete("never-issued").unwrap());
    assert!(store.get("never-issued").unwrap().is_none());
}

#[tokio::test]
async fn test_delete_is_at_most_once() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));
    let key = store.put("regkey payload").unwrap();

    assert!(store.delete(&key).unwrap());
    assert!(!store.delete(&key).unwrap());
    assert!(store.get(&key).unwrap().is_none());
}

#[tokio::test]
async fn test_take_consumes_once() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));
    let key = store.put("one-time").unwrap();

    assert_eq!(store.take(&key).unwrap().as_deref(), Some("one-time"));
    assert!(store.take(&key).unwrap().is_none());
}

#[tokio::test]
async fn test_get_all_keys_returns_live_keys() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));

    let a = store.put("a").unwrap();
    let b = store.put("b").unwrap();
    let c = store.put("c").unwrap();
    store.delete(&b).unwrap();

    let keys: HashSet<String> = store.get_all_keys().unwrap().into_iter().collect();
    assert_eq!(keys, HashSet::from([a, c]));
    assert_eq!(store.len().unwrap(), 2);
}

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let (store, _errors) = create_test_store(Duration::from_secs(1));

    let key = store.put("a@b.com").unwrap();
    assert_eq!(store.get(&key).unwrap().as_deref(), Some("a@b.com"));

    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert!(store.get(&key).unwrap().is_none());
    assert!(store.get_all_keys().unwrap().is_empty());
}

#[tokio::test]
async fn test_sweeper_removes_expired_rows() {
    let config = StoreConfig::new(Duration::from_secs(1))
        .with_sweep_interval(Duration::from_millis(500));
    let (store, _errors) = SqliteEphemeralStore::initialize_with_config(config).unwrap();

    let key = store.put("short lived").unwrap();
    let entry = store.get_entry(&key).unwrap().unwrap();
    assert!(!entry.is_expired());

    // One full TTL plus two sweep intervals
    tokio::time::sleep(Duration::from_millis(2200)).await;

    assert!(store.get_entry(&key).unwrap().is_none());
}

#[tokio::test]
async fn test_sweep_now_leaves_live_rows() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));
    let key = store.put("fresh").unwrap();

    assert_eq!(store.sweep_now().unwrap(), 0);
    assert!(store.get(&key).unwrap().is_some());
}

#[tokio::test]
async fn test_expiry_is_fixed_at_creation() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));

    let before = ephemkv_core::now_ms();
    let key = store.put("v").unwrap();
    let after = ephemkv_core::now_ms();

    let first = store.get_entry(&key).unwrap().unwrap();
    assert!(first.expires_at_ms >= before + 60_000);
    assert!(first.expires_at_ms <= after + 60_000);

    store.get(&key).unwrap();
    let second = store.get_entry(&key).unwrap().unwrap();
    assert_eq!(first.expires_at_ms, second.expires_at_ms);
}

#[tokio::test]
async fn test_failed_transaction_rolls_back() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));
    let key = store.put("x").unwrap();

    let result: ephemkv_sqlite::Result<()> = store.in_transaction(|view| {
        assert!(view.delete(&key)?);
        view.put("never committed")?;
        Err(anyhow::anyhow!("boom").into())
    });

    let err = result.unwrap_err();
    assert!(matches!(err, EphemkvError::Other(_)));
    assert!(err.to_string().contains("boom"));

    assert_eq!(store.get(&key).unwrap().as_deref(), Some("x"));
    assert_eq!(store.get_all_keys().unwrap(), vec![key]);
}

#[tokio::test]
async fn test_successful_transaction_commits() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));
    let old = store.put("old").unwrap();

    let new = store
        .in_transaction(|view| {
            assert_eq!(view.get(&old)?.as_deref(), Some("old"));
            assert!(view.delete(&old)?);
            let new = view.put("new")?;
            assert_eq!(view.get(&new)?.as_deref(), Some("new"));
            Ok(new)
        })
        .unwrap();

    assert!(store.get(&old).unwrap().is_none());
    assert_eq!(store.get(&new).unwrap().as_deref(), Some("new"));
}

#[tokio::test]
async fn test_failed_commit_applies_nothing() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));
    store
        .in_transaction(|view| {
            view.executor().execute_batch(
                "CREATE TABLE accounts (id INTEGER PRIMARY KEY);
                 CREATE TABLE invites (
                     id INTEGER PRIMARY KEY,
                     account_id INTEGER NOT NULL
                         REFERENCES accounts(id) DEFERRABLE INITIALLY DEFERRED
                 );",
            )?;
            Ok(())
        })
        .unwrap();

    // The dangling reference is only caught at COMMIT
    let mut issued = None;
    let result: ephemkv_sqlite::Result<()> = store.in_transaction(|view| {
        issued = Some(view.put("invite")?);
        view.executor()
            .execute("INSERT INTO invites (account_id) VALUES (?1)", [42])?;
        Ok(())
    });

    match result {
        Err(EphemkvError::Database(rusqlite::Error::SqliteFailure(err, _))) => {
            assert_eq!(err.code, rusqlite::ErrorCode::ConstraintViolation);
        }
        other => panic!("expected a constraint failure at commit, got {other:?}"),
    }
    let issued = issued.expect("put ran before the commit");
    assert!(store.get_entry(&issued).unwrap().is_none());
    assert_eq!(store.len().unwrap(), 0);

    // Nothing is left open: the next transaction starts and commits
    let invites: i64 = store
        .in_transaction(|view| {
            Ok(view
                .executor()
                .query_row("SELECT COUNT(*) FROM invites", [], |row| row.get(0))?)
        })
        .unwrap();
    assert_eq!(invites, 0);
    let key = store.put("after").unwrap();
    assert_eq!(store.get(&key).unwrap().as_deref(), Some("after"));
}

#[tokio::test]
async fn test_failed_rollback_is_joined_with_callback_error() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));

    // The callback ends the transaction itself, so the rollback has nothing to undo
    let mut issued = None;
    let result: ephemkv_sqlite::Result<()> = store.in_transaction(|view| {
        issued = Some(view.put("escaped")?);
        view.executor().execute_batch("COMMIT")?;
        Err(anyhow::anyhow!("boom").into())
    });

    let err = result.unwrap_err();
    match &err {
        EphemkvError::Rollback { source, .. } => {
            assert!(matches!(**source, EphemkvError::Other(_)));
        }
        other => panic!("expected a joined rollback failure, got {other:?}"),
    }
    assert!(err.to_string().contains("boom"));
    assert!(err.to_string().contains("rollback also failed"));

    // Work committed by the callback's own COMMIT stays committed
    let issued = issued.expect("put ran before the COMMIT");
    assert_eq!(store.get(&issued).unwrap().as_deref(), Some("escaped"));
    store.in_transaction(|view| view.delete(&issued)).unwrap();
    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn test_token_exchange_composes_with_caller_statements() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));

    store
        .in_transaction(|view| {
            view.executor().execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL UNIQUE)",
            )?;
            Ok(())
        })
        .unwrap();

    let count_users = |store: &SqliteEphemeralStore| -> i64 {
        store
            .in_transaction(|view| {
                Ok(view
                    .executor()
                    .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
            })
            .unwrap()
    };

    let token = store.put("taken@example.com").unwrap();
    store
        .in_transaction(|view| {
            view.executor().execute(
                "INSERT INTO users (email) VALUES (?1)",
                ["taken@example.com"],
            )?;
            Ok(())
        })
        .unwrap();

    // User creation hits the unique constraint: the token must survive
    let result: ephemkv_sqlite::Result<()> = store.in_transaction(|view| {
        let email = view.take(&token)?.expect("token is live");
        view.executor()
            .execute("INSERT INTO users (email) VALUES (?1)", [email])?;
        Ok(())
    });
    assert!(matches!(result, Err(EphemkvError::Database(_))));
    assert!(store.get(&token).unwrap().is_some());
    assert_eq!(count_users(&store), 1);

    // A fresh email succeeds and consumes the token with it
    let token = store.put("fresh@example.com").unwrap();
    store
        .in_transaction(|view| {
            let email = view.take(&token)?.expect("token is live");
            view.executor()
                .execute("INSERT INTO users (email) VALUES (?1)", [email])?;
            Ok(())
        })
        .unwrap();
    assert!(store.get(&token).unwrap().is_none());
    assert_eq!(count_users(&store), 2);
}

fn consume_with<S: EphemeralOps>(ops: &S, key: &str) -> ephemkv_sqlite::Result<Option<String>> {
    let value = ops.get(key)?;
    if value.is_some() {
        ops.delete(key)?;
    }
    Ok(value)
}

#[tokio::test]
async fn test_same_logic_runs_on_store_and_view() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));

    let direct = store.put("direct").unwrap();
    assert_eq!(consume_with(&store, &direct).unwrap().as_deref(), Some("direct"));

    let grouped = store.put("grouped").unwrap();
    let value = store
        .in_transaction(|view| consume_with(view, &grouped))
        .unwrap();
    assert_eq!(value.as_deref(), Some("grouped"));

    assert!(store.get_all_keys().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_connection() {
    let (store, _errors) = create_test_store(Duration::from_secs(60));
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let mut keys = Vec::new();
                for i in 0..50 {
                    let key = store.put(&format!("{t}-{i}")).unwrap();
                    if i % 2 == 0 {
                        store
                            .in_transaction(|view| {
                                assert!(view.get(&key)?.is_some());
                                assert!(view.delete(&key)?);
                                Ok(())
                            })
                            .unwrap();
                    } else {
                        keys.push(key);
                    }
                }
                keys
            })
        })
        .collect();

    let mut expected = HashSet::new();
    for handle in handles {
        expected.extend(handle.join().unwrap());
    }

    let live: HashSet<String> = store.get_all_keys().unwrap().into_iter().collect();
    assert_eq!(live.len(), 8 * 25);
    assert_eq!(live, expected);

    store.close().unwrap();
}

#[tokio::test]
async fn test_store_in_custom_parent_dir() {
    let parent = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(Duration::from_secs(60)).with_temp_dir(parent.path());
    let (store, _errors) = SqliteEphemeralStore::initialize_with_config(config).unwrap();

    assert!(store.path().starts_with(parent.path()));
    store.put("v").unwrap();

    store.close().unwrap();
    assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_two_stores_are_isolated() {
    let (regkeys, _e1) = create_test_store(Duration::from_secs(60));
    let (tokens, _e2) = create_test_store(Duration::from_secs(60));

    let key = regkeys.put("registration").unwrap();
    assert_ne!(regkeys.path(), tokens.path());
    assert!(tokens.get(&key).unwrap().is_none());
    assert!(tokens.get_all_keys().unwrap().is_empty());
}
