//! Connection provisioning.

mod common;

use pgexplorer::{ConnectionFactory, Credentials, ExplorerConfig, ExplorerError, SslMode};

#[tokio::test]
async fn unreachable_host_returns_false_and_leaks_nothing() {
    let factory = ConnectionFactory::new(ExplorerConfig::new().connect_timeout_ms(2000));
    let creds = Credentials::new("127.0.0.1", 1, "nobody", "nopass", "nodb").sslmode(SslMode::Disable);

    assert!(!factory.test_connection(&creds).await);
    assert!(factory.registered_keys().is_empty());

    let err = factory.try_test_connection(&creds).await.unwrap_err();
    assert!(matches!(err, ExplorerError::Connection(_) | ExplorerError::Timeout(_)));
    assert!(factory.registered_keys().is_empty());
}

#[tokio::test]
async fn handle_is_released_on_drop() {
    let Some(profile) = common::profile(11) else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let factory = ConnectionFactory::new(ExplorerConfig::default());

    assert!(factory.test_connection(&profile.credentials).await);
    assert!(factory.registered_keys().is_empty());

    {
        let handle = factory.acquire(&profile, None).await.unwrap();
        assert_eq!(handle.key(), "postgres_11");
        assert_eq!(factory.registered_keys(), vec!["postgres_11".to_string()]);
        handle.client().batch_execute("SELECT 1").await.unwrap();
    }
    assert!(factory.registered_keys().is_empty());
}

#[tokio::test]
async fn reacquire_replaces_registration_without_breaking_live_handle() {
    let Some(profile) = common::profile(12) else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let factory = ConnectionFactory::new(ExplorerConfig::default());

    let first = factory.acquire(&profile, None).await.unwrap();
    let second = factory.acquire(&profile, None).await.unwrap();

    // The replaced handle keeps working until dropped.
    first.client().batch_execute("SELECT 1").await.unwrap();
    drop(first);
    assert!(factory.registered_keys().contains(&"postgres_12".to_string()));

    second.client().batch_execute("SELECT 1").await.unwrap();
    drop(second);
    assert!(factory.registered_keys().is_empty());
}

#[tokio::test]
async fn statement_timeout_is_enforced() {
    let Some(profile) = common::profile(13) else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let factory = ConnectionFactory::new(ExplorerConfig::new().statement_timeout_ms(100));
    let handle = factory.acquire(&profile, None).await.unwrap();

    let err = handle.client().batch_execute("SELECT pg_sleep(2)").await.unwrap_err();
    let err = ExplorerError::from(err);
    assert_eq!(err.sql_state(), Some("57014"));
}
