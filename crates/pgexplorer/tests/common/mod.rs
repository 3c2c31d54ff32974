//! Shared helpers for database-backed tests.

#![allow(dead_code)]

use pgexplorer::{ConnectionProfile, Credentials, SslMode};
use tokio_postgres::config::Host;

pub fn database_url() -> Option<String> {
    let _ = dotenvy::dotenv();
    std::env::var("DATABASE_URL").ok()
}

pub async fn try_connect() -> Option<tokio_postgres::Client> {
    let database_url = database_url()?;
    let (client, connection) = tokio_postgres::connect(&database_url, tokio_postgres::NoTls)
        .await
        .expect("Failed to connect to DATABASE_URL with NoTls");
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("tokio-postgres connection error: {e}");
        }
    });
    Some(client)
}

/// Credentials for DATABASE_URL; `None` when unset or not a TCP host.
pub fn credentials() -> Option<Credentials> {
    let cfg: tokio_postgres::Config = database_url()?.parse().ok()?;
    let host = match cfg.get_hosts().first()? {
        Host::Tcp(host) => host.clone(),
        _ => return None,
    };
    let sslmode = match cfg.get_ssl_mode() {
        tokio_postgres::config::SslMode::Require => SslMode::Require,
        _ => SslMode::Disable,
    };
    let password = cfg
        .get_password()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .unwrap_or_default();
    Some(
        Credentials::new(
            host,
            cfg.get_ports().first().copied().unwrap_or(5432),
            cfg.get_user().unwrap_or("postgres"),
            password,
            cfg.get_dbname().unwrap_or("postgres"),
        )
        .sslmode(sslmode),
    )
}

pub fn profile(id: i64) -> Option<ConnectionProfile> {
    Some(ConnectionProfile::new(id, "integration", credentials()?))
}

/// A table name no other test run uses.
pub fn unique_table(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}
