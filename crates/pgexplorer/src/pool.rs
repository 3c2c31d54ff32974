//! Pool construction for provisioned connections.

use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, ExplorerResult};
use crate::profile::{Credentials, SslMode};
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolBuilder, RecyclingMethod, Runtime};
use native_tls::{Certificate, Identity, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::NoTls;
use tokio_postgres::Socket;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};

/// Connections a single provisioned handle may hold at once.
pub const HANDLE_POOL_SIZE: usize = 2;

/// Driver configuration with the explorer's timeouts applied.
pub fn pg_config(credentials: &Credentials, config: &ExplorerConfig) -> tokio_postgres::Config {
    let mut cfg = credentials.to_pg_config();
    cfg.connect_timeout(config.connect_timeout());
    if let Some(ms) = config.statement_timeout_ms {
        cfg.options(&format!("-c statement_timeout={ms}"));
    }
    cfg
}

/// Build a pool for `credentials`, choosing TLS from its `sslmode`.
///
/// No connection is opened until the first `get()`.
pub fn create_pool(credentials: &Credentials, config: &ExplorerConfig) -> ExplorerResult<Pool> {
    let pg_config = pg_config(credentials, config);
    let wait = config.pool_wait_timeout();
    let configure = |b: PoolBuilder| {
        let b = b.max_size(HANDLE_POOL_SIZE);
        match wait {
            Some(t) => b.wait_timeout(Some(t)).runtime(Runtime::Tokio1),
            None => b,
        }
    };

    match credentials.sslmode {
        SslMode::Disable => create_pool_with_manager_config(pg_config, NoTls, configure),
        _ => create_pool_with_manager_config(pg_config, tls_connector(credentials)?, configure),
    }
}

/// Create a pool with an injected TLS connector and `PoolBuilder` tuning.
pub fn create_pool_with_manager_config<T>(
    pg_config: tokio_postgres::Config,
    tls: T,
    configure_pool: impl FnOnce(PoolBuilder) -> PoolBuilder,
) -> ExplorerResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let mgr = Manager::from_config(pg_config, tls, default_manager_config());
    configure_pool(Pool::builder(mgr))
        .build()
        .map_err(|e| ExplorerError::Pool(e.to_string()))
}

fn default_manager_config() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    }
}

/// Native TLS connector honouring `sslmode` and the optional certificate files.
pub fn tls_connector(credentials: &Credentials) -> ExplorerResult<MakeTlsConnector> {
    let mut builder = TlsConnector::builder();

    if let Some(path) = non_empty(&credentials.sslrootcert) {
        let pem = read_file("root certificate", path)?;
        let cert = Certificate::from_pem(&pem)
            .map_err(|e| ExplorerError::Tls(format!("invalid root certificate {path}: {e}")))?;
        builder.add_root_certificate(cert);
    }

    if let (Some(cert_path), Some(key_path)) =
        (non_empty(&credentials.sslcert), non_empty(&credentials.sslkey))
    {
        let cert = read_file("client certificate", cert_path)?;
        let key = read_file("client key", key_path)?;
        let identity = Identity::from_pkcs8(&cert, &key)
            .map_err(|e| ExplorerError::Tls(format!("invalid client certificate/key pair: {e}")))?;
        builder.identity(identity);
    }

    let (accept_invalid_certs, accept_invalid_hostnames) = verification(
        credentials.sslmode,
        non_empty(&credentials.sslrootcert).is_some(),
    );
    builder.danger_accept_invalid_certs(accept_invalid_certs);
    builder.danger_accept_invalid_hostnames(accept_invalid_hostnames);

    let connector = builder
        .build()
        .map_err(|e| ExplorerError::Tls(format!("failed to build TLS connector: {e}")))?;
    Ok(MakeTlsConnector::new(connector))
}

/// `(accept_invalid_certs, accept_invalid_hostnames)` for a mode.
///
/// Modes below `verify-ca` only ask for encryption; with a root certificate
/// the chain is still checked.
fn verification(mode: SslMode, has_root_cert: bool) -> (bool, bool) {
    if mode.verifies_certificate() {
        (false, mode != SslMode::VerifyFull)
    } else {
        (!has_root_cert, true)
    }
}

fn non_empty(path: &Option<String>) -> Option<&str> {
    path.as_deref().filter(|p| !p.is_empty())
}

fn read_file(what: &str, path: &str) -> ExplorerResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| ExplorerError::Tls(format!("failed to read {what} {path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeouts_are_applied() {
        let creds = Credentials::new("localhost", 5432, "postgres", "", "postgres");
        let config = ExplorerConfig::new()
            .connect_timeout_ms(2500)
            .statement_timeout_ms(30_000);
        let cfg = pg_config(&creds, &config);
        assert_eq!(cfg.get_connect_timeout(), Some(&Duration::from_millis(2500)));
        assert_eq!(cfg.get_options(), Some("-c statement_timeout=30000"));
        assert_eq!(cfg.get_password(), None);
    }

    #[test]
    fn no_statement_timeout_by_default() {
        let creds = Credentials::new("localhost", 5432, "postgres", "pw", "postgres");
        let cfg = pg_config(&creds, &ExplorerConfig::default());
        assert_eq!(cfg.get_options(), None);
        assert_eq!(cfg.get_password(), Some(&b"pw"[..]));
    }

    #[test]
    fn verification_levels() {
        assert_eq!(verification(SslMode::Require, false), (true, true));
        assert_eq!(verification(SslMode::Require, true), (false, true));
        assert_eq!(verification(SslMode::Prefer, false), (true, true));
        assert_eq!(verification(SslMode::VerifyCa, false), (false, true));
        assert_eq!(verification(SslMode::VerifyFull, true), (false, false));
    }

    #[test]
    fn missing_certificate_file_is_a_tls_error() {
        let creds = Credentials::new("localhost", 5432, "postgres", "", "postgres")
            .sslmode(SslMode::VerifyFull)
            .sslrootcert("/nonexistent/root.crt");
        assert!(matches!(tls_connector(&creds), Err(ExplorerError::Tls(_))));
    }

    #[tokio::test]
    async fn pool_is_lazy() {
        let creds = Credentials::new("127.0.0.1", 1, "nobody", "", "none").sslmode(SslMode::Disable);
        let pool = create_pool(&creds, &ExplorerConfig::default()).unwrap();
        assert_eq!(pool.status().size, 0);
        assert_eq!(pool.status().max_size, HANDLE_POOL_SIZE);
    }
}
