//! Configuration resolution for the `nimbus` binary.
//!
//! Resolution chain: CLI flag > environment variable > default. There is
//! no config file layer -- the control plane has no secrets to manage
//! beyond the database URL and provider credentials, which individual
//! `ProviderAdapter` implementations read for themselves.

use nimbus_db::config::DbConfig;

/// Default bind address for `nimbus serve`.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default port for `nimbus serve`.
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct NimbusConfig {
    pub db_config: DbConfig,
    pub bind: String,
    pub port: u16,
}

impl NimbusConfig {
    /// Resolve configuration using the chain: CLI flag > env var > default.
    ///
    /// - DB URL: `cli_db_url` > `NIMBUS_DATABASE_URL` > [`DbConfig::DEFAULT_URL`].
    /// - Bind address: `cli_bind` > `NIMBUS_BIND` > [`DEFAULT_BIND`].
    /// - Port: `cli_port` > `NIMBUS_PORT` > [`DEFAULT_PORT`].
    pub fn resolve(
        cli_db_url: Option<&str>,
        cli_bind: Option<&str>,
        cli_port: Option<u16>,
    ) -> anyhow::Result<Self> {
        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("NIMBUS_DATABASE_URL") {
            url
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        let bind = if let Some(b) = cli_bind {
            b.to_string()
        } else if let Ok(b) = std::env::var("NIMBUS_BIND") {
            b
        } else {
            DEFAULT_BIND.to_string()
        };

        let port = if let Some(p) = cli_port {
            p
        } else if let Ok(p) = std::env::var("NIMBUS_PORT") {
            p.parse()
                .map_err(|e| anyhow::anyhow!("NIMBUS_PORT is not a valid port number: {e}"))?
        } else {
            DEFAULT_PORT
        };

        Ok(Self {
            db_config: DbConfig::new(db_url),
            bind,
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
        LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn resolve_with_cli_flags_overrides_all() {
        let _lock = lock_env();
        unsafe { std::env::set_var("NIMBUS_DATABASE_URL", "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var("NIMBUS_BIND", "0.0.0.0") };
        unsafe { std::env::set_var("NIMBUS_PORT", "9999") };

        let cfg = NimbusConfig::resolve(Some("postgresql://cli:5432/clidb"), Some("10.0.0.1"), Some(1234))
            .unwrap();
        assert_eq!(cfg.db_config.database_url, "postgresql://cli:5432/clidb");
        assert_eq!(cfg.bind, "10.0.0.1");
        assert_eq!(cfg.port, 1234);

        unsafe { std::env::remove_var("NIMBUS_DATABASE_URL") };
        unsafe { std::env::remove_var("NIMBUS_BIND") };
        unsafe { std::env::remove_var("NIMBUS_PORT") };
    }

    #[test]
    fn resolve_falls_back_to_env_then_default() {
        let _lock = lock_env();
        unsafe { std::env::remove_var("NIMBUS_DATABASE_URL") };
        unsafe { std::env::remove_var("NIMBUS_BIND") };
        unsafe { std::env::remove_var("NIMBUS_PORT") };

        let cfg = NimbusConfig::resolve(None, None, None).unwrap();
        assert_eq!(cfg.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(cfg.bind, DEFAULT_BIND);
        assert_eq!(cfg.port, DEFAULT_PORT);

        unsafe { std::env::set_var("NIMBUS_BIND", "192.168.1.1") };
        let cfg = NimbusConfig::resolve(None, None, None).unwrap();
        assert_eq!(cfg.bind, "192.168.1.1");
        unsafe { std::env::remove_var("NIMBUS_BIND") };
    }
}
