//! Process configuration for x402paygate.
//!
//! Every setting is sourced from the environment (optionally loaded from a
//! `.env` file by `main` before this runs), with `clap`'s `env` derive
//! feature giving us `--flag`/`ENV_VAR` parity and `--help` output for free.

use clap::Parser;
use std::net::IpAddr;
use url::Url;

fn default_port() -> u16 {
    8080
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_max_connections() -> u32 {
    10
}

/// Runtime configuration for the proxy process.
#[derive(Parser, Debug, Clone)]
#[command(name = "x402paygate")]
#[command(about = "Multi-tenant HTTP reverse proxy that monetizes upstream APIs over x402")]
pub struct Config {
    /// Postgres connection string for tenant/endpoint/secret/payment storage.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Maximum size of the Postgres connection pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = default_max_connections())]
    pub database_max_connections: u32,

    /// 32-byte AES-256-GCM key (hex-encoded) used to seal and open tenant secrets.
    #[arg(long, env = "SECRET_ENCRYPTION_KEY")]
    pub secret_encryption_key: String,

    /// Base URL of the x402 facilitator used to verify and settle payments.
    #[arg(long, env = "FACILITATOR_URL")]
    pub facilitator_url: Url,

    /// Public base URL this instance is reachable at, used to build absolute
    /// resource URLs in `PaymentRequirements` and paywall pages.
    #[arg(long, env = "APP_BASE_URL")]
    pub app_base_url: Url,

    /// WalletConnect project id embedded in the default paywall page.
    #[arg(long, env = "WALLETCONNECT_PROJECT_ID")]
    pub walletconnect_project_id: String,

    /// Force every `PaymentRequirements` onto the testnet (Base Sepolia) USDC
    /// deployment regardless of each endpoint's stored network preference.
    #[arg(long, env = "FORCE_TESTNET", default_value_t = false)]
    pub force_testnet: bool,

    /// Allow endpoints to proxy to loopback/private upstream hosts. Off by
    /// default so a misconfigured tenant can't turn this instance into an
    /// internal-network proxy.
    #[arg(long, env = "ALLOW_LOCALHOST_UPSTREAM", default_value_t = false)]
    pub allow_localhost_upstream: bool,

    /// Allow `http://` (rather than only `https://`) upstream URLs.
    #[arg(long, env = "ALLOW_INSECURE_UPSTREAM_SCHEMES", default_value_t = false)]
    pub allow_insecure_upstream_schemes: bool,

    /// Address to bind the HTTP listener to.
    #[arg(long, env = "HOST", default_value_t = default_host())]
    pub host: IpAddr,

    /// Port to bind the HTTP listener to.
    #[arg(long, env = "PORT", default_value_t = default_port())]
    pub port: u16,
}

impl Config {
    /// Parses configuration from `env::args()` plus the process environment.
    /// Call after `dotenvy::dotenv()` so `.env` entries are visible to `env`.
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.host, self.port)
    }

    pub fn encryption_key(&self) -> Result<x402paygate_secrets::EncryptionKey, ConfigError> {
        x402paygate_secrets::EncryptionKey::from_hex(&self.secret_encryption_key)
            .map_err(|source| ConfigError::BadEncryptionKey { source })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SECRET_ENCRYPTION_KEY is invalid: {source}")]
    BadEncryptionKey {
        #[source]
        source: x402paygate_secrets::SecretError,
    },
}
