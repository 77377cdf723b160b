//! Row models for the five persisted tables.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub default_pay_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    None,
    Bearer,
    HeaderKey,
    QueryKey,
    Basic,
    CustomHeaders,
}

impl std::str::FromStr for AuthKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "bearer" => Ok(Self::Bearer),
            "header-key" => Ok(Self::HeaderKey),
            "query-key" => Ok(Self::QueryKey),
            "basic" => Ok(Self::Basic),
            "custom-headers" => Ok(Self::CustomHeaders),
            other => Err(format!("unknown auth kind {other}")),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Endpoint {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub upstream_url: String,
    pub auth_kind: String,
    pub auth_config: Value,
    pub price_usd: Decimal,
    pub pay_to: Option<String>,
    pub testnet: bool,
    pub paywall_config: Value,
    pub custom_template: Option<String>,
    pub cname: Option<String>,
    pub active: bool,
    pub rate_limit_per_sec: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Endpoint {
    pub fn auth_kind(&self) -> AuthKind {
        self.auth_kind.parse().unwrap_or(AuthKind::None)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Secret {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Secret {
    pub fn sealed(&self) -> x402paygate_secrets::SealedSecret {
        x402paygate_secrets::SealedSecret {
            ciphertext: self.ciphertext.clone(),
            nonce: self.nonce.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Verified,
    Settled,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Settled => "settled",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub endpoint_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub payer: String,
    pub amount: String,
    pub chain_id: String,
    pub network: String,
    pub tx_hash: Option<String>,
    pub status: String,
    pub payload: Value,
    pub settlement_response: Option<Value>,
    pub request_path: String,
    pub request_method: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}
