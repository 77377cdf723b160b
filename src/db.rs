//! Postgres connection pool and queries against the five persisted tables.
//!
//! Every query acquires a connection from the shared pool and releases it
//! immediately; no connection is ever held across an `.await` on a
//! facilitator or upstream network call.

use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Endpoint, Payment, PaymentStatus, Secret, Tenant};

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub async fn find_tenant_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Tenant>, sqlx::Error> {
    sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await
}

pub async fn find_endpoint_by_slug(
    pool: &PgPool,
    tenant_id: Uuid,
    slug: &str,
) -> Result<Option<Endpoint>, sqlx::Error> {
    sqlx::query_as::<_, Endpoint>("SELECT * FROM endpoints WHERE tenant_id = $1 AND slug = $2")
        .bind(tenant_id)
        .bind(slug)
        .fetch_optional(pool)
        .await
}

pub async fn find_secret(
    pool: &PgPool,
    tenant_id: Uuid,
    name: &str,
) -> Result<Option<Secret>, sqlx::Error> {
    sqlx::query_as::<_, Secret>("SELECT * FROM secrets WHERE tenant_id = $1 AND name = $2")
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(pool)
        .await
}

/// Parameters for creating the Payment row once a facilitator `verify` call
/// has succeeded.
pub struct NewPayment<'a> {
    pub endpoint_id: Uuid,
    pub tenant_id: Uuid,
    pub payer: &'a str,
    pub amount: &'a str,
    pub chain_id: &'a str,
    pub network: &'a str,
    pub payload: Value,
    pub request_path: &'a str,
    pub request_method: &'a str,
}

pub async fn insert_payment(pool: &PgPool, new: NewPayment<'_>) -> Result<Payment, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments
            (endpoint_id, tenant_id, payer, amount, chain_id, network, status, payload, request_path, request_method)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(new.endpoint_id)
    .bind(new.tenant_id)
    .bind(new.payer)
    .bind(new.amount)
    .bind(new.chain_id)
    .bind(new.network)
    .bind(PaymentStatus::Verified.as_str())
    .bind(new.payload)
    .bind(new.request_path)
    .bind(new.request_method)
    .fetch_one(pool)
    .await
}

/// Updates a payment's terminal state. Only ever called on a payment row
/// created earlier within the same request.
pub async fn update_payment_settled(
    pool: &PgPool,
    payment_id: Uuid,
    tx_hash: &str,
    settlement_response: Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE payments
        SET status = $2, tx_hash = $3, settlement_response = $4, settled_at = now()
        WHERE id = $1
        "#,
    )
    .bind(payment_id)
    .bind(PaymentStatus::Settled.as_str())
    .bind(tx_hash)
    .bind(settlement_response)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_payment_failed(
    pool: &PgPool,
    payment_id: Uuid,
    error_message: &str,
    settlement_response: Option<Value>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE payments
        SET status = $2, error_message = $3, settlement_response = COALESCE($4, settlement_response)
        WHERE id = $1
        "#,
    )
    .bind(payment_id)
    .bind(PaymentStatus::Failed.as_str())
    .bind(error_message)
    .bind(settlement_response)
    .execute(pool)
    .await?;
    Ok(())
}

/// A new append-only request log entry.
pub struct NewRequestLog<'a> {
    pub endpoint_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub path: &'a str,
    pub method: &'a str,
    pub status: i32,
    pub elapsed_ms: i64,
    pub client_ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub is_browser: bool,
    pub paid: bool,
    pub rate_limited: bool,
}

pub async fn insert_request_log(pool: &PgPool, log: NewRequestLog<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO request_logs
            (endpoint_id, tenant_id, payment_id, path, method, status, elapsed_ms,
             client_ip, user_agent, is_browser, paid, rate_limited)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(log.endpoint_id)
    .bind(log.tenant_id)
    .bind(log.payment_id)
    .bind(log.path)
    .bind(log.method)
    .bind(log.status)
    .bind(log.elapsed_ms)
    .bind(log.client_ip)
    .bind(log.user_agent)
    .bind(log.is_browser)
    .bind(log.paid)
    .bind(log.rate_limited)
    .execute(pool)
    .await?;
    Ok(())
}

/// Resolves the recipient address for an endpoint: endpoint override, then
/// tenant default.
pub fn resolve_pay_to(endpoint: &Endpoint, tenant: &Tenant) -> Option<String> {
    endpoint
        .pay_to
        .clone()
        .or_else(|| tenant.default_pay_to.clone())
}
