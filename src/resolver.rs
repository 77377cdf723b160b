//! Resolving `(tenantSlug, endpointSlug)` into an active, payable endpoint.

use sqlx::PgPool;

use crate::db;
use crate::error::AppError;
use crate::models::{Endpoint, Tenant};

/// Slugs that can never name a tenant, because they're claimed by the
/// platform itself (or reserved for a future admin surface).
const RESERVED_SLUGS: &[&str] = &[
    "api", "admin", "dashboard", "login", "register", "logout", "signup", "health", "static",
    "assets", "favicon.ico", "_next", "robots.txt",
];

/// The outcome of a successful resolution, passed down the rest of the
/// pipeline. Immutable once built.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub tenant: Tenant,
    pub endpoint: Endpoint,
    pub pay_to: String,
}

pub async fn resolve(
    pool: &PgPool,
    tenant_slug: &str,
    endpoint_slug: &str,
) -> Result<ResolvedRoute, AppError> {
    if RESERVED_SLUGS.contains(&tenant_slug) {
        return Err(AppError::NotFound);
    }

    let tenant = db::find_tenant_by_slug(pool, tenant_slug)
        .await?
        .ok_or(AppError::NotFound)?;

    let endpoint = db::find_endpoint_by_slug(pool, tenant.id, endpoint_slug)
        .await?
        .ok_or(AppError::NotFound)?;

    if !endpoint.active {
        // Indistinguishable from "doesn't exist" -- don't leak which.
        return Err(AppError::NotFound);
    }

    let pay_to = db::resolve_pay_to(&endpoint, &tenant)
        .ok_or_else(|| AppError::Misconfigured(format!("endpoint {} has no pay-to address", endpoint.id)))?;

    Ok(ResolvedRoute {
        tenant,
        endpoint,
        pay_to,
    })
}
