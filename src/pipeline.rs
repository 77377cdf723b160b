//! The per-request state machine: resolve, rate-limit, parse payment,
//! verify, record, forward upstream, settle, respond.
//!
//! Forwarding deliberately precedes settlement -- the payer has already
//! consumed the resource by the time we ask the facilitator to settle, so a
//! settlement failure never rolls back the response; it's recorded as
//! `failed` for out-of-band reconciliation. Once settlement is issued it
//! runs to completion on a spawned task even if the client disconnects and
//! the response future is dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::PgPool;
use url::Url;

use x402paygate_facilitator::header::extract_payment_payload;
use x402paygate_facilitator::payer::resolve_payer;
use x402paygate_facilitator::requirement::{RequirementParams, payment_required};
use x402paygate_ratelimit::RateLimiter;
use x402paygate_secrets::EncryptionKey;

use crate::auth_header::build_upstream_auth;
use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::models::Endpoint;
use crate::paywall;
use crate::resolver::{self, ResolvedRoute};

/// Headers never forwarded from the inbound request to the upstream.
const DROPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "te",
    "trailer",
    "upgrade",
    "content-length",
    "x-payment",
    "x-payment-signature",
    "payment-signature",
];

static BROWSER_USER_AGENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Mozilla|Chrome|Safari|Firefox|Edge").unwrap());

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub facilitator: x402paygate_facilitator::FacilitatorClient,
    pub rate_limiter: RateLimiter,
    pub secret_key: EncryptionKey,
    pub http_client: reqwest::Client,
    pub config: Arc<Config>,
}

fn is_browser(headers: &HeaderMap) -> bool {
    let accept_html = headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"));
    let browser_ua = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| BROWSER_USER_AGENT.is_match(v));
    accept_html || browser_ua
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
}

/// Entry point for `/{tenant}/{endpoint}` with no additional path segments.
pub async fn handle_root(
    State(state): State<AppState>,
    Path((tenant_slug, endpoint_slug)): Path<(String, String)>,
    request: Request<Body>,
) -> Response {
    handle(state, tenant_slug, endpoint_slug, String::new(), request).await
}

/// Entry point for `/{tenant}/{endpoint}/{*rest}`.
pub async fn handle_rest(
    State(state): State<AppState>,
    Path((tenant_slug, endpoint_slug, rest)): Path<(String, String, String)>,
    request: Request<Body>,
) -> Response {
    handle(state, tenant_slug, endpoint_slug, rest, request).await
}

async fn handle(
    state: AppState,
    tenant_slug: String,
    endpoint_slug: String,
    rest: String,
    request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers().clone();

    let route = match resolver::resolve(&state.pool, &tenant_slug, &endpoint_slug).await {
        Ok(route) => route,
        Err(err) => return err.into_response(),
    };

    let limit = route.endpoint.rate_limit_per_sec.max(1) as u32;
    let check = state.rate_limiter.check(route.endpoint.id, limit).await;
    let response_headers = rate_limit_headers(&check);
    if !check.allowed {
        let retry_after = check.reset_at.saturating_sub(now_unix()).max(1);
        log_request(
            &state,
            &route,
            None,
            &uri,
            &method,
            StatusCode::TOO_MANY_REQUESTS,
            started,
            &headers,
            false,
            true,
        )
        .await;
        return with_headers(
            AppError::RateLimited {
                retry_after_secs: retry_after,
            }
            .into_response(),
            response_headers,
        );
    }

    let payment_payload = extract_payment_payload(&headers);
    let Some(payment_payload) = payment_payload else {
        let response = paywall_response(&route, &uri, &headers, &state.config);
        log_request(
            &state,
            &route,
            None,
            &uri,
            &method,
            StatusCode::PAYMENT_REQUIRED,
            started,
            &headers,
            false,
            false,
        )
        .await;
        return with_headers(response, response_headers);
    };

    let verify_outcome = state
        .facilitator
        .verify(&payment_payload, &payment_payload.accepted)
        .await;

    if !verify_outcome.is_valid {
        let reason = verify_outcome
            .invalid_reason
            .unwrap_or_else(|| "rejected by facilitator".to_string());
        log_request(
            &state,
            &route,
            None,
            &uri,
            &method,
            StatusCode::PAYMENT_REQUIRED,
            started,
            &headers,
            false,
            false,
        )
        .await;
        return with_headers(
            AppError::PaymentInvalid { reason }.into_response(),
            response_headers,
        );
    }

    let payer = resolve_payer(verify_outcome.payer.as_deref(), &payment_payload.payload);

    let payment = match db::insert_payment(
        &state.pool,
        db::NewPayment {
            endpoint_id: route.endpoint.id,
            tenant_id: route.tenant.id,
            payer: &payer,
            amount: &payment_payload.accepted.amount,
            chain_id: &payment_payload.accepted.network.to_string(),
            network: &x402paygate_types::network::Network::from_testnet_flag(route.endpoint.testnet)
                .to_string(),
            payload: serde_json::to_value(&payment_payload).unwrap_or(serde_json::Value::Null),
            request_path: uri.path(),
            request_method: method.as_str(),
        },
    )
    .await
    {
        Ok(payment) => payment,
        Err(err) => {
            tracing::error!(error = %err, "failed to record payment, continuing anyway");
            return with_headers(
                AppError::Internal("failed to record payment".to_string()).into_response(),
                response_headers,
            );
        }
    };

    let (upstream_url, auth) =
        match assemble_upstream_request(&route.endpoint, &rest, uri.query(), &state).await {
            Ok(pair) => pair,
            Err(reason) => {
                return with_headers(
                    AppError::Misconfigured(reason).into_response(),
                    response_headers,
                );
            }
        };

    let upstream_request = build_upstream_request(
        &state.http_client,
        &method,
        upstream_url,
        &headers,
        auth,
        request.into_body(),
    );

    let upstream_response = match upstream_request.send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, payment_id = %payment.id, "upstream unreachable");
            if let Err(db_err) =
                db::update_payment_failed(&state.pool, payment.id, &err.to_string(), None).await
            {
                tracing::error!(error = %db_err, "failed to persist payment failure");
            }
            log_request(
                &state,
                &route,
                Some(payment.id),
                &uri,
                &method,
                StatusCode::BAD_GATEWAY,
                started,
                &headers,
                is_browser(&headers),
                false,
            )
            .await;
            return with_headers(AppError::UpstreamUnreachable.into_response(), response_headers);
        }
    };

    let upstream_status = upstream_response.status();
    let content_type = upstream_response.headers().get("content-type").cloned();

    // Settlement is spawned so a dropped response future (client disconnect)
    // doesn't abort it -- funds may already be in motion.
    let settle_handle = {
        let facilitator = state.facilitator.clone();
        let pool = state.pool.clone();
        let payment_id = payment.id;
        let payload = payment_payload.clone();
        tokio::spawn(async move {
            let settle_outcome = facilitator.settle(&payload, &payload.accepted).await;
            if settle_outcome.success {
                let tx_hash = settle_outcome.transaction.clone().unwrap_or_default();
                let response_json = serde_json::to_value(&settle_outcome).unwrap_or(serde_json::Value::Null);
                if let Err(err) =
                    db::update_payment_settled(&pool, payment_id, &tx_hash, response_json).await
                {
                    tracing::error!(error = %err, "failed to persist settlement");
                }
            } else {
                let reason = settle_outcome
                    .error_reason
                    .clone()
                    .unwrap_or_else(|| "settlement failed".to_string());
                let response_json = serde_json::to_value(&settle_outcome).unwrap_or(serde_json::Value::Null);
                if let Err(err) =
                    db::update_payment_failed(&pool, payment_id, &reason, Some(response_json)).await
                {
                    tracing::error!(error = %err, "failed to persist settlement failure");
                }
            }
            settle_outcome
        })
    };

    let settle_outcome = settle_handle.await.ok();

    log_request(
        &state,
        &route,
        Some(payment.id),
        &uri,
        &method,
        upstream_status,
        started,
        &headers,
        is_browser(&headers),
        true,
    )
    .await;

    let mut builder = Response::builder().status(upstream_status);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    if let Some(outcome) = settle_outcome.filter(|o| o.success) {
        if let Ok(encoded) = serde_json::to_vec(&outcome) {
            let encoded = STANDARD.encode(encoded);
            builder = builder
                .header("x-payment-response", encoded.clone())
                .header("payment-response", encoded);
        }
    }
    let body = Body::from_stream(upstream_response.bytes_stream());
    let response = builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    with_headers(response, response_headers)
}

fn paywall_response(
    route: &ResolvedRoute,
    uri: &Uri,
    headers: &HeaderMap,
    config: &Config,
) -> Response {
    let resource_url = format!(
        "{}{}",
        config.app_base_url.as_str().trim_end_matches('/'),
        uri.path()
    );
    let params = RequirementParams {
        price_usd: route.endpoint.price_usd,
        pay_to: &route.pay_to,
        testnet: config.force_testnet || route.endpoint.testnet,
        max_timeout_seconds: 300,
    };
    let document = payment_required(
        &resource_url,
        route.endpoint.description.as_deref().unwrap_or(&route.endpoint.name),
        &params,
    );

    if is_browser(headers) {
        let html = paywall::render_html(&route.endpoint, &document);
        (
            StatusCode::PAYMENT_REQUIRED,
            [("content-type", "text/html; charset=utf-8")],
            html,
        )
            .into_response()
    } else {
        (StatusCode::PAYMENT_REQUIRED, axum::Json(document)).into_response()
    }
}

async fn assemble_upstream_request(
    endpoint: &Endpoint,
    rest: &str,
    query: Option<&str>,
    state: &AppState,
) -> Result<(Url, crate::auth_header::UpstreamAuth), String> {
    let base = endpoint.upstream_url.trim_end_matches('/');
    let mut url = Url::parse(base).map_err(|e| format!("invalid upstream url: {e}"))?;

    if !state.config.allow_insecure_upstream_schemes && url.scheme() != "https" {
        return Err("upstream scheme must be https".to_string());
    }
    if !state.config.allow_localhost_upstream && is_loopback_host(&url) {
        return Err("upstream host may not be loopback".to_string());
    }

    let path_after_endpoint = rest.trim_start_matches('/');
    if !path_after_endpoint.is_empty() {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| "upstream url cannot be a base".to_string())?;
        segments.pop_if_empty();
        for segment in path_after_endpoint.split('/') {
            segments.push(segment);
        }
    }

    if let Some(query) = query {
        url.set_query(Some(query));
    }

    // `build_upstream_auth` takes a synchronous lookup closure, so every
    // secret it might reference is fetched up front.
    let mut sealed_by_name = std::collections::HashMap::new();
    for name in crate::auth_header::referenced_secret_names(&endpoint.auth_config) {
        if let Ok(Some(secret)) = db::find_secret(&state.pool, endpoint.tenant_id, &name).await {
            sealed_by_name.insert(name, secret.sealed());
        }
    }
    let key = state.secret_key.clone();
    let auth = build_upstream_auth(endpoint, &key, |name| sealed_by_name.get(name).cloned());

    if let Some((param, value)) = &auth.query_param {
        url.query_pairs_mut().append_pair(param, value);
    }

    Ok((url, auth))
}

fn is_loopback_host(url: &Url) -> bool {
    match url.host_str() {
        Some(host) => {
            host == "localhost"
                || host
                    .parse::<std::net::IpAddr>()
                    .map(|ip| ip.is_loopback())
                    .unwrap_or(false)
        }
        None => false,
    }
}

fn build_upstream_request(
    client: &reqwest::Client,
    method: &Method,
    url: Url,
    headers: &HeaderMap,
    auth: crate::auth_header::UpstreamAuth,
    body: Body,
) -> reqwest::RequestBuilder {
    let reqwest_method =
        reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);
    let mut builder = client
        .request(reqwest_method, url)
        .timeout(UPSTREAM_TIMEOUT);

    for (name, value) in headers.iter() {
        let lower = name.as_str().to_ascii_lowercase();
        if DROPPED_REQUEST_HEADERS.contains(&lower.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder = builder.header(name, value);
        }
    }
    for (name, value) in auth.headers.iter() {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder = builder.header(name, value);
        }
    }

    if method != Method::GET && method != Method::HEAD {
        let stream = body.into_data_stream();
        builder = builder.body(reqwest::Body::wrap_stream(stream));
    }

    builder
}

fn rate_limit_headers(check: &x402paygate_ratelimit::CheckResult) -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderValue::from_str(&check.limit.to_string()).unwrap(),
        ),
        (
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from_str(&check.remaining.to_string()).unwrap(),
        ),
        (
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderValue::from_str(&check.reset_at.to_string()).unwrap(),
        ),
    ]
}

fn with_headers(mut response: Response, headers: Vec<(HeaderName, HeaderValue)>) -> Response {
    for (name, value) in headers {
        response.headers_mut().insert(name, value);
    }
    response
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[allow(clippy::too_many_arguments)]
async fn log_request(
    state: &AppState,
    route: &ResolvedRoute,
    payment_id: Option<uuid::Uuid>,
    uri: &Uri,
    method: &Method,
    status: StatusCode,
    started: Instant,
    headers: &HeaderMap,
    is_browser: bool,
    paid: bool,
) {
    let client_ip = client_ip(headers);
    let log = db::NewRequestLog {
        endpoint_id: Some(route.endpoint.id),
        tenant_id: Some(route.tenant.id),
        payment_id,
        path: uri.path(),
        method: method.as_str(),
        status: status.as_u16() as i32,
        elapsed_ms: started.elapsed().as_millis() as i64,
        client_ip: client_ip.as_deref(),
        user_agent: headers.get("user-agent").and_then(|v| v.to_str().ok()),
        is_browser,
        paid,
        rate_limited: status == StatusCode::TOO_MANY_REQUESTS,
    };
    if let Err(err) = db::insert_request_log(&state.pool, log).await {
        tracing::error!(error = %err, "failed to write request log");
    }
}
