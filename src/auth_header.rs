//! Assembling upstream credentials from an endpoint's auth configuration.
//!
//! Every string value taken from `auth_config` is passed through
//! [`x402paygate_secrets::resolve_references`] before use, so a tenant can
//! reference a stored secret as `{{SECRET:NAME}}` instead of pasting a
//! plaintext credential into their endpoint config.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::str::FromStr;

use x402paygate_secrets::EncryptionKey;

use crate::models::{AuthKind, Endpoint};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{SECRET:([A-Z_][A-Z0-9_]*)\}\}").unwrap());

/// Collects every distinct secret name referenced anywhere in an endpoint's
/// auth config, so callers can prefetch them (asynchronously, from the
/// database) before handing a synchronous lookup closure to
/// [`build_upstream_auth`].
pub fn referenced_secret_names(config: &Value) -> Vec<String> {
    let mut names = BTreeSet::new();
    collect_names(config, &mut names);
    names.into_iter().collect()
}

fn collect_names(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for caps in PLACEHOLDER.captures_iter(s) {
                names.insert(caps[1].to_string());
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_names(v, names);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_names(v, names);
            }
        }
        _ => {}
    }
}

/// What the auth builder adds to the outbound request: extra headers, and
/// an optional query parameter to merge into the upstream URL.
#[derive(Debug, Default)]
pub struct UpstreamAuth {
    pub headers: HeaderMap,
    pub query_param: Option<(String, String)>,
}

/// Resolves `{{SECRET:NAME}}` references in `raw` using `lookup`, which
/// should return the sealed ciphertext for a tenant's secret by name.
fn resolve<F>(key: &EncryptionKey, raw: &str, lookup: &mut F) -> String
where
    F: FnMut(&str) -> Option<x402paygate_secrets::SealedSecret>,
{
    x402paygate_secrets::resolve_references(key, raw, lookup)
}

fn config_str<'a>(config: &'a Value, field: &str) -> &'a str {
    config.get(field).and_then(Value::as_str).unwrap_or("")
}

/// Builds the headers (and optional query param) to layer onto the
/// upstream request for this endpoint, given a secret lookup for its
/// tenant.
pub fn build_upstream_auth<F>(
    endpoint: &Endpoint,
    key: &EncryptionKey,
    mut lookup: F,
) -> UpstreamAuth
where
    F: FnMut(&str) -> Option<x402paygate_secrets::SealedSecret>,
{
    let config = &endpoint.auth_config;
    let mut auth = UpstreamAuth::default();

    match endpoint.auth_kind() {
        AuthKind::None => {}
        AuthKind::Bearer => {
            let token = resolve(key, config_str(config, "token"), &mut lookup);
            insert(&mut auth.headers, "authorization", &format!("Bearer {token}"));
        }
        AuthKind::HeaderKey => {
            let name = config_str(config, "headerName");
            let value = resolve(key, config_str(config, "headerValue"), &mut lookup);
            if !name.is_empty() {
                insert(&mut auth.headers, name, &value);
            }
        }
        AuthKind::QueryKey => {
            let param = config_str(config, "queryParam");
            let value = resolve(key, config_str(config, "queryValue"), &mut lookup);
            if !param.is_empty() {
                auth.query_param = Some((param.to_string(), value));
            }
        }
        AuthKind::Basic => {
            let user = resolve(key, config_str(config, "username"), &mut lookup);
            let pass = resolve(key, config_str(config, "password"), &mut lookup);
            let encoded = STANDARD.encode(format!("{user}:{pass}"));
            insert(&mut auth.headers, "authorization", &format!("Basic {encoded}"));
        }
        AuthKind::CustomHeaders => {
            if let Some(map) = config.get("headers").and_then(Value::as_object) {
                for (name, value) in map {
                    let Some(raw) = value.as_str() else { continue };
                    let resolved = resolve(key, raw, &mut lookup);
                    insert(&mut auth.headers, name, &resolved);
                }
            }
        }
    }

    auth
}

fn insert(headers: &mut HeaderMap, name: &str, value: &str) {
    let (Ok(name), Ok(value)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) else {
        tracing::warn!(header = name, "skipping unrepresentable auth header");
        return;
    };
    headers.insert(name, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn key() -> EncryptionKey {
        EncryptionKey::from_bytes(&[3u8; 32]).unwrap()
    }

    fn endpoint_with(auth_kind: &str, auth_config: Value) -> Endpoint {
        Endpoint {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            slug: "weather".into(),
            name: "weather".into(),
            description: None,
            upstream_url: "https://upstream.example.com".into(),
            auth_kind: auth_kind.into(),
            auth_config,
            price_usd: rust_decimal::Decimal::new(1, 2),
            pay_to: Some("0xA".into()),
            testnet: true,
            paywall_config: json!({}),
            custom_template: None,
            cname: None,
            active: true,
            rate_limit_per_sec: 5,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn bearer_resolves_secret_reference() {
        let key = key();
        let sealed = x402paygate_secrets::encrypt(&key, b"sk_live_xyz").unwrap();
        let endpoint = endpoint_with("bearer", json!({"token": "{{SECRET:UPSTREAM_KEY}}"}));
        let auth = build_upstream_auth(&endpoint, &key, |name| {
            assert_eq!(name, "UPSTREAM_KEY");
            Some(sealed.clone())
        });
        assert_eq!(
            auth.headers.get("authorization").unwrap(),
            "Bearer sk_live_xyz"
        );
    }

    #[test]
    fn query_key_sets_a_query_param_not_a_header() {
        let key = key();
        let endpoint = endpoint_with(
            "query-key",
            json!({"queryParam": "api_key", "queryValue": "plain-value"}),
        );
        let auth = build_upstream_auth(&endpoint, &key, |_| None);
        assert!(auth.headers.is_empty());
        assert_eq!(auth.query_param, Some(("api_key".into(), "plain-value".into())));
    }

    #[test]
    fn basic_encodes_user_and_pass() {
        let key = key();
        let endpoint = endpoint_with("basic", json!({"username": "alice", "password": "hunter2"}));
        let auth = build_upstream_auth(&endpoint, &key, |_| None);
        let header = auth.headers.get("authorization").unwrap().to_str().unwrap();
        assert!(header.starts_with("Basic "));
    }

    #[test]
    fn none_produces_no_headers() {
        let key = key();
        let endpoint = endpoint_with("none", json!({}));
        let auth = build_upstream_auth(&endpoint, &key, |_| None);
        assert!(auth.headers.is_empty());
        assert!(auth.query_param.is_none());
    }

    #[test]
    fn referenced_secret_names_finds_nested_references() {
        let config = json!({
            "token": "{{SECRET:UPSTREAM_KEY}}",
            "headers": {"X-Extra": "{{SECRET:OTHER_KEY}}"},
        });
        let mut names = referenced_secret_names(&config);
        names.sort();
        assert_eq!(names, vec!["OTHER_KEY".to_string(), "UPSTREAM_KEY".to_string()]);
    }
}
