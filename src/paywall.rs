//! Rendering the HTML paywall page shown to browser clients that haven't
//! presented a payment yet.
//!
//! The renderer only ever touches branding, theme, price, and the
//! already-built `PaymentRequired` document -- never a secret or tenant
//! credential.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use x402paygate_facilitator::requirement::format_usd;
use x402paygate_types::proto::PaymentRequired;

use crate::models::Endpoint;

const CONFIG_MARKER: &str = "{{payment-config}}";

/// Builds the `paymentConfig` object embedded (base64 JSON) in either
/// paywall flavor: the default page's `x-paywall-config` meta tag, or a
/// custom template's `{{payment-config}}` marker.
fn config_object(endpoint: &Endpoint, payment_required: &PaymentRequired) -> Value {
    json!({
        "paymentRequired": payment_required,
        "theme": endpoint.paywall_config.get("theme").cloned().unwrap_or(json!("default")),
        "branding": endpoint.paywall_config.get("branding").cloned().unwrap_or(json!({})),
        "walletConnectProjectId": endpoint.paywall_config.get("walletConnectProjectId"),
        "priceDisplay": format_usd(endpoint.price_usd),
    })
}

fn encode_config(config: &Value) -> String {
    STANDARD.encode(serde_json::to_vec(config).unwrap_or_default())
}

/// Renders the HTML body for a given endpoint and payment requirement,
/// using the endpoint's custom template if it has one, otherwise a
/// self-contained default page.
pub fn render_html(endpoint: &Endpoint, payment_required: &PaymentRequired) -> String {
    let config = config_object(endpoint, payment_required);
    let encoded = encode_config(&config);

    if let Some(template) = &endpoint.custom_template {
        return template.replace(CONFIG_MARKER, &encoded);
    }

    let price = format_usd(endpoint.price_usd);
    let name = html_escape(&endpoint.name);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta name="x-paywall-config" content="{encoded}">
<title>{name} &middot; Payment required</title>
</head>
<body>
<main>
<h1>{name}</h1>
<p>This endpoint requires a payment of <strong>${price}</strong> to access.</p>
<p>Connect a wallet to continue.</p>
</main>
</body>
</html>
"#
    )
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;
    use x402paygate_types::proto::{PaymentRequirementsExtra, ResourceInfo, X402Version2};

    fn sample_endpoint() -> Endpoint {
        Endpoint {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            slug: "weather".into(),
            name: "Weather API".into(),
            description: None,
            upstream_url: "https://upstream.example.com".into(),
            auth_kind: "none".into(),
            auth_config: json!({}),
            price_usd: Decimal::new(1, 2),
            pay_to: Some("0xA".into()),
            testnet: true,
            paywall_config: json!({}),
            custom_template: None,
            cname: None,
            active: true,
            rate_limit_per_sec: 5,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_payment_required() -> PaymentRequired {
        PaymentRequired {
            x402_version: X402Version2,
            error: None,
            resource: ResourceInfo {
                description: "weather".into(),
                mime_type: "application/json".into(),
                url: "https://pay.example.com/alice/weather".into(),
            },
            accepts: vec![x402paygate_types::proto::PaymentRequirements {
                scheme: "exact".into(),
                network: "eip155:84532".parse().unwrap(),
                amount: "10000".into(),
                pay_to: "0xA".into(),
                max_timeout_seconds: 300,
                asset: "0x036C".into(),
                extra: PaymentRequirementsExtra {
                    name: "USDC".into(),
                    version: "2".into(),
                },
            }],
        }
    }

    #[test]
    fn default_page_embeds_config_meta_tag() {
        let html = render_html(&sample_endpoint(), &sample_payment_required());
        assert!(html.contains(r#"<meta name="x-paywall-config" content=""#));
        assert!(html.contains("Weather API"));
    }

    #[test]
    fn custom_template_substitutes_every_marker_occurrence() {
        let mut endpoint = sample_endpoint();
        endpoint.custom_template =
            Some("<div>{{payment-config}}</div><script>{{payment-config}}</script>".to_string());
        let html = render_html(&endpoint, &sample_payment_required());
        assert!(!html.contains("{{payment-config}}"));
        assert_eq!(html.matches("<div>").count(), 1);
    }

    #[test]
    fn embedded_config_decodes_to_expected_amount() {
        let html = render_html(&sample_endpoint(), &sample_payment_required());
        let start = html.find("content=\"").unwrap() + "content=\"".len();
        let rest = &html[start..];
        let end = rest.find('"').unwrap();
        let encoded = &rest[..end];
        let decoded = STANDARD.decode(encoded).unwrap();
        let config: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(config["paymentRequired"]["accepts"][0]["amount"], "10000");
    }
}
