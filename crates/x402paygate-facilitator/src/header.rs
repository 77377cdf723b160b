//! Parsing the inbound payment header.
//!
//! A payer presents their signed authorization as a base64-encoded JSON
//! document in either `X-PAYMENT-SIGNATURE` or `PAYMENT-SIGNATURE`. Malformed
//! or absent headers are never an error to the caller -- they just mean
//! "no payment was presented", which the pipeline treats as the paywall
//! branch.

use http::HeaderMap;
use x402paygate_types::proto::PaymentPayload;
use x402paygate_types::util::Base64Bytes;

const HEADER_NAMES: [&str; 2] = ["x-payment-signature", "payment-signature"];

/// Extracts and decodes the payment payload from the request headers, if
/// present and well-formed.
pub fn extract_payment_payload(headers: &HeaderMap) -> Option<PaymentPayload> {
    for name in HEADER_NAMES {
        if let Some(value) = headers.get(name) {
            let Ok(text) = value.to_str() else {
                tracing::debug!(header = name, "payment header is not valid utf-8");
                continue;
            };
            let bytes = Base64Bytes::from(text.as_bytes());
            let Ok(decoded) = bytes.decode() else {
                tracing::debug!(header = name, "payment header is not valid base64");
                continue;
            };
            match serde_json::from_slice::<PaymentPayload>(&decoded) {
                Ok(payload) => return Some(payload),
                Err(err) => {
                    tracing::debug!(header = name, error = %err, "payment header is not a valid payment payload");
                    continue;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    fn sample_json() -> &'static str {
        r#"{
            "x402Version": 2,
            "accepted": {
                "scheme": "exact",
                "network": "eip155:84532",
                "amount": "10000",
                "payTo": "0xA",
                "maxTimeoutSeconds": 300,
                "asset": "0x036C",
                "extra": {"name": "USDC", "version": "2"}
            },
            "payload": {"signature": "0xsig", "authorization": {"from": "0xB"}},
            "resource": null
        }"#
    }

    #[test]
    fn absent_header_yields_none() {
        let headers = HeaderMap::new();
        assert!(extract_payment_payload(&headers).is_none());
    }

    #[test]
    fn malformed_base64_yields_none_not_error() {
        let mut headers = HeaderMap::new();
        headers.insert("x-payment-signature", "not-base64-!!!".parse().unwrap());
        assert!(extract_payment_payload(&headers).is_none());
    }

    #[test]
    fn accepts_either_header_name() {
        let encoded = STANDARD.encode(sample_json());
        let mut headers = HeaderMap::new();
        headers.insert("payment-signature", encoded.parse().unwrap());
        let payload = extract_payment_payload(&headers).unwrap();
        assert_eq!(payload.accepted.scheme, "exact");

        let mut headers = HeaderMap::new();
        headers.insert("x-payment-signature", encoded.parse().unwrap());
        assert!(extract_payment_payload(&headers).is_some());
    }
}
