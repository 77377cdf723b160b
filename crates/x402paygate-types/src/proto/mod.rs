//! Wire format for the x402 protocol, version 2.
//!
//! x402paygate only ever speaks protocol version 2: CAIP-2 chain ids instead
//! of network names, and a `resource` block describing what's being paid
//! for. These types mirror exactly what goes over the wire to a payer's
//! client, to the facilitator, and back.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::chain::ChainId;

/// Version marker for x402 protocol version 2. Serializes as the integer `2`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version2;

impl X402Version2 {
    pub const VALUE: u8 = 2;
}

impl Serialize for X402Version2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version2 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version2)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected x402Version {}, got {num}",
                Self::VALUE
            )))
        }
    }
}

impl fmt::Display for X402Version2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// Human-readable metadata about the resource being paid for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub description: String,
    pub mime_type: String,
    pub url: String,
}

/// Extra scheme-specific data carried alongside a requirement (EIP-712 domain bits).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentRequirementsExtra {
    pub name: String,
    pub version: String,
}

/// Terms under which x402paygate will accept a payment for a given endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Always `"exact"`.
    pub scheme: String,
    /// CAIP-2 chain id, e.g. `"eip155:8453"`.
    pub network: ChainId,
    /// Atomic stablecoin amount, as a decimal string.
    pub amount: String,
    pub pay_to: String,
    pub max_timeout_seconds: u64,
    /// Stablecoin contract address.
    pub asset: String,
    pub extra: PaymentRequirementsExtra,
}

/// The inner, scheme-specific signed authorization. x402paygate treats this
/// as an opaque value on the way in (it is handed verbatim to the
/// facilitator) except when hunting for the payer address (see
/// `x402paygate_facilitator::payer`).
pub type SchemePayload = serde_json::Value;

/// A signed payment authorization presented by a payer, as decoded from the
/// `X-PAYMENT-SIGNATURE` / `PAYMENT-SIGNATURE` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version2,
    pub accepted: PaymentRequirements,
    pub payload: SchemePayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
}

/// HTTP 402 response body: the set of payment methods x402paygate will
/// accept for a given endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: X402Version2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub resource: ResourceInfo,
    pub accepts: Vec<PaymentRequirements>,
}

/// Body posted to the facilitator's `/verify` and `/settle` endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest<'a> {
    pub x402_version: X402Version2,
    pub payment_payload: &'a PaymentPayload,
    pub payment_requirements: &'a PaymentRequirements,
}

/// Response from the facilitator's `/verify` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Response from the facilitator's `/settle` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}
