//! Building payment requirements and the HTTP 402 body from a USD price.
//!
//! Every endpoint is priced in USD; this module converts that price into
//! the atomic-unit stablecoin amount the x402 wire format expects, and
//! assembles the requirement and the full `PaymentRequired` document around
//! it.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use x402paygate_types::network::{Network, UsdcDeployment};
use x402paygate_types::proto::{
    PaymentRequired, PaymentRequirements, PaymentRequirementsExtra, ResourceInfo,
};

/// Converts a USD amount into the atomic-unit representation of the
/// network's stablecoin (6 decimals for USDC), truncating any sub-atomic
/// remainder.
///
/// `usdToStable(0.01) == "10000"`; amounts below one atomic unit round down
/// to `"0"`.
pub fn usd_to_stable(usd: Decimal, testnet: bool) -> (String, String, PaymentRequirementsExtra) {
    let network = Network::from_testnet_flag(testnet);
    let deployment = UsdcDeployment::by_network(network);
    let scale = Decimal::from(10u64.pow(deployment.decimals));
    let atomic = (usd * scale).trunc();
    let amount = atomic
        .to_u128()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "0".to_string());
    (
        deployment.address.to_string(),
        amount,
        PaymentRequirementsExtra {
            name: deployment.eip712_name.to_string(),
            version: deployment.eip712_version.to_string(),
        },
    )
}

/// Parameters for building a [`PaymentRequirements`] for one endpoint.
pub struct RequirementParams<'a> {
    pub price_usd: Decimal,
    pub pay_to: &'a str,
    pub testnet: bool,
    pub max_timeout_seconds: u64,
}

impl Default for RequirementParams<'_> {
    fn default() -> Self {
        Self {
            price_usd: Decimal::ZERO,
            pay_to: "",
            testnet: true,
            max_timeout_seconds: 300,
        }
    }
}

/// Builds the single payment requirement x402paygate offers for an
/// endpoint. x402paygate only ever advertises the "exact" scheme.
pub fn build_requirement(params: &RequirementParams) -> PaymentRequirements {
    let network = Network::from_testnet_flag(params.testnet).caip2();
    let (asset, amount, extra) = usd_to_stable(params.price_usd, params.testnet);
    PaymentRequirements {
        scheme: "exact".to_string(),
        network,
        amount,
        pay_to: params.pay_to.to_string(),
        max_timeout_seconds: params.max_timeout_seconds,
        asset,
        extra,
    }
}

/// Builds the full HTTP 402 response body for an endpoint.
pub fn payment_required(
    url: &str,
    description: &str,
    params: &RequirementParams,
) -> PaymentRequired {
    PaymentRequired {
        x402_version: x402paygate_types::proto::X402Version2,
        error: None,
        resource: ResourceInfo {
            description: description.to_string(),
            mime_type: "application/json".to_string(),
            url: url.to_string(),
        },
        accepts: vec![build_requirement(params)],
    }
}

/// Formats a USD amount for display: two decimals at or above one cent,
/// otherwise up to six decimals with trailing zeros trimmed.
pub fn format_usd(amount: Decimal) -> String {
    let one_cent = Decimal::new(1, 2);
    if amount >= one_cent {
        format!("{:.2}", amount)
    } else {
        let scaled = amount.round_dp(6).normalize();
        if scaled.scale() == 0 {
            format!("{:.2}", scaled)
        } else {
            scaled.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn usd_to_stable_matches_known_boundaries() {
        let (_, amount, _) = usd_to_stable(Decimal::from_str("0.01").unwrap(), true);
        assert_eq!(amount, "10000");
        let (_, amount, _) = usd_to_stable(Decimal::from_str("0.000001").unwrap(), true);
        assert_eq!(amount, "1");
        let (asset, _, _) = usd_to_stable(Decimal::from_str("1").unwrap(), true);
        assert_eq!(asset, "0x036CbD53842c5426634e7929541eC2318f3dCF7e");
        let (asset, _, _) = usd_to_stable(Decimal::from_str("1").unwrap(), false);
        assert_eq!(asset, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
    }

    #[test]
    fn usd_to_stable_rounds_sub_atomic_remainder_down() {
        let (_, amount, _) = usd_to_stable(Decimal::from_str("0.0000009").unwrap(), true);
        assert_eq!(amount, "0");
    }

    #[test]
    fn build_requirement_uses_exact_scheme_and_testnet_network() {
        let requirement = build_requirement(&RequirementParams {
            price_usd: Decimal::from_str("0.01").unwrap(),
            pay_to: "0xA",
            testnet: true,
            max_timeout_seconds: 300,
        });
        assert_eq!(requirement.scheme, "exact");
        assert_eq!(requirement.network.to_string(), "eip155:84532");
        assert_eq!(requirement.amount, "10000");
        assert_eq!(requirement.pay_to, "0xA");
    }

    #[test]
    fn format_usd_boundary_rules() {
        assert_eq!(format_usd(Decimal::from_str("0.01").unwrap()), "0.01");
        assert_eq!(format_usd(Decimal::from_str("0.0025").unwrap()), "0.0025");
        assert_eq!(format_usd(Decimal::from_str("1").unwrap()), "1.00");
    }
}
