//! Known networks and their stablecoin deployments.
//!
//! x402paygate prices every endpoint in USD and settles in USDC on Base. This
//! module pins the two supported networks and the well-known USDC contract
//! address on each, so tenants never have to configure an asset address
//! themselves.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::chain::ChainId;

/// Supported EVM networks, distinguishing testnet from mainnet.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Base Sepolia testnet (chain id 84532).
    #[serde(rename = "base-sepolia")]
    BaseSepolia,
    /// Base mainnet (chain id 8453).
    #[serde(rename = "base")]
    Base,
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::BaseSepolia => write!(f, "base-sepolia"),
            Network::Base => write!(f, "base"),
        }
    }
}

impl Network {
    /// Select testnet or mainnet based on a boolean flag.
    pub fn from_testnet_flag(testnet: bool) -> Self {
        if testnet { Network::BaseSepolia } else { Network::Base }
    }

    /// The numeric chain id for this network.
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::BaseSepolia => 84532,
            Network::Base => 8453,
        }
    }

    /// The CAIP-2 chain id for this network, e.g. `"eip155:8453"`.
    pub fn caip2(&self) -> ChainId {
        ChainId::new("eip155", self.chain_id().to_string())
    }
}

/// A known USDC (or USDC-equivalent) token deployment.
#[derive(Clone, Debug)]
pub struct UsdcDeployment {
    /// Lowercase-hex, `0x`-prefixed contract address.
    pub address: &'static str,
    pub network: Network,
    pub decimals: u32,
    pub eip712_name: &'static str,
    pub eip712_version: &'static str,
}

static USDC_BASE_SEPOLIA: Lazy<UsdcDeployment> = Lazy::new(|| UsdcDeployment {
    address: "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
    network: Network::BaseSepolia,
    decimals: 6,
    eip712_name: "USDC",
    eip712_version: "2",
});

static USDC_BASE: Lazy<UsdcDeployment> = Lazy::new(|| UsdcDeployment {
    address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
    network: Network::Base,
    decimals: 6,
    eip712_name: "USDC",
    eip712_version: "2",
});

impl UsdcDeployment {
    /// Return the known USDC deployment for the given network.
    pub fn by_network(network: Network) -> &'static UsdcDeployment {
        match network {
            Network::BaseSepolia => &USDC_BASE_SEPOLIA,
            Network::Base => &USDC_BASE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testnet_flag_selects_sepolia() {
        assert_eq!(Network::from_testnet_flag(true), Network::BaseSepolia);
        assert_eq!(Network::from_testnet_flag(false), Network::Base);
    }

    #[test]
    fn known_usdc_addresses() {
        assert_eq!(
            UsdcDeployment::by_network(Network::BaseSepolia).address,
            "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
        );
        assert_eq!(
            UsdcDeployment::by_network(Network::Base).address,
            "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
        );
    }
}
