use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Runtime configuration for one blockchain network the gateway can pay on
/// or demand payment from. Decouples payment construction from compile-time
/// constants, enabling multi-chain deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNetwork {
    /// Network name referenced by resource policies (e.g. "sepolia").
    pub name: String,
    pub rpc_url: String,
    pub chain_id: u64,
    /// Token contract used as the EIP-712 verifying contract.
    pub token_address: Address,
    /// EIP-712 domain name of the token.
    pub token_name: String,
    /// EIP-712 domain version of the token.
    pub token_version: String,
    pub token_decimals: u32,
    /// Token standard, e.g. "ERC20".
    pub token_type: String,
}

/// Find a network descriptor by name.
pub fn find_network<'a>(networks: &'a [ChainNetwork], name: &str) -> Option<&'a ChainNetwork> {
    networks.iter().find(|n| n.name == name)
}
