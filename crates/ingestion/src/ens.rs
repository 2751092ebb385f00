//! ENS primary-name resolution.
//!
//! A primary name is only reported when it resolves forward to the same
//! address, matching what wallets and explorers display.

use crate::abi::{decode_address, decode_string, encode_bytes32_call};
use crate::rpc_client::RpcClient;
use alloy::primitives::{address, keccak256, Address, B256};
use anyhow::Result;
use tracing::debug;

/// ENS registry deployed on Ethereum mainnet.
pub const MAINNET_ENS_REGISTRY: Address = address!("00000000000c2e074ec69a0dfb2997ba6c7d2e1e");

const RESOLVER: &str = "resolver(bytes32)";
const NAME: &str = "name(bytes32)";
const ADDR: &str = "addr(bytes32)";

/// Compute the ENS namehash of a dotted name.
pub fn namehash(name: &str) -> B256 {
    let mut node = B256::ZERO;
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = keccak256(label.as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_slice());
        buf[32..].copy_from_slice(label_hash.as_slice());
        node = keccak256(buf);
    }
    node
}

/// Name whose namehash is the reverse record node of `address`.
pub fn reverse_name(address: Address) -> String {
    format!("{:x}.addr.reverse", address)
}

/// Reverse resolver over an ENS registry.
#[derive(Debug, Clone)]
pub struct EnsResolver {
    registry: Address,
}

impl EnsResolver {
    pub fn new(registry: Address) -> Self {
        Self { registry }
    }

    /// Look up the verified primary name of `address`.
    pub async fn lookup(&self, rpc: &RpcClient, address: Address) -> Result<Option<String>> {
        let reverse_node = namehash(&reverse_name(address));
        let Some(resolver) = self.resolver(rpc, reverse_node).await? else {
            return Ok(None);
        };

        let name = rpc
            .call(resolver, &encode_bytes32_call(NAME, reverse_node))
            .await?;
        let Some(name) = decode_string(&name).filter(|name| !name.is_empty()) else {
            return Ok(None);
        };

        let forward_node = namehash(&name);
        let Some(forward_resolver) = self.resolver(rpc, forward_node).await? else {
            debug!("Primary name {} of {} has no resolver", name, address);
            return Ok(None);
        };
        let resolved = rpc
            .call(forward_resolver, &encode_bytes32_call(ADDR, forward_node))
            .await?;

        if decode_address(&resolved) != Some(address) {
            debug!("Primary name {} does not resolve back to {}", name, address);
            return Ok(None);
        }
        Ok(Some(name))
    }

    async fn resolver(&self, rpc: &RpcClient, node: B256) -> Result<Option<Address>> {
        let result = rpc
            .call(self.registry, &encode_bytes32_call(RESOLVER, node))
            .await?;
        Ok(decode_address(&result).filter(|resolver| *resolver != Address::ZERO))
    }
}

impl Default for EnsResolver {
    fn default() -> Self {
        Self::new(MAINNET_ENS_REGISTRY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    #[test]
    fn test_namehash() {
        assert_eq!(namehash(""), B256::ZERO);
        assert_eq!(
            namehash("eth"),
            b256!("93cdeb708b7545dc668eb9280176169d1c33cfd8ed6f04690a0bcc88a93fc4ae")
        );
        assert_eq!(
            namehash("foo.eth"),
            b256!("de9b09fd7c5f901e23a3f19fecc54828e9c848539801e86591bd9801b019f84f")
        );
    }

    #[test]
    fn test_reverse_name_is_lowercase_hex() {
        let address: Address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap();
        assert_eq!(
            reverse_name(address),
            "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed.addr.reverse"
        );
    }
}
