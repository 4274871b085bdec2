//! ENS client over Ethereum JSON-RPC
//!
//! Resolution is two `eth_call`s: ask the ENS registry for the node's
//! resolver, then ask that resolver for the record. Reverse records are only
//! trusted when the forward record of the returned name points back to the
//! same address.

use super::{GatewayError, GatewayResult, NameResolver};
use async_trait::async_trait;
use peerbook_common::peer::{is_hex_address, normalize};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::time::Duration;
use tracing::debug;

/// ENS registry, same address on mainnet and the major testnets
pub const ENS_REGISTRY: &str = "0x00000000000c2e074ec69a0dfb2997ba6c7d2e1e";

const USER_AGENT: &str = concat!("peerbook/", env!("CARGO_PKG_VERSION"));

/// `resolver(bytes32)`
const RESOLVER_SELECTOR: [u8; 4] = [0x01, 0x78, 0xb8, 0xbf];
/// `name(bytes32)`
const NAME_SELECTOR: [u8; 4] = [0x69, 0x1f, 0x34, 0x31];
/// `addr(bytes32)`
const ADDR_SELECTOR: [u8; 4] = [0x3b, 0x3b, 0x57, 0xde];

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: (CallParams<'a>, &'static str),
}

#[derive(Serialize)]
struct CallParams<'a> {
    to: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// ENS name resolver backed by an Ethereum node
pub struct EnsClient {
    http_client: reqwest::Client,
    rpc_url: String,
    registry: String,
}

impl EnsClient {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.into(),
            registry: ENS_REGISTRY.to_string(),
        })
    }

    /// Use a different registry contract (private chains, tests)
    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = normalize(&registry.into());
        self
    }

    async fn eth_call(
        &self,
        to: &str,
        selector: [u8; 4],
        node: &[u8; 32],
    ) -> GatewayResult<Vec<u8>> {
        let mut calldata = Vec::with_capacity(36);
        calldata.extend_from_slice(&selector);
        calldata.extend_from_slice(node);

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "eth_call",
            params: (
                CallParams {
                    to,
                    data: format!("0x{}", hex::encode(calldata)),
                },
                "latest",
            ),
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status(status.as_u16(), body));
        }

        let body: RpcResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(GatewayError::Rpc(error.code, error.message));
        }

        let result = body
            .result
            .ok_or_else(|| GatewayError::Parse("JSON-RPC response without result".to_string()))?;
        let hex_str = result.strip_prefix("0x").unwrap_or(&result);
        hex::decode(hex_str).map_err(|e| GatewayError::Parse(format!("Invalid hex result: {}", e)))
    }

    async fn resolver_of(&self, node: &[u8; 32]) -> GatewayResult<Option<String>> {
        let data = self.eth_call(&self.registry, RESOLVER_SELECTOR, node).await?;
        Ok(decode_address(&data))
    }
}

#[async_trait]
impl NameResolver for EnsClient {
    async fn reverse_resolve(&self, address: &str) -> GatewayResult<Option<String>> {
        if !is_hex_address(address) {
            return Err(GatewayError::InvalidAddress(address.to_string()));
        }
        let address = normalize(address);
        let node = namehash(&format!("{}.addr.reverse", &address[2..]));

        let Some(resolver) = self.resolver_of(&node).await? else {
            return Ok(None);
        };

        let data = self.eth_call(&resolver, NAME_SELECTOR, &node).await?;
        let Some(name) = decode_string(&data)? else {
            return Ok(None);
        };
        if name.is_empty() {
            return Ok(None);
        }

        match self.resolve(&name).await? {
            Some(forward) if forward == address => Ok(Some(name)),
            forward => {
                debug!(
                    address = %address,
                    name = %name,
                    ?forward,
                    "Reverse record not confirmed by forward record"
                );
                Ok(None)
            }
        }
    }

    async fn resolve(&self, name: &str) -> GatewayResult<Option<String>> {
        let node = namehash(&normalize(name));

        let Some(resolver) = self.resolver_of(&node).await? else {
            return Ok(None);
        };

        let data = self.eth_call(&resolver, ADDR_SELECTOR, &node).await?;
        Ok(decode_address(&data))
    }
}

/// ENS namehash of a (normalized) name
pub fn namehash(name: &str) -> [u8; 32] {
    let mut node = [0u8; 32];
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = Keccak256::digest(label.as_bytes());
        let mut hasher = Keccak256::new();
        hasher.update(node);
        hasher.update(label_hash);
        node.copy_from_slice(&hasher.finalize());
    }
    node
}

/// Address in the low 20 bytes of the first ABI word; zero means unset
fn decode_address(data: &[u8]) -> Option<String> {
    let word = data.get(..32)?;
    let address = &word[12..];
    if address.iter().all(|b| *b == 0) {
        return None;
    }
    Some(format!("0x{}", hex::encode(address)))
}

/// ABI-encoded dynamic `string` return value
fn decode_string(data: &[u8]) -> GatewayResult<Option<String>> {
    // Empty return data: no resolver or reverted call
    if data.len() < 64 {
        return Ok(None);
    }

    let offset = read_word_usize(&data[..32])?;
    let len_end = offset
        .checked_add(32)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| GatewayError::Parse("String offset out of range".to_string()))?;
    let len = read_word_usize(&data[offset..len_end])?;
    let end = len_end
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| GatewayError::Parse("String length out of range".to_string()))?;

    String::from_utf8(data[len_end..end].to_vec())
        .map(Some)
        .map_err(|e| GatewayError::Parse(format!("Name is not UTF-8: {}", e)))
}

fn read_word_usize(word: &[u8]) -> GatewayResult<usize> {
    if word.len() != 32 || word[..24].iter().any(|b| *b != 0) {
        return Err(GatewayError::Parse("ABI word does not fit in usize".to_string()));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(bytes))
        .map_err(|_| GatewayError::Parse("ABI word does not fit in usize".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_string(value: &str) -> Vec<u8> {
        let mut data = vec![0u8; 64];
        data[31] = 0x20;
        data[63] = value.len() as u8;
        let mut bytes = value.as_bytes().to_vec();
        bytes.resize(value.len().div_ceil(32) * 32, 0);
        data.extend_from_slice(&bytes);
        data
    }

    #[test]
    fn test_namehash_vectors() {
        assert_eq!(namehash(""), [0u8; 32]);
        assert_eq!(
            hex::encode(namehash("eth")),
            "93cdeb708b7545dc668eb9280176169d1c33cfd8ed6f04690a0bcc88a93fc4ae"
        );
        assert_eq!(
            hex::encode(namehash("foo.eth")),
            "de9b09fd7c5f901e23a3f19fecc54828e9c848539801e86591bd9801b019f84f"
        );
    }

    #[test]
    fn test_decode_address() {
        let mut word = vec![0u8; 32];
        assert_eq!(decode_address(&word), None);
        assert_eq!(decode_address(&[]), None);

        word[31] = 0x01;
        assert_eq!(
            decode_address(&word).as_deref(),
            Some("0x0000000000000000000000000000000000000001")
        );
    }

    #[test]
    fn test_decode_string() {
        let data = encode_string("vitalik.eth");
        assert_eq!(decode_string(&data).unwrap().as_deref(), Some("vitalik.eth"));
        assert_eq!(decode_string(&[]).unwrap(), None);
    }

    #[test]
    fn test_decode_string_rejects_bad_offset() {
        let mut data = encode_string("a.eth");
        data[31] = 0xff;
        assert!(matches!(decode_string(&data), Err(GatewayError::Parse(_))));
    }

    #[test]
    fn test_client_creation() {
        let client = EnsClient::new("http://127.0.0.1:8545", Duration::from_secs(1));
        assert!(client.is_ok());
        let client = client.unwrap().with_registry("0xABCD");
        assert_eq!(client.registry, "0xabcd");
    }

    #[tokio::test]
    async fn test_reverse_resolve_rejects_malformed_address() {
        let client = EnsClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let result = client.reverse_resolve("not-an-address").await;
        assert!(matches!(result, Err(GatewayError::InvalidAddress(_))));
    }
}
