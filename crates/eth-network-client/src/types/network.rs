//! Network and provider identification.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, ParseChainIdError};

/// Largest chain id that can be represented safely by every wallet
/// component (`floor(MAX_SAFE_INTEGER / 2) - 36`).
pub const MAX_SAFE_CHAIN_ID: u64 = 4_503_599_627_370_476;

// ============================================================================
// ChainId
// ============================================================================

/// A validated EVM chain id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(u64);

impl ChainId {
    /// Create a chain id from a number, checking the safe range.
    pub fn new(value: u64) -> Result<Self, ParseChainIdError> {
        if value == 0 {
            return Err(ParseChainIdError::InvalidHex("0x0".to_string()));
        }
        if value > MAX_SAFE_CHAIN_ID {
            return Err(ParseChainIdError::Unsafe(format!("0x{:x}", value)));
        }
        Ok(Self(value))
    }

    /// The numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The `0x`-prefixed hex form, as answered for `eth_chainId`.
    pub fn to_hex(&self) -> String {
        format!("0x{:x}", self.0)
    }

    /// The decimal form, as answered for `net_version`.
    pub fn to_decimal_string(&self) -> String {
        self.0.to_string()
    }
}

impl FromStr for ChainId {
    type Err = ParseChainIdError;

    /// Parse a `0x`-prefixed hex chain id without leading zeros.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseChainIdError::InvalidHex(s.to_string());

        let digits = s.strip_prefix("0x").ok_or_else(invalid)?;
        if digits.is_empty()
            || digits.starts_with('0')
            || !digits.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(invalid());
        }

        let value =
            u64::from_str_radix(digits, 16).map_err(|_| ParseChainIdError::Unsafe(s.to_string()))?;
        if value > MAX_SAFE_CHAIN_ID {
            return Err(ParseChainIdError::Unsafe(s.to_string()));
        }
        Ok(Self(value))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ============================================================================
// InfuraNetwork
// ============================================================================

/// Networks served by Infura.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum InfuraNetwork {
    #[default]
    Mainnet,
    Goerli,
    Sepolia,
    LineaGoerli,
    LineaSepolia,
    LineaMainnet,
}

impl InfuraNetwork {
    /// All supported networks.
    pub const ALL: [InfuraNetwork; 6] = [
        InfuraNetwork::Mainnet,
        InfuraNetwork::Goerli,
        InfuraNetwork::Sepolia,
        InfuraNetwork::LineaGoerli,
        InfuraNetwork::LineaSepolia,
        InfuraNetwork::LineaMainnet,
    ];

    /// Returns the Infura subdomain for this network.
    pub fn as_str(&self) -> &'static str {
        match self {
            InfuraNetwork::Mainnet => "mainnet",
            InfuraNetwork::Goerli => "goerli",
            InfuraNetwork::Sepolia => "sepolia",
            InfuraNetwork::LineaGoerli => "linea-goerli",
            InfuraNetwork::LineaSepolia => "linea-sepolia",
            InfuraNetwork::LineaMainnet => "linea-mainnet",
        }
    }

    /// The chain id the network is known to run.
    pub fn chain_id(&self) -> ChainId {
        ChainId(match self {
            InfuraNetwork::Mainnet => 0x1,
            InfuraNetwork::Goerli => 0x5,
            InfuraNetwork::Sepolia => 0xaa36a7,
            InfuraNetwork::LineaGoerli => 0xe704,
            InfuraNetwork::LineaSepolia => 0xe705,
            InfuraNetwork::LineaMainnet => 0xe708,
        })
    }

    /// The HTTPS endpoint for a project.
    pub fn rpc_url(&self, project_id: &str) -> String {
        format!("https://{}.infura.io/v3/{}", self.as_str(), project_id)
    }
}

impl FromStr for InfuraNetwork {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InfuraNetwork::ALL
            .into_iter()
            .find(|network| network.as_str() == s)
            .ok_or_else(|| Error::Config(format!("Unknown Infura network: {}", s)))
    }
}

impl fmt::Display for InfuraNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ProviderConfig
// ============================================================================

/// Which upstream a network client talks to.
///
/// The provider type also selects the retry and error classification policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderConfig {
    Infura {
        network: InfuraNetwork,
        project_id: String,
    },
    Custom {
        rpc_url: String,
        chain_id: ChainId,
    },
}

impl ProviderConfig {
    /// Configuration for an Infura network.
    pub fn infura(network: InfuraNetwork, project_id: impl Into<String>) -> Result<Self, Error> {
        let project_id = project_id.into();
        if project_id.trim().is_empty() {
            return Err(Error::Config("Infura project id must not be empty".to_string()));
        }
        Ok(ProviderConfig::Infura {
            network,
            project_id,
        })
    }

    /// Configuration for an arbitrary JSON-RPC endpoint.
    ///
    /// The chain id is supplied here and echoed for `eth_chainId` and
    /// `net_version` instead of being queried.
    pub fn custom(rpc_url: impl Into<String>, chain_id: &str) -> Result<Self, Error> {
        let rpc_url = rpc_url.into();
        validate_rpc_url(&rpc_url)?;
        Ok(ProviderConfig::Custom {
            rpc_url,
            chain_id: chain_id.parse()?,
        })
    }

    /// Returns true for Infura providers.
    pub fn is_infura(&self) -> bool {
        matches!(self, ProviderConfig::Infura { .. })
    }

    /// The chain id answered for `eth_chainId` and `net_version`.
    pub fn chain_id(&self) -> ChainId {
        match self {
            ProviderConfig::Infura { network, .. } => network.chain_id(),
            ProviderConfig::Custom { chain_id, .. } => *chain_id,
        }
    }

    /// The endpoint requests are POSTed to.
    pub fn rpc_url(&self) -> String {
        match self {
            ProviderConfig::Infura {
                network,
                project_id,
            } => network.rpc_url(project_id),
            ProviderConfig::Custom { rpc_url, .. } => rpc_url.clone(),
        }
    }
}

fn validate_rpc_url(rpc_url: &str) -> Result<(), Error> {
    let url = reqwest::Url::parse(rpc_url)
        .map_err(|e| Error::Config(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::Config(format!(
            "Invalid RPC URL '{}': expected an http(s) URL",
            rpc_url
        )));
    }
    Ok(())
}
