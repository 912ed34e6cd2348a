//! Network client assembly.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::types::{InfuraNetwork, ProviderConfig};

use super::block_tracker::{BlockTracker, BlockTrackerConfig};
use super::middleware::{
    BlockCache, BlockRefResolver, BlockTrackerInspector, ChainIdResponder, InFlightCoalescer,
    RequestHandler, RetryOnEmpty,
};
use super::provider::Provider;
use super::retry::{
    CustomRpcRetryPolicy, InfuraRetryPolicy, RetryConfig, RetryPolicy, RetryingTransport,
};
use super::transport::{DEFAULT_REQUEST_TIMEOUT, HttpTransport, Transport};

/// A wired JSON-RPC client for one network.
///
/// Each client owns its block tracker, cache and in-flight map; two
/// clients never share state. Dropping the client stops block polling.
///
/// # Example
///
/// ```rust,no_run
/// use eth_network_client::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Error> {
///     let client = NetworkClient::infura(InfuraNetwork::Sepolia, "my-project-id")?.build()?;
///     let block = client.provider().block_number().await?;
///     println!("Sepolia is at block {}", block);
///     client.destroy();
///     Ok(())
/// }
/// ```
pub struct NetworkClient {
    config: ProviderConfig,
    provider: Provider,
    block_tracker: Arc<BlockTracker>,
    cache: Arc<BlockCache>,
    coalescer: Arc<InFlightCoalescer>,
    transport: Arc<RetryingTransport>,
}

impl NetworkClient {
    /// Create a builder for an Infura network.
    pub fn infura(
        network: InfuraNetwork,
        project_id: impl Into<String>,
    ) -> Result<NetworkClientBuilder, Error> {
        Ok(NetworkClientBuilder::new(ProviderConfig::infura(
            network, project_id,
        )?))
    }

    /// Create a builder for a custom RPC endpoint.
    ///
    /// `chain_id` is a `0x`-prefixed hex string such as `"0x539"`.
    pub fn custom(
        rpc_url: impl Into<String>,
        chain_id: &str,
    ) -> Result<NetworkClientBuilder, Error> {
        Ok(NetworkClientBuilder::new(ProviderConfig::custom(
            rpc_url, chain_id,
        )?))
    }

    /// Create a builder from an existing provider configuration.
    pub fn builder(config: ProviderConfig) -> NetworkClientBuilder {
        NetworkClientBuilder::new(config)
    }

    /// Create a client from environment variables.
    ///
    /// Reads either:
    /// - `INFURA_PROJECT_ID` and optionally `INFURA_NETWORK` (defaults to `"mainnet"`), or
    /// - `RPC_URL` and `CHAIN_ID` (hex, e.g. `"0x539"`).
    ///
    /// ```bash
    /// export RPC_URL=http://localhost:8545
    /// export CHAIN_ID=0x539
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if neither set is present, if both are, or
    /// if one is incomplete.
    pub fn from_env() -> Result<NetworkClient, Error> {
        let config = config_from_vars(|name| std::env::var(name).ok())?;
        NetworkClientBuilder::new(config).build()
    }

    /// The request entry point.
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// The client's block tracker.
    pub fn block_tracker(&self) -> &BlockTracker {
        &self.block_tracker
    }

    /// The provider configuration this client was built from.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The response cache.
    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// The in-flight request coalescer.
    pub fn coalescer(&self) -> &InFlightCoalescer {
        &self.coalescer
    }

    /// The upstream URL.
    pub fn rpc_url(&self) -> &str {
        self.transport.url()
    }

    /// Tear the client down: stop block polling and stop scheduling
    /// retries. Calls already on the wire still settle. Idempotent.
    pub fn destroy(&self) {
        self.block_tracker.destroy();
        self.transport.close();
    }
}

impl Drop for NetworkClient {
    fn drop(&mut self) {
        self.block_tracker.destroy();
    }
}

impl std::fmt::Debug for NetworkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkClient")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("block_tracker", &self.block_tracker)
            .finish()
    }
}

/// Build a client for `config` with default settings.
pub fn create_network_client(config: ProviderConfig) -> Result<NetworkClient, Error> {
    NetworkClientBuilder::new(config).build()
}

fn config_from_vars(var: impl Fn(&str) -> Option<String>) -> Result<ProviderConfig, Error> {
    let project_id = var("INFURA_PROJECT_ID");
    let network = var("INFURA_NETWORK");
    let rpc_url = var("RPC_URL");
    let chain_id = var("CHAIN_ID");

    match (project_id, rpc_url) {
        (Some(_), Some(_)) => Err(Error::Config(
            "INFURA_PROJECT_ID and RPC_URL are both set; set only one".into(),
        )),
        (Some(project_id), None) => {
            if chain_id.is_some() {
                return Err(Error::Config(
                    "CHAIN_ID is only used with RPC_URL, not INFURA_PROJECT_ID".into(),
                ));
            }
            let network: InfuraNetwork = network.as_deref().unwrap_or("mainnet").parse()?;
            ProviderConfig::infura(network, project_id)
        }
        (None, Some(rpc_url)) => {
            if network.is_some() {
                return Err(Error::Config(
                    "INFURA_NETWORK is set but INFURA_PROJECT_ID is missing".into(),
                ));
            }
            let chain_id = chain_id.ok_or_else(|| {
                Error::Config("RPC_URL is set but CHAIN_ID is missing".into())
            })?;
            ProviderConfig::custom(rpc_url, &chain_id)
        }
        (None, None) => Err(Error::Config(
            "set INFURA_PROJECT_ID or RPC_URL to configure a network".into(),
        )),
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for a [`NetworkClient`].
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use eth_network_client::*;
///
/// # fn example() -> Result<(), Error> {
/// let client = NetworkClient::custom("http://localhost:8545", "0x539")?
///     .retry_config(RetryConfig {
///         max_attempts: 3,
///         ..RetryConfig::default()
///     })
///     .block_tracker_config(BlockTrackerConfig {
///         polling_interval: Duration::from_secs(4),
///         ..BlockTrackerConfig::default()
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct NetworkClientBuilder {
    config: ProviderConfig,
    retry_config: RetryConfig,
    block_tracker_config: BlockTrackerConfig,
    rpc_endpoint: Option<String>,
    request_timeout: Duration,
    transport: Option<Arc<dyn Transport>>,
}

impl NetworkClientBuilder {
    fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            retry_config: RetryConfig::default(),
            block_tracker_config: BlockTrackerConfig::default(),
            rpc_endpoint: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transport: None,
        }
    }

    /// Set the retry configuration.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Set the block tracker configuration.
    pub fn block_tracker_config(mut self, config: BlockTrackerConfig) -> Self {
        self.block_tracker_config = config;
        self
    }

    /// Send requests to `url` instead of the endpoint derived from the
    /// provider configuration. The retry policy still follows the provider
    /// type.
    pub fn rpc_endpoint(mut self, url: impl Into<String>) -> Self {
        self.rpc_endpoint = Some(url.into());
        self
    }

    /// Bound each upstream HTTP exchange. An expired timeout is retried
    /// like any other `ETIMEDOUT`. Ignored with a custom transport.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Use a custom transport. Takes precedence over
    /// [`rpc_endpoint`](Self::rpc_endpoint).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<NetworkClient, Error> {
        if self.retry_config.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if self.block_tracker_config.polling_interval.is_zero() {
            return Err(Error::Config("polling_interval must be non-zero".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request_timeout must be non-zero".into()));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let url = self
                    .rpc_endpoint
                    .unwrap_or_else(|| self.config.rpc_url());
                Arc::new(HttpTransport::new(url).with_timeout(self.request_timeout))
                    as Arc<dyn Transport>
            }
        };

        let policy: Arc<dyn RetryPolicy> = if self.config.is_infura() {
            Arc::new(InfuraRetryPolicy)
        } else {
            Arc::new(CustomRpcRetryPolicy)
        };
        let retries_empty = policy.retries_empty_results();

        let retrying = Arc::new(RetryingTransport::new(
            transport,
            policy,
            self.retry_config.clone(),
        ));
        let tracker = Arc::new(BlockTracker::new(
            retrying.clone(),
            self.block_tracker_config,
        ));

        // Assembled back to front.
        let mut next: Arc<dyn RequestHandler> = retrying.clone();
        if retries_empty {
            next = Arc::new(RetryOnEmpty::new(tracker.clone(), &self.retry_config, next));
        }
        next = Arc::new(BlockTrackerInspector::new(tracker.clone(), next));
        let coalescer = Arc::new(InFlightCoalescer::new(tracker.clone(), next));
        let cache = Arc::new(BlockCache::new(tracker.clone(), coalescer.clone()));
        next = Arc::new(BlockRefResolver::new(tracker.clone(), cache.clone()));
        next = Arc::new(ChainIdResponder::new(self.config.chain_id(), next));

        tracing::debug!(
            url = %retrying.url(),
            policy = retrying.policy().name(),
            "network client created"
        );

        Ok(NetworkClient {
            config: self.config,
            provider: Provider::new(next),
            block_tracker: tracker,
            cache,
            coalescer,
            transport: retrying,
        })
    }
}

impl TryFrom<NetworkClientBuilder> for NetworkClient {
    type Error = Error;

    fn try_from(builder: NetworkClientBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}
