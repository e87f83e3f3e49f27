//! Connection settings.

use std::time::Duration;

use castline_assembly::AssemblerConfig;
use castline_protocol::FragmentationPolicy;
use serde::{Deserialize, Serialize};

/// Everything a [`Connection`](crate::Connection) needs, generic over the
/// transport's own configuration.
///
/// With the multicast transport this is `ConnectionConfig<TransportConfig>`
/// and can be read from a partial JSON/TOML document:
///
/// ```rust,ignore
/// let cfg: ConnectionConfig<TransportConfig> =
///     serde_json::from_str(r#"{ "transport": { "port": 7668 } }"#)?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig<C> {
    pub transport: C,
    pub fragmentation: FragmentationPolicy,
    pub assembly: AssemblerConfig,
    /// How often the receive task purges stale assemblies.
    pub sweep_interval: Duration,
}

impl<C> ConnectionConfig<C> {
    pub fn new(transport: C) -> Self {
        Self {
            transport,
            fragmentation: FragmentationPolicy::default(),
            assembly: AssemblerConfig::default(),
            sweep_interval: Duration::from_secs(1),
        }
    }

    pub fn fragmentation(mut self, policy: FragmentationPolicy) -> Self {
        self.fragmentation = policy;
        self
    }

    pub fn assembly(mut self, config: AssemblerConfig) -> Self {
        self.assembly = config;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

impl<C: Default> Default for ConnectionConfig<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}
