use serde::{Deserialize, Serialize};

use crate::config::NetworkConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Connected,
    Offline,
}

/// Static identity of the ledger plus whether its store is reachable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHealth {
    pub status: NetworkStatus,
    pub channel: String,
    pub chaincode: String,
    pub network: String,
    pub consensus: String,
    pub block_height: u64,
}

impl NetworkHealth {
    pub fn new(network: &NetworkConfig, store_reachable: bool, block_height: u64) -> Self {
        Self {
            status: if store_reachable {
                NetworkStatus::Connected
            } else {
                NetworkStatus::Offline
            },
            channel: network.channel.clone(),
            chaincode: network.chaincode.clone(),
            network: network.network.clone(),
            consensus: network.consensus.clone(),
            block_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_serializes_lowercase_status() {
        let health = NetworkHealth::new(&NetworkConfig::default(), true, 3);
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["status"], "connected");
        assert_eq!(json["chaincode"], "threat-logger");
        assert_eq!(json["blockHeight"], 3);

        let offline = NetworkHealth::new(&NetworkConfig::default(), false, 0);
        assert_eq!(offline.status, NetworkStatus::Offline);
    }
}
