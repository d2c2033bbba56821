//! Hetzner Cloud response shapes.
//!
//! Only the fields the daemon reports on are modelled; everything else in
//! the API response is ignored when decoding.

use serde::{Deserialize, Serialize};
use stagewatch_store::Entity;

/// Name used in `responseStruct` for [`CloudServers`].
pub const CLOUD_SERVERS: &str = "CloudServers";

/// Body of `GET /v1/servers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudServers {
    #[serde(default)]
    pub servers: Vec<Server>,
}

/// A single server record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_net: Option<PublicNet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicNet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ipv4 {
    pub ip: String,
}

impl Server {
    /// Returns the public IPv4 address, if the server has one.
    pub fn ipv4(&self) -> Option<&str> {
        self.public_net
            .as_ref()
            .and_then(|net| net.ipv4.as_ref())
            .map(|v4| v4.ip.as_str())
    }
}

impl Entity for Server {
    fn identity(&self) -> String {
        self.id.to_string()
    }
}
