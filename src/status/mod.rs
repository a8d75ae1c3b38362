pub mod geo;

use serde::{Deserialize, Serialize};
use std::net::UdpSocket;
use std::sync::Arc;

use self::geo::{GeoLookup, IpLocation};
use crate::error::Result;
use crate::vpn::reconciler::InterfaceMap;
use crate::vpn::tool::WgTool;

pub const STATUS_CONNECTED: &str = "Connected";
pub const STATUS_DISCONNECTED: &str = "Disconnected";

const NOT_CONNECTED: &str = "Not connected";
const UNKNOWN: &str = "Unknown";
const ERROR: &str = "Error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDetails {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub postal: Option<String>,
    pub display: String,
}

impl From<&IpLocation> for LocationDetails {
    fn from(location: &IpLocation) -> Self {
        Self {
            city: location.city.clone(),
            region: location.region.clone(),
            country: location.country.clone(),
            postal: location.postal.clone(),
            display: location.display(),
        }
    }
}

/// What `/status` returns. Built fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub current_config: String,
    pub local_ip: String,
    pub public_ip: String,
    pub city: String,
    pub country: String,
    pub location: Option<LocationDetails>,
    pub status: String,
    pub timestamp: String,
}

impl ConnectionSnapshot {
    pub fn error(message: &str) -> Self {
        Self {
            current_config: ERROR.to_string(),
            local_ip: ERROR.to_string(),
            public_ip: ERROR.to_string(),
            city: ERROR.to_string(),
            country: ERROR.to_string(),
            location: None,
            status: format!("Error: {}", message),
            timestamp: now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == STATUS_CONNECTED
    }
}

pub struct StatusReporter {
    tool: WgTool,
    geo: Arc<dyn GeoLookup>,
}

impl StatusReporter {
    pub fn new(tool: WgTool, geo: Arc<dyn GeoLookup>) -> Self {
        Self { tool, geo }
    }

    /// Never fails: internal errors come back as an `Error: ...` snapshot.
    /// `names` translates interface names to profile names when available.
    pub async fn snapshot(&self, names: Option<&InterfaceMap>) -> ConnectionSnapshot {
        match self.collect(names).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("Status check failed: {}", e);
                ConnectionSnapshot::error(&e.to_string())
            }
        }
    }

    async fn collect(&self, names: Option<&InterfaceMap>) -> Result<ConnectionSnapshot> {
        let interfaces = self.tool.show_interfaces().await?;
        let current = interfaces.first().map(|interface| {
            names
                .and_then(|map| map.profile_name(interface))
                .unwrap_or_else(|| interface.clone())
        });

        let location = match current {
            Some(_) => match self.geo.lookup().await {
                Ok(location) => Some(location),
                Err(e) => {
                    tracing::warn!("Error getting IP location: {}", e);
                    None
                }
            },
            None => None,
        };

        let text = |value: Option<&String>| value.cloned().unwrap_or_else(|| UNKNOWN.to_string());
        Ok(ConnectionSnapshot {
            current_config: current.clone().unwrap_or_else(|| NOT_CONNECTED.to_string()),
            local_ip: local_ip().unwrap_or_else(|| UNKNOWN.to_string()),
            public_ip: location
                .as_ref()
                .map(|l| l.ip.clone())
                .unwrap_or_else(|| NOT_CONNECTED.to_string()),
            city: text(location.as_ref().and_then(|l| l.city.as_ref())),
            country: text(location.as_ref().and_then(|l| l.country.as_ref())),
            location: location.as_ref().map(LocationDetails::from),
            status: if current.is_some() { STATUS_CONNECTED } else { STATUS_DISCONNECTED }.to_string(),
            timestamp: now(),
        })
    }
}

/// Address of the interface the default route leaves through. Connecting a UDP
/// socket only selects a route; nothing is sent.
pub fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
