use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{Result, RotatorError};

/// Public IP and whatever location details the answering service provided.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpLocation {
    pub ip: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub postal: Option<String>,
}

impl IpLocation {
    /// Multi-line summary for the UI: IP, then "City, Country" when known.
    pub fn display(&self) -> String {
        let place = match (&self.city, &self.country) {
            (Some(city), Some(country)) => format!("{}, {}", city, country),
            (Some(city), None) => city.clone(),
            (None, Some(country)) => country.clone(),
            (None, None) => "Unknown".to_string(),
        };
        format!("{}\n{}", self.ip, place)
    }
}

#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self) -> Result<IpLocation>;
}

/// Asks each configured service in turn and returns the first usable answer.
pub struct HttpGeoLookup {
    client: reqwest::Client,
    services: Vec<String>,
}

impl HttpGeoLookup {
    pub fn new(services: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wg-rotator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RotatorError::LookupFailed(format!("could not build HTTP client: {}", e)))?;
        Ok(Self { client, services })
    }

    async fn query(&self, url: &str) -> std::result::Result<IpLocation, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        parse_location(&body).ok_or_else(|| "response carried no IP address".to_string())
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn lookup(&self) -> Result<IpLocation> {
        for url in &self.services {
            match self.query(url).await {
                Ok(location) => {
                    tracing::debug!("Location info from {}: {:?}", url, location);
                    return Ok(location);
                }
                Err(e) => tracing::info!("Failed to get IP info from {}: {}", url, e),
            }
        }
        Err(RotatorError::LookupFailed(format!(
            "none of {} services answered",
            self.services.len()
        )))
    }
}

/// Understands the ipinfo.io, api.myip.com and ifconfig.me/all.json shapes,
/// which differ mostly in what they call the address field.
pub fn parse_location(body: &Value) -> Option<IpLocation> {
    let field = |names: &[&str]| {
        names.iter().find_map(|name| {
            body.get(*name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    };

    Some(IpLocation {
        ip: field(&["ip", "ip_addr", "query"])?,
        city: field(&["city"]),
        region: field(&["region", "regionName"]),
        country: field(&["country"]),
        postal: field(&["postal", "zip"]),
    })
}
