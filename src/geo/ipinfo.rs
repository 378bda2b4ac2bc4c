//! ipinfo.io lookups used for ISP enrichment and the server coordinate.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::geo::distance::{distance_from_location, Coordinate, DistanceUnit};
use crate::geo::GeoError;

static AS_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"AS\d+\s").expect("valid regex"));

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Response body of an ipinfo.io `/json` lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpInfo {
    pub ip: String,
    pub hostname: String,
    pub city: String,
    pub region: String,
    pub country: String,
    #[serde(rename = "loc")]
    pub location: String,
    #[serde(rename = "org")]
    pub organization: String,
    pub postal: String,
    pub timezone: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub readme: String,
}

impl IpInfo {
    /// `"<ISP>, <country> (<distance>)"` summary shown after the address.
    ///
    /// Country and distance are left out when unknown or unparseable.
    pub fn isp_summary(&self, server: &Coordinate, unit: DistanceUnit) -> String {
        let mut isp = AS_NUMBER.replace_all(&self.organization, "").into_owned();
        if isp.is_empty() {
            isp = "Unknown ISP".to_string();
        }

        if !self.country.is_empty() {
            isp.push_str(", ");
            isp.push_str(&self.country);
        }

        if !self.location.is_empty() {
            match distance_from_location(&self.location, server, unit) {
                Ok(distance) => {
                    isp.push_str(&format!(" ({distance})"));
                }
                Err(e) => {
                    tracing::error!(location = %self.location, error = %e, "Parsing client coordinates");
                }
            }
        }

        isp
    }
}

/// HTTP client for the ipinfo.io API.
#[derive(Debug, Clone)]
pub struct IpInfoClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl IpInfoClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, GeoError> {
        let http = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        let base_url = Url::parse(base_url)?;

        Ok(Self {
            http,
            base_url,
            api_key: (!api_key.is_empty()).then(|| api_key.to_string()),
        })
    }

    /// URL for `address`, or for the caller's own address when `None`.
    pub fn lookup_url(&self, address: Option<&str>) -> Result<Url, GeoError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| GeoError::BaseUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();
            if let Some(address) = address {
                segments.push(address);
            }
            segments.push("json");
        }
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("token", key);
        }
        Ok(url)
    }

    pub async fn lookup(&self, address: Option<&str>) -> Result<IpInfo, GeoError> {
        let url = self.lookup_url(address)?;
        let info = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<IpInfo>()
            .await?;
        Ok(info)
    }

    /// Lookup that degrades to an empty record on any failure.
    pub async fn lookup_or_default(&self, address: &str) -> IpInfo {
        match self.lookup(Some(address)).await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(address = %address, error = %e, "ipinfo lookup failed");
                IpInfo::default()
            }
        }
    }
}

/// Resolve the server coordinate once, before serving starts.
///
/// A configured non-zero coordinate wins. Otherwise the server's own public
/// address is looked up; failures leave `(0, 0)`.
pub async fn resolve_server_coordinate(configured: Coordinate, client: &IpInfoClient) -> Coordinate {
    if !configured.is_zero() {
        tracing::info!(lat = configured.lat, lng = configured.lon, "Configured server coordinates");
        return configured;
    }

    let info = match client.lookup(None).await {
        Ok(info) => info,
        Err(e) => {
            tracing::error!(error = %e, "Cannot fetch server coordinates");
            return Coordinate::default();
        }
    };

    if info.location.is_empty() {
        tracing::warn!("ipinfo response carried no location, server coordinates stay at 0,0");
        return Coordinate::default();
    }

    match info.location.parse::<Coordinate>() {
        Ok(coordinate) => {
            tracing::info!(lat = coordinate.lat, lng = coordinate.lon, "Fetched server coordinates");
            coordinate
        }
        Err(e) => {
            tracing::error!(error = %e, "Cannot get server coordinates");
            Coordinate::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_urls() {
        let client = IpInfoClient::new("https://ipinfo.io", "").unwrap();
        assert_eq!(
            client.lookup_url(Some("8.8.8.8")).unwrap().as_str(),
            "https://ipinfo.io/8.8.8.8/json"
        );
        assert_eq!(client.lookup_url(None).unwrap().as_str(), "https://ipinfo.io/json");
        assert_eq!(
            client.lookup_url(Some("abcd::1")).unwrap().as_str(),
            "https://ipinfo.io/abcd::1/json"
        );

        let client = IpInfoClient::new("https://ipinfo.io/", "secret").unwrap();
        assert_eq!(
            client.lookup_url(Some("1.1.1.1")).unwrap().as_str(),
            "https://ipinfo.io/1.1.1.1/json?token=secret"
        );
    }

    #[test]
    fn decodes_ipinfo_payload() {
        let info: IpInfo = serde_json::from_str(
            r#"{"ip":"8.8.8.8","hostname":"dns.google","city":"Mountain View",
                "country":"US","loc":"37.4056,-122.0775","org":"AS15169 Google LLC",
                "anycast":true}"#,
        )
        .unwrap();
        assert_eq!(info.location, "37.4056,-122.0775");
        assert_eq!(info.organization, "AS15169 Google LLC");
        assert!(info.postal.is_empty());
    }

    #[test]
    fn isp_summary_formats() {
        let server = Coordinate::new(45.04, 7.42);
        let info = IpInfo {
            country: "GB".into(),
            location: "51.45,1.15".into(),
            organization: "AS5089 Virgin Media Limited".into(),
            ..Default::default()
        };
        assert_eq!(
            info.isp_summary(&server, DistanceUnit::Kilometers),
            "Virgin Media Limited, GB (849.94 km)"
        );

        let bare = IpInfo::default();
        assert_eq!(bare.isp_summary(&server, DistanceUnit::Miles), "Unknown ISP");

        let broken = IpInfo {
            location: "somewhere".into(),
            ..Default::default()
        };
        assert_eq!(broken.isp_summary(&server, DistanceUnit::Miles), "Unknown ISP");
    }

    #[tokio::test]
    async fn configured_coordinate_skips_lookup() {
        let client = IpInfoClient::new("http://127.0.0.1:1/", "").unwrap();
        let c = resolve_server_coordinate(Coordinate::new(1.5, 2.5), &client).await;
        assert_eq!(c, Coordinate::new(1.5, 2.5));
    }

    #[tokio::test]
    async fn failed_lookup_leaves_origin() {
        let client = IpInfoClient::new("http://127.0.0.1:1/", "").unwrap();
        let c = resolve_server_coordinate(Coordinate::default(), &client).await;
        assert!(c.is_zero());
    }
}
