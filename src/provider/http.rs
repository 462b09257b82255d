use std::env;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{
    FetchError, ListingError, PriceFilter, PriceSession, RawSpotPrice, SpotPriceProvider,
    PRODUCT_DESCRIPTION,
};
use crate::launcher::{InstanceLauncher, LaunchError, LaunchedInstance};

/// Pricing collaborator backed by a JSON-over-HTTP gateway.
///
/// The gateway fronts the cloud provider's pricing API and owns
/// authentication and retry concerns; this client only drives the
/// queries:
///
/// * `GET {base}/regions` — region listing
/// * `GET {base}/regions/{region}/spot-prices` — one price history page,
///   with `nextToken` pagination
///
/// # Configuration
/// * `SPOT_GATEWAY_URL`: base URL (required)
/// * `SPOT_GATEWAY_TOKEN`: bearer token, attached when present
pub struct GatewayProvider {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl GatewayProvider {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    /// Builds a provider from environment variables.
    ///
    /// # Errors
    /// Returns an error if `SPOT_GATEWAY_URL` is not set.
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = env::var("SPOT_GATEWAY_URL")
            .map_err(|_| anyhow::anyhow!("SPOT_GATEWAY_URL must be set in environment"))?;
        let token = env::var("SPOT_GATEWAY_TOKEN").ok();
        Ok(Self::new(base_url, token))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegionListing {
    #[serde(rename = "Regions", default)]
    regions: Vec<RegionEntry>,
}

#[derive(Debug, Deserialize)]
struct RegionEntry {
    #[serde(rename = "RegionName")]
    region_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceHistoryPage {
    #[serde(rename = "SpotPriceHistory", default)]
    spot_price_history: Vec<RawSpotPrice>,
    #[serde(rename = "NextToken")]
    next_token: Option<String>,
}

#[async_trait]
impl SpotPriceProvider for GatewayProvider {
    type Session = GatewaySession;

    async fn list_regions(&self) -> Result<Vec<String>, ListingError> {
        let url = format!("{}/regions", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        let listing: RegionListing = response.error_for_status()?.json().await?;

        let mut regions = Vec::with_capacity(listing.regions.len());
        for entry in listing.regions {
            let name = entry
                .region_name
                .ok_or_else(|| ListingError::Decode("region entry without a name".into()))?;
            regions.push(name);
        }
        Ok(regions)
    }

    async fn open_session(
        &self,
        region: &str,
        filter: &PriceFilter,
        since: DateTime<Utc>,
    ) -> Result<Self::Session, FetchError> {
        Ok(GatewaySession {
            client: self.client.clone(),
            url: format!("{}/regions/{}/spot-prices", self.base_url, region),
            token: self.token.clone(),
            patterns: filter.patterns(),
            since,
            next_token: None,
            exhausted: false,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LaunchResponse {
    #[serde(rename = "Instances", default)]
    instances: Vec<LaunchEntry>,
}

#[derive(Debug, Deserialize)]
struct LaunchEntry {
    #[serde(rename = "InstanceId")]
    instance_id: String,
    #[serde(rename = "InstanceType")]
    instance_type: String,
    #[serde(rename = "AvailabilityZone")]
    availability_zone: String,
}

#[derive(Debug, Deserialize)]
struct GatewayRejection {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

#[async_trait]
impl InstanceLauncher for GatewayProvider {
    /// `POST {base}/instances` with the launch template name and count.
    /// A rejection body carries the provider's `Code`/`Message` pair, which
    /// is what the launch loop classifies contention by.
    async fn launch(
        &self,
        template: &str,
        count: u32,
    ) -> Result<Vec<LaunchedInstance>, LaunchError> {
        let url = format!("{}/instances", self.base_url);
        let body = serde_json::json!({
            "LaunchTemplateName": template,
            "MinCount": 1,
            "MaxCount": count,
        });

        let response = self.authorize(self.client.post(&url).json(&body)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<GatewayRejection>(&text) {
                Ok(rejection) => LaunchError::Rejected {
                    code: rejection.code,
                    message: rejection.message,
                },
                Err(_) => LaunchError::Rejected {
                    code: format!("HTTP {}", status.as_u16()),
                    message: text,
                },
            });
        }

        let launched: LaunchResponse = response
            .json()
            .await
            .map_err(|err| LaunchError::Decode(err.to_string()))?;
        Ok(launched
            .instances
            .into_iter()
            .map(|entry| LaunchedInstance {
                instance_id: entry.instance_id,
                instance_type: entry.instance_type,
                zone: entry.availability_zone,
            })
            .collect())
    }
}

/// One in-flight paginated query against a single region.
pub struct GatewaySession {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    patterns: Vec<String>,
    since: DateTime<Utc>,
    next_token: Option<String>,
    exhausted: bool,
}

#[async_trait]
impl PriceSession for GatewaySession {
    async fn next_page(&mut self) -> Result<Option<Vec<RawSpotPrice>>, FetchError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut request = self.client.get(&self.url).query(&[
            ("since", self.since.to_rfc3339()),
            ("product", PRODUCT_DESCRIPTION.to_string()),
            ("instanceTypes", self.patterns.join(",")),
        ]);
        if let Some(token) = &self.next_token {
            request = request.query(&[("nextToken", token)]);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Remote(format!("gateway returned {}", status)));
        }
        let page: PriceHistoryPage = response
            .json()
            .await
            .map_err(|err| FetchError::Decode(err.to_string()))?;

        self.next_token = page.next_token;
        if self.next_token.is_none() {
            self.exhausted = true;
        }
        Ok(Some(page.spot_price_history))
    }

    async fn close(self) {
        // The pooled HTTP connection is returned on drop; the gateway
        // holds no per-query server state to release.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_price_history_page() {
        let body = r#"{
            "SpotPriceHistory": [
                {"InstanceType": "g5.xlarge", "AvailabilityZoneId": "use1-az1", "SpotPrice": "0.35"},
                {"InstanceType": "g6e.48xlarge", "SpotPrice": "1.61"}
            ],
            "NextToken": "page-2"
        }"#;
        let page: PriceHistoryPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.spot_price_history.len(), 2);
        assert_eq!(page.next_token.as_deref(), Some("page-2"));
        assert!(page.spot_price_history[1].availability_zone_id.is_none());
    }

    #[test]
    fn test_decode_final_page_without_token() {
        let page: PriceHistoryPage = serde_json::from_str(r#"{"SpotPriceHistory": []}"#).unwrap();
        assert!(page.spot_price_history.is_empty());
        assert!(page.next_token.is_none());
    }

    #[test]
    fn test_decode_region_listing() {
        let body = r#"{"Regions": [{"RegionName": "us-east-1"}, {"RegionName": "eu-west-1"}]}"#;
        let listing: RegionListing = serde_json::from_str(body).unwrap();
        let names: Vec<_> = listing
            .regions
            .into_iter()
            .map(|r| r.region_name.unwrap())
            .collect();
        assert_eq!(names, vec!["us-east-1", "eu-west-1"]);
    }

    #[test]
    fn test_decode_launch_response() {
        let body = r#"{
            "Instances": [
                {"InstanceId": "i-abc123", "InstanceType": "g5.48xlarge", "AvailabilityZone": "us-east-1a"}
            ]
        }"#;
        let launched: LaunchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(launched.instances.len(), 1);
        assert_eq!(launched.instances[0].instance_id, "i-abc123");
    }

    #[test]
    fn test_decode_gateway_rejection() {
        let body = r#"{"Code": "SpotMaxPriceTooLow", "Message": "bid below current price"}"#;
        let rejection: GatewayRejection = serde_json::from_str(body).unwrap();
        assert_eq!(rejection.code, "SpotMaxPriceTooLow");
        assert_eq!(rejection.message, "bid below current price");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = GatewayProvider::new("https://pricing.example/".into(), None);
        assert_eq!(provider.base_url, "https://pricing.example");
    }
}
