pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::pricing::InstanceFamily;

pub use http::GatewayProvider;

/// Product/platform restriction applied to every price query.
pub const PRODUCT_DESCRIPTION: &str = "Linux/UNIX";

/// One raw element of a spot price history page, exactly as the provider
/// sends it. Every field is optional on the wire; [`crate::pricing::PriceRecord::from_raw`]
/// validates them.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSpotPrice {
    #[serde(rename = "InstanceType")]
    pub instance_type: Option<String>,
    #[serde(rename = "AvailabilityZoneId")]
    pub availability_zone_id: Option<String>,
    #[serde(rename = "SpotPrice")]
    pub spot_price: Option<String>,
}

/// Which instance types a region query asks the provider for.
///
/// Two supported modes: an exact allow-list of instance types, or a
/// wildcard over a set of recognized families. Either way the query is
/// further restricted to [`PRODUCT_DESCRIPTION`].
#[derive(Debug, Clone)]
pub enum PriceFilter {
    InstanceTypes(Vec<String>),
    FamilyPrefixes(Vec<InstanceFamily>),
}

impl PriceFilter {
    /// The instance-type patterns to send with the query, wildcarded for
    /// the family mode.
    pub fn patterns(&self) -> Vec<String> {
        match self {
            PriceFilter::InstanceTypes(types) => types.clone(),
            PriceFilter::FamilyPrefixes(families) => {
                families.iter().map(|f| format!("{}.*", f)).collect()
            }
        }
    }
}

/// Region enumeration failed. Fatal for the whole run: no fetch is
/// attempted and no partial listing is used.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("malformed region listing: {0}")]
    Decode(String),
}

/// A single region's fetch failed. Recoverable at pipeline level: the
/// region contributes no further records and the error joins the run's
/// warning list, while sibling regions keep going.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("malformed page: {0}")]
    Decode(String),
    #[error("{0}")]
    Remote(String),
}

/// The remote pricing collaborator.
///
/// Everything provider-specific (endpoints, pagination mechanics,
/// authentication) lives behind this seam so the pipeline can be driven
/// by a fake in tests.
#[async_trait]
pub trait SpotPriceProvider: Send + Sync + 'static {
    type Session: PriceSession;

    /// Enumerates every region to scan, in the provider's order.
    async fn list_regions(&self) -> Result<Vec<String>, ListingError>;

    /// Opens one pricing session for `region` and starts the price query
    /// with the given filter and start time. One session per fetch task;
    /// sessions are never shared.
    async fn open_session(
        &self,
        region: &str,
        filter: &PriceFilter,
        since: DateTime<Utc>,
    ) -> Result<Self::Session, FetchError>;
}

/// A live paginated price query against one region.
///
/// The page sequence is finite and non-restartable. Callers must invoke
/// [`close`](PriceSession::close) on every exit path, including error and
/// early abandonment.
#[async_trait]
pub trait PriceSession: Send {
    /// Fetches the next page, or `None` once the query is exhausted.
    async fn next_page(&mut self) -> Result<Option<Vec<RawSpotPrice>>, FetchError>;

    /// Releases the session's remote resources.
    async fn close(self);
}
