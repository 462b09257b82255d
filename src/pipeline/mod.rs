pub mod aggregator;
pub mod reporter;

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::pricing::{ClassifyError, PriceRecord, RecordDecodeError};
use crate::provider::{FetchError, ListingError, SpotPriceProvider};

pub use aggregator::aggregate;
pub use reporter::{drain, ConsoleSink, ReportSink};

/// A recoverable problem collected during a scan.
///
/// Warnings never abort sibling work; they are surfaced together at the
/// end of the run and turn the exit status non-zero.
#[derive(Debug)]
pub enum ScanWarning {
    /// One region stopped contributing records.
    RegionFailed { region: String, error: FetchError },
    /// One raw record could not be decoded and was dropped.
    RecordDropped {
        region: String,
        error: RecordDecodeError,
    },
    /// One record could not be classified and was treated as rejected.
    Unclassifiable {
        record: PriceRecord,
        error: ClassifyError,
    },
    /// The aggregation machinery itself failed; fetch results may have
    /// been lost.
    Internal { message: String },
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanWarning::RegionFailed { region, error } => {
                write!(f, "region {} failed: {}", region, error)
            }
            ScanWarning::RecordDropped { region, error } => {
                write!(f, "dropped record from {}: {}", region, error)
            }
            ScanWarning::Unclassifiable { record, error } => {
                write!(f, "could not classify {}: {}", record, error)
            }
            ScanWarning::Internal { message } => {
                write!(f, "internal failure: {}", message)
            }
        }
    }
}

/// Summary of one complete scan.
#[derive(Debug)]
pub struct ScanReport {
    pub accepted: usize,
    pub rejected: usize,
    pub warnings: Vec<ScanWarning>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Runs one scan end to end: list regions, fan out a fetch task per
/// region, drain the merged stream through the classifier into the sink.
///
/// Region and record level problems are collected into the report's
/// warning list; only a failed region listing is fatal.
///
/// # Errors
/// Returns a [`ListingError`] if region enumeration fails — no fetch is
/// attempted in that case.
pub async fn run_scan<P: SpotPriceProvider>(
    provider: Arc<P>,
    config: &ScanConfig,
    sink: &mut dyn ReportSink,
) -> Result<ScanReport, ListingError> {
    let regions = provider.list_regions().await?;
    info!(regions = regions.len(), "starting spot price scan");

    let (stream, supervisor) = aggregate(
        provider,
        regions,
        config.filter.clone(),
        config.channel_capacity,
    );
    let drained = drain(stream, &config.policy, sink).await;

    // The stream has closed, so every fetch task is done and the
    // supervisor resolves promptly.
    let mut warnings = match supervisor.await {
        Ok(warnings) => warnings,
        Err(err) => {
            warn!("aggregation supervisor failed: {}", err);
            vec![ScanWarning::Internal {
                message: format!("aggregation supervisor failed: {}", err),
            }]
        }
    };
    warnings.extend(drained.warnings);

    Ok(ScanReport {
        accepted: drained.accepted,
        rejected: drained.rejected,
        warnings,
    })
}

// Shared fakes for pipeline tests
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use crate::provider::{
        FetchError, ListingError, PriceFilter, PriceSession, RawSpotPrice, SpotPriceProvider,
    };

    pub(crate) fn raw(instance_type: &str, zone_id: &str, price: &str) -> RawSpotPrice {
        RawSpotPrice {
            instance_type: Some(instance_type.to_string()),
            availability_zone_id: Some(zone_id.to_string()),
            spot_price: Some(price.to_string()),
        }
    }

    /// Scripted behavior for one fake region.
    #[derive(Clone)]
    pub(crate) struct FakeRegion {
        pub name: String,
        pages: Vec<Vec<RawSpotPrice>>,
        page_delay: Duration,
        fail_after_pages: Option<usize>,
        fail_open: bool,
        panic_in_flight: bool,
    }

    impl FakeRegion {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                pages: Vec::new(),
                page_delay: Duration::ZERO,
                fail_after_pages: None,
                fail_open: false,
                panic_in_flight: false,
            }
        }

        pub fn page(mut self, records: Vec<RawSpotPrice>) -> Self {
            self.pages.push(records);
            self
        }

        pub fn page_delay(mut self, delay: Duration) -> Self {
            self.page_delay = delay;
            self
        }

        /// Fail with a fetch error once `n` pages have been served.
        pub fn fail_after_pages(mut self, n: usize) -> Self {
            self.fail_after_pages = Some(n);
            self
        }

        pub fn fail_open(mut self) -> Self {
            self.fail_open = true;
            self
        }

        /// Panic inside the fetch task instead of returning an error.
        pub fn panic_in_flight(mut self) -> Self {
            self.panic_in_flight = true;
            self
        }
    }

    /// In-memory provider driving scripted regions, recording which
    /// sessions were closed.
    pub(crate) struct FakeProvider {
        regions: Vec<FakeRegion>,
        closed: Arc<Mutex<Vec<String>>>,
        fail_listing: bool,
    }

    impl FakeProvider {
        pub fn new(regions: Vec<FakeRegion>) -> Self {
            Self {
                regions,
                closed: Arc::new(Mutex::new(Vec::new())),
                fail_listing: false,
            }
        }

        pub fn failing_listing() -> Self {
            Self {
                regions: Vec::new(),
                closed: Arc::new(Mutex::new(Vec::new())),
                fail_listing: true,
            }
        }

        pub fn region_names(&self) -> Vec<String> {
            self.regions.iter().map(|r| r.name.clone()).collect()
        }

        pub fn closed_regions(&self) -> Vec<String> {
            self.closed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpotPriceProvider for FakeProvider {
        type Session = FakeSession;

        async fn list_regions(&self) -> Result<Vec<String>, ListingError> {
            if self.fail_listing {
                return Err(ListingError::Decode("listing unavailable".into()));
            }
            Ok(self.region_names())
        }

        async fn open_session(
            &self,
            region: &str,
            _filter: &PriceFilter,
            _since: DateTime<Utc>,
        ) -> Result<Self::Session, FetchError> {
            let scripted = self
                .regions
                .iter()
                .find(|r| r.name == region)
                .cloned()
                .ok_or_else(|| FetchError::Remote(format!("unknown region {}", region)))?;
            if scripted.fail_open {
                return Err(FetchError::Remote(format!("{} refused session", region)));
            }
            Ok(FakeSession {
                region: scripted.name,
                pages: scripted.pages.into(),
                page_delay: scripted.page_delay,
                fail_after_pages: scripted.fail_after_pages,
                panic_in_flight: scripted.panic_in_flight,
                served: 0,
                closed: Arc::clone(&self.closed),
            })
        }
    }

    pub(crate) struct FakeSession {
        region: String,
        pages: VecDeque<Vec<RawSpotPrice>>,
        page_delay: Duration,
        fail_after_pages: Option<usize>,
        panic_in_flight: bool,
        served: usize,
        closed: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PriceSession for FakeSession {
        async fn next_page(&mut self) -> Result<Option<Vec<RawSpotPrice>>, FetchError> {
            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
            if self.panic_in_flight {
                panic!("scripted panic in {}", self.region);
            }
            if self.fail_after_pages == Some(self.served) {
                return Err(FetchError::Remote(format!(
                    "{} dropped the query",
                    self.region
                )));
            }
            match self.pages.pop_front() {
                Some(page) => {
                    self.served += 1;
                    Ok(Some(page))
                }
                None => Ok(None),
            }
        }

        async fn close(self) {
            self.closed.lock().unwrap().push(self.region);
        }
    }
}
