use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::pricing::PriceRecord;
use crate::provider::{FetchError, PriceFilter, PriceSession, SpotPriceProvider};

use super::ScanWarning;

/// Fans out one fetch task per region and fans their records into a
/// single bounded channel.
///
/// Returns the receiving end of the channel plus a supervisor handle that
/// resolves to the collected warnings once every fetch task has
/// terminated. The channel closes exactly when the last task finishes:
/// each task owns a sender clone and drops it on exit, and the one held
/// here is dropped before returning. A failing region is recorded as a
/// warning without cancelling its siblings.
///
/// `capacity` bounds how far producers can run ahead of the consumer;
/// producers suspend on send while the channel is full.
pub fn aggregate<P: SpotPriceProvider>(
    provider: Arc<P>,
    regions: Vec<String>,
    filter: PriceFilter,
    capacity: usize,
) -> (mpsc::Receiver<PriceRecord>, JoinHandle<Vec<ScanWarning>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let mut handles = Vec::with_capacity(regions.len());
    for region in regions {
        let provider = Arc::clone(&provider);
        let filter = filter.clone();
        let tx = tx.clone();
        let task_region = region.clone();
        handles.push((
            region,
            tokio::spawn(async move { fetch_region(provider, task_region, filter, tx).await }),
        ));
    }
    drop(tx);

    let supervisor = tokio::spawn(async move {
        let mut warnings = Vec::new();
        for (region, handle) in handles {
            match handle.await {
                Ok(task_warnings) => warnings.extend(task_warnings),
                // A panicked or aborted task still lost its region's work,
                // so it joins the warning list like any other fetch failure.
                Err(err) => {
                    warn!(%region, "fetch task aborted: {}", err);
                    warnings.push(ScanWarning::RegionFailed {
                        region,
                        error: FetchError::Remote(format!("fetch task aborted: {}", err)),
                    });
                }
            }
        }
        warnings
    });

    (rx, supervisor)
}

/// Drives one region's paginated query to exhaustion.
///
/// Opens a session, decodes each page element, and sends the decoded
/// records downstream in page order. The session is closed on every exit
/// path. Per-record decode failures drop that record only; a transport or
/// page-level failure ends this region's contribution with a warning.
async fn fetch_region<P: SpotPriceProvider>(
    provider: Arc<P>,
    region: String,
    filter: PriceFilter,
    tx: mpsc::Sender<PriceRecord>,
) -> Vec<ScanWarning> {
    let mut warnings = Vec::new();

    let since = Utc::now();
    let mut session = match provider.open_session(&region, &filter, since).await {
        Ok(session) => session,
        Err(error) => {
            warn!(%region, %error, "failed to open pricing session");
            warnings.push(ScanWarning::RegionFailed { region, error });
            return warnings;
        }
    };

    loop {
        let page = match session.next_page().await {
            Ok(Some(page)) => page,
            Ok(None) => break,
            Err(error) => {
                warn!(%region, %error, "region fetch failed mid-pagination");
                warnings.push(ScanWarning::RegionFailed {
                    region: region.clone(),
                    error,
                });
                break;
            }
        };

        for raw in page {
            match PriceRecord::from_raw(raw) {
                Ok(record) => {
                    if tx.send(record).await.is_err() {
                        // Consumer hung up: early abandonment, not a failure.
                        debug!(%region, "output stream closed, abandoning fetch");
                        session.close().await;
                        return warnings;
                    }
                }
                Err(error) => {
                    warn!(%region, %error, "dropping undecodable record");
                    warnings.push(ScanWarning::RecordDropped {
                        region: region.clone(),
                        error,
                    });
                }
            }
        }
    }

    session.close().await;
    warnings
}
