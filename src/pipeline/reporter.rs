use tokio::sync::mpsc;
use tracing::warn;

use crate::pricing::{Decision, PriceRecord, ThresholdPolicy};

use super::ScanWarning;

/// Destination for accepted records.
///
/// Append-only: each accepted record is written at most once, in the
/// order the pipeline accepted it.
pub trait ReportSink {
    fn emit(&mut self, record: &PriceRecord, ceiling: f64);
}

/// Writes each accepted record as one line on stdout.
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn emit(&mut self, record: &PriceRecord, ceiling: f64) {
        println!("{} (ceiling {:.4})", record, ceiling);
    }
}

/// Tallies from draining one aggregated stream.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub accepted: usize,
    pub rejected: usize,
    pub warnings: Vec<ScanWarning>,
}

/// Drains the aggregated stream, classifying each record against the
/// policy and emitting accepted ones to the sink.
///
/// Runs until the stream closes, which the aggregator guarantees happens
/// only after every fetch task has terminated. A record the policy cannot
/// classify is treated as rejected and recorded as a warning; it never
/// stops the drain.
pub async fn drain(
    mut stream: mpsc::Receiver<PriceRecord>,
    policy: &ThresholdPolicy,
    sink: &mut dyn ReportSink,
) -> DrainReport {
    let mut report = DrainReport::default();

    while let Some(record) = stream.recv().await {
        match policy.evaluate(&record) {
            Ok(Decision::Accepted { ceiling }) => {
                sink.emit(&record, ceiling);
                report.accepted += 1;
            }
            Ok(Decision::Rejected { .. }) => {
                report.rejected += 1;
            }
            Err(error) => {
                warn!(instance_type = %record.instance_type, %error, "record not classifiable, rejecting");
                // Excluded from acceptance, so it counts as rejected too.
                report.rejected += 1;
                report.warnings.push(ScanWarning::Unclassifiable { record, error });
            }
        }
    }

    report
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Sink that remembers every emission, for asserting order and count.
    #[derive(Default)]
    pub(crate) struct VecSink {
        pub emitted: Vec<(PriceRecord, f64)>,
    }

    impl ReportSink for VecSink {
        fn emit(&mut self, record: &PriceRecord, ceiling: f64) {
            self.emitted.push((record.clone(), ceiling));
        }
    }
}
