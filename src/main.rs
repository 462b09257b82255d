use std::process::ExitCode;
use std::sync::Arc;

use dotenv::dotenv;
use tracing::{info, warn};

use spot_scout::config::ScanConfig;
use spot_scout::pipeline::{run_scan, ConsoleSink};
use spot_scout::provider::GatewayProvider;

/// Scans every region for spot prices below the configured ceiling and
/// prints each acceptable offer as it is discovered.
///
/// Exit status is non-zero when any region or record level warnings were
/// collected, even though accepted records were still emitted.
#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = ScanConfig::from_env()?;
    let provider = Arc::new(GatewayProvider::from_env()?);
    let mut sink = ConsoleSink;

    let report = run_scan(provider, &config, &mut sink).await?;

    info!(
        accepted = report.accepted,
        rejected = report.rejected,
        warnings = report.warnings.len(),
        "scan complete"
    );

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        for warning in &report.warnings {
            warn!("{}", warning);
        }
        Ok(ExitCode::FAILURE)
    }
}
