use std::env;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

/// Rejection codes that mean spot capacity is contended right now rather
/// than the request being wrong; worth waiting out indefinitely.
const CONTENTION_CODES: [&str; 2] = ["MaxSpotInstanceCountExceeded", "SpotMaxPriceTooLow"];

/// A launch attempt failed.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("malformed launch response: {0}")]
    Decode(String),
    #[error("{code}: {message}")]
    Rejected { code: String, message: String },
}

impl LaunchError {
    /// Whether this rejection is spot capacity contention, the expected
    /// steady state while waiting for a price dip.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            LaunchError::Rejected { code, .. } if CONTENTION_CODES.contains(&code.as_str())
        )
    }
}

/// One instance the provider reports as started.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchedInstance {
    pub instance_id: String,
    pub instance_type: String,
    pub zone: String,
}

/// The provider's launch surface: start instances from a named launch
/// template. Kept separate from the pricing traits so fakes only script
/// what a test needs.
#[async_trait]
pub trait InstanceLauncher: Send + Sync {
    async fn launch(
        &self,
        template: &str,
        count: u32,
    ) -> Result<Vec<LaunchedInstance>, LaunchError>;
}

/// Settings for the launch loop.
///
/// # Configuration
/// * `LAUNCH_TEMPLATE`: launch template name (required)
/// * `LAUNCH_COUNT`: instances per attempt (default 1)
/// * `LAUNCH_INTERVAL_SECS`: pause between attempts (default 1)
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub launch_template: String,
    pub count: u32,
    pub interval: Duration,
}

impl LaunchConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let launch_template = env::var("LAUNCH_TEMPLATE")
            .map_err(|_| anyhow::anyhow!("LAUNCH_TEMPLATE must be set in environment"))?;
        let count = match env::var("LAUNCH_COUNT") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid LAUNCH_COUNT {:?}", raw))?,
            Err(_) => 1,
        };
        let interval = match env::var("LAUNCH_INTERVAL_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("invalid LAUNCH_INTERVAL_SECS {:?}", raw))?,
            ),
            Err(_) => Duration::from_secs(1),
        };
        Ok(Self {
            launch_template,
            count,
            interval,
        })
    }
}

/// Makes one launch attempt and logs its outcome.
///
/// Successful launches are reported per instance; capacity contention is
/// logged quietly since the loop exists to wait it out, while any other
/// failure is logged as a warning. The error is returned either way so
/// callers can see what happened.
pub async fn launch_round<L: InstanceLauncher + ?Sized>(
    launcher: &L,
    config: &LaunchConfig,
) -> Result<Vec<LaunchedInstance>, LaunchError> {
    match launcher.launch(&config.launch_template, config.count).await {
        Ok(instances) => {
            for instance in &instances {
                info!(
                    id = %instance.instance_id,
                    instance_type = %instance.instance_type,
                    zone = %instance.zone,
                    "launched instance"
                );
            }
            Ok(instances)
        }
        Err(error) if error.is_contention() => {
            info!(%error, "no spot capacity yet, will retry");
            Err(error)
        }
        Err(error) => {
            warn!(%error, "launch failed, will retry");
            Err(error)
        }
    }
}

/// Attempts a launch every `config.interval`, forever.
///
/// No failure stops the loop; it runs until the process is killed. This
/// mirrors how spot capacity is actually grabbed: keep asking at a fixed
/// cadence until the market lets the request through.
pub async fn run_launch_loop<L: InstanceLauncher + ?Sized>(launcher: &L, config: &LaunchConfig) {
    loop {
        let _ = launch_round(launcher, config).await;
        tokio::time::sleep(config.interval).await;
    }
}
