use dotenv::dotenv;

use spot_scout::launcher::{run_launch_loop, LaunchConfig};
use spot_scout::provider::GatewayProvider;

/// Grabs spot instances from a named launch template, retrying at a fixed
/// interval until capacity comes through. Runs until killed.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = LaunchConfig::from_env()?;
    let launcher = GatewayProvider::from_env()?;

    run_launch_loop(&launcher, &config).await;
    Ok(())
}
