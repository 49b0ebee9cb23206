use tokio::sync::mpsc;
use tracing::{info, warn};
use walkingpad::{
    Config, Discoverer, Intent, KingsmithDiscoverer, Result, Supervisor, TracingSink,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("📊 WalkingPad Status Monitor Example");

    let config = Config::load_or_default();
    let discoverer = KingsmithDiscoverer::new().await?;
    let discoverers: Vec<Box<dyn Discoverer>> = vec![Box::new(discoverer)];

    let (intents_tx, intents_rx) = mpsc::channel(8);
    let supervisor =
        Supervisor::from_config(discoverers, &config, Box::new(TracingSink), intents_rx);

    let handle = tokio::spawn(supervisor.run());

    info!("🔍 Monitoring; press Ctrl+C to quit");
    tokio::signal::ctrl_c().await?;

    info!("🔌 Shutting down...");
    if intents_tx.send(Intent::Quit).await.is_err() {
        warn!("supervisor already stopped");
    }
    let _ = handle.await;

    info!("🎉 Status monitoring completed!");
    Ok(())
}
