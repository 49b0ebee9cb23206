use std::time::Duration;
use tracing::{error, info};
use walkingpad::{
    discover_candidates, KingsmithDiscoverer, PadDriver, Result, ScanParams,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🚶 WalkingPad Basic Control Example");
    info!("Scanning for WalkingPad devices...");

    let discoverer = KingsmithDiscoverer::new().await?;
    let discoverers: Vec<Box<dyn walkingpad::Discoverer>> = vec![Box::new(discoverer)];
    let candidates = discover_candidates(&discoverers, &ScanParams::default()).await?;

    let Some(candidate) = candidates.into_iter().next() else {
        error!("❌ No WalkingPad found");
        return Err(walkingpad::PadError::DeviceNotFound);
    };

    info!("✅ Found: {}", candidate.address);
    let (transport, notifications) = candidate.connect().await?;
    let driver = PadDriver::new(transport, notifications, None);

    // Wait for the first status report before issuing commands
    info!("⏳ Waiting for first status report...");
    while driver.latest_status().await.is_none() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    info!("▶️  Starting belt at 2.5 km/h");
    driver.start(2.5).await;
    tokio::time::sleep(Duration::from_secs(15)).await;

    info!("⏩ Increasing speed to 3.5 km/h");
    driver.change_speed(3.5).await;
    tokio::time::sleep(Duration::from_secs(15)).await;

    if let Some(status) = driver.latest_status().await {
        println!("\n📊 Current Status:");
        println!("  Speed:    {:.1} km/h", status.speed);
        println!("  Mode:     {}", status.mode);
        println!("  Distance: {:.2} km", status.distance_km);
        println!("  Steps:    {}", status.steps);
    }

    info!("⏹️  Stopping belt");
    driver.stop().await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    info!("🔌 Disconnecting...");
    driver.close().await;

    info!("🎉 Basic control completed!");
    Ok(())
}
