// Capture the current display frame and dump the raw pixels to a file

use monitor_client::{DisplayFormat, EmulatorFamily, MonitorGrip};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("monitor_client=debug")
        .init();

    let grip = MonitorGrip::connect(EmulatorFamily::Vice, "localhost", 6502).await?;
    println!("✓ Connected to the monitor\n");

    println!("📸 Capturing display...");
    let display = grip.display_get(DisplayFormat::Rgba).await?;

    println!("✓ Frame captured:");
    println!("   debug area: {}x{}", display.debug_width, display.debug_height);
    println!(
        "   inner area: {}x{} at ({}, {})",
        display.inner_width, display.inner_height, display.offset_x, display.offset_y
    );
    println!("   {} bpp, {} pixel bytes", display.bpp, display.pixels.len());

    let path = std::env::temp_dir().join("monitor-display.raw");
    std::fs::write(&path, &display.pixels)?;
    println!("\n💾 Raw pixels written to {}", path.display());

    Ok(())
}
