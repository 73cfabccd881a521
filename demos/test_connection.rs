// Smoke-test a live monitor connection: ping, bank and register metadata

use monitor_client::{EmulatorFamily, MonitorGrip};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("monitor_client=debug")
        .init();

    println!("🔌 Connecting to the binary monitor...\n");

    let grip = MonitorGrip::connect(EmulatorFamily::Vice, "localhost", 6502).await?;
    grip.ping().await?;
    println!("✓ Monitor answered the ping\n");

    let banks = grip.available_banks().await?;
    println!("✓ {} memory banks:", banks.len());
    for bank in &banks {
        println!("   [{}] {}", bank.id, bank.name);
    }

    let meta = grip.available_registers().await?;
    let values = grip.get_registers().await?;
    println!("\n✓ Registers:");
    for value in &values {
        let name = meta
            .iter()
            .find(|m| m.id == value.id)
            .map(|m| m.name.as_str())
            .unwrap_or("?");
        println!("   {:4} = {:#06x}", name, value.value);
    }

    Ok(())
}
