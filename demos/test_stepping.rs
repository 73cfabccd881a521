// Test stepping: into, over, and out of subroutines

use monitor_client::{EmulatorFamily, MonitorGrip, StopReason};

fn pc_of(reason: &StopReason) -> u16 {
    match reason {
        StopReason::Break { pc, .. } => *pc,
        StopReason::Jam { pc } => *pc,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("monitor_client=debug")
        .init();

    let grip = MonitorGrip::connect(EmulatorFamily::Vice, "localhost", 6502).await?;
    println!("✓ Connected to the monitor\n");

    println!("👣 Stepping one instruction at a time...");
    for _ in 0..5 {
        let reason = grip.step_into(1).await?;
        println!("   pc = {:#06x}", pc_of(&reason));
    }

    println!("\n👣 Stepping over the next subroutine call...");
    let reason = grip.step_over(1).await?;
    println!("   pc = {:#06x}", pc_of(&reason));

    println!("\n👣 Running until the current subroutine returns...");
    let reason = grip.step_out().await?;
    println!("   pc = {:#06x}", pc_of(&reason));

    println!("\n✅ Stepping test complete");
    Ok(())
}
