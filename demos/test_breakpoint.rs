// Test setting a breakpoint at the default BASIC start address

use monitor_client::{EmulatorFamily, MonitorGrip, StopReason};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("monitor_client=debug")
        .init();

    println!("🔧 Setting up breakpoint test...\n");

    let grip = MonitorGrip::connect(EmulatorFamily::Vice, "localhost", 6502).await?;
    println!("✓ Connected to the monitor\n");

    // Set breakpoint!
    println!("🎯 Setting breakpoint at $0810...");
    let checkpoint = grip.set_breakpoint(0x0810).await?;
    println!("✅ Breakpoint set! Checkpoint ID: {}", checkpoint.id);

    println!("\n▶️  Continuing execution, waiting for the hit...");

    match grip.resume_until_stop().await? {
        StopReason::Break { pc, checkpoint: cause } => {
            println!("🛑 Stopped at {:#06x}", pc);
            if let Some(cause) = cause {
                println!("   Caused by checkpoint {} ({} hits)", cause.id, cause.hit_count);
            }

            let memory = grip.read_memory(pc, pc + 15).await?;
            println!("   Next bytes: {:02x?}", memory);
        }
        StopReason::Jam { pc } => {
            println!("💥 CPU jammed at {:#06x}", pc);
        }
    }

    println!("\n🧹 Cleaning up...");
    grip.checkpoints().delete(checkpoint.id).await?;
    println!("✓ Breakpoint cleared");

    Ok(())
}
