// Emulator grips
//
// Per-family façade composing the connection, checkpoint manager and
// execution control behind one capability set. Families differ in which
// commands their monitor implements and which display chip is captured;
// protocol handling is identical.

use crate::checkpoint::CheckpointManager;
use crate::command::{command_kinds, Command};
use crate::connection::MonitorConnection;
use crate::execution::{ExecutionControl, StopReason};
use crate::protocol::{MonitorError, MonitorResult};
use crate::response::{Response, ResponseBody};
use crate::types::{
    BankMeta, Checkpoint, CpuOperation, DisplayBuffer, DisplayFormat, MemSpace, RegisterMeta,
    RegisterValue, ResetMethod, ResourceValue,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmulatorFamily {
    Vice,
    Mesen,
}

impl EmulatorFamily {
    /// Whether this family's monitor implements a command. The Mesen
    /// bridge speaks the same protocol through its script host but leaves
    /// out the machine-state snapshot and resource plumbing.
    pub fn supports(&self, kind: u8) -> bool {
        match self {
            EmulatorFamily::Vice => true,
            EmulatorFamily::Mesen => !matches!(
                kind,
                command_kinds::DUMP
                    | command_kinds::UNDUMP
                    | command_kinds::RESOURCE_GET
                    | command_kinds::RESOURCE_SET
                    | command_kinds::KEYBOARD_FEED
                    | command_kinds::AUTOSTART
            ),
        }
    }

    fn uses_vic_ii(&self) -> bool {
        matches!(self, EmulatorFamily::Vice)
    }
}

pub struct MonitorGrip {
    family: EmulatorFamily,
    connection: MonitorConnection,
    checkpoints: CheckpointManager,
    execution: ExecutionControl,
    // Enumerable metadata, fetched once per connection
    banks: Mutex<Option<Vec<BankMeta>>>,
    register_meta: Mutex<Option<Vec<RegisterMeta>>>,
}

impl MonitorGrip {
    /// Connect to an emulator's binary monitor port. Launching the
    /// emulator process itself is the launcher's job.
    pub async fn connect(family: EmulatorFamily, host: &str, port: u16) -> MonitorResult<Self> {
        let connection = MonitorConnection::connect(host, port).await?;
        Ok(Self::with_connection(family, connection))
    }

    pub fn with_connection(family: EmulatorFamily, connection: MonitorConnection) -> Self {
        info!("Attaching {:?} grip", family);

        let checkpoints = CheckpointManager::new(connection.clone());
        let execution = ExecutionControl::new(connection.clone());

        Self {
            family,
            connection,
            checkpoints,
            execution,
            banks: Mutex::new(None),
            register_meta: Mutex::new(None),
        }
    }

    pub fn family(&self) -> EmulatorFamily {
        self.family
    }

    pub fn connection(&self) -> &MonitorConnection {
        &self.connection
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn execution(&self) -> &ExecutionControl {
        &self.execution
    }

    /// Raw command passthrough, gated on the family's capability set
    pub async fn exec(&self, command: &Command) -> MonitorResult<Response> {
        if !self.family.supports(command.kind()) {
            return Err(MonitorError::Unsupported);
        }
        self.connection.exec(command).await
    }

    pub async fn ping(&self) -> MonitorResult<()> {
        let response = self.exec(&Command::Ping).await?;
        response.check_error()
    }

    /// Set an execution breakpoint at a single address
    pub async fn set_breakpoint(&self, address: u16) -> MonitorResult<Checkpoint> {
        self.checkpoints
            .set(address, address, true, true, CpuOperation::EXEC, false)
            .await
    }

    pub async fn resume(&self) -> MonitorResult<()> {
        self.execution.resume().await
    }

    pub async fn resume_until_stop(&self) -> MonitorResult<StopReason> {
        self.execution.resume_until_stop().await
    }

    pub async fn step_into(&self, count: u16) -> MonitorResult<StopReason> {
        self.execution.step_into(count).await
    }

    pub async fn step_over(&self, count: u16) -> MonitorResult<StopReason> {
        self.execution.step_over(count).await
    }

    pub async fn step_out(&self) -> MonitorResult<StopReason> {
        self.execution.step_out().await
    }

    pub async fn wait_for_stop(&self) -> MonitorResult<StopReason> {
        self.execution.wait_for_stop().await
    }

    /// Read main memory without side effects
    pub async fn read_memory(&self, start_address: u16, end_address: u16) -> MonitorResult<Vec<u8>> {
        self.read_memory_in(start_address, end_address, MemSpace::Main, 0)
            .await
    }

    pub async fn read_memory_in(
        &self,
        start_address: u16,
        end_address: u16,
        memspace: MemSpace,
        bank_id: u16,
    ) -> MonitorResult<Vec<u8>> {
        let response = self
            .exec(&Command::MemoryGet {
                side_effects: false,
                start_address,
                end_address,
                memspace,
                bank_id,
            })
            .await?;
        response.check_error()?;

        match response.body {
            ResponseBody::MemoryGet { memory } => Ok(memory),
            other => Err(unexpected_kind("memory get", &other)),
        }
    }

    /// Write main memory without side effects
    pub async fn write_memory(&self, start_address: u16, data: &[u8]) -> MonitorResult<()> {
        if data.is_empty() {
            return Err(MonitorError::InvalidCommand(
                "cannot write zero bytes".to_string(),
            ));
        }

        let end_address = start_address + (data.len() as u16 - 1);
        let response = self
            .exec(&Command::MemorySet {
                side_effects: false,
                start_address,
                end_address,
                memspace: MemSpace::Main,
                bank_id: 0,
                memory: data.to_vec(),
            })
            .await?;
        response.check_error()
    }

    pub async fn get_registers(&self) -> MonitorResult<Vec<RegisterValue>> {
        let response = self.exec(&Command::RegistersGet).await?;
        response.check_error()?;

        match response.body {
            ResponseBody::RegisterInfo { registers } => Ok(registers),
            other => Err(unexpected_kind("registers get", &other)),
        }
    }

    pub async fn set_registers(&self, registers: Vec<RegisterValue>) -> MonitorResult<()> {
        let response = self.exec(&Command::RegistersSet { registers }).await?;
        response.check_error()
    }

    /// Register descriptors, fetched once and cached for the connection
    pub async fn available_registers(&self) -> MonitorResult<Vec<RegisterMeta>> {
        let mut cache = self.register_meta.lock().await;
        if let Some(meta) = cache.as_ref() {
            return Ok(meta.clone());
        }

        let response = self
            .exec(&Command::RegistersAvailable {
                memspace: MemSpace::Main,
            })
            .await?;
        response.check_error()?;

        match response.body {
            ResponseBody::RegistersAvailable { registers } => {
                *cache = Some(registers.clone());
                Ok(registers)
            }
            other => Err(unexpected_kind("registers available", &other)),
        }
    }

    /// Bank descriptors, fetched once and cached for the connection
    pub async fn available_banks(&self) -> MonitorResult<Vec<BankMeta>> {
        let mut cache = self.banks.lock().await;
        if let Some(banks) = cache.as_ref() {
            return Ok(banks.clone());
        }

        let response = self.exec(&Command::BanksAvailable).await?;
        response.check_error()?;

        match response.body {
            ResponseBody::BanksAvailable { banks } => {
                *cache = Some(banks.clone());
                Ok(banks)
            }
            other => Err(unexpected_kind("banks available", &other)),
        }
    }

    /// Capture the current display frame. VICE machines capture the
    /// VIC-II output; everything else uses the default chip.
    pub async fn display_get(&self, format: DisplayFormat) -> MonitorResult<DisplayBuffer> {
        let response = self
            .exec(&Command::DisplayGet {
                use_vic_ii: self.family.uses_vic_ii(),
                format,
            })
            .await?;
        response.check_error()?;

        match response.body {
            ResponseBody::DisplayGet { display } => Ok(display),
            other => Err(unexpected_kind("display get", &other)),
        }
    }

    pub async fn reset(&self, method: ResetMethod) -> MonitorResult<()> {
        let response = self.exec(&Command::Reset { method }).await?;
        response.check_error()
    }

    pub async fn autostart(&self, run: bool, index: u16, filename: &str) -> MonitorResult<()> {
        let response = self
            .exec(&Command::Autostart {
                run,
                index,
                filename: filename.to_string(),
            })
            .await?;
        response.check_error()
    }

    pub async fn keyboard_feed(&self, text: &str) -> MonitorResult<()> {
        let response = self
            .exec(&Command::KeyboardFeed {
                text: text.to_string(),
            })
            .await?;
        response.check_error()
    }

    pub async fn resource_get(&self, name: &str) -> MonitorResult<ResourceValue> {
        let response = self
            .exec(&Command::ResourceGet {
                name: name.to_string(),
            })
            .await?;
        response.check_error()?;

        match response.body {
            ResponseBody::ResourceGet { value } => Ok(value),
            other => Err(unexpected_kind("resource get", &other)),
        }
    }

    pub async fn resource_set(&self, name: &str, value: ResourceValue) -> MonitorResult<()> {
        let response = self
            .exec(&Command::ResourceSet {
                name: name.to_string(),
                value,
            })
            .await?;
        response.check_error()
    }

    /// Shut the emulator down
    pub async fn quit(&self) -> MonitorResult<()> {
        let response = self.exec(&Command::Quit).await?;
        response.check_error()
    }
}

fn unexpected_kind(operation: &str, body: &ResponseBody) -> MonitorError {
    MonitorError::Protocol(format!(
        "{} answered with kind {:#04x}",
        operation,
        body.kind()
    ))
}
