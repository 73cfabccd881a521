// Execution control
//
// Continue and step commands plus the state machine fed by the monitor's
// stopped/resumed/jam notifications.

use crate::command::Command;
use crate::connection::MonitorConnection;
use crate::events::MonitorEvent;
use crate::protocol::{MonitorError, MonitorResult};
use crate::types::CheckpointInfo;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Into,
    Over,
    Out,
    Advance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    /// No event observed yet. Emulators commonly start stopped-on-entry,
    /// but the state is unknown until the first notification.
    Unknown,
    Running,
    Stopped,
    Stepping(StepKind),
    Jammed,
}

/// Why execution halted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StopReason {
    /// Ordinary stop: a checkpoint hit or an external pause. The
    /// triggering checkpoint is attached when its hit notification
    /// preceded the stop.
    Break {
        pc: u16,
        checkpoint: Option<CheckpointInfo>,
    },
    /// The CPU jammed on an illegal opcode. Distinct from an ordinary
    /// stop; the machine cannot continue from here.
    Jam { pc: u16 },
}

pub struct ExecutionControl {
    connection: MonitorConnection,
    state: Arc<Mutex<ExecutionState>>,
    // The monitor handles one control command at a time; holding this
    // across command-plus-wait keeps callers serialized.
    control: Mutex<()>,
}

impl ExecutionControl {
    pub fn new(connection: MonitorConnection) -> Self {
        let state = Arc::new(Mutex::new(ExecutionState::Unknown));

        let events = connection.subscribe();
        tokio::spawn(track_state(events, Arc::clone(&state)));

        Self {
            connection,
            state,
            control: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> ExecutionState {
        *self.state.lock().await
    }

    /// Resume execution. In this protocol "exit the monitor" is the
    /// continue operation. Returns once the monitor confirms with a
    /// resumed event; the eventual stop is observed via wait_for_stop.
    pub async fn resume(&self) -> MonitorResult<()> {
        let _guard = self.control.lock().await;
        let mut events = self.connection.subscribe();

        let response = self.connection.exec(&Command::Exit).await?;
        response.check_error()?;

        loop {
            match events.recv().await {
                Ok(MonitorEvent::Resumed { pc }) => {
                    debug!("Resumed at {:#06x}", pc);
                    return Ok(());
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Resume waiter lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(MonitorError::ConnectionClosed)
                }
            }
        }
    }

    /// Resume and block until the next stop. Subscribes before the
    /// continue command goes out, so a hit on a nearby checkpoint cannot
    /// slip between resuming and waiting.
    pub async fn resume_until_stop(&self) -> MonitorResult<StopReason> {
        let _guard = self.control.lock().await;
        let mut events = self.connection.subscribe();

        let response = self.connection.exec(&Command::Exit).await?;
        response.check_error()?;

        wait_stop_on(&mut events).await
    }

    /// Execute one or more instructions, stepping into subroutines
    pub async fn step_into(&self, count: u16) -> MonitorResult<StopReason> {
        self.step(
            StepKind::Into,
            Command::AdvanceInstructions {
                step_over_subroutines: false,
                count,
            },
        )
        .await
    }

    /// Execute one or more instructions, stepping over subroutine calls
    pub async fn step_over(&self, count: u16) -> MonitorResult<StopReason> {
        self.step(
            StepKind::Over,
            Command::AdvanceInstructions {
                step_over_subroutines: true,
                count,
            },
        )
        .await
    }

    /// Run until the current subroutine returns
    pub async fn step_out(&self) -> MonitorResult<StopReason> {
        self.step(StepKind::Out, Command::ExecuteUntilReturn).await
    }

    /// Advance a raw instruction count
    pub async fn advance_instructions(
        &self,
        step_over_subroutines: bool,
        count: u16,
    ) -> MonitorResult<StopReason> {
        self.step(
            StepKind::Advance,
            Command::AdvanceInstructions {
                step_over_subroutines,
                count,
            },
        )
        .await
    }

    async fn step(&self, kind: StepKind, command: Command) -> MonitorResult<StopReason> {
        let _guard = self.control.lock().await;

        // Subscribe before issuing the command so the stop cannot be missed.
        let mut events = self.connection.subscribe();

        *self.state.lock().await = ExecutionState::Stepping(kind);

        let response = self.connection.exec(&command).await?;
        response.check_error()?;

        wait_stop_on(&mut events).await
    }

    /// Block until the next stop, reporting its cause. Used after resume
    /// to observe checkpoint hits and external pauses.
    pub async fn wait_for_stop(&self) -> MonitorResult<StopReason> {
        if self.connection.is_closed() {
            return Err(MonitorError::ConnectionClosed);
        }

        let mut events = self.connection.subscribe();
        wait_stop_on(&mut events).await
    }
}

async fn wait_stop_on(
    events: &mut broadcast::Receiver<MonitorEvent>,
) -> MonitorResult<StopReason> {
    let mut last_hit: Option<CheckpointInfo> = None;

    loop {
        match events.recv().await {
            Ok(MonitorEvent::CheckpointHit { info }) => last_hit = Some(info),
            Ok(MonitorEvent::Stopped { pc }) => {
                return Ok(StopReason::Break {
                    pc,
                    checkpoint: last_hit,
                })
            }
            Ok(MonitorEvent::Jam { pc }) => return Ok(StopReason::Jam { pc }),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Stop waiter lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(MonitorError::ConnectionClosed)
            }
        }
    }
}

async fn track_state(
    mut events: broadcast::Receiver<MonitorEvent>,
    state: Arc<Mutex<ExecutionState>>,
) {
    loop {
        match events.recv().await {
            Ok(MonitorEvent::Stopped { .. }) => {
                *state.lock().await = ExecutionState::Stopped;
            }
            Ok(MonitorEvent::Resumed { .. }) => {
                let mut state = state.lock().await;
                // Stepping is cleared by the stop that completes the step,
                // not by the transient resume it causes.
                if !matches!(*state, ExecutionState::Stepping(_)) {
                    *state = ExecutionState::Running;
                }
            }
            Ok(MonitorEvent::Jam { .. }) => {
                *state.lock().await = ExecutionState::Jammed;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("State tracker lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
