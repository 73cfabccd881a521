// Binary monitor client library for VICE and Mesen emulators
//
// Implements the binary monitor protocol used for machine-level debugging:
// - Wire codec for typed commands and responses
// - Connection management with request correlation
// - Checkpoint (breakpoint/watchpoint) tracking
// - Execution control (continue, stepping, jam detection)
// - Display capture and register/bank inspection

pub mod checkpoint;
pub mod command;
pub mod connection;
pub mod eventloop;
pub mod events;
pub mod execution;
pub mod grip;
pub mod protocol;
pub mod reader;
pub mod response;
pub mod types;

pub use checkpoint::CheckpointManager;
pub use command::Command;
pub use connection::MonitorConnection;
pub use events::MonitorEvent;
pub use execution::{ExecutionControl, ExecutionState, StepKind, StopReason};
pub use grip::{EmulatorFamily, MonitorGrip};
pub use protocol::{MonitorError, MonitorResult};
pub use response::{decode_response, Response, ResponseBody};
pub use types::{
    BankMeta, Checkpoint, CheckpointInfo, CpuOperation, DisplayBuffer, DisplayFormat, MemSpace,
    RegisterMeta, RegisterValue, ResetMethod, ResourceValue,
};
