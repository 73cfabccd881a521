// Monitor type definitions
//
// Common types shared by the wire codec and the higher layers

use serde::{Deserialize, Serialize};

/// Addressable unit selectable per memory or register command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MemSpace {
    Main = 0x00,
    Drive8 = 0x01,
    Drive9 = 0x02,
    Drive10 = 0x03,
    Drive11 = 0x04,
}

impl Default for MemSpace {
    fn default() -> Self {
        MemSpace::Main
    }
}

/// Checkpoint trigger mask. Load, store and exec are combinable bit-flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuOperation(pub u8);

impl CpuOperation {
    pub const LOAD: CpuOperation = CpuOperation(0x01);
    pub const STORE: CpuOperation = CpuOperation(0x02);
    pub const EXEC: CpuOperation = CpuOperation(0x04);

    pub fn contains(self, other: CpuOperation) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CpuOperation {
    type Output = CpuOperation;

    fn bitor(self, rhs: CpuOperation) -> CpuOperation {
        CpuOperation(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResetMethod {
    Soft = 0x00,
    Hard = 0x01,
    Drive8 = 0x08,
    Drive9 = 0x09,
    Drive10 = 0x0a,
    Drive11 = 0x0b,
}

/// Pixel format for display captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DisplayFormat {
    Indexed8 = 0x00,
    Rgb = 0x01,
    Bgr = 0x02,
    Rgba = 0x03,
    Bgra = 0x04,
}

/// A monitor resource value: either a string or an integer of wire
/// width 1, 2 or 4 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceValue {
    String(String),
    Int(u32),
}

pub mod resource_kinds {
    pub const STRING: u8 = 0x00;
    pub const INT: u8 = 0x01;
}

/// Bank descriptor, enumerable metadata fetched once per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankMeta {
    pub id: u16,
    pub name: String,
}

/// Register descriptor. `size` is the register width in bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMeta {
    pub id: u8,
    pub size: u8,
    pub name: String,
}

/// A single register id/value pair as carried by register get/set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterValue {
    pub id: u8,
    pub value: u16,
}

/// Checkpoint state as reported by the emulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub id: u32,
    pub hit: bool,
    pub start_address: u16,
    pub end_address: u16,
    pub stop: bool,
    pub enabled: bool,
    pub operation: CpuOperation,
    pub temporary: bool,
    pub hit_count: u32,
    pub ignore_count: u32,
    pub has_condition: bool,
}

/// Local mirror of an emulator-assigned checkpoint. The id always comes
/// from the emulator's acknowledgement, never from this side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: u32,
    pub start_address: u16,
    pub end_address: u16,
    pub stop: bool,
    pub enabled: bool,
    pub operation: CpuOperation,
    pub temporary: bool,
    pub hit_count: u32,
    pub ignore_count: u32,
    pub has_condition: bool,
}

impl From<&CheckpointInfo> for Checkpoint {
    fn from(info: &CheckpointInfo) -> Self {
        Self {
            id: info.id,
            start_address: info.start_address,
            end_address: info.end_address,
            stop: info.stop,
            enabled: info.enabled,
            operation: info.operation,
            temporary: info.temporary,
            hit_count: info.hit_count,
            ignore_count: info.ignore_count,
            has_condition: info.has_condition,
        }
    }
}

/// A captured display frame: geometry plus the raw pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayBuffer {
    pub debug_width: u16,
    pub debug_height: u16,
    pub offset_x: u16,
    pub offset_y: u16,
    pub inner_width: u16,
    pub inner_height: u16,
    pub bpp: u8,
    pub pixels: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_mask_combines() {
        let op = CpuOperation::LOAD | CpuOperation::STORE;

        assert_eq!(op.0, 0x03);
        assert!(op.contains(CpuOperation::LOAD));
        assert!(op.contains(CpuOperation::STORE));
        assert!(!op.contains(CpuOperation::EXEC));
    }

    #[test]
    fn test_checkpoint_from_info() {
        let info = CheckpointInfo {
            id: 3,
            hit: true,
            start_address: 0x0810,
            end_address: 0x0812,
            stop: true,
            enabled: true,
            operation: CpuOperation::EXEC,
            temporary: false,
            hit_count: 1,
            ignore_count: 0,
            has_condition: false,
        };

        let checkpoint = Checkpoint::from(&info);
        assert_eq!(checkpoint.id, 3);
        assert_eq!(checkpoint.start_address, 0x0810);
        assert!(checkpoint.operation.contains(CpuOperation::EXEC));
    }
}
