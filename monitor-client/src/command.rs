// Monitor command definitions and body encoding
//
// Commands:
// 0x01-0x02 = memory
// 0x11-0x15, 0x22 = checkpoints
// 0x31-0x32 = registers
// 0x41-0x42 = dump/undump
// 0x51-0x52 = resources
// 0x71-0x73 = execution
// 0x81-0x84 = info/display
// 0xaa-0xdd = machine control

use crate::protocol::{MonitorError, MonitorResult};
use crate::types::{
    CpuOperation, DisplayFormat, MemSpace, RegisterValue, ResetMethod, ResourceValue,
    resource_kinds,
};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

// Command kind ids
pub mod command_kinds {
    pub const MEMORY_GET: u8 = 0x01;
    pub const MEMORY_SET: u8 = 0x02;
    pub const CHECKPOINT_GET: u8 = 0x11;
    pub const CHECKPOINT_SET: u8 = 0x12;
    pub const CHECKPOINT_DELETE: u8 = 0x13;
    pub const CHECKPOINT_LIST: u8 = 0x14;
    pub const CHECKPOINT_TOGGLE: u8 = 0x15;
    pub const CONDITION_SET: u8 = 0x22;
    pub const REGISTERS_GET: u8 = 0x31;
    pub const REGISTERS_SET: u8 = 0x32;
    pub const DUMP: u8 = 0x41;
    pub const UNDUMP: u8 = 0x42;
    pub const RESOURCE_GET: u8 = 0x51;
    pub const RESOURCE_SET: u8 = 0x52;
    pub const ADVANCE_INSTRUCTIONS: u8 = 0x71;
    pub const KEYBOARD_FEED: u8 = 0x72;
    pub const EXECUTE_UNTIL_RETURN: u8 = 0x73;
    pub const PING: u8 = 0x81;
    pub const BANKS_AVAILABLE: u8 = 0x82;
    pub const REGISTERS_AVAILABLE: u8 = 0x83;
    pub const DISPLAY_GET: u8 = 0x84;
    pub const EXIT: u8 = 0xaa;
    pub const QUIT: u8 = 0xbb;
    pub const RESET: u8 = 0xcc;
    pub const AUTOSTART: u8 = 0xdd;
}

// Response kind ids. Most mirror the command kinds; the rest are
// unsolicited notification kinds.
pub mod response_kinds {
    pub const MEMORY_GET: u8 = 0x01;
    pub const MEMORY_SET: u8 = 0x02;
    pub const CHECKPOINT_INFO: u8 = 0x11;
    pub const CHECKPOINT_DELETE: u8 = 0x13;
    pub const CHECKPOINT_LIST: u8 = 0x14;
    pub const CHECKPOINT_TOGGLE: u8 = 0x15;
    pub const CONDITION_SET: u8 = 0x22;
    pub const REGISTER_INFO: u8 = 0x31;
    pub const DUMP: u8 = 0x41;
    pub const UNDUMP: u8 = 0x42;
    pub const RESOURCE_GET: u8 = 0x51;
    pub const RESOURCE_SET: u8 = 0x52;
    pub const JAM: u8 = 0x61;
    pub const STOPPED: u8 = 0x62;
    pub const RESUMED: u8 = 0x63;
    pub const ADVANCE_INSTRUCTIONS: u8 = 0x71;
    pub const KEYBOARD_FEED: u8 = 0x72;
    pub const EXECUTE_UNTIL_RETURN: u8 = 0x73;
    pub const PING: u8 = 0x81;
    pub const BANKS_AVAILABLE: u8 = 0x82;
    pub const REGISTERS_AVAILABLE: u8 = 0x83;
    pub const DISPLAY_GET: u8 = 0x84;
    pub const EXIT: u8 = 0xaa;
    pub const QUIT: u8 = 0xbb;
    pub const RESET: u8 = 0xcc;
    pub const AUTOSTART: u8 = 0xdd;
}

/// A typed monitor command. Each variant carries exactly the fields its
/// wire layout needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    MemoryGet {
        side_effects: bool,
        start_address: u16,
        end_address: u16,
        memspace: MemSpace,
        bank_id: u16,
    },
    MemorySet {
        side_effects: bool,
        start_address: u16,
        end_address: u16,
        memspace: MemSpace,
        bank_id: u16,
        memory: Vec<u8>,
    },
    CheckpointGet {
        id: u32,
    },
    CheckpointSet {
        start_address: u16,
        end_address: u16,
        stop: bool,
        enabled: bool,
        operation: CpuOperation,
        temporary: bool,
    },
    CheckpointDelete {
        id: u32,
    },
    CheckpointList,
    CheckpointToggle {
        id: u32,
        enabled: bool,
    },
    ConditionSet {
        checkpoint_id: u32,
        condition: String,
    },
    RegistersGet,
    RegistersSet {
        registers: Vec<RegisterValue>,
    },
    Dump {
        save_roms: bool,
        save_disks: bool,
        filename: String,
    },
    Undump {
        filename: String,
    },
    ResourceGet {
        name: String,
    },
    ResourceSet {
        name: String,
        value: ResourceValue,
    },
    AdvanceInstructions {
        step_over_subroutines: bool,
        count: u16,
    },
    KeyboardFeed {
        text: String,
    },
    ExecuteUntilReturn,
    Ping,
    BanksAvailable,
    RegistersAvailable {
        memspace: MemSpace,
    },
    DisplayGet {
        use_vic_ii: bool,
        format: DisplayFormat,
    },
    Exit,
    Quit,
    Reset {
        method: ResetMethod,
    },
    Autostart {
        run: bool,
        index: u16,
        filename: String,
    },
}

impl Command {
    pub fn kind(&self) -> u8 {
        use command_kinds::*;

        match self {
            Command::MemoryGet { .. } => MEMORY_GET,
            Command::MemorySet { .. } => MEMORY_SET,
            Command::CheckpointGet { .. } => CHECKPOINT_GET,
            Command::CheckpointSet { .. } => CHECKPOINT_SET,
            Command::CheckpointDelete { .. } => CHECKPOINT_DELETE,
            Command::CheckpointList => CHECKPOINT_LIST,
            Command::CheckpointToggle { .. } => CHECKPOINT_TOGGLE,
            Command::ConditionSet { .. } => CONDITION_SET,
            Command::RegistersGet => REGISTERS_GET,
            Command::RegistersSet { .. } => REGISTERS_SET,
            Command::Dump { .. } => DUMP,
            Command::Undump { .. } => UNDUMP,
            Command::ResourceGet { .. } => RESOURCE_GET,
            Command::ResourceSet { .. } => RESOURCE_SET,
            Command::AdvanceInstructions { .. } => ADVANCE_INSTRUCTIONS,
            Command::KeyboardFeed { .. } => KEYBOARD_FEED,
            Command::ExecuteUntilReturn => EXECUTE_UNTIL_RETURN,
            Command::Ping => PING,
            Command::BanksAvailable => BANKS_AVAILABLE,
            Command::RegistersAvailable { .. } => REGISTERS_AVAILABLE,
            Command::DisplayGet { .. } => DISPLAY_GET,
            Command::Exit => EXIT,
            Command::Quit => QUIT,
            Command::Reset { .. } => RESET,
            Command::Autostart { .. } => AUTOSTART,
        }
    }

    /// The terminal response kind for commands that produce a sequence of
    /// responses before a final one. The connection engine collects every
    /// earlier response sharing the request id into the `related` list
    /// until this kind arrives.
    pub fn terminal_response_kind(&self) -> Option<u8> {
        match self {
            Command::CheckpointList => Some(response_kinds::CHECKPOINT_LIST),
            _ => None,
        }
    }

    /// Encode the command body. The connection engine prefixes the frame
    /// header.
    pub fn encode(&self) -> MonitorResult<Vec<u8>> {
        let mut buf = BytesMut::new();

        match self {
            Command::MemoryGet {
                side_effects,
                start_address,
                end_address,
                memspace,
                bank_id,
            } => {
                buf.put_u8(*side_effects as u8);
                buf.put_u16_le(*start_address);
                buf.put_u16_le(*end_address);
                buf.put_u8(*memspace as u8);
                buf.put_u16_le(*bank_id);
            }
            Command::MemorySet {
                side_effects,
                start_address,
                end_address,
                memspace,
                bank_id,
                memory,
            } => {
                buf.put_u8(*side_effects as u8);
                buf.put_u16_le(*start_address);
                buf.put_u16_le(*end_address);
                buf.put_u8(*memspace as u8);
                buf.put_u16_le(*bank_id);
                buf.put_slice(memory);
            }
            Command::CheckpointGet { id } => {
                buf.put_u32_le(*id);
            }
            Command::CheckpointSet {
                start_address,
                end_address,
                stop,
                enabled,
                operation,
                temporary,
            } => {
                buf.put_u16_le(*start_address);
                buf.put_u16_le(*end_address);
                buf.put_u8(*stop as u8);
                buf.put_u8(*enabled as u8);
                buf.put_u8(operation.0);
                buf.put_u8(*temporary as u8);
            }
            Command::CheckpointDelete { id } => {
                buf.put_u32_le(*id);
            }
            Command::CheckpointList => {}
            Command::CheckpointToggle { id, enabled } => {
                buf.put_u32_le(*id);
                buf.put_u8(*enabled as u8);
            }
            Command::ConditionSet {
                checkpoint_id,
                condition,
            } => {
                buf.put_u32_le(*checkpoint_id);
                put_string(&mut buf, condition)?;
            }
            Command::RegistersGet => {}
            Command::RegistersSet { registers } => {
                buf.put_u16_le(registers.len() as u16);
                for register in registers {
                    // item size byte, then id and value
                    buf.put_u8(3);
                    buf.put_u8(register.id);
                    buf.put_u16_le(register.value);
                }
            }
            Command::Dump {
                save_roms,
                save_disks,
                filename,
            } => {
                buf.put_u8(*save_roms as u8);
                buf.put_u8(*save_disks as u8);
                put_string(&mut buf, filename)?;
            }
            Command::Undump { filename } => {
                put_string(&mut buf, filename)?;
            }
            Command::ResourceGet { name } => {
                put_string(&mut buf, name)?;
            }
            Command::ResourceSet { name, value } => {
                match value {
                    ResourceValue::String(s) => {
                        buf.put_u8(resource_kinds::STRING);
                        put_string(&mut buf, name)?;
                        put_string(&mut buf, s)?;
                    }
                    ResourceValue::Int(v) => {
                        buf.put_u8(resource_kinds::INT);
                        put_string(&mut buf, name)?;
                        buf.put_u8(4);
                        buf.put_u32_le(*v);
                    }
                }
            }
            Command::AdvanceInstructions {
                step_over_subroutines,
                count,
            } => {
                buf.put_u8(*step_over_subroutines as u8);
                buf.put_u16_le(*count);
            }
            Command::KeyboardFeed { text } => {
                put_string(&mut buf, text)?;
            }
            Command::ExecuteUntilReturn => {}
            Command::Ping => {}
            Command::BanksAvailable => {}
            Command::RegistersAvailable { memspace } => {
                buf.put_u8(*memspace as u8);
            }
            Command::DisplayGet { use_vic_ii, format } => {
                buf.put_u8(*use_vic_ii as u8);
                buf.put_u8(*format as u8);
            }
            Command::Exit => {}
            Command::Quit => {}
            Command::Reset { method } => {
                buf.put_u8(*method as u8);
            }
            Command::Autostart {
                run,
                index,
                filename,
            } => {
                buf.put_u8(*run as u8);
                buf.put_u16_le(*index);
                put_string(&mut buf, filename)?;
            }
        }

        Ok(buf.to_vec())
    }
}

/// Write a length-prefixed ASCII string. Strings over 255 bytes cannot be
/// represented on the wire and are a caller error.
fn put_string(buf: &mut BytesMut, s: &str) -> MonitorResult<()> {
    if s.len() > u8::MAX as usize {
        return Err(MonitorError::InvalidCommand(format!(
            "string of {} bytes exceeds wire limit of 255",
            s.len()
        )));
    }
    if !s.is_ascii() {
        return Err(MonitorError::InvalidCommand(
            "monitor strings must be ASCII".to_string(),
        ));
    }

    buf.put_u8(s.len() as u8);
    buf.put_slice(s.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_get_layout() {
        let command = Command::MemoryGet {
            side_effects: false,
            start_address: 0x0810,
            end_address: 0x0820,
            memspace: MemSpace::Main,
            bank_id: 1,
        };

        let body = command.encode().unwrap();
        assert_eq!(body, vec![0, 0x10, 0x08, 0x20, 0x08, 0, 1, 0]);
        assert_eq!(command.kind(), 0x01);
    }

    #[test]
    fn test_memory_set_appends_payload() {
        let command = Command::MemorySet {
            side_effects: false,
            start_address: 0xc000,
            end_address: 0xc001,
            memspace: MemSpace::Main,
            bank_id: 0,
            memory: vec![0xa9, 0x00],
        };

        let body = command.encode().unwrap();
        assert_eq!(body.len(), 10);
        assert_eq!(&body[8..], &[0xa9, 0x00]);
    }

    #[test]
    fn test_checkpoint_set_layout() {
        let command = Command::CheckpointSet {
            start_address: 0x0810,
            end_address: 0x0810,
            stop: true,
            enabled: true,
            operation: CpuOperation::EXEC,
            temporary: false,
        };

        let body = command.encode().unwrap();
        assert_eq!(body, vec![0x10, 0x08, 0x10, 0x08, 1, 1, 0x04, 0]);
    }

    #[test]
    fn test_condition_set_string() {
        let command = Command::ConditionSet {
            checkpoint_id: 5,
            condition: "A == $20".to_string(),
        };

        let body = command.encode().unwrap();
        assert_eq!(&body[..4], &[5, 0, 0, 0]);
        assert_eq!(body[4], 8);
        assert_eq!(&body[5..], b"A == $20");
    }

    #[test]
    fn test_registers_set_items() {
        let command = Command::RegistersSet {
            registers: vec![
                RegisterValue { id: 3, value: 0x0810 },
                RegisterValue { id: 0, value: 0x00ff },
            ],
        };

        let body = command.encode().unwrap();
        assert_eq!(&body[..2], &[2, 0]);
        assert_eq!(&body[2..6], &[3, 3, 0x10, 0x08]);
        assert_eq!(&body[6..10], &[3, 0, 0xff, 0x00]);
    }

    #[test]
    fn test_resource_set_int() {
        let command = Command::ResourceSet {
            name: "VICIIBorderMode".to_string(),
            value: ResourceValue::Int(1),
        };

        let body = command.encode().unwrap();
        assert_eq!(body[0], resource_kinds::INT);
        assert_eq!(body[1], 15);
        assert_eq!(&body[2..17], b"VICIIBorderMode");
        assert_eq!(body[17], 4);
        assert_eq!(&body[18..], &[1, 0, 0, 0]);
    }

    #[test]
    fn test_display_get_layout() {
        let command = Command::DisplayGet {
            use_vic_ii: false,
            format: DisplayFormat::Rgba,
        };

        assert_eq!(command.encode().unwrap(), vec![0, 0x03]);
        assert_eq!(command.kind(), 0x84);
    }

    #[test]
    fn test_autostart_layout() {
        let command = Command::Autostart {
            run: true,
            index: 0,
            filename: "demo.prg".to_string(),
        };

        let body = command.encode().unwrap();
        assert_eq!(&body[..3], &[1, 0, 0]);
        assert_eq!(body[3], 8);
        assert_eq!(&body[4..], b"demo.prg");
    }

    #[test]
    fn test_empty_bodies() {
        for command in [
            Command::CheckpointList,
            Command::RegistersGet,
            Command::ExecuteUntilReturn,
            Command::Ping,
            Command::BanksAvailable,
            Command::Exit,
            Command::Quit,
        ] {
            assert!(command.encode().unwrap().is_empty());
        }
    }

    #[test]
    fn test_overlong_string_rejected() {
        let command = Command::KeyboardFeed {
            text: "x".repeat(300),
        };

        assert!(matches!(
            command.encode(),
            Err(MonitorError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_only_checkpoint_list_declares_terminal() {
        assert_eq!(
            Command::CheckpointList.terminal_response_kind(),
            Some(response_kinds::CHECKPOINT_LIST)
        );
        assert_eq!(Command::Ping.terminal_response_kind(), None);
        assert_eq!(
            Command::CheckpointSet {
                start_address: 0,
                end_address: 0,
                stop: true,
                enabled: true,
                operation: CpuOperation::EXEC,
                temporary: false,
            }
            .terminal_response_kind(),
            None
        );
    }
}
