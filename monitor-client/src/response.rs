// Monitor response decoding
//
// Branches on the kind byte of the frame header. Kinds the codec does not
// model decode to a passthrough variant carrying the raw body - a newer
// emulator must never break the engine merely by answering with something
// we do not recognize.

use crate::command::response_kinds;
use crate::protocol::{
    self, FrameHeader, MonitorError, MonitorResult, HEADER_SIZE, SENTINEL_REQUEST_ID,
};
use crate::reader::{read_bool, read_string, read_u16, read_u32, read_u8};
use crate::types::{
    BankMeta, CheckpointInfo, CpuOperation, DisplayBuffer, RegisterMeta, RegisterValue,
    ResourceValue, resource_kinds,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub api_version: u8,
    pub error: u8,
    pub request_id: u32,
    /// Earlier responses sharing this request id, in arrival order. Filled
    /// in by the connection engine for multi-response commands.
    pub related: Vec<Response>,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseBody {
    MemoryGet { memory: Vec<u8> },
    MemorySet,
    CheckpointInfo(CheckpointInfo),
    CheckpointDelete,
    CheckpointList { count: u32 },
    CheckpointToggle,
    ConditionSet,
    RegisterInfo { registers: Vec<RegisterValue> },
    Dump,
    Undump { program_counter: u16 },
    ResourceGet { value: ResourceValue },
    ResourceSet,
    Jam { program_counter: u16 },
    Stopped { program_counter: u16 },
    Resumed { program_counter: u16 },
    AdvanceInstructions,
    KeyboardFeed,
    ExecuteUntilReturn,
    Ping,
    BanksAvailable { banks: Vec<BankMeta> },
    RegistersAvailable { registers: Vec<RegisterMeta> },
    DisplayGet { display: DisplayBuffer },
    Exit,
    Quit,
    Reset,
    Autostart,
    Unknown { kind: u8, raw_body: Vec<u8> },
}

impl ResponseBody {
    pub fn kind(&self) -> u8 {
        use response_kinds::*;

        match self {
            ResponseBody::MemoryGet { .. } => MEMORY_GET,
            ResponseBody::MemorySet => MEMORY_SET,
            ResponseBody::CheckpointInfo(_) => CHECKPOINT_INFO,
            ResponseBody::CheckpointDelete => CHECKPOINT_DELETE,
            ResponseBody::CheckpointList { .. } => CHECKPOINT_LIST,
            ResponseBody::CheckpointToggle => CHECKPOINT_TOGGLE,
            ResponseBody::ConditionSet => CONDITION_SET,
            ResponseBody::RegisterInfo { .. } => REGISTER_INFO,
            ResponseBody::Dump => DUMP,
            ResponseBody::Undump { .. } => UNDUMP,
            ResponseBody::ResourceGet { .. } => RESOURCE_GET,
            ResponseBody::ResourceSet => RESOURCE_SET,
            ResponseBody::Jam { .. } => JAM,
            ResponseBody::Stopped { .. } => STOPPED,
            ResponseBody::Resumed { .. } => RESUMED,
            ResponseBody::AdvanceInstructions => ADVANCE_INSTRUCTIONS,
            ResponseBody::KeyboardFeed => KEYBOARD_FEED,
            ResponseBody::ExecuteUntilReturn => EXECUTE_UNTIL_RETURN,
            ResponseBody::Ping => PING,
            ResponseBody::BanksAvailable { .. } => BANKS_AVAILABLE,
            ResponseBody::RegistersAvailable { .. } => REGISTERS_AVAILABLE,
            ResponseBody::DisplayGet { .. } => DISPLAY_GET,
            ResponseBody::Exit => EXIT,
            ResponseBody::Quit => QUIT,
            ResponseBody::Reset => RESET,
            ResponseBody::Autostart => AUTOSTART,
            ResponseBody::Unknown { kind, .. } => *kind,
        }
    }
}

impl Response {
    pub fn kind(&self) -> u8 {
        self.body.kind()
    }

    /// True for notifications the emulator pushed on its own.
    pub fn is_unsolicited(&self) -> bool {
        self.request_id == SENTINEL_REQUEST_ID
    }

    pub fn is_error(&self) -> bool {
        self.error != 0
    }

    pub fn check_error(&self) -> MonitorResult<()> {
        if self.is_error() {
            Err(MonitorError::ErrorCode(
                self.error,
                protocol::error_message(self.error).to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Decode a complete response frame. `response_length` is the total frame
/// length declared by the header; the body is `buf[12..response_length]`.
pub fn decode_response(buf: &[u8], response_length: usize) -> MonitorResult<Response> {
    let header = FrameHeader::parse(buf)?;

    if response_length < HEADER_SIZE || response_length > buf.len() {
        return Err(MonitorError::MalformedResponse(format!(
            "response length {} out of range",
            response_length
        )));
    }

    let body = &buf[HEADER_SIZE..response_length];

    Ok(Response {
        api_version: header.api_version,
        error: header.error,
        request_id: header.request_id,
        related: Vec::new(),
        body: decode_body(header.kind, body)?,
    })
}

fn decode_body(kind: u8, body: &[u8]) -> MonitorResult<ResponseBody> {
    use response_kinds::*;

    let mut buf = body;

    let decoded = match kind {
        MEMORY_GET => {
            let len = read_u16(&mut buf)? as usize;
            if buf.len() < len {
                return Err(MonitorError::MalformedResponse(format!(
                    "memory payload truncated: declared {}, got {}",
                    len,
                    buf.len()
                )));
            }
            ResponseBody::MemoryGet {
                memory: buf[..len].to_vec(),
            }
        }
        MEMORY_SET => ResponseBody::MemorySet,
        CHECKPOINT_INFO => ResponseBody::CheckpointInfo(decode_checkpoint_info(&mut buf)?),
        CHECKPOINT_DELETE => ResponseBody::CheckpointDelete,
        CHECKPOINT_LIST => ResponseBody::CheckpointList {
            count: read_u32(&mut buf)?,
        },
        CHECKPOINT_TOGGLE => ResponseBody::CheckpointToggle,
        CONDITION_SET => ResponseBody::ConditionSet,
        REGISTER_INFO => {
            let mut registers = Vec::new();
            for mut item in iter_items(body)? {
                let id = read_u8(&mut item)?;
                let value = read_u16(&mut item)?;
                registers.push(RegisterValue { id, value });
            }
            ResponseBody::RegisterInfo { registers }
        }
        DUMP => ResponseBody::Dump,
        UNDUMP => ResponseBody::Undump {
            program_counter: read_u16(&mut buf)?,
        },
        RESOURCE_GET => ResponseBody::ResourceGet {
            value: decode_resource_value(&mut buf)?,
        },
        RESOURCE_SET => ResponseBody::ResourceSet,
        JAM => ResponseBody::Jam {
            program_counter: read_u16(&mut buf)?,
        },
        STOPPED => ResponseBody::Stopped {
            program_counter: read_u16(&mut buf)?,
        },
        RESUMED => ResponseBody::Resumed {
            program_counter: read_u16(&mut buf)?,
        },
        ADVANCE_INSTRUCTIONS => ResponseBody::AdvanceInstructions,
        KEYBOARD_FEED => ResponseBody::KeyboardFeed,
        EXECUTE_UNTIL_RETURN => ResponseBody::ExecuteUntilReturn,
        PING => ResponseBody::Ping,
        BANKS_AVAILABLE => {
            let mut banks = Vec::new();
            for mut item in iter_items(body)? {
                let id = read_u16(&mut item)?;
                let name = read_string(&mut item)?;
                banks.push(BankMeta { id, name });
            }
            ResponseBody::BanksAvailable { banks }
        }
        REGISTERS_AVAILABLE => {
            let mut registers = Vec::new();
            for mut item in iter_items(body)? {
                let id = read_u8(&mut item)?;
                let size = read_u8(&mut item)?;
                let name = read_string(&mut item)?;
                registers.push(RegisterMeta { id, size, name });
            }
            ResponseBody::RegistersAvailable { registers }
        }
        DISPLAY_GET => ResponseBody::DisplayGet {
            display: decode_display(body)?,
        },
        EXIT => ResponseBody::Exit,
        QUIT => ResponseBody::Quit,
        RESET => ResponseBody::Reset,
        AUTOSTART => ResponseBody::Autostart,
        _ => ResponseBody::Unknown {
            kind,
            raw_body: body.to_vec(),
        },
    };

    Ok(decoded)
}

// Fixed 22-byte layout.
fn decode_checkpoint_info(buf: &mut &[u8]) -> MonitorResult<CheckpointInfo> {
    Ok(CheckpointInfo {
        id: read_u32(buf)?,
        hit: read_bool(buf)?,
        start_address: read_u16(buf)?,
        end_address: read_u16(buf)?,
        stop: read_bool(buf)?,
        enabled: read_bool(buf)?,
        operation: CpuOperation(read_u8(buf)?),
        temporary: read_bool(buf)?,
        hit_count: read_u32(buf)?,
        ignore_count: read_u32(buf)?,
        has_condition: read_bool(buf)?,
    })
}

fn decode_resource_value(buf: &mut &[u8]) -> MonitorResult<ResourceValue> {
    let kind = read_u8(buf)?;
    let len = read_u8(buf)? as usize;

    match kind {
        resource_kinds::INT => {
            let value = match len {
                1 => read_u8(buf)? as u32,
                2 => read_u16(buf)? as u32,
                4 => read_u32(buf)?,
                other => {
                    return Err(MonitorError::MalformedResponse(format!(
                        "invalid integer resource width: {}",
                        other
                    )))
                }
            };
            Ok(ResourceValue::Int(value))
        }
        resource_kinds::STRING => {
            if buf.len() < len {
                return Err(MonitorError::MalformedResponse(
                    "string resource truncated".to_string(),
                ));
            }
            let value = String::from_utf8(buf[..len].to_vec()).map_err(|e| {
                MonitorError::MalformedResponse(format!("invalid string resource: {}", e))
            })?;
            Ok(ResourceValue::String(value))
        }
        other => Err(MonitorError::MalformedResponse(format!(
            "unrecognized resource kind: {:#04x}",
            other
        ))),
    }
}

// Variable-count bodies: a leading u16 count (informational only), then a
// sequence of self-describing items. The first byte of each item is the
// number of bytes that follow it, so the cursor advances past trailing
// fields this decoder does not know about without desynchronizing.
fn iter_items<'a>(body: &'a [u8]) -> MonitorResult<Vec<&'a [u8]>> {
    let mut buf = body;
    let _count = read_u16(&mut buf)?;

    let mut items = Vec::new();
    let mut cursor = 2usize;
    while cursor < body.len() {
        let item_size = body[cursor] as usize;
        let end = cursor + 1 + item_size;
        if end > body.len() {
            return Err(MonitorError::MalformedResponse(format!(
                "item of {} bytes at offset {} overruns body of {} bytes",
                item_size,
                cursor,
                body.len()
            )));
        }
        items.push(&body[cursor + 1..end]);
        cursor = end;
    }

    Ok(items)
}

// Geometry lives at fixed offsets; everything past the declared metadata
// length is the raw pixel buffer.
fn decode_display(body: &[u8]) -> MonitorResult<DisplayBuffer> {
    let metadata_len = u32_at(body, 4)? as usize;

    let pixels_start = 12 + metadata_len;
    if pixels_start > body.len() {
        return Err(MonitorError::MalformedResponse(format!(
            "display metadata of {} bytes overruns body of {} bytes",
            metadata_len,
            body.len()
        )));
    }

    Ok(DisplayBuffer {
        debug_width: u16_at(body, 12)?,
        debug_height: u16_at(body, 14)?,
        offset_x: u16_at(body, 16)?,
        offset_y: u16_at(body, 18)?,
        inner_width: u16_at(body, 20)?,
        inner_height: u16_at(body, 22)?,
        bpp: u8_at(body, 24)?,
        pixels: body[pixels_start..].to_vec(),
    })
}

fn u8_at(body: &[u8], offset: usize) -> MonitorResult<u8> {
    body.get(offset).copied().ok_or_else(|| {
        MonitorError::MalformedResponse(format!("body too short for u8 at offset {}", offset))
    })
}

fn u16_at(body: &[u8], offset: usize) -> MonitorResult<u16> {
    if body.len() < offset + 2 {
        return Err(MonitorError::MalformedResponse(format!(
            "body too short for u16 at offset {}",
            offset
        )));
    }
    Ok(u16::from_le_bytes([body[offset], body[offset + 1]]))
}

fn u32_at(body: &[u8], offset: usize) -> MonitorResult<u32> {
    if body.len() < offset + 4 {
        return Err(MonitorError::MalformedResponse(format!(
            "body too short for u32 at offset {}",
            offset
        )));
    }
    Ok(u32::from_le_bytes([
        body[offset],
        body[offset + 1],
        body[offset + 2],
        body[offset + 3],
    ]))
}
