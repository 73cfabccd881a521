// Binary monitor protocol definitions and frame handling
//
// Reference: https://vice-emu.sourceforge.io/vice_13.html

use bytes::{BufMut, BytesMut};
use thiserror::Error;

// The binary monitor uses little-endian for all multi-byte values,
// matching the 8-bit targets it debugs.

pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid monitor command: {0}")]
    InvalidCommand(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Monitor error code {0:#04x}: {1}")]
    ErrorCode(u8, String),

    #[error("Command not supported by this emulator family")]
    Unsupported,

    #[error("Connection closed")]
    ConnectionClosed,
}

// Frame structure (commands and responses share the header):
// start marker (1 byte) - always 0x02
// api version (1 byte)
// total length (4 bytes) - includes header
// command/response kind (1 byte)
// error code (1 byte) - zero on commands
// request id (4 bytes)
// body (variable)

pub const STX: u8 = 0x02;
pub const API_VERSION: u8 = 0x02;
pub const HEADER_SIZE: usize = 12;

/// Reserved request id carried by unsolicited notifications. Never
/// allocated to an outgoing command.
pub const SENTINEL_REQUEST_ID: u32 = 0xffff_ffff;

#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub api_version: u8,
    pub length: u32,
    pub kind: u8,
    pub error: u8,
    pub request_id: u32,
}

impl FrameHeader {
    pub fn parse(buf: &[u8]) -> MonitorResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(MonitorError::MalformedResponse(
                "frame shorter than header".to_string(),
            ));
        }

        if buf[0] != STX {
            return Err(MonitorError::Protocol(format!(
                "bad start marker: {:#04x}",
                buf[0]
            )));
        }

        Ok(Self {
            api_version: buf[1],
            length: u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]),
            kind: buf[6],
            error: buf[7],
            request_id: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

/// Wrap an encoded command body with the frame header.
pub fn encode_frame(kind: u8, request_id: u32, body: &[u8]) -> Vec<u8> {
    let length = HEADER_SIZE + body.len();
    let mut buf = BytesMut::with_capacity(length);

    buf.put_u8(STX);
    buf.put_u8(API_VERSION);
    buf.put_u32_le(length as u32);
    buf.put_u8(kind);
    buf.put_u8(0x00); // error byte unused on commands
    buf.put_u32_le(request_id);
    buf.put_slice(body);

    buf.to_vec()
}

pub fn error_message(code: u8) -> &'static str {
    match code {
        0x00 => "OK",
        0x01 => "OBJECT_MISSING",
        0x02 => "INVALID_MEMSPACE",
        0x80 => "INVALID_LENGTH",
        0x81 => "INVALID_PARAMETER",
        0x82 => "INVALID_API_VERSION",
        0x83 => "INVALID_COMMAND",
        0x84 => "GENERAL_FAILURE",
        _ => "UNKNOWN_ERROR",
    }
}
