// Helper functions for reading monitor data types from response bodies

use crate::protocol::{MonitorError, MonitorResult};
use bytes::Buf;

/// Read a monitor string (1-byte length prefix + ASCII bytes)
pub fn read_string(buf: &mut &[u8]) -> MonitorResult<String> {
    let len = read_u8(buf)? as usize;

    if buf.remaining() < len {
        return Err(MonitorError::MalformedResponse(format!(
            "not enough data for string: expected {}, got {}",
            len,
            buf.remaining()
        )));
    }

    let bytes = &buf[..len];
    buf.advance(len);

    String::from_utf8(bytes.to_vec())
        .map_err(|e| MonitorError::MalformedResponse(format!("invalid string bytes: {}", e)))
}

/// Read a u8
pub fn read_u8(buf: &mut &[u8]) -> MonitorResult<u8> {
    if buf.remaining() < 1 {
        return Err(MonitorError::MalformedResponse(
            "not enough data for u8".to_string(),
        ));
    }
    Ok(buf.get_u8())
}

/// Read a bool encoded as a single byte (0/1)
pub fn read_bool(buf: &mut &[u8]) -> MonitorResult<bool> {
    Ok(read_u8(buf)? != 0)
}

/// Read a little-endian u16
pub fn read_u16(buf: &mut &[u8]) -> MonitorResult<u16> {
    if buf.remaining() < 2 {
        return Err(MonitorError::MalformedResponse(
            "not enough data for u16".to_string(),
        ));
    }
    Ok(buf.get_u16_le())
}

/// Read a little-endian u32
pub fn read_u32(buf: &mut &[u8]) -> MonitorResult<u32> {
    if buf.remaining() < 4 {
        return Err(MonitorError::MalformedResponse(
            "not enough data for u32".to_string(),
        ));
    }
    Ok(buf.get_u32_le())
}
