// Monitor event handling
//
// Unsolicited notifications pushed by the emulator: execution state
// changes and checkpoint hits.

use crate::protocol::SENTINEL_REQUEST_ID;
use crate::response::{Response, ResponseBody};
use crate::types::CheckpointInfo;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
    /// Execution halted; the machine is in the monitor.
    Stopped { pc: u16 },
    /// Execution resumed.
    Resumed { pc: u16 },
    /// The CPU hit an illegal opcode and halted.
    Jam { pc: u16 },
    /// A checkpoint triggered. Arrives with the sentinel request id before
    /// the accompanying stop notification.
    CheckpointHit { info: CheckpointInfo },
    /// Anything else that was not a reply to an outstanding request.
    Unhandled { response: Response },
}

/// Classify a response that was not matched to a pending request.
pub fn classify_event(response: Response) -> MonitorEvent {
    match response.body {
        ResponseBody::Stopped { program_counter } => MonitorEvent::Stopped {
            pc: program_counter,
        },
        ResponseBody::Resumed { program_counter } => MonitorEvent::Resumed {
            pc: program_counter,
        },
        ResponseBody::Jam { program_counter } => MonitorEvent::Jam {
            pc: program_counter,
        },
        ResponseBody::CheckpointInfo(ref info) if response.request_id == SENTINEL_REQUEST_ID => {
            MonitorEvent::CheckpointHit { info: info.clone() }
        }
        _ => MonitorEvent::Unhandled { response },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CpuOperation;

    fn response(request_id: u32, body: ResponseBody) -> Response {
        Response {
            api_version: 2,
            error: 0,
            request_id,
            related: Vec::new(),
            body,
        }
    }

    #[test]
    fn test_classify_execution_events() {
        let stopped = classify_event(response(
            SENTINEL_REQUEST_ID,
            ResponseBody::Stopped { program_counter: 0x0810 },
        ));
        assert!(matches!(stopped, MonitorEvent::Stopped { pc: 0x0810 }));

        let resumed = classify_event(response(
            SENTINEL_REQUEST_ID,
            ResponseBody::Resumed { program_counter: 0x0812 },
        ));
        assert!(matches!(resumed, MonitorEvent::Resumed { pc: 0x0812 }));

        let jam = classify_event(response(
            SENTINEL_REQUEST_ID,
            ResponseBody::Jam { program_counter: 0xdead },
        ));
        assert!(matches!(jam, MonitorEvent::Jam { pc: 0xdead }));
    }

    #[test]
    fn test_sentinel_checkpoint_info_is_a_hit() {
        let info = CheckpointInfo {
            id: 4,
            hit: true,
            start_address: 0x0810,
            end_address: 0x0810,
            stop: true,
            enabled: true,
            operation: CpuOperation::EXEC,
            temporary: false,
            hit_count: 1,
            ignore_count: 0,
            has_condition: false,
        };

        let event = classify_event(response(
            SENTINEL_REQUEST_ID,
            ResponseBody::CheckpointInfo(info),
        ));
        match event {
            MonitorEvent::CheckpointHit { info } => assert_eq!(info.id, 4),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_non_sentinel_checkpoint_info_is_not_a_hit() {
        let info = CheckpointInfo {
            id: 4,
            hit: false,
            start_address: 0,
            end_address: 0,
            stop: false,
            enabled: true,
            operation: CpuOperation::LOAD,
            temporary: false,
            hit_count: 0,
            ignore_count: 0,
            has_condition: false,
        };

        // A checkpoint info reply that simply lost its waiter must not be
        // misreported as a hit.
        let event = classify_event(response(17, ResponseBody::CheckpointInfo(info)));
        assert!(matches!(event, MonitorEvent::Unhandled { .. }));
    }
}
