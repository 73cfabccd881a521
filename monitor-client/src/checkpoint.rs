// Checkpoint management
//
// Issues checkpoint commands and mirrors the emulator-assigned records.
// The emulator owns checkpoint ids; this side never invents one.

use crate::command::Command;
use crate::connection::MonitorConnection;
use crate::events::MonitorEvent;
use crate::protocol::{MonitorError, MonitorResult};
use crate::response::ResponseBody;
use crate::types::{Checkpoint, CpuOperation};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

pub struct CheckpointManager {
    connection: MonitorConnection,
    mirror: Arc<Mutex<HashMap<u32, Checkpoint>>>,
}

impl CheckpointManager {
    pub fn new(connection: MonitorConnection) -> Self {
        let mirror = Arc::new(Mutex::new(HashMap::new()));

        // Keep the mirror current on checkpoint hits: hit counts advance,
        // temporary checkpoints self-delete after one hit.
        let events = connection.subscribe();
        tokio::spawn(track_hits(events, Arc::clone(&mirror)));

        Self { connection, mirror }
    }

    /// Set a checkpoint. The returned record carries the id assigned by
    /// the emulator's acknowledgement.
    pub async fn set(
        &self,
        start_address: u16,
        end_address: u16,
        stop: bool,
        enabled: bool,
        operation: CpuOperation,
        temporary: bool,
    ) -> MonitorResult<Checkpoint> {
        let response = self
            .connection
            .exec(&Command::CheckpointSet {
                start_address,
                end_address,
                stop,
                enabled,
                operation,
                temporary,
            })
            .await?;
        response.check_error()?;

        let checkpoint = match &response.body {
            ResponseBody::CheckpointInfo(info) => Checkpoint::from(info),
            other => {
                return Err(MonitorError::Protocol(format!(
                    "checkpoint set acknowledged with kind {:#04x}",
                    other.kind()
                )))
            }
        };

        debug!(
            "Checkpoint {} set at {:#06x}-{:#06x}",
            checkpoint.id, checkpoint.start_address, checkpoint.end_address
        );

        let mut mirror = self.mirror.lock().await;
        mirror.insert(checkpoint.id, checkpoint.clone());

        Ok(checkpoint)
    }

    /// Fetch one checkpoint's current state from the emulator
    pub async fn get(&self, id: u32) -> MonitorResult<Checkpoint> {
        let response = self.connection.exec(&Command::CheckpointGet { id }).await?;
        response.check_error()?;

        let checkpoint = match &response.body {
            ResponseBody::CheckpointInfo(info) => Checkpoint::from(info),
            other => {
                return Err(MonitorError::Protocol(format!(
                    "checkpoint get answered with kind {:#04x}",
                    other.kind()
                )))
            }
        };

        let mut mirror = self.mirror.lock().await;
        mirror.insert(checkpoint.id, checkpoint.clone());

        Ok(checkpoint)
    }

    pub async fn delete(&self, id: u32) -> MonitorResult<()> {
        let response = self
            .connection
            .exec(&Command::CheckpointDelete { id })
            .await?;
        response.check_error()?;

        self.mirror.lock().await.remove(&id);
        Ok(())
    }

    /// List all checkpoints in the emulator's listing order. The terminal
    /// response's declared count must agree with the number of collected
    /// entries; a mismatch is a protocol inconsistency, not something to
    /// paper over.
    pub async fn list(&self) -> MonitorResult<Vec<Checkpoint>> {
        let response = self.connection.exec(&Command::CheckpointList).await?;
        response.check_error()?;

        let declared = match response.body {
            ResponseBody::CheckpointList { count } => count,
            ref other => {
                return Err(MonitorError::Protocol(format!(
                    "checkpoint list answered with kind {:#04x}",
                    other.kind()
                )))
            }
        };

        let mut checkpoints = Vec::with_capacity(response.related.len());
        for related in &response.related {
            match &related.body {
                ResponseBody::CheckpointInfo(info) => checkpoints.push(Checkpoint::from(info)),
                other => {
                    return Err(MonitorError::Protocol(format!(
                        "checkpoint list interleaved with kind {:#04x}",
                        other.kind()
                    )))
                }
            }
        }

        if declared as usize != checkpoints.len() {
            return Err(MonitorError::Protocol(format!(
                "checkpoint list declared {} entries but delivered {}",
                declared,
                checkpoints.len()
            )));
        }

        let mut mirror = self.mirror.lock().await;
        mirror.clear();
        for checkpoint in &checkpoints {
            mirror.insert(checkpoint.id, checkpoint.clone());
        }

        Ok(checkpoints)
    }

    pub async fn toggle(&self, id: u32, enabled: bool) -> MonitorResult<()> {
        let response = self
            .connection
            .exec(&Command::CheckpointToggle { id, enabled })
            .await?;
        response.check_error()?;

        if let Some(checkpoint) = self.mirror.lock().await.get_mut(&id) {
            checkpoint.enabled = enabled;
        }
        Ok(())
    }

    /// Attach a condition expression to a checkpoint
    pub async fn set_condition(&self, id: u32, condition: &str) -> MonitorResult<()> {
        let response = self
            .connection
            .exec(&Command::ConditionSet {
                checkpoint_id: id,
                condition: condition.to_string(),
            })
            .await?;
        response.check_error()?;

        if let Some(checkpoint) = self.mirror.lock().await.get_mut(&id) {
            checkpoint.has_condition = true;
        }
        Ok(())
    }

    /// The locally mirrored record, if any
    pub async fn cached(&self, id: u32) -> Option<Checkpoint> {
        self.mirror.lock().await.get(&id).cloned()
    }
}

async fn track_hits(
    mut events: broadcast::Receiver<MonitorEvent>,
    mirror: Arc<Mutex<HashMap<u32, Checkpoint>>>,
) {
    loop {
        match events.recv().await {
            Ok(MonitorEvent::CheckpointHit { info }) => {
                let mut mirror = mirror.lock().await;
                if info.temporary {
                    debug!("Temporary checkpoint {} hit, dropping mirror entry", info.id);
                    mirror.remove(&info.id);
                } else if let Some(checkpoint) = mirror.get_mut(&info.id) {
                    checkpoint.hit_count = info.hit_count;
                    checkpoint.ignore_count = info.ignore_count;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Checkpoint hit tracker lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{command_kinds, response_kinds};
    use crate::protocol::{encode_frame, FrameHeader, HEADER_SIZE, SENTINEL_REQUEST_ID};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

    fn make_frame(kind: u8, request_id: u32, body: &[u8]) -> Vec<u8> {
        encode_frame(kind, request_id, body)
    }

    fn info_body(id: u32, start: u16, temporary: bool, hit: bool, hit_count: u32) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&id.to_le_bytes());
        body.push(hit as u8);
        body.extend_from_slice(&start.to_le_bytes());
        body.extend_from_slice(&start.to_le_bytes());
        body.push(1); // stop
        body.push(1); // enabled
        body.push(0x04); // exec
        body.push(temporary as u8);
        body.extend_from_slice(&hit_count.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(0); // has condition
        body
    }

    async fn read_command(io: &mut (impl AsyncRead + Unpin)) -> (u8, u32, Vec<u8>) {
        let mut header = [0u8; HEADER_SIZE];
        io.read_exact(&mut header).await.unwrap();
        let parsed = FrameHeader::parse(&header).unwrap();

        let mut body = vec![0u8; parsed.length as usize - HEADER_SIZE];
        io.read_exact(&mut body).await.unwrap();

        (parsed.kind, parsed.request_id, body)
    }

    fn manager() -> (CheckpointManager, tokio::io::DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        let (reader, writer) = tokio::io::split(client);
        let connection = MonitorConnection::attach(reader, writer);
        (CheckpointManager::new(connection), server)
    }

    #[tokio::test]
    async fn test_set_uses_emulator_assigned_id() {
        let (manager, mut server) = manager();

        let driver = async {
            let (kind, request_id, body) = read_command(&mut server).await;
            assert_eq!(kind, command_kinds::CHECKPOINT_SET);
            assert_eq!(body, vec![0x10, 0x08, 0x10, 0x08, 1, 1, 0x04, 0]);

            server
                .write_all(&make_frame(
                    response_kinds::CHECKPOINT_INFO,
                    request_id,
                    &info_body(42, 0x0810, false, false, 0),
                ))
                .await
                .unwrap();
        };

        let (checkpoint, _) = tokio::join!(
            manager.set(0x0810, 0x0810, true, true, CpuOperation::EXEC, false),
            driver
        );

        let checkpoint = checkpoint.unwrap();
        assert_eq!(checkpoint.id, 42);
        assert_eq!(manager.cached(42).await.unwrap().start_address, 0x0810);
    }

    #[tokio::test]
    async fn test_list_preserves_emulator_order() {
        let (manager, mut server) = manager();

        let driver = async {
            let (kind, request_id, _) = read_command(&mut server).await;
            assert_eq!(kind, command_kinds::CHECKPOINT_LIST);

            // listing order is the emulator's, not sorted
            for id in [5u32, 3] {
                server
                    .write_all(&make_frame(
                        response_kinds::CHECKPOINT_INFO,
                        request_id,
                        &info_body(id, 0x1000, false, false, 0),
                    ))
                    .await
                    .unwrap();
            }
            server
                .write_all(&make_frame(
                    response_kinds::CHECKPOINT_LIST,
                    request_id,
                    &2u32.to_le_bytes(),
                ))
                .await
                .unwrap();
        };

        let (checkpoints, _) = tokio::join!(manager.list(), driver);

        let ids: Vec<u32> = checkpoints.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![5, 3]);
    }

    #[tokio::test]
    async fn test_list_count_mismatch_is_surfaced() {
        let (manager, mut server) = manager();

        let driver = async {
            let (_, request_id, _) = read_command(&mut server).await;

            server
                .write_all(&make_frame(
                    response_kinds::CHECKPOINT_INFO,
                    request_id,
                    &info_body(5, 0x1000, false, false, 0),
                ))
                .await
                .unwrap();
            // terminal response claims two entries but only one arrived
            server
                .write_all(&make_frame(
                    response_kinds::CHECKPOINT_LIST,
                    request_id,
                    &2u32.to_le_bytes(),
                ))
                .await
                .unwrap();
        };

        let (result, _) = tokio::join!(manager.list(), driver);
        assert!(matches!(result, Err(MonitorError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_delete_checks_error_code() {
        let (manager, mut server) = manager();

        let driver = async {
            let (kind, request_id, body) = read_command(&mut server).await;
            assert_eq!(kind, command_kinds::CHECKPOINT_DELETE);
            assert_eq!(body, vec![9, 0, 0, 0]);

            let mut frame = make_frame(response_kinds::CHECKPOINT_DELETE, request_id, &[]);
            frame[7] = 0x01; // OBJECT_MISSING
            server.write_all(&frame).await.unwrap();
        };

        let (result, _) = tokio::join!(manager.delete(9), driver);
        assert!(matches!(result, Err(MonitorError::ErrorCode(0x01, _))));
    }

    #[tokio::test]
    async fn test_temporary_checkpoint_dropped_after_hit() {
        let (manager, mut server) = manager();

        let driver = async {
            let (_, request_id, _) = read_command(&mut server).await;
            server
                .write_all(&make_frame(
                    response_kinds::CHECKPOINT_INFO,
                    request_id,
                    &info_body(7, 0x2000, true, false, 0),
                ))
                .await
                .unwrap();
        };

        let (checkpoint, _) = tokio::join!(
            manager.set(0x2000, 0x2000, true, true, CpuOperation::EXEC, true),
            driver
        );
        assert_eq!(checkpoint.unwrap().id, 7);
        assert!(manager.cached(7).await.is_some());

        // the hit notification arrives with the sentinel request id
        server
            .write_all(&make_frame(
                response_kinds::CHECKPOINT_INFO,
                SENTINEL_REQUEST_ID,
                &info_body(7, 0x2000, true, true, 1),
            ))
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while manager.cached(7).await.is_some() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("temporary checkpoint still mirrored after hit");
    }
}

