// Monitor event loop
//
// Multiplexes command replies and unsolicited notifications arriving on
// one socket. Owns the pending-waiter table; all correlation happens here.

use crate::command::Command;
use crate::events::{classify_event, MonitorEvent};
use crate::protocol::{
    encode_frame, FrameHeader, MonitorError, MonitorResult, HEADER_SIZE, SENTINEL_REQUEST_ID,
};
use crate::response::{decode_response, Response};
use bytes::BytesMut;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Maximum allowed frame size (16MB). Display captures dominate frame
/// sizes; anything beyond this is a corrupt length field.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Request to send a command and collect its response
pub struct CommandRequest {
    pub request_id: u32,
    pub kind: u8,
    pub body: Vec<u8>,
    pub terminal_kind: Option<u8>,
    pub reply_tx: oneshot::Sender<MonitorResult<Response>>,
}

/// Handle to the event loop for sending commands and receiving events
#[derive(Debug)]
pub struct EventLoopHandle {
    command_tx: mpsc::Sender<CommandRequest>,
    event_rx: broadcast::Receiver<MonitorEvent>,
}

impl Clone for EventLoopHandle {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            event_rx: self.event_rx.resubscribe(),
        }
    }
}

impl EventLoopHandle {
    /// Send a command and wait for its (terminal) response
    pub async fn send_command(
        &self,
        request_id: u32,
        command: &Command,
    ) -> MonitorResult<Response> {
        let body = command.encode()?;
        let (reply_tx, reply_rx) = oneshot::channel();

        let request = CommandRequest {
            request_id,
            kind: command.kind(),
            body,
            terminal_kind: command.terminal_response_kind(),
            reply_tx,
        };

        self.command_tx
            .send(request)
            .await
            .map_err(|_| MonitorError::ConnectionClosed)?;

        reply_rx
            .await
            .map_err(|_| MonitorError::ConnectionClosed)?
    }

    /// Subscribe to unsolicited monitor events. Every subscriber receives
    /// every event; the stream ends when the connection closes.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_rx.resubscribe()
    }

    /// True once the event loop has shut down
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}

/// Start the event loop task
pub fn spawn_event_loop<R, W>(reader: R, writer: W) -> EventLoopHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(32);
    // Events are critical (checkpoint hits, stops) and must not be lost
    // under load, so the broadcast buffer is generous.
    let (event_tx, event_rx) = broadcast::channel(256);

    tokio::spawn(event_loop_task(reader, writer, command_rx, event_tx));

    EventLoopHandle {
        command_tx,
        event_rx,
    }
}

struct PendingWaiter {
    terminal_kind: Option<u8>,
    related: Vec<Response>,
    reply_tx: oneshot::Sender<MonitorResult<Response>>,
}

/// Main event loop task
async fn event_loop_task<R, W>(
    mut reader: R,
    mut writer: W,
    mut command_rx: mpsc::Receiver<CommandRequest>,
    event_tx: broadcast::Sender<MonitorEvent>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Monitor event loop started");

    let mut pending: HashMap<u32, PendingWaiter> = HashMap::new();
    let mut inbound = BytesMut::with_capacity(4096);

    'outer: loop {
        tokio::select! {
            // Handle outgoing commands
            Some(request) = command_rx.recv() => {
                let request_id = request.request_id;
                debug!("Sending command kind={:#04x} id={}", request.kind, request_id);

                let frame = encode_frame(request.kind, request_id, &request.body);

                // Register the waiter before writing the frame so a reply
                // cannot arrive ahead of its registration.
                pending.insert(request_id, PendingWaiter {
                    terminal_kind: request.terminal_kind,
                    related: Vec::new(),
                    reply_tx: request.reply_tx,
                });

                if let Err(e) = write_frame(&mut writer, &frame).await {
                    error!("Failed to write command: {}", e);
                    if let Some(waiter) = pending.remove(&request_id) {
                        waiter.reply_tx.send(Err(MonitorError::Io(e))).ok();
                    }
                }
            }

            // Handle incoming bytes. The stream does not respect message
            // boundaries, so frames are reassembled from a buffer.
            result = reader.read_buf(&mut inbound) => {
                match result {
                    Ok(0) => {
                        info!("Monitor closed the connection");
                        break;
                    }
                    Ok(_) => loop {
                        match take_frame(&mut inbound) {
                            Ok(Some(frame)) => {
                                if let Err(e) = handle_frame(&frame, &mut pending, &event_tx) {
                                    error!("Unrecoverable protocol failure: {}", e);
                                    break 'outer;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                error!("Framing failure: {}", e);
                                break 'outer;
                            }
                        }
                    },
                    Err(e) => {
                        error!("Failed to read from monitor: {}", e);
                        break;
                    }
                }
            }
        }
    }

    // The socket is gone; every still-outstanding request fails the same
    // way. No partial responses are synthesized.
    for (_, waiter) in pending.drain() {
        waiter.reply_tx.send(Err(MonitorError::ConnectionClosed)).ok();
    }

    info!("Monitor event loop shutting down");
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Split one complete frame off the front of the buffer, if available
fn take_frame(inbound: &mut BytesMut) -> MonitorResult<Option<Vec<u8>>> {
    if inbound.len() < HEADER_SIZE {
        return Ok(None);
    }

    let length =
        u32::from_le_bytes([inbound[2], inbound[3], inbound[4], inbound[5]]) as usize;

    if length < HEADER_SIZE {
        return Err(MonitorError::Protocol(format!(
            "invalid frame length: {}",
            length
        )));
    }

    if length > MAX_FRAME_SIZE {
        return Err(MonitorError::Protocol(format!(
            "frame too large: {} bytes (max: {} bytes)",
            length, MAX_FRAME_SIZE
        )));
    }

    if inbound.len() < length {
        return Ok(None);
    }

    Ok(Some(inbound.split_to(length).to_vec()))
}

fn handle_frame(
    frame: &[u8],
    pending: &mut HashMap<u32, PendingWaiter>,
    event_tx: &broadcast::Sender<MonitorEvent>,
) -> MonitorResult<()> {
    let header = FrameHeader::parse(frame)?;
    let request_id = header.request_id;

    // The sentinel id marks unsolicited traffic and never consults the
    // pending table, no matter what kind it carries.
    let waiter = if request_id == SENTINEL_REQUEST_ID {
        None
    } else {
        pending.remove(&request_id)
    };

    if let Some(mut waiter) = waiter {
        // A reply to an outstanding request. A malformed body fails this
        // waiter only; other in-flight requests are unaffected.
        match decode_response(frame, frame.len()) {
            Ok(mut response) => {
                let terminal = waiter
                    .terminal_kind
                    .map_or(true, |kind| response.kind() == kind);

                if terminal {
                    debug!("Received reply kind={:#04x} id={}", header.kind, request_id);
                    response.related = std::mem::take(&mut waiter.related);
                    waiter.reply_tx.send(Ok(response)).ok();
                } else {
                    debug!(
                        "Collecting related response kind={:#04x} id={}",
                        header.kind, request_id
                    );
                    waiter.related.push(response);
                    pending.insert(request_id, waiter);
                }
            }
            Err(e) => {
                warn!("Failed to decode reply id={}: {}", request_id, e);
                waiter.reply_tx.send(Err(e)).ok();
            }
        }
    } else {
        // Sentinel request id, or a response nothing is waiting for:
        // classify and broadcast.
        match decode_response(frame, frame.len()) {
            Ok(response) => {
                let event = classify_event(response);
                debug!("Broadcasting event: {:?}", event);
                // send only fails when there are no subscribers
                event_tx.send(event).ok();
            }
            Err(e) => {
                warn!("Failed to decode unsolicited response: {}", e);
            }
        }
    }

    Ok(())
}
