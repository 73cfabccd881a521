// Monitor connection management
//
// Owns request-id allocation and the event loop for one emulator socket

use crate::command::Command;
use crate::eventloop::{spawn_event_loop, EventLoopHandle};
use crate::events::MonitorEvent;
use crate::protocol::{MonitorError, MonitorResult, SENTINEL_REQUEST_ID};
use crate::response::Response;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MonitorConnection {
    event_loop: EventLoopHandle,
    next_id: Arc<AtomicU32>,
}

impl MonitorConnection {
    /// Connect to an emulator's binary monitor port
    pub async fn connect(host: &str, port: u16) -> MonitorResult<Self> {
        info!("Connecting to binary monitor at {}:{}", host, port);

        let stream = TcpStream::connect((host, port)).await?;
        let (reader, writer) = stream.into_split();

        Ok(Self::attach(reader, writer))
    }

    /// Attach to an already-connected stream. Process launch and port
    /// negotiation belong to the launcher, which hands the socket over.
    pub fn attach<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let event_loop = spawn_event_loop(reader, writer);

        Self {
            event_loop,
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Send a command and wait for its terminal response
    pub async fn exec(&self, command: &Command) -> MonitorResult<Response> {
        let id = self.next_id();
        debug!("Executing command kind={:#04x} id={}", command.kind(), id);
        self.event_loop.send_command(id, command).await
    }

    /// Subscribe to unsolicited monitor events
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_loop.subscribe()
    }

    /// True once the underlying socket is gone
    pub fn is_closed(&self) -> bool {
        self.event_loop.is_closed()
    }

    /// Wait for the next event matching a predicate. Concurrent waiters
    /// each receive matching events independently.
    pub async fn wait_for_event<F>(&self, mut predicate: F) -> MonitorResult<MonitorEvent>
    where
        F: FnMut(&MonitorEvent) -> bool,
    {
        if self.event_loop.is_closed() {
            return Err(MonitorError::ConnectionClosed);
        }

        let mut events = self.subscribe();
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event subscriber lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(MonitorError::ConnectionClosed)
                }
            }
        }
    }

    /// Allocate the next request id. Ids only need to be unique among
    /// currently outstanding requests; the sentinel is never handed out.
    fn next_id(&self) -> u32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            if id != SENTINEL_REQUEST_ID {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duplex_connection() -> (MonitorConnection, tokio::io::DuplexStream) {
        let (client, server) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(client);
        (MonitorConnection::attach(reader, writer), server)
    }

    #[tokio::test]
    async fn test_next_id_increments() {
        let (connection, _server) = duplex_connection();

        assert_eq!(connection.next_id(), 1);
        assert_eq!(connection.next_id(), 2);
        assert_eq!(connection.next_id(), 3);
    }

    #[tokio::test]
    async fn test_next_id_skips_sentinel() {
        let (connection, _server) = duplex_connection();
        connection.next_id.store(SENTINEL_REQUEST_ID, Ordering::SeqCst);

        // the counter wraps without ever yielding the sentinel
        assert_eq!(connection.next_id(), 0);
        assert_eq!(connection.next_id(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_event_skips_non_matching() {
        use crate::command::response_kinds;
        use crate::protocol::encode_frame;
        use tokio::io::AsyncWriteExt;

        let (connection, mut server) = duplex_connection();

        let wait = connection.wait_for_event(|event| matches!(event, MonitorEvent::Stopped { .. }));

        let driver = async {
            server
                .write_all(&encode_frame(
                    response_kinds::RESUMED,
                    SENTINEL_REQUEST_ID,
                    &0x1000u16.to_le_bytes(),
                ))
                .await
                .unwrap();
            server
                .write_all(&encode_frame(
                    response_kinds::STOPPED,
                    SENTINEL_REQUEST_ID,
                    &0x2000u16.to_le_bytes(),
                ))
                .await
                .unwrap();
        };

        let (event, _) = tokio::join!(wait, driver);
        assert!(matches!(event.unwrap(), MonitorEvent::Stopped { pc: 0x2000 }));
    }

    #[tokio::test]
    async fn test_concurrent_waiters_resolve_independently() {
        use crate::command::response_kinds;
        use crate::protocol::encode_frame;
        use tokio::io::AsyncWriteExt;

        let (connection, mut server) = duplex_connection();

        let stop_waiter =
            connection.wait_for_event(|event| matches!(event, MonitorEvent::Stopped { .. }));
        let any_waiter = connection.wait_for_event(|_| true);

        let driver = async {
            server
                .write_all(&encode_frame(
                    response_kinds::STOPPED,
                    SENTINEL_REQUEST_ID,
                    &0x0810u16.to_le_bytes(),
                ))
                .await
                .unwrap();
        };

        // one event, two waiters, both resolve
        let (stop, any, _) = tokio::join!(stop_waiter, any_waiter, driver);
        assert!(matches!(stop.unwrap(), MonitorEvent::Stopped { pc: 0x0810 }));
        assert!(matches!(any.unwrap(), MonitorEvent::Stopped { pc: 0x0810 }));
    }

    #[tokio::test]
    async fn test_wait_for_event_fails_after_close() {
        let (connection, server) = duplex_connection();
        drop(server);

        // give the event loop a chance to observe the close
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            connection.wait_for_event(|_| true),
        )
        .await
        .expect("waiter did not resolve");

        assert!(matches!(result, Err(MonitorError::ConnectionClosed)));
    }
}
