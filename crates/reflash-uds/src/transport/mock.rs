//! In-memory mock transport with scripted replies
//!
//! The mock records every sent payload and answers from two sources:
//! scripted (prefix, reply) entries consumed in insertion order, then a
//! built-in set of well-formed positive responses for the services the
//! orchestrator uses. Tests assert against the sent log.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{Transport, TransportError};
use crate::config::MockConfig;

struct ScriptedReply {
    prefix: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
}

/// Mock transport for tests and dry runs.
#[derive(Default)]
pub struct MockTransport {
    config: MockConfig,
    open: AtomicBool,
    scripted: Mutex<Vec<ScriptedReply>>,
    queue: Mutex<VecDeque<Vec<u8>>>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockTransport {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            config: config.clone(),
            open: AtomicBool::new(true),
            ..Default::default()
        }
    }

    /// Script a reply for requests starting with `prefix`. Multiple
    /// entries with the same prefix are consumed one send at a time, in
    /// insertion order; exhausted entries fall away so the built-in
    /// responses apply again.
    pub fn expect(&self, prefix: Vec<u8>, reply: Vec<u8>) {
        let mut scripted = self.scripted.lock();
        scripted.push(ScriptedReply {
            prefix,
            replies: VecDeque::from([reply]),
        });
    }

    /// Everything sent through this transport, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Queue an inbound frame, as if the controller had sent one
    /// unprompted.
    pub fn push_frame(&self, frame: Vec<u8>) {
        self.queue.lock().push_back(frame);
    }

    fn reply_for(&self, request: &[u8]) -> Option<Vec<u8>> {
        let mut scripted = self.scripted.lock();
        if let Some(position) = scripted
            .iter()
            .position(|entry| request.starts_with(&entry.prefix))
        {
            let reply = scripted[position].replies.pop_front();
            if scripted[position].replies.is_empty() {
                scripted.remove(position);
            }
            if let Some(reply) = reply {
                return Some(reply);
            }
        }
        default_reply(request)
    }
}

/// Well-formed positive responses for unscripted requests.
fn default_reply(request: &[u8]) -> Option<Vec<u8>> {
    let at = |i: usize| request.get(i).copied().unwrap_or_default();
    match *request.first()? {
        // DiagnosticSessionControl echoes the session and P2 timings.
        0x10 => Some(vec![0x50, at(1), 0x00, 0x32, 0x01, 0xF4]),
        0x11 => Some(vec![0x51, at(1)]),
        0x14 => Some(vec![0x54]),
        0x22 => {
            let mut reply = vec![0x62, at(1), at(2)];
            reply.extend_from_slice(b"MOCK0000");
            Some(reply)
        }
        // Seed on odd sub-function, plain accept on even.
        0x27 if at(1) % 2 == 1 => Some(vec![0x67, at(1), 0x00, 0x00, 0x00, 0x00]),
        0x27 => Some(vec![0x67, at(1)]),
        0x2E => Some(vec![0x6E, at(1), at(2)]),
        0x31 => Some(vec![0x71, at(1), at(2), at(3), 0x00]),
        0x34 => Some(vec![0x74, 0x20, 0x10, 0x02]),
        0x36 => Some(vec![0x76, at(1)]),
        0x37 => Some(vec![0x77]),
        0x3E => Some(vec![0x7E, 0x00]),
        // OBD clear-emissions broadcast: nobody answers the tester.
        0x04 => None,
        _ => None,
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self) -> Result<(), TransportError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        debug!(payload = ?payload, "mock transport send");
        self.sent.lock().push(payload.to_vec());
        if let Some(reply) = self.reply_for(payload) {
            self.queue.lock().push_back(reply);
        }
        Ok(())
    }

    async fn wait_frame(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if !self.is_open() {
                return Err(TransportError::NotOpen);
            }
            if let Some(frame) = self.queue.lock().pop_front() {
                return Ok(frame);
            }
            if std::time::Instant::now() >= deadline {
                return Err(TransportError::Timeout);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn empty_rx(&self) {
        self.queue.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_take_precedence_and_expire() {
        let mock = MockTransport::new(&MockConfig::default());
        mock.expect(vec![0x36], vec![0x7F, 0x36, 0x73]);

        mock.send(&[0x36, 0x01, 0xAA]).await.unwrap();
        assert_eq!(
            mock.wait_frame(Duration::from_millis(10)).await.unwrap(),
            vec![0x7F, 0x36, 0x73]
        );

        // Scripted entry is used up; the builtin echo applies.
        mock.send(&[0x36, 0x02, 0xAA]).await.unwrap();
        assert_eq!(
            mock.wait_frame(Duration::from_millis(10)).await.unwrap(),
            vec![0x76, 0x02]
        );
    }

    #[tokio::test]
    async fn sent_log_records_order() {
        let mock = MockTransport::new(&MockConfig::default());
        mock.send(&[0x10, 0x03]).await.unwrap();
        mock.send(&[0x3E, 0x00]).await.unwrap();
        assert_eq!(mock.sent(), vec![vec![0x10, 0x03], vec![0x3E, 0x00]]);
    }

    #[tokio::test]
    async fn empty_rx_discards_buffered_frames() {
        let mock = MockTransport::new(&MockConfig::default());
        mock.send(&[0x3E, 0x00]).await.unwrap();
        mock.empty_rx().await;
        assert!(matches!(
            mock.wait_frame(Duration::from_millis(10)).await,
            Err(TransportError::Timeout)
        ));
    }

    #[tokio::test]
    async fn closed_transport_rejects_io() {
        let mock = MockTransport::new(&MockConfig::default());
        mock.close().await.unwrap();
        assert!(!mock.is_open());
        assert!(matches!(
            mock.send(&[0x3E, 0x00]).await,
            Err(TransportError::NotOpen)
        ));
    }
}
