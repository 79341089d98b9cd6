//! SocketCAN ISO-TP transport (Linux only)
//!
//! A non-blocking ISO-TP socket with a background reader task pushing
//! reassembled payloads into a bounded queue. The queue is strictly
//! single-producer/single-consumer: the reader fills it, the foreground
//! orchestrator drains it through [`Transport::wait_frame`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use socketcan::ExtendedId;
use socketcan_isotp::IsoTpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{Transport, TransportError};
use crate::config::SocketCanConfig;

const RX_QUEUE_DEPTH: usize = 256;

pub struct SocketCanTransport {
    config: SocketCanConfig,
    rx_id: u32,
    tx_id: u32,
    socket: Arc<Mutex<IsoTpSocket>>,
    connected: Arc<AtomicBool>,
    rx_queue: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SocketCanTransport {
    pub fn new(config: &SocketCanConfig, rx_id: u32, tx_id: u32) -> Result<Self, TransportError> {
        let mut socket = Self::create_socket(config, rx_id, tx_id)?;
        Self::drain_socket(&mut socket);

        let socket = Arc::new(Mutex::new(socket));
        let connected = Arc::new(AtomicBool::new(true));
        let (queue_tx, queue_rx) = mpsc::channel(RX_QUEUE_DEPTH);

        let handle = Self::start_listener(socket.clone(), connected.clone(), queue_tx);

        Ok(Self {
            config: config.clone(),
            rx_id,
            tx_id,
            socket,
            connected,
            rx_queue: tokio::sync::Mutex::new(queue_rx),
            listener_handle: Mutex::new(Some(handle)),
        })
    }

    fn create_socket(
        config: &SocketCanConfig,
        rx_id: u32,
        tx_id: u32,
    ) -> Result<IsoTpSocket, TransportError> {
        let ext_rx_id = ExtendedId::new(rx_id).ok_or_else(|| {
            TransportError::InvalidConfig(format!("Invalid CAN ID: 0x{:X}", rx_id))
        })?;
        let ext_tx_id = ExtendedId::new(tx_id).ok_or_else(|| {
            TransportError::InvalidConfig(format!("Invalid CAN ID: 0x{:X}", tx_id))
        })?;

        let socket = IsoTpSocket::open(&config.interface, ext_rx_id, ext_tx_id).map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to open ISO-TP socket: {}", e))
        })?;

        socket.set_nonblocking(true).map_err(|e| {
            TransportError::InvalidConfig(format!("Failed to set non-blocking: {}", e))
        })?;

        Ok(socket)
    }

    /// Drop data left over from previous sessions on the same channel.
    fn drain_socket(socket: &mut IsoTpSocket) {
        loop {
            match socket.read() {
                Ok(data) if !data.is_empty() => {
                    debug!(data = ?data, "drained stale frame from socket");
                }
                Ok(_) | Err(_) => break,
            }
        }
    }

    fn start_listener(
        socket: Arc<Mutex<IsoTpSocket>>,
        connected: Arc<AtomicBool>,
        queue_tx: mpsc::Sender<Vec<u8>>,
    ) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || {
            while connected.load(Ordering::SeqCst) {
                let frame = {
                    let mut socket_guard = socket.lock();
                    socket_guard.read().map(|data| data.to_vec())
                };
                match frame {
                    Ok(data) if !data.is_empty() => {
                        debug!(data = ?data, "inbound ISO-TP payload");
                        if queue_tx.blocking_send(data).is_err() {
                            break;
                        }
                    }
                    Ok(_) => std::thread::sleep(Duration::from_millis(1)),
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => {
                        error!(?e, "SocketCAN read error");
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }
            debug!("SocketCAN listener stopped");
        })
    }
}

#[async_trait]
impl Transport for SocketCanTransport {
    async fn open(&self) -> Result<(), TransportError> {
        if self.is_open() {
            return Ok(());
        }
        let mut socket = Self::create_socket(&self.config, self.rx_id, self.tx_id)?;
        Self::drain_socket(&mut socket);
        *self.socket.lock() = socket;
        self.connected.store(true, Ordering::SeqCst);
        // The previous listener exited when `connected` went false; its
        // queue sender died with it, so rebuild the queue as well.
        let (queue_tx, queue_rx) = mpsc::channel(RX_QUEUE_DEPTH);
        *self.rx_queue.lock().await = queue_rx;
        let handle = Self::start_listener(self.socket.clone(), self.connected.clone(), queue_tx);
        *self.listener_handle.lock() = Some(handle);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self.listener_handle.lock().take() {
            handle.abort();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }

        let socket = self.socket.clone();
        let payload = payload.to_vec();

        tokio::task::spawn_blocking(move || {
            let socket_guard = socket.lock();
            socket_guard
                .write(&payload)
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::SendFailed(format!("Task join error: {}", e)))??;

        Ok(())
    }

    async fn wait_frame(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        let mut queue = self.rx_queue.lock().await;
        match tokio::time::timeout(timeout, queue.recv()).await {
            Ok(Some(data)) => Ok(data),
            Ok(None) => Err(TransportError::ReceiveFailed(
                "Receiver task ended".to_string(),
            )),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn empty_rx(&self) {
        let mut queue = self.rx_queue.lock().await;
        while queue.try_recv().is_ok() {}
    }
}

impl Drop for SocketCanTransport {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
