//! UDS client
//!
//! Request/response handling over a [`Transport`]: service encoding,
//! response validation, negative-response decoding and the
//! response-pending wait loop. All requests are strictly serialized;
//! there is never more than one request in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{service_id, NegativeResponseCode, UdsError};
use crate::transport::Transport;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Both the request timeout and `p2_server_max` while the programming
/// session is active.
const PROGRAMMING_TIMEOUT: Duration = Duration::from_secs(30);
const RESPONSE_PENDING_POLL: Duration = Duration::from_millis(100);

pub struct UdsClient {
    transport: Arc<dyn Transport>,
    timeout: Mutex<Duration>,
}

impl UdsClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: Mutex::new(DEFAULT_TIMEOUT),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    /// Switch between the default and the extended programming-session
    /// timing.
    pub fn set_programming_timing(&self, programming: bool) {
        *self.timeout.lock() = if programming {
            PROGRAMMING_TIMEOUT
        } else {
            DEFAULT_TIMEOUT
        };
    }

    /// Send a request and wait for its validated positive response.
    async fn request(&self, request: &[u8]) -> Result<Vec<u8>, UdsError> {
        let service = *request
            .first()
            .ok_or_else(|| UdsError::InvalidResponse("Empty request".to_string()))?;

        self.transport.empty_rx().await;
        trace!(request = %hex::encode(request), "UDS request");
        self.transport.send(request).await?;

        let deadline = Instant::now() + self.timeout();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(UdsError::Timeout);
            }

            let response = self.transport.wait_frame(remaining).await?;
            trace!(response = %hex::encode(&response), "UDS response");

            if response.first() == Some(&service_id::NEGATIVE_RESPONSE) {
                if response.len() < 3 {
                    return Err(UdsError::InvalidResponse(
                        "Negative response too short".to_string(),
                    ));
                }
                let nrc = NegativeResponseCode::from(response[2]);
                if nrc == NegativeResponseCode::ResponsePending {
                    debug!(service = format_args!("0x{service:02X}"), "response pending");
                    tokio::time::sleep(RESPONSE_PENDING_POLL).await;
                    continue;
                }
                return Err(UdsError::NegativeResponse {
                    service_id: response[1],
                    nrc,
                });
            }

            let got = response.first().copied().unwrap_or_default();
            if got != service.wrapping_add(0x40) {
                return Err(UdsError::UnexpectedResponse { service, got });
            }
            return Ok(response);
        }
    }

    /// Diagnostic Session Control (0x10). Entering the programming
    /// session raises the request timeout to `p2_server_max` = 30 s;
    /// any other session restores the default.
    pub async fn diagnostic_session_control(&self, session: u8) -> Result<(), UdsError> {
        self.request(&[service_id::DIAGNOSTIC_SESSION_CONTROL, session])
            .await?;
        self.set_programming_timing(session == super::session::PROGRAMMING);
        Ok(())
    }

    /// ECU Reset (0x11)
    pub async fn ecu_reset(&self, reset: u8) -> Result<(), UdsError> {
        self.request(&[service_id::ECU_RESET, reset]).await?;
        Ok(())
    }

    /// Clear Diagnostic Information (0x14)
    pub async fn clear_diagnostic_information(&self, group: u32) -> Result<(), UdsError> {
        let bytes = group.to_be_bytes();
        self.request(&[
            service_id::CLEAR_DIAGNOSTIC_INFO,
            bytes[1],
            bytes[2],
            bytes[3],
        ])
        .await?;
        Ok(())
    }

    /// Read Data By Identifier (0x22), single DID
    pub async fn read_data_by_identifier(&self, did: u16) -> Result<Vec<u8>, UdsError> {
        let id = did.to_be_bytes();
        let response = self
            .request(&[service_id::READ_DATA_BY_ID, id[0], id[1]])
            .await?;
        if response.len() < 3 || response[1..3] != id {
            return Err(UdsError::InvalidResponse(format!(
                "ReadDataByIdentifier 0x{did:04X} echo mismatch"
            )));
        }
        Ok(response[3..].to_vec())
    }

    /// Write Data By Identifier (0x2E)
    pub async fn write_data_by_identifier(&self, did: u16, data: &[u8]) -> Result<(), UdsError> {
        let mut request = vec![service_id::WRITE_DATA_BY_ID];
        request.extend_from_slice(&did.to_be_bytes());
        request.extend_from_slice(data);
        self.request(&request).await?;
        Ok(())
    }

    /// Security Access (0x27): request the reflashing seed.
    pub async fn security_access_request_seed(&self) -> Result<Vec<u8>, UdsError> {
        let response = self
            .request(&[service_id::SECURITY_ACCESS, super::security::REQUEST_SEED])
            .await?;
        if response.len() < 3 {
            return Err(UdsError::InvalidResponse(
                "Seed response too short".to_string(),
            ));
        }
        Ok(response[2..].to_vec())
    }

    /// Security Access (0x27): send the computed key.
    pub async fn security_access_send_key(&self, key: &[u8]) -> Result<(), UdsError> {
        let mut request = vec![service_id::SECURITY_ACCESS, super::security::SEND_KEY];
        request.extend_from_slice(key);
        self.request(&request).await?;
        Ok(())
    }

    /// Routine Control (0x31), startRoutine. Returns the routine info
    /// bytes.
    pub async fn routine_control_start(
        &self,
        routine_id: u16,
        params: &[u8],
    ) -> Result<Vec<u8>, UdsError> {
        let mut request = vec![service_id::ROUTINE_CONTROL, super::routine::START];
        request.extend_from_slice(&routine_id.to_be_bytes());
        request.extend_from_slice(params);

        let response = self.request(&request).await?;
        if response.len() < 4 {
            return Err(UdsError::InvalidResponse(
                "Routine response too short".to_string(),
            ));
        }
        Ok(response[4..].to_vec())
    }

    /// Request Download (0x34). The memory location is the single-byte
    /// block identifier plus a 32-bit transfer size; the data format
    /// identifier carries the compression/encryption nibbles. Returns
    /// the controller's maxNumberOfBlockLength.
    pub async fn request_download(
        &self,
        data_format: u8,
        block_identifier: u8,
        size: u32,
    ) -> Result<u32, UdsError> {
        let mut request = vec![service_id::REQUEST_DOWNLOAD, data_format, 0x41, block_identifier];
        request.extend_from_slice(&size.to_be_bytes());

        let response = self.request(&request).await?;
        if response.len() < 2 {
            return Err(UdsError::InvalidResponse(
                "RequestDownload response too short".to_string(),
            ));
        }
        let num_bytes = (response[1] >> 4) as usize;
        if num_bytes == 0 || response.len() < 2 + num_bytes {
            return Err(UdsError::InvalidResponse(
                "RequestDownload response missing maxNumberOfBlockLength".to_string(),
            ));
        }
        let mut max_block_length: u32 = 0;
        for &byte in &response[2..2 + num_bytes] {
            max_block_length = (max_block_length << 8) | byte as u32;
        }
        Ok(max_block_length)
    }

    /// Transfer Data (0x36) with an explicit sequence counter.
    pub async fn transfer_data(&self, counter: u8, data: &[u8]) -> Result<(), UdsError> {
        let mut request = vec![service_id::TRANSFER_DATA, counter];
        request.extend_from_slice(data);

        let response = self.request(&request).await?;
        if response.len() < 2 || response[1] != counter {
            return Err(UdsError::InvalidResponse(format!(
                "TransferData counter echo mismatch (sent {counter})"
            )));
        }
        Ok(())
    }

    /// Request Transfer Exit (0x37)
    pub async fn request_transfer_exit(&self) -> Result<(), UdsError> {
        self.request(&[service_id::REQUEST_TRANSFER_EXIT]).await?;
        Ok(())
    }

    /// Tester Present (0x3E) with an optional payload suffix.
    pub async fn tester_present(&self, suffix: &[u8]) -> Result<(), UdsError> {
        let mut request = vec![service_id::TESTER_PRESENT, 0x00];
        request.extend_from_slice(suffix);
        self.request(&request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::transport::mock::MockTransport;
    use crate::uds::session;

    fn client_with_mock() -> (UdsClient, Arc<MockTransport>) {
        let mock = Arc::new(MockTransport::new(&MockConfig::default()));
        (UdsClient::new(mock.clone()), mock)
    }

    #[tokio::test]
    async fn negative_response_is_typed() {
        let (client, mock) = client_with_mock();
        mock.expect(vec![0x27, 0x04], vec![0x7F, 0x27, 0x35]);

        let err = client.security_access_send_key(&[1, 2, 3, 4]).await;
        match err {
            Err(UdsError::NegativeResponse { service_id, nrc }) => {
                assert_eq!(service_id, 0x27);
                assert_eq!(nrc, NegativeResponseCode::InvalidKey);
            }
            other => panic!("expected negative response, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn response_pending_is_awaited() {
        let (client, mock) = client_with_mock();
        // First reply is ResponsePending; the real answer arrives later
        // on the same request.
        mock.expect(vec![0x31], vec![0x7F, 0x31, 0x78]);

        let inject = {
            let mock = mock.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                mock.push_frame(vec![0x71, 0x01, 0xFF, 0x01, 0x00]);
            }
        };
        let (result, ()) = tokio::join!(client.routine_control_start(0xFF01, &[]), inject);
        assert_eq!(result.unwrap(), vec![0x00]);

        // Exactly one request went out.
        assert_eq!(mock.sent(), vec![vec![0x31, 0x01, 0xFF, 0x01]]);
    }

    #[tokio::test]
    async fn read_data_checks_the_did_echo() {
        let (client, mock) = client_with_mock();
        mock.expect(vec![0x22, 0xF1, 0x90], vec![0x62, 0xF1, 0x91, 0x41]);
        let err = client.read_data_by_identifier(0xF190).await;
        assert!(matches!(err, Err(UdsError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn read_data_strips_the_header() {
        let (client, mock) = client_with_mock();
        let mut reply = vec![0x62, 0xF1, 0x90];
        reply.extend_from_slice(b"WVWZZZ1KZAW000001");
        mock.expect(vec![0x22, 0xF1, 0x90], reply);
        let vin = client.read_data_by_identifier(0xF190).await.unwrap();
        assert_eq!(vin, b"WVWZZZ1KZAW000001");
    }

    #[tokio::test]
    async fn unexpected_service_echo_is_rejected() {
        let (client, mock) = client_with_mock();
        mock.expect(vec![0x3E], vec![0x50, 0x03]);
        let err = client.tester_present(&[]).await;
        assert!(matches!(
            err,
            Err(UdsError::UnexpectedResponse {
                service: 0x3E,
                got: 0x50
            })
        ));
    }

    #[tokio::test]
    async fn request_download_parses_max_block_length() {
        let (client, mock) = client_with_mock();
        mock.expect(vec![0x34], vec![0x74, 0x20, 0x0F, 0xFF]);
        let max = client.request_download(0xAA, 0x05, 0x1000).await.unwrap();
        assert_eq!(max, 0x0FFF);

        let sent = mock.sent();
        assert_eq!(
            sent[0],
            vec![0x34, 0xAA, 0x41, 0x05, 0x00, 0x00, 0x10, 0x00]
        );
    }

    #[tokio::test]
    async fn programming_session_raises_the_timeout() {
        let (client, _mock) = client_with_mock();
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);
        client
            .diagnostic_session_control(session::PROGRAMMING)
            .await
            .unwrap();
        assert_eq!(client.timeout(), PROGRAMMING_TIMEOUT);
        client
            .diagnostic_session_control(session::EXTENDED)
            .await
            .unwrap();
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn transfer_data_validates_counter_echo() {
        let (client, mock) = client_with_mock();
        mock.expect(vec![0x36, 0x05], vec![0x76, 0x06]);
        let err = client.transfer_data(0x05, &[0xAA]).await;
        assert!(matches!(err, Err(UdsError::InvalidResponse(_))));
    }
}
