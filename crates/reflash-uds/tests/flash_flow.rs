//! End-to-end flash flows against the mock transport

use std::sync::Arc;

use reflash_core::{FlashFamily, PreparedBlock};
use reflash_uds::transport::mock::MockTransport;
use reflash_uds::{
    FlashError, FlashOptions, Flasher, MockConfig, NegativeResponseCode, Transport, UdsError,
};

const CHUNK: usize = 0xFFD;

fn prepared(number: u16, name: &str, len: usize) -> PreparedBlock {
    PreparedBlock {
        number,
        name: name.to_string(),
        box_code: "8V0906259H".to_string(),
        compression: 0xA,
        encryption: 0xA,
        should_erase: true,
        uds_checksum: [0xDE, 0xAD, 0xBE, 0xEF],
        data: (0..len).map(|i| (i % 251) as u8).collect(),
    }
}

fn flasher_with_mocks(options: FlashOptions) -> (Flasher, Arc<MockTransport>, Arc<MockTransport>) {
    let info = FlashFamily::Simos.info().unwrap();
    let primary = Arc::new(MockTransport::new(&MockConfig::default()));
    let broadcast = Arc::new(MockTransport::new(&MockConfig::default()));

    // Seed challenge recorded for the engine-family SA2 program; only
    // the matching key is accepted.
    primary.expect(vec![0x27, 0x03], vec![0x67, 0x03, 0x12, 0x23, 0x34, 0x45]);
    primary.expect(vec![0x27, 0x04, 0x85, 0xD5, 0x2E, 0x27], vec![0x67, 0x04]);
    primary.expect(vec![0x27, 0x04], vec![0x7F, 0x27, 0x35]);

    let flasher = Flasher::new(info, primary.clone(), options).with_broadcast(broadcast.clone());
    (flasher, primary, broadcast)
}

#[tokio::test(start_paused = true)]
async fn full_flash_sends_the_expected_service_sequence() {
    // 260 chunks for ASW1 so the sequence counter wraps 0xFF -> 0x00.
    let asw1_len = 259 * CHUNK + 50;
    let blocks = vec![prepared(5, "CAL", 3 * CHUNK + 9), prepared(2, "ASW1", asw1_len)];

    let (flasher, primary, broadcast) = flasher_with_mocks(FlashOptions::default());
    flasher.flash(&blocks).await.unwrap();

    let sent = primary.sent();

    // Session setup through workshop code.
    assert_eq!(sent[0], vec![0x10, 0x03]);
    assert_eq!(sent[1], vec![0x22, 0xF1, 0x90]);
    assert_eq!(sent[2], vec![0x31, 0x01, 0x02, 0x03]);
    assert_eq!(sent[3], vec![0x10, 0x4F]);
    assert_eq!(sent[4], vec![0x27, 0x03]);
    assert_eq!(sent[5], vec![0x27, 0x04, 0x85, 0xD5, 0x2E, 0x27]);
    assert_eq!(sent[6][..3], [0x2E, 0xF1, 0x5A]);
    assert_eq!(sent[6].len(), 3 + 10);

    // CAL: erase, download, 4 chunks, exit, tester present, checksum.
    let mut at = 7;
    assert_eq!(sent[at], vec![0x31, 0x01, 0xFF, 0x00, 0x01, 0x05]);
    assert_eq!(
        sent[at + 1],
        {
            let mut frame = vec![0x34, 0xAA, 0x41, 0x05];
            frame.extend_from_slice(&(blocks[0].data.len() as u32).to_be_bytes());
            frame
        }
    );
    at += 2;
    for counter in 1..=4u8 {
        assert_eq!(sent[at][0], 0x36);
        assert_eq!(sent[at][1], counter);
        at += 1;
    }
    assert_eq!(sent[at], vec![0x37]);
    assert_eq!(sent[at + 1], vec![0x3E, 0x00]);
    assert_eq!(
        sent[at + 2],
        vec![0x31, 0x01, 0x02, 0x02, 0x01, 0x05, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF]
    );
    at += 3;

    // ASW1: same flow, with a wrapping transfer counter.
    assert_eq!(sent[at], vec![0x31, 0x01, 0xFF, 0x00, 0x01, 0x02]);
    assert_eq!(sent[at + 1][..4], [0x34, 0xAA, 0x41, 0x02]);
    at += 2;
    let transfer_count = asw1_len.div_ceil(CHUNK);
    assert_eq!(transfer_count, 260);
    let counters: Vec<u8> = sent[at..at + transfer_count]
        .iter()
        .map(|frame| {
            assert_eq!(frame[0], 0x36);
            frame[1]
        })
        .collect();
    let expected: Vec<u8> = (0..transfer_count).map(|i| ((i + 1) % 256) as u8).collect();
    assert_eq!(counters, expected);
    assert_eq!(counters[254], 0xFF);
    assert_eq!(counters[255], 0x00);
    assert_eq!(counters[256], 0x01);
    at += transfer_count;

    assert_eq!(sent[at], vec![0x37]);
    assert_eq!(sent[at + 1], vec![0x3E, 0x00]);
    assert_eq!(
        sent[at + 2],
        vec![0x31, 0x01, 0x02, 0x02, 0x01, 0x02, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF]
    );
    at += 3;

    // Teardown: dependencies, reset, clear.
    assert_eq!(sent[at], vec![0x31, 0x01, 0xFF, 0x01]);
    assert_eq!(sent[at + 1], vec![0x11, 0x01]);
    assert_eq!(sent[at + 2], vec![0x14, 0xFF, 0xFF, 0xFF]);
    assert_eq!(sent.len(), at + 3);

    // The broadcast channel frames the session with OBD clears.
    assert_eq!(broadcast.sent(), vec![vec![0x04], vec![0x04]]);
}

#[tokio::test(start_paused = true)]
async fn rejected_key_aborts_the_flash() {
    let info = FlashFamily::Simos.info().unwrap();
    let primary = Arc::new(MockTransport::new(&MockConfig::default()));
    // The controller refuses every key.
    primary.expect(vec![0x27, 0x04], vec![0x7F, 0x27, 0x35]);
    let flasher = Flasher::new(info, primary.clone(), FlashOptions::default());

    let blocks = vec![prepared(5, "CAL", CHUNK)];
    let err = flasher.flash(&blocks).await.unwrap_err();
    match err {
        FlashError::Uds(UdsError::NegativeResponse { service_id, nrc }) => {
            assert_eq!(service_id, 0x27);
            assert_eq!(nrc, NegativeResponseCode::InvalidKey);
        }
        other => panic!("expected a negative response, got {other}"),
    }

    // The flow never reached the workshop code or any download.
    let sent = primary.sent();
    assert!(sent.iter().all(|f| f[0] != 0x2E && f[0] != 0x34 && f[0] != 0x36));
}

#[tokio::test(start_paused = true)]
async fn patch_flow_erases_cal_and_sizes_chunks_by_address() {
    // Block 6 is a patch of block 1: uncompressed download, CAL erase
    // first, 8-byte writes inside the ECC windows.
    let mut block = prepared(6, "CBOOT_TEMP", 0x4100);
    block.should_erase = false;
    block.compression = 0x0;

    let (flasher, primary, _broadcast) = flasher_with_mocks(FlashOptions::default());
    // Reject the first chunk once; the flow resends it with the counter
    // still advancing.
    primary.expect(vec![0x36], vec![0x7F, 0x36, 0x73]);

    flasher.flash(&[block.clone()]).await.unwrap();
    let sent = primary.sent();

    // CAL (block 5) is erased even though the patch targets block 6.
    assert!(sent
        .iter()
        .any(|frame| frame == &[0x31, 0x01, 0xFF, 0x00, 0x01, 0x05]));
    // No erase of block 6 itself.
    assert!(!sent
        .iter()
        .any(|frame| frame == &[0x31, 0x01, 0xFF, 0x00, 0x01, 0x06]));

    // Download with compression 0, encryption 0xA.
    let download = sent.iter().find(|frame| frame[0] == 0x34).unwrap();
    assert_eq!(download[..4], [0x34, 0x0A, 0x41, 0x06]);

    let transfers: Vec<&Vec<u8>> = sent.iter().filter(|frame| frame[0] == 0x36).collect();
    // 64 full chunks below the ECC window, 32 short chunks inside it,
    // plus one resend of the rejected first chunk.
    assert_eq!(transfers.len(), 64 + 32 + 1);

    // The rejected chunk is resent byte-identical with a new counter.
    assert_eq!(transfers[0][2..], transfers[1][2..]);
    assert_eq!(transfers[0][1], 1);
    assert_eq!(transfers[1][1], 2);

    let full = transfers.iter().filter(|f| f.len() == 2 + 0x100).count();
    let short = transfers.iter().filter(|f| f.len() == 2 + 0x8).count();
    assert_eq!(full, 65);
    assert_eq!(short, 32);

    // Counters advance monotonically across rejects and chunks.
    let counters: Vec<u8> = transfers.iter().map(|f| f[1]).collect();
    let expected: Vec<u8> = (1..=97u8).collect();
    assert_eq!(counters, expected);

    // The patch flow ends at transfer exit: no checksum routine for the
    // patched block.
    assert!(!sent
        .iter()
        .any(|frame| frame.starts_with(&[0x31, 0x01, 0x02, 0x02, 0x01, 0x06])));
}

#[tokio::test(start_paused = true)]
async fn box_code_mismatch_is_a_preflight_failure() {
    let options = FlashOptions {
        verify_box_code: true,
        ..FlashOptions::default()
    };
    let (flasher, primary, _broadcast) = flasher_with_mocks(options);
    let mut reply = vec![0x62, 0xF1, 0x87];
    reply.extend_from_slice(b"5Q0906259AA");
    primary.expect(vec![0x22, 0xF1, 0x87], reply);

    let blocks = vec![prepared(5, "CAL", CHUNK)];
    let err = flasher.flash(&blocks).await.unwrap_err();
    match err {
        FlashError::BoxCodeMismatch { file, ecu } => {
            assert_eq!(file, "8V0906259H");
            assert_eq!(ecu, "5Q0906259AA");
        }
        other => panic!("expected box-code mismatch, got {other}"),
    }

    // Nothing was erased or downloaded.
    let sent = primary.sent();
    assert!(!sent.iter().any(|frame| frame[0] == 0x31 || frame[0] == 0x34));
}

#[tokio::test(start_paused = true)]
async fn transmission_family_flash_skips_compression() {
    let info = FlashFamily::Dsg.info().unwrap();
    let primary = Arc::new(MockTransport::new(&MockConfig::default()));
    let flasher = Flasher::new(info, primary.clone(), FlashOptions::default());

    let block = PreparedBlock {
        number: 3,
        name: "CAL".to_string(),
        box_code: String::new(),
        compression: 0x0,
        encryption: 0x1,
        should_erase: true,
        uds_checksum: [0x01, 0x02, 0x03, 0x04],
        data: vec![0x5A; 0x5FD * 2],
    };
    flasher.flash(&[block]).await.unwrap();

    let sent = primary.sent();
    // DFI carries compression 0, encryption 1.
    let download = sent.iter().find(|frame| frame[0] == 0x34).unwrap();
    assert_eq!(download[..4], [0x34, 0x01, 0x41, 0x03]);
    // Exactly two full chunks at the family transfer size.
    let transfers: Vec<_> = sent.iter().filter(|frame| frame[0] == 0x36).collect();
    assert_eq!(transfers.len(), 2);
    assert!(transfers.iter().all(|frame| frame.len() == 2 + 0x5FD));
}

#[tokio::test(start_paused = true)]
async fn tuner_tag_rides_on_tester_present_above_block_one() {
    let options = FlashOptions {
        tuner_tag: "TT".to_string(),
        ..FlashOptions::default()
    };
    let (flasher, primary, _broadcast) = flasher_with_mocks(options);

    let cboot = prepared(1, "CBOOT", CHUNK);
    let asw = prepared(2, "ASW1", CHUNK);
    flasher.flash(&[cboot, asw]).await.unwrap();

    let tester_presents: Vec<_> = primary
        .sent()
        .into_iter()
        .filter(|frame| frame[0] == 0x3E)
        .collect();
    // Block 1 gets the plain tester present, block 2 carries the tag.
    assert_eq!(tester_presents[0], vec![0x3E, 0x00]);
    assert_eq!(tester_presents[1], vec![0x3E, 0x00, b'T', b'T']);
}

#[tokio::test]
async fn identification_sweep_reads_the_registry() {
    let info = FlashFamily::Simos.info().unwrap();
    let primary = Arc::new(MockTransport::new(&MockConfig::default()));
    let mut vin = vec![0x62, 0xF1, 0x90];
    vin.extend_from_slice(b"WVWZZZ1KZAW000001");
    primary.expect(vec![0x22, 0xF1, 0x90], vin);
    // One DID refused; the sweep skips it.
    primary.expect(vec![0x22, 0xF1, 0x97], vec![0x7F, 0x22, 0x31]);

    let flasher = Flasher::new(info, primary.clone(), FlashOptions::default());
    let idents = flasher.read_ecu_info().await.unwrap();

    let vin = idents.iter().find(|i| i.key == "vin").unwrap();
    assert_eq!(vin.value, "WVWZZZ1KZAW000001");
    assert!(idents.iter().all(|i| i.key != "system_name"));
    assert!(idents.iter().any(|i| i.key == "box_code"));
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_at_the_first_checkpoint() {
    let (flasher, primary, _broadcast) = flasher_with_mocks(FlashOptions::default());
    flasher.cancel_token().store(true, std::sync::atomic::Ordering::SeqCst);

    let blocks = vec![prepared(5, "CAL", CHUNK)];
    let err = flasher.flash(&blocks).await.unwrap_err();
    assert!(matches!(err, FlashError::Cancelled));
    // The cancel fired at the first checkpoint, before any UDS traffic.
    assert!(primary.sent().is_empty());
    assert!(!primary.is_open());
}
