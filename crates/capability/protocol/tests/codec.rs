use pmac_protocol::frame::{ascii::ACK, opcode};
use pmac_protocol::{CodecConfig, MemoryTransport, PmacCodec, Termination};

fn codec(device: &MemoryTransport, flush_before_write: bool) -> PmacCodec {
    let config = CodecConfig {
        timeout_ms: 50,
        max_reply_bytes: 1024,
        flush_before_write,
    };
    PmacCodec::new(Box::new(device.clone()), config)
}

fn opcodes(device: &MemoryTransport) -> Vec<u8> {
    device.sent_frames().iter().map(|frame| frame.opcode).collect()
}

#[tokio::test]
async fn multi_value_reply_ends_with_ack() {
    let device = MemoryTransport::new();
    device.push_reply(Some(b"12\r34\r\x06"));
    let mut codec = codec(&device, false);

    let exchange = codec.write_read(b"P1 P2").await.unwrap();
    assert_eq!(exchange.bytes_written, 5);
    assert_eq!(exchange.bytes_read(), 7);
    assert_eq!(exchange.reply.as_bytes().last(), Some(&ACK));
    assert_eq!(exchange.reply.text(), "12\r34\r");
    assert_eq!(device.command_texts(), vec!["P1 P2".to_string()]);
}

#[tokio::test]
async fn error_reply_completes_at_cr() {
    let device = MemoryTransport::new();
    device.push_reply(Some(b"\x07ERR003\r"));
    let mut codec = codec(&device, false);

    let reply = codec.write_read(b"Q99999").await.unwrap().reply;
    assert_eq!(reply.len(), 9);
    assert_eq!(reply.termination(), Termination::Block);
    assert_eq!(reply.device_error_code().as_deref(), Some("ERR003"));
}

#[tokio::test]
async fn control_character_uses_control_frame() {
    let device = MemoryTransport::new();
    device.push_reply(Some(b"\x06"));
    let mut codec = codec(&device, false);

    codec.write_read(&[0x10]).await.unwrap();
    let frames = device.sent_frames();
    assert_eq!(frames[0].opcode, opcode::CTRL_RESPONSE);
    assert_eq!(frames[0].value, 0x10);
    assert!(frames[0].payload.is_empty());
    assert!(device.sent_commands()[0].control);
}

#[tokio::test]
async fn held_reply_is_fetched_after_probe() {
    let device = MemoryTransport::new();
    device.set_immediate_limit(Some(0));
    device.push_reply(Some(b"7\r\x06"));
    let mut codec = codec(&device, false);

    let reply = codec.write_read(b"M100").await.unwrap().reply;
    assert_eq!(reply.text(), "7\r");
    assert_eq!(
        opcodes(&device),
        vec![opcode::GET_RESPONSE, opcode::READ_READY, opcode::GET_BUFFER]
    );
}

#[tokio::test]
async fn unterminated_chunk_is_followed_by_probe_and_fetch() {
    let device = MemoryTransport::new();
    device.set_immediate_limit(Some(3));
    device.push_reply(Some(b"12\r34\r\x06"));
    let mut codec = codec(&device, false);

    let reply = codec.write_read(b"P1 P2").await.unwrap().reply;
    assert_eq!(reply.as_bytes(), b"12\r34\r\x06");
    assert!(reply.is_complete());
    assert_eq!(
        opcodes(&device),
        vec![opcode::GET_RESPONSE, opcode::READ_READY, opcode::GET_BUFFER]
    );
}

#[tokio::test]
async fn silence_is_a_timeout() {
    let device = MemoryTransport::new();
    device.push_reply(None);
    let mut codec = codec(&device, false);

    let err = codec.write_read(b"P1").await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(opcodes(&device), vec![opcode::GET_RESPONSE, opcode::READ_READY]);
}

#[tokio::test]
async fn partial_reply_then_silence_is_incomplete() {
    let device = MemoryTransport::new();
    device.push_reply(Some(b"12\r"));
    let mut codec = codec(&device, false);

    let reply = codec.write_read(b"P1 P2").await.unwrap().reply;
    assert_eq!(reply.termination(), Termination::Incomplete);
    assert_eq!(reply.as_bytes(), b"12\r");
}

#[tokio::test]
async fn trailing_bytes_kept_until_flush() {
    let device = MemoryTransport::new();
    device.push_reply(Some(b"1\r\x06\x07ERR"));
    let mut codec = codec(&device, false);

    let reply = codec.write_read(b"P1").await.unwrap().reply;
    assert_eq!(reply.text(), "1\r");
    assert_eq!(codec.pending_len(), 4);

    codec.flush().await.unwrap();
    assert_eq!(codec.pending_len(), 0);
    assert_eq!(device.sent_frames().last().map(|f| f.opcode), Some(opcode::FLUSH));
}

#[tokio::test]
async fn truncated_reply_does_not_leak_into_next_reply() {
    let device = MemoryTransport::new();
    device.push_reply(Some(b"12345\r\x06"));
    device.push_reply(Some(b"9\r\x06"));
    let config = CodecConfig {
        timeout_ms: 50,
        max_reply_bytes: 4,
        flush_before_write: false,
    };
    let mut codec = PmacCodec::new(Box::new(device.clone()), config);

    let first = codec.write_read(b"P1").await.unwrap().reply;
    assert_eq!(first.as_bytes(), b"123\x06");
    assert_eq!(first.termination(), Termination::Truncated);
    assert_eq!(codec.pending_len(), 0);

    let second = codec.write_read(b"P2").await.unwrap().reply;
    assert_eq!(second.text(), "9\r");
    assert_eq!(second.termination(), Termination::Ack);
}

#[tokio::test]
async fn failed_write_reports_nothing_written() {
    let device = MemoryTransport::new();
    device.push_reply(Some(b"1\r\x06"));
    let mut codec = codec(&device, false);
    codec.write_read(b"P1").await.unwrap();
    assert_eq!(codec.last_bytes_written(), 2);

    device.disconnect(true);
    assert!(codec.write_read(b"P1 P2").await.is_err());
    assert_eq!(codec.last_bytes_written(), 0);
}

#[tokio::test]
async fn flush_before_write_discards_stale_bytes() {
    let device = MemoryTransport::new();
    device.inject(b"stale\r\x06");
    device.set_variable("I10", "3713707");
    let mut codec = codec(&device, true);

    let reply = codec.write_read(b"I10").await.unwrap().reply;
    assert_eq!(reply.text(), "3713707\r");
    assert_eq!(opcodes(&device), vec![opcode::FLUSH, opcode::GET_RESPONSE]);
}

#[tokio::test]
async fn disconnection_is_a_transport_error() {
    let device = MemoryTransport::new();
    device.disconnect(true);
    let mut codec = codec(&device, false);

    let err = codec.write_read(b"P1").await.unwrap_err();
    assert!(err.is_transport());
    assert!(codec.reconnect().await.is_err());

    device.allow_reconnect();
    codec.reconnect().await.unwrap();
    assert!(device.is_connected());
    assert_eq!(device.reconnect_count(), 1);
}
