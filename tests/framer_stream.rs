use meshpipe::meshtastic::framer::{encode_frame, FrameError, StreamFramer, MAX_FRAME_LEN};
use meshpipe::protobuf::meshtastic_generated as proto;
use prost::Message;

fn want_config_frame() -> (Vec<u8>, Vec<u8>) {
    let msg = proto::ToRadio {
        payload_variant: Some(proto::to_radio::PayloadVariant::WantConfigId(42)),
    };
    let payload = msg.encode_to_vec();
    (encode_frame(&payload).unwrap(), payload)
}

#[test]
fn frame_split_across_reads() {
    let (frame, payload) = want_config_frame();
    let mut framer = StreamFramer::new();
    for byte in &frame[..frame.len() - 1] {
        framer.push(std::slice::from_ref(byte));
        assert_eq!(framer.next_frame(), None);
    }
    framer.push(&frame[frame.len() - 1..]);
    assert_eq!(framer.next_frame(), Some(payload));
    assert_eq!(framer.pending(), 0);
}

#[test]
fn console_text_between_frames() {
    let (frame, payload) = want_config_frame();
    let mut stream = b"INFO  | boot done\r\n".to_vec();
    stream.extend_from_slice(&frame);
    stream.extend_from_slice(b"DEBUG | radio idle\n");
    stream.extend_from_slice(&frame);

    let mut framer = StreamFramer::new();
    framer.push(&stream);
    assert_eq!(framer.next_frame(), Some(payload.clone()));
    assert_eq!(framer.next_frame(), Some(payload));
    assert_eq!(framer.next_frame(), None);
    assert_eq!(
        framer.take_console_lines(),
        vec!["INFO  | boot done".to_string(), "DEBUG | radio idle".to_string()]
    );
}

#[test]
fn payload_decodes_back_to_the_message() {
    let (frame, _) = want_config_frame();
    let mut framer = StreamFramer::new();
    framer.push(&frame);
    let decoded = proto::ToRadio::decode(&framer.next_frame().unwrap()[..]).unwrap();
    assert_eq!(
        decoded.payload_variant,
        Some(proto::to_radio::PayloadVariant::WantConfigId(42))
    );
}

#[test]
fn bogus_header_resynchronises() {
    let (frame, payload) = want_config_frame();
    // declares 0xFFFF bytes, far over the limit
    let mut stream = vec![0x94, 0xC3, 0xFF, 0xFF, 0x94, 0x00];
    stream.extend_from_slice(&frame);

    let mut framer = StreamFramer::new();
    framer.push(&stream);
    assert_eq!(framer.next_frame(), Some(payload));
}

#[test]
fn oversized_payload_is_not_framed() {
    let big = vec![0u8; MAX_FRAME_LEN + 1];
    assert_eq!(
        encode_frame(&big),
        Err(FrameError::TooLarge {
            len: MAX_FRAME_LEN + 1,
            max: MAX_FRAME_LEN
        })
    );
    assert_eq!(encode_frame(&[]), Err(FrameError::Empty));
}
