//! TLS deliveries split across calls, two-phase END_STREAM and teardown

use h2_telemetry::{
    flags, frame_type, BoundedReader, ConnTuple, H2FrameHeader, StreamKey, TlsInput, TlsOutcome,
};

use crate::support::{
    batch_decoder, client, frame, frame_header, headers_frame, recording_decoder, RecordingDecoder, StepClock,
};

fn deliver(decoder: &mut RecordingDecoder<'_>, tuple: ConnTuple, bytes: Vec<u8>) -> TlsOutcome {
    let mut input = TlsInput::new(tuple, bytes, 0);
    decoder.decode_tls(&mut input)
}

#[test]
fn test_header_only_delivery_is_deferred() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    let outcome = deliver(&mut decoder, client(), frame_header(frame_type::HEADERS, flags::END_HEADERS, 1, 1));
    let expected = H2FrameHeader {
        length: 1,
        frame_type: frame_type::HEADERS,
        flags: flags::END_HEADERS,
        stream_id: 1,
    };
    assert_eq!(outcome, TlsOutcome::Deferred(expected));

    let TlsOutcome::Processed(report) = deliver(&mut decoder, client(), vec![0x82]) else {
        panic!("expected the deferred frame to be processed");
    };
    assert_eq!(report.header, expected);
    assert_eq!(report.processed_headers, 1);

    assert_eq!(decoder.pending_tls_frames(), 0);
    let stream = decoder.streams().get(&StreamKey::new(client(), 1)).unwrap();
    assert_eq!(stream.request_method.map(|label| label.value), Some("GET"));
}

#[test]
fn test_payload_of_other_length_does_not_resume() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    let mut header = TlsInput::new(client(), frame_header(frame_type::HEADERS, flags::END_HEADERS, 1, 1), 0);
    assert!(matches!(decoder.decode_tls(&mut header), TlsOutcome::Deferred(_)));

    let mut other = TlsInput::new(client(), vec![0x82, 0x86], 0);
    assert_eq!(decoder.decode_tls(&mut other), TlsOutcome::NotRelevant);
    assert_eq!(decoder.pending_tls_frames(), 1);
    assert!(decoder.streams().is_empty());
}

#[test]
fn test_deferred_state_is_per_connection() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);
    let other = ConnTuple::new("10.0.0.9:40000".parse().unwrap(), "10.0.0.2:443".parse().unwrap());

    let mut header = TlsInput::new(client(), frame_header(frame_type::HEADERS, flags::END_HEADERS, 1, 1), 0);
    decoder.decode_tls(&mut header);

    let mut payload = TlsInput::new(other, vec![0x82], 0);
    assert_eq!(decoder.decode_tls(&mut payload), TlsOutcome::NotRelevant);
    assert_eq!(decoder.pending_tls_frames(), 1);
}

#[test]
fn test_split_literal_then_indexed_reference() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    deliver(&mut decoder, client(), frame_header(frame_type::HEADERS, flags::END_HEADERS, 1, 5));
    deliver(&mut decoder, client(), vec![0x44, 0x03, b'/', b'v', b'1']);
    deliver(&mut decoder, client(), frame_header(frame_type::HEADERS, flags::END_HEADERS, 3, 1));
    deliver(&mut decoder, client(), vec![0xbe]);

    for stream_id in [1, 3] {
        let stream = decoder.streams().get(&StreamKey::new(client(), stream_id)).unwrap();
        assert_eq!(stream.path(), b"/v1", "stream {stream_id}");
    }
}

#[test]
fn test_declared_length_limits_delivery() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    // The backing buffer holds the payload too, but only the header is declared.
    let bytes = headers_frame(flags::END_HEADERS, 1, &[0x82]);
    let reader = BoundedReader::new(bytes).with_declared_len(9);
    let mut input = TlsInput::with_reader(client(), reader, 0);

    assert!(matches!(decoder.decode_tls(&mut input), TlsOutcome::Deferred(_)));
}

#[test]
fn test_irrelevant_frames() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    for bytes in [
        frame(frame_type::SETTINGS, 0, 0, &[]),
        frame(frame_type::DATA, 0, 1, b"body"),
        frame(frame_type::WINDOW_UPDATE, 0, 0, &[0, 0, 0x10, 0]),
        vec![0; 9],
    ] {
        let mut input = TlsInput::new(client(), bytes, 0);
        assert_eq!(decoder.decode_tls(&mut input), TlsOutcome::NotRelevant);
    }
    assert!(decoder.streams().is_empty());
    assert_eq!(decoder.pending_tls_frames(), 0);
}

#[test]
fn test_tls_state_table_is_bounded() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock).with_max_tls_states(1);

    let other = ConnTuple::new("10.0.0.9:40000".parse().unwrap(), "10.0.0.2:443".parse().unwrap());
    for tuple in [client(), other] {
        let mut input = TlsInput::new(tuple, frame_header(frame_type::HEADERS, flags::END_HEADERS, 1, 4), 0);
        assert!(matches!(decoder.decode_tls(&mut input), TlsOutcome::Deferred(_)));
    }
    assert_eq!(decoder.pending_tls_frames(), 1);
}

#[test]
fn test_request_and_response_complete_stream() {
    let clock = StepClock::new();
    let mut decoder = batch_decoder(&clock);
    let server = client().flipped();

    let request = headers_frame(flags::END_HEADERS | flags::END_STREAM, 1, &[0x82, 0x44, 0x02, b'/', b'a']);
    let mut input = TlsInput::new(client(), request, 7);
    decoder.decode_tls(&mut input);
    assert!(decoder.finisher().pending().is_empty());
    assert_eq!(decoder.streams().len(), 1);

    let response = headers_frame(flags::END_HEADERS | flags::END_STREAM, 1, &[0x88]);
    let mut input = TlsInput::new(server, response, 9);
    let TlsOutcome::Processed(report) = decoder.decode_tls(&mut input) else {
        panic!("expected a processed frame");
    };
    assert!(report.end_of_stream);

    assert!(decoder.streams().is_empty());
    let done = decoder.finisher_mut().drain();
    assert_eq!(done.len(), 1);
    let record = &done[0];
    assert_eq!(record.request_method.map(|label| label.value), Some("GET"));
    assert_eq!(record.response_status_code.map(|label| label.value), Some("200"));
    assert_eq!(record.path(), b"/a");
    assert!(record.request_end_of_stream);
    assert!(record.response_last_seen > record.request_started);
    assert_eq!(record.tuple, Some(client().normalized()));
    assert_eq!(record.tags, 9);
}

#[test]
fn test_forget_connection_drops_both_directions() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    let mut input = TlsInput::new(client(), headers_frame(flags::END_HEADERS, 1, &[0x44, 0x02, b'/', b'a']), 0);
    decoder.decode_tls(&mut input);
    let mut input = TlsInput::new(client(), frame_header(frame_type::HEADERS, flags::END_HEADERS, 3, 1), 0);
    decoder.decode_tls(&mut input);
    assert_eq!(decoder.dynamic().entries(), 1);
    assert_eq!(decoder.pending_tls_frames(), 1);

    decoder.forget_connection(&client().flipped());

    assert_eq!(decoder.dynamic().peek_counter(&client()), None);
    assert_eq!(decoder.dynamic().entries(), 0);
    assert_eq!(decoder.pending_tls_frames(), 0);
}

#[test]
fn test_delivery_starting_mid_buffer() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    let mut bytes = vec![0xde, 0xad, 0xbe];
    bytes.extend(headers_frame(flags::END_HEADERS, 1, &[0x83]));
    let reader = BoundedReader::new(bytes).with_offset(3);
    let mut input = TlsInput::with_reader(client(), reader, 0);

    assert!(matches!(decoder.decode_tls(&mut input), TlsOutcome::Processed(_)));
    let stream = decoder.streams().get(&StreamKey::new(client(), 1)).unwrap();
    assert_eq!(stream.request_method.map(|label| label.value), Some("POST"));
}
