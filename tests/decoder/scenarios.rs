//! End-to-end scenarios over single TLS deliveries

use h2_telemetry::{
    flags, BoundedReader, DecodeError, DynamicIndex, DynamicTable, HpackStaticTable, Http2Stream, StaticTable, StreamKey,
    TlsInput, TlsOutcome, CONNECTION_PREFACE, FRAME_HEADER_SIZE, H_FILT, H_PROC,
};

use crate::support::{client, headers_frame, recording_decoder, RecordingDecoder, StepClock};

const END_HEADERS_AND_STREAM: u8 = flags::END_HEADERS | flags::END_STREAM;

fn deliver(decoder: &mut RecordingDecoder<'_>, bytes: Vec<u8>, tags: u64) -> TlsOutcome {
    let mut input = TlsInput::new(client(), bytes, tags);
    decoder.decode_tls(&mut input)
}

#[test]
fn test_preface_only() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    let mut input = TlsInput::new(client(), CONNECTION_PREFACE.to_vec(), 0);
    assert_eq!(decoder.decode_tls(&mut input), TlsOutcome::NotRelevant);

    assert_eq!(input.reader.offset(), 24);
    assert!(decoder.streams().is_empty());
    assert!(decoder.finisher().calls.is_empty());
}

#[test]
fn test_static_method_with_end_stream() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    let bytes = headers_frame(END_HEADERS_AND_STREAM, 1, &[0x82]);
    assert_eq!(&bytes[..FRAME_HEADER_SIZE], &[0x00, 0x00, 0x01, 0x01, 0x05, 0x00, 0x00, 0x00, 0x01]);

    let TlsOutcome::Processed(report) = deliver(&mut decoder, bytes, 42) else {
        panic!("expected a processed frame");
    };
    assert_eq!(report.interesting_headers, 1);
    assert_eq!(report.processed_headers, 1);
    assert!(report.end_of_stream);
    assert_eq!(report.stop, None);

    let key = StreamKey::new(client(), 1);
    let stream = decoder.streams().get(&key).unwrap();
    assert_eq!(stream.request_method, HpackStaticTable.get(2));
    assert_ne!(stream.request_started, 0);
    assert_eq!(decoder.finisher().calls, vec![(key, 42)]);
}

#[test]
fn test_path_literal_with_incremental_indexing() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);
    assert_eq!(decoder.dynamic().peek_counter(&client()).unwrap_or(0), 0);

    let outcome = deliver(&mut decoder, headers_frame(flags::END_HEADERS, 1, &[0x44, 0x02, b'/', b'a']), 0);
    let TlsOutcome::Processed(report) = outcome else {
        panic!("expected a processed frame");
    };
    assert_eq!(report.interesting_headers, 1);
    assert!(!report.end_of_stream);

    assert_eq!(decoder.dynamic().peek_counter(&client()), Some(1));
    let entry = decoder.dynamic().get(&DynamicIndex::new(client(), 0)).unwrap();
    assert_eq!(entry.string_len, 2);
    assert_eq!(entry.as_bytes(), b"/a");

    let stream = decoder.streams().get(&StreamKey::new(client(), 1)).unwrap();
    assert_eq!(stream.path_size, 2);
    assert_eq!(&stream.request_path[..2], b"/a");
}

#[test]
fn test_indexed_reference_to_new_dynamic_entry() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    deliver(&mut decoder, headers_frame(flags::END_HEADERS, 1, &[0x44, 0x02, b'/', b'a']), 0);
    let TlsOutcome::Processed(report) = deliver(&mut decoder, headers_frame(flags::END_HEADERS, 3, &[0xbe]), 0) else {
        panic!("expected a processed frame");
    };
    assert_eq!(report.processed_headers, 1);

    let stream = decoder.streams().get(&StreamKey::new(client(), 3)).unwrap();
    assert_eq!(stream.path(), b"/a");
    assert_eq!(decoder.dynamic().peek_counter(&client()), Some(1));
}

#[test]
fn test_truncated_literal() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    let mut input = TlsInput::new(client(), headers_frame(flags::END_HEADERS, 1, &[0x44, 0x05, b'/', b'a']), 0);
    let TlsOutcome::Processed(report) = decoder.decode_tls(&mut input) else {
        panic!("expected a processed frame");
    };

    assert_eq!(report.interesting_headers, 0);
    assert_eq!(report.processed_headers, 0);
    assert!(matches!(report.stop, Some(DecodeError::Truncated { .. })));
    assert!(input.reader.offset() <= input.reader.len());

    let stream = decoder.streams().get(&StreamKey::new(client(), 1)).unwrap();
    assert_eq!(*stream, Http2Stream::default());
    assert_eq!(decoder.dynamic().entries(), 0);
}

#[test]
fn test_descriptor_capacity_overflow() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    let payload = vec![0x82; H_FILT + 5];
    let mut input = TlsInput::new(client(), headers_frame(flags::END_HEADERS, 1, &payload), 0);
    let TlsOutcome::Processed(report) = decoder.decode_tls(&mut input) else {
        panic!("expected a processed frame");
    };

    assert_eq!(report.filter_steps, H_FILT);
    assert_eq!(report.interesting_headers, H_PROC);
    assert_eq!(report.processed_headers, H_PROC);
    assert_eq!(report.stop, None);
    assert_eq!(input.reader.offset() as usize, FRAME_HEADER_SIZE + H_FILT);

    let stream = decoder.streams().get(&StreamKey::new(client(), 1)).unwrap();
    assert_eq!(stream.request_method.map(|label| label.value), Some("GET"));
}

#[test]
fn test_status_and_index_path() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    // :path /index.html, then :status 404
    deliver(&mut decoder, headers_frame(flags::END_HEADERS, 5, &[0x85, 0x8d]), 0);

    let stream = decoder.streams().get(&StreamKey::new(client(), 5)).unwrap();
    assert_eq!(stream.path(), b"/index.html");
    assert_eq!(stream.response_status_code.map(|label| label.value), Some("404"));
    assert_eq!(stream.request_started, 0);
}

#[test]
fn test_uninteresting_static_fields_ignored() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    // :scheme https, :authority (static 1), accept-encoding
    let TlsOutcome::Processed(report) = deliver(&mut decoder, headers_frame(flags::END_HEADERS, 1, &[0x87, 0x81, 0x90]), 0)
    else {
        panic!("expected a processed frame");
    };
    assert_eq!(report.interesting_headers, 0);
    assert_eq!(report.filter_steps, 3);
}

#[test]
fn test_unmapped_tail_faults() {
    let clock = StepClock::new();
    let mut decoder = recording_decoder(&clock);

    // Declared length 12, only 10 bytes behind it.
    let mut bytes = headers_frame(flags::END_HEADERS, 1, &[0x82]);
    bytes[2] = 3;
    let reader = BoundedReader::new(bytes).with_declared_len(12);
    let mut input = TlsInput::with_reader(client(), reader, 0);

    let TlsOutcome::Processed(report) = decoder.decode_tls(&mut input) else {
        panic!("expected a processed frame");
    };
    assert_eq!(report.interesting_headers, 1);
    assert_eq!(report.processed_headers, 1);
    assert_eq!(report.stop, Some(DecodeError::Fault { offset: 10 }));
    assert!(!report.stop.unwrap().is_benign());
}
