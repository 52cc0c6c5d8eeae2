//! Frame orchestrator.
//!
//! Ties the scanner, filter and binder to the storage collaborators. Two entry
//! points exist:
//! - [`Http2Decoder::decode_tls`]: one relevant frame per delivery of
//!   decrypted bytes, with re-entry when a delivery held only a frame header
//! - [`Http2Decoder::decode_plaintext`]: several frames per cleartext
//!   delivery, each payload skipped precisely
//!
//! Neither returns errors. A report says how far decoding got.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::binder::{process_headers, BindContext};
use crate::clock::{Clock, MonotonicClock};
use crate::error::DecodeError;
use crate::filter::{filter_relevant_headers, HeaderBatch};
use crate::frame::{read_frame_header, scan_relevant_frame, skip_preface, H2FrameHeader, FRAME_HEADER_SIZE};
use crate::reader::{BoundedReader, TlsInput};
use crate::stream::{BatchFinisher, EndOfStream, Http2Stream, InMemoryStreams, StreamDisposition, StreamTable};
use crate::tables::{DynamicTable, HpackStaticTable, InMemoryDynamicTable, StaticTable};
use crate::types::{ConnTuple, StreamKey, MAX_FRAMES_ITERATIONS, MAX_FRAMES_TO_FILTER};

/// Default number of frame headers awaiting their payload.
pub const DEFAULT_MAX_TLS_STATES: usize = 1024;

/// What happened to one relevant frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub header: H2FrameHeader,
    /// Descriptors the filter extracted.
    pub interesting_headers: usize,
    /// Descriptors the binder applied.
    pub processed_headers: usize,
    /// Filter loop iterations.
    pub filter_steps: usize,
    /// The frame was handed to the end-of-stream collaborator.
    pub end_of_stream: bool,
    /// First failure, if decoding stopped early.
    pub stop: Option<DecodeError>,
}

impl FrameReport {
    fn new(header: H2FrameHeader) -> Self {
        Self {
            header,
            interesting_headers: 0,
            processed_headers: 0,
            filter_steps: 0,
            end_of_stream: false,
            stop: None,
        }
    }
}

/// Result of one TLS delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsOutcome {
    /// No relevant frame header at the offset.
    NotRelevant,
    /// The delivery was a lone relevant frame header; its payload is expected
    /// in a later delivery of exactly `header.length` bytes.
    Deferred(H2FrameHeader),
    Processed(FrameReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TlsStateKey {
    tuple: ConnTuple,
    length: u32,
}

/// A deferred frame header: the decoder has seen a HEADERS or DATA frame
/// header alone and waits for its payload.
#[derive(Debug, Clone, Copy)]
struct TlsFrameState {
    header: H2FrameHeader,
}

/// HTTP/2 telemetry decoder.
///
/// Generic over its collaborators; [`Http2Decoder::new`] wires the bounded
/// in-memory implementations.
#[derive(Debug)]
pub struct Http2Decoder<
    S = HpackStaticTable,
    D = InMemoryDynamicTable,
    T = InMemoryStreams,
    F = BatchFinisher,
    C = MonotonicClock,
> {
    static_table: S,
    dynamic: D,
    streams: T,
    finisher: F,
    clock: C,
    tls_states: HashMap<TlsStateKey, TlsFrameState>,
    max_tls_states: usize,
    headers: HeaderBatch,
}

impl Default for Http2Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Http2Decoder {
    pub fn new() -> Self {
        Self::with_parts(
            HpackStaticTable,
            InMemoryDynamicTable::default(),
            InMemoryStreams::default(),
            BatchFinisher::default(),
            MonotonicClock,
        )
    }
}

impl<S, D, T, F, C> Http2Decoder<S, D, T, F, C>
where
    S: StaticTable,
    D: DynamicTable,
    T: StreamTable,
    F: EndOfStream,
    C: Clock,
{
    pub fn with_parts(static_table: S, dynamic: D, streams: T, finisher: F, clock: C) -> Self {
        Self {
            static_table,
            dynamic,
            streams,
            finisher,
            clock,
            tls_states: HashMap::new(),
            max_tls_states: DEFAULT_MAX_TLS_STATES,
            headers: HeaderBatch::new(),
        }
    }

    pub fn with_max_tls_states(mut self, max: usize) -> Self {
        self.max_tls_states = max;
        self
    }

    pub fn dynamic(&self) -> &D {
        &self.dynamic
    }

    pub fn streams(&self) -> &T {
        &self.streams
    }

    pub fn finisher(&self) -> &F {
        &self.finisher
    }

    pub fn finisher_mut(&mut self) -> &mut F {
        &mut self.finisher
    }

    /// Frame headers still waiting for their payload.
    pub fn pending_tls_frames(&self) -> usize {
        self.tls_states.len()
    }

    /// Decode one delivery of decrypted bytes.
    ///
    /// Only the first frame of the delivery is examined. Its payload is run
    /// through header processing whatever its type, so a DATA frame with
    /// END_STREAM has its body scanned as a header block.
    pub fn decode_tls(&mut self, input: &mut TlsInput) -> TlsOutcome {
        debug!(tuple = %input.tuple, len = input.reader.len(), off = input.reader.offset(), "tls delivery");

        let key = TlsStateKey {
            tuple: input.tuple,
            length: input.reader.len(),
        };
        if let Some(state) = self.tls_states.remove(&key) {
            trace!(stream_id = state.header.stream_id, "payload of a deferred frame");
            return TlsOutcome::Processed(self.parse_frame_tls(input, &state.header));
        }

        let header = match scan_relevant_frame(&mut input.reader) {
            Ok(Some(header)) => header,
            Ok(None) | Err(_) => {
                trace!("not a relevant frame");
                return TlsOutcome::NotRelevant;
            }
        };

        if input.reader.len() as usize == FRAME_HEADER_SIZE {
            self.defer(input.tuple, header);
            return TlsOutcome::Deferred(header);
        }

        TlsOutcome::Processed(self.parse_frame_tls(input, &header))
    }

    /// Decode one delivery of cleartext HTTP/2.
    ///
    /// Walks up to `MAX_FRAMES_TO_FILTER` frame headers and processes up to
    /// `MAX_FRAMES_ITERATIONS` relevant frames. Only HEADERS payloads are
    /// decoded; all other payloads are skipped.
    pub fn decode_plaintext(&mut self, tuple: ConnTuple, buf: impl Into<Bytes>) -> Vec<FrameReport> {
        let mut reader = BoundedReader::new(buf);
        skip_preface(&mut reader);

        let mut frames: Vec<(H2FrameHeader, u32)> = Vec::with_capacity(MAX_FRAMES_ITERATIONS);
        for _ in 0..MAX_FRAMES_TO_FILTER {
            if frames.len() >= MAX_FRAMES_ITERATIONS {
                break;
            }
            let header = match read_frame_header(&mut reader) {
                Ok(header) => header,
                Err(err) => {
                    trace!(%err, "frame walk stopped");
                    break;
                }
            };
            if header.is_relevant() {
                frames.push((header, reader.offset()));
            }
            if reader.advance(header.length).is_err() {
                break;
            }
        }
        debug!(%tuple, frames = frames.len(), "plaintext frames");

        let mut reports = Vec::with_capacity(frames.len());
        for (header, offset) in frames {
            reader.set_offset(offset);
            reports.push(self.parse_frame_plaintext(&mut reader, tuple, &header));
            if reader.offset() >= reader.len() {
                break;
            }
        }
        reports
    }

    /// Drop all per-connection state: the dynamic counter and captured paths
    /// of both directions, the connection's stream records, and any frame
    /// header awaiting its payload.
    pub fn forget_connection(&mut self, tuple: &ConnTuple) {
        let flipped = tuple.flipped();
        debug!(%tuple, "forgetting connection");
        self.dynamic.forget_connection(tuple);
        self.dynamic.forget_connection(&flipped);
        self.streams.forget_connection(tuple);
        self.tls_states
            .retain(|key, _| key.tuple != *tuple && key.tuple != flipped);
    }

    fn defer(&mut self, tuple: ConnTuple, header: H2FrameHeader) {
        let key = TlsStateKey {
            tuple,
            length: header.length,
        };
        if self.tls_states.len() >= self.max_tls_states && !self.tls_states.contains_key(&key) {
            debug!(stream_id = header.stream_id, "tls state table full, dropping frame header");
            return;
        }
        trace!(stream_id = header.stream_id, length = header.length, "deferring frame header");
        self.tls_states.insert(key, TlsFrameState { header });
    }

    fn parse_frame_tls(&mut self, input: &mut TlsInput, header: &H2FrameHeader) -> FrameReport {
        let mut report = FrameReport::new(*header);
        let key = StreamKey::new(input.tuple, header.stream_id);
        let Some(stream) = self.streams.fetch(&key) else {
            report.stop = Some(DecodeError::StreamUnavailable);
            return report;
        };

        Self::process_headers_frame(
            &mut input.reader,
            &input.tuple,
            header,
            stream,
            &mut report,
            &self.static_table,
            &mut self.dynamic,
            &self.clock,
            &mut self.headers,
        );

        if header.is_end_stream() {
            debug!(stream_id = header.stream_id, tags = input.tags, "end of stream");
            report.end_of_stream = true;
            if self.finisher.handle_end_of_stream(stream, &key, input.tags) == StreamDisposition::Retire {
                self.streams.retire(&key);
            }
        }
        report
    }

    fn parse_frame_plaintext(&mut self, reader: &mut BoundedReader, tuple: ConnTuple, header: &H2FrameHeader) -> FrameReport {
        let mut report = FrameReport::new(*header);
        let key = StreamKey::new(tuple, header.stream_id);
        let Some(stream) = self.streams.fetch(&key) else {
            report.stop = Some(DecodeError::StreamUnavailable);
            let _ = reader.advance(header.length);
            return report;
        };

        if header.is_headers() {
            Self::process_headers_frame(
                reader,
                &tuple,
                header,
                stream,
                &mut report,
                &self.static_table,
                &mut self.dynamic,
                &self.clock,
                &mut self.headers,
            );
        } else {
            let _ = reader.advance(header.length);
        }

        if header.is_end_stream() {
            debug!(stream_id = header.stream_id, "end of stream");
            report.end_of_stream = true;
            if self.finisher.handle_end_of_stream(stream, &key, 0) == StreamDisposition::Retire {
                self.streams.retire(&key);
            }
        }
        report
    }

    #[allow(clippy::too_many_arguments)]
    fn process_headers_frame(
        reader: &mut BoundedReader,
        tuple: &ConnTuple,
        header: &H2FrameHeader,
        stream: &mut Http2Stream,
        report: &mut FrameReport,
        static_table: &S,
        dynamic: &mut D,
        clock: &C,
        headers: &mut HeaderBatch,
    ) {
        headers.clear();
        let filtered = filter_relevant_headers(reader, tuple, header.length, dynamic, headers);
        report.interesting_headers = filtered.interesting;
        report.filter_steps = filtered.steps;
        report.stop = filtered.stop;
        if headers.is_empty() {
            return;
        }

        let ctx = BindContext {
            tuple,
            static_table,
            dynamic,
            clock,
        };
        let bound = process_headers(reader, headers.as_slice(), stream, ctx);
        report.processed_headers = bound.processed;
        if report.stop.is_none() {
            report.stop = bound.stop;
        }
    }
}
