//! h2-telemetry: request telemetry from intercepted HTTP/2 traffic
//!
//! This crate walks possibly-partial HTTP/2 byte buffers handed over by a TLS
//! interception stage and records, per stream, the request method, request
//! path, response status and start/end timestamps.
//!
//! # Features
//!
//! - **Bounded work**: every loop has a compile-time cap, so hostile input
//!   cannot cause unbounded decoding
//! - **Fail-closed reads**: no read crosses the declared buffer length
//! - **Shared HPACK state**: captured `:path` values live in a dynamic table
//!   that survives across deliveries, so indexed references resolve later
//! - **Re-entry**: a frame header delivered alone is remembered until its
//!   payload arrives
//!
//! # Quick Start
//!
//! ```rust
//! use h2_telemetry::{ConnTuple, Http2Decoder, TlsInput, TlsOutcome};
//!
//! let tuple = ConnTuple::new(
//!     "10.0.0.1:50000".parse().unwrap(),
//!     "10.0.0.2:443".parse().unwrap(),
//! );
//! let mut decoder = Http2Decoder::new();
//!
//! // HEADERS, END_STREAM | END_HEADERS, stream 1, `:method: GET`
//! let frame = vec![0x00, 0x00, 0x01, 0x01, 0x05, 0x00, 0x00, 0x00, 0x01, 0x82];
//! let mut input = TlsInput::new(tuple, frame, 0);
//!
//! match decoder.decode_tls(&mut input) {
//!     TlsOutcome::Processed(report) => {
//!         assert_eq!(report.interesting_headers, 1);
//!         assert!(report.end_of_stream);
//!     }
//!     other => panic!("unexpected outcome: {other:?}"),
//! }
//! ```
//!
//! # Architecture
//!
//! Leaves first:
//! - [`reader`]: bounded reader over the delivered buffer
//! - [`frame`]: preface skip, frame header parse, relevance
//! - [`hpack`]: integer and field-representation decoding
//! - [`filter`]: header filter producing a few descriptors per block
//! - [`binder`]: applies descriptors to the stream record
//! - [`decoder`]: per-frame orchestration
//!
//! Storage is not owned by the decoder: the static table, dynamic table,
//! stream table, end-of-stream handoff and clock are collaborators behind the
//! traits in [`tables`], [`stream`] and [`clock`]. Bounded in-memory versions
//! are provided.
//!
//! It does NOT provide:
//! - Huffman decoding or full HPACK compliance
//! - CONTINUATION reassembly, flow control or SETTINGS handling
//! - Transport or TLS decryption (you provide the bytes)

pub mod binder;
pub mod clock;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod frame;
pub mod hpack;
pub mod reader;
pub mod stream;
pub mod tables;
pub mod types;

pub use clock::{Clock, MonotonicClock};
pub use decoder::{FrameReport, Http2Decoder, TlsOutcome};
pub use error::DecodeError;
pub use filter::{FilterOutcome, HeaderBatch};
pub use frame::{
    flags, frame_type, is_h2_preface, H2FrameHeader, CONNECTION_PREFACE, FRAME_HEADER_SIZE, PREFACE_LEN,
};
pub use hpack::{HeaderDescriptor, STATIC_TABLE_SIZE};
pub use reader::{BoundedReader, TlsInput};
pub use stream::{BatchFinisher, EndOfStream, Http2Stream, InMemoryStreams, StreamDisposition, StreamTable};
pub use tables::{DynamicTable, HpackStaticTable, InMemoryDynamicTable, StaticLabel, StaticTable};
pub use types::{
    ConnTuple, DynamicEntry, DynamicIndex, StreamKey, H_FILT, H_PROC, MAX_FRAMES_ITERATIONS, MAX_FRAMES_TO_FILTER, PATH_MAX,
};
