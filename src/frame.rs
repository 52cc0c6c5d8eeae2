//! HTTP/2 frame scanning for the telemetry decoder.
//!
//! Recognizes the connection preface, parses 9-octet frame headers and decides
//! which frames carry telemetry:
//! 1. HEADERS frames, whose header block holds method, path and status
//! 2. DATA frames with END_STREAM, which close a stream direction
//!
//! Reference: RFC 7540 (HTTP/2) Section 4.1

use tracing::{debug, trace};

use crate::error::DecodeError;
use crate::reader::BoundedReader;

/// HTTP/2 frame types (RFC 7540 Section 6)
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 frame flags
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
}

/// Size of a frame header on the wire
pub const FRAME_HEADER_SIZE: usize = 9;

/// The HTTP/2 connection preface (24 bytes)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub const PREFACE_LEN: usize = CONNECTION_PREFACE.len();

/// Check if data starts with the HTTP/2 connection preface
pub fn is_h2_preface(data: &[u8]) -> bool {
    data.len() >= PREFACE_LEN && &data[..PREFACE_LEN] == CONNECTION_PREFACE
}

/// A parsed HTTP/2 frame header (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H2FrameHeader {
    pub length: u32,      // 24 bits
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,   // 31 bits (high bit reserved)
}

impl H2FrameHeader {
    /// Parse a 9-byte frame header
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return None;
        }

        let length = u32::from_be_bytes([0, data[0], data[1], data[2]]);
        let frame_type = data[3];
        let flags = data[4];
        let stream_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & 0x7FFF_FFFF;

        Some(Self {
            length,
            frame_type,
            flags,
            stream_id,
        })
    }

    /// Check if END_STREAM flag is set
    pub fn is_end_stream(&self) -> bool {
        self.flags & flags::END_STREAM != 0
    }

    pub fn is_headers(&self) -> bool {
        self.frame_type == frame_type::HEADERS
    }

    /// HEADERS frames, and DATA frames closing their stream.
    /// END_STREAM can only appear on those two types (RFC 7540 6.1, 6.2).
    pub fn is_relevant(&self) -> bool {
        self.is_headers() || (self.frame_type == frame_type::DATA && self.is_end_stream())
    }

    /// Unknown frame types are noise.
    pub fn is_valid(&self) -> bool {
        self.frame_type <= frame_type::CONTINUATION
    }
}

/// Step over the connection preface if the buffer starts with it at the
/// current offset. Returns whether it was skipped.
pub fn skip_preface(reader: &mut BoundedReader) -> bool {
    let mut preface = [0u8; PREFACE_LEN];
    if reader.read_fixed(&mut preface).is_err() || !is_h2_preface(&preface) {
        return false;
    }
    // read_fixed succeeded, so the span is in bounds.
    reader.advance(PREFACE_LEN as u32).is_ok()
}

/// Parse the frame header at the current offset and step past it.
pub fn read_frame_header(reader: &mut BoundedReader) -> Result<H2FrameHeader, DecodeError> {
    let mut raw = [0u8; FRAME_HEADER_SIZE];
    reader.read_fixed(&mut raw)?;
    reader.advance(FRAME_HEADER_SIZE as u32)?;

    // An all-zero header is padding, not a frame.
    if raw.iter().all(|&b| b == 0) {
        return Err(DecodeError::InvalidFrameHeader);
    }
    let header = H2FrameHeader::parse(&raw).ok_or(DecodeError::InvalidFrameHeader)?;
    if !header.is_valid() {
        return Err(DecodeError::InvalidFrameHeader);
    }
    Ok(header)
}

/// Skip the preface, then read one frame header. `Ok(None)` means the frame
/// was parsed but carries nothing of interest.
pub fn scan_relevant_frame(reader: &mut BoundedReader) -> Result<Option<H2FrameHeader>, DecodeError> {
    if skip_preface(reader) {
        trace!("skipped connection preface");
    }

    let header = read_frame_header(reader).inspect_err(|err| {
        debug!(%err, "could not read frame header");
    })?;
    debug!(
        length = header.length,
        frame_type = header.frame_type,
        flags = header.flags,
        stream_id = header.stream_id,
        offset = reader.offset(),
        len = reader.len(),
        "frame"
    );

    Ok(header.is_relevant().then_some(header))
}
