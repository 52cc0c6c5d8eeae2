//! Connection identity, storage keys and the compile-time limits shared by
//! every decoding stage.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Maximum number of path bytes stored per stream and per dynamic-table entry.
pub const PATH_MAX: usize = 160;

/// Iteration cap of the header filter loop.
pub const H_FILT: usize = 33;

/// Capacity of the interesting-header descriptor vector.
pub const H_PROC: usize = 2;

const _: () = assert!(H_PROC < H_FILT);

/// Frame headers inspected per plaintext delivery.
pub const MAX_FRAMES_TO_FILTER: usize = 10;

/// Relevant frames processed per plaintext delivery.
pub const MAX_FRAMES_ITERATIONS: usize = 5;

/// Directional connection tuple identifying one side of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnTuple {
    pub src: SocketAddr,
    pub dst: SocketAddr,
}

impl ConnTuple {
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        Self { src, dst }
    }

    /// The same flow seen from the opposite direction.
    pub fn flipped(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }

    /// Direction-independent form: the lower endpoint always comes first, and
    /// IPv4-mapped IPv6 addresses compare as their IPv4 equivalent.
    pub fn normalized(&self) -> Self {
        let src = SocketAddr::new(normalize_ip(self.src.ip()), self.src.port());
        let dst = SocketAddr::new(normalize_ip(self.dst.ip()), self.dst.port());
        if (src.ip(), src.port()) <= (dst.ip(), dst.port()) {
            Self { src, dst }
        } else {
            Self { src: dst, dst: src }
        }
    }
}

impl fmt::Display for ConnTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => ip,
        },
        other => other,
    }
}

/// Key of an in-flight stream record. Built from the normalized tuple so both
/// directions of a connection land on the same record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub tuple: ConnTuple,
    pub stream_id: u32,
}

impl StreamKey {
    pub fn new(tuple: ConnTuple, stream_id: u32) -> Self {
        Self {
            tuple: tuple.normalized(),
            stream_id,
        }
    }
}

/// Address of a dynamic-table slot. Uses the raw (directional) tuple: each
/// direction of a connection owns its own HPACK context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DynamicIndex {
    pub tuple: ConnTuple,
    pub index: u64,
}

impl DynamicIndex {
    pub fn new(tuple: ConnTuple, index: u64) -> Self {
        Self { tuple, index }
    }
}

/// A path captured from a literal header field.
///
/// `buffer` is always fully written; only the first `string_len` bytes are
/// meaningful.
#[derive(Clone, PartialEq, Eq)]
pub struct DynamicEntry {
    pub string_len: u8,
    pub buffer: [u8; PATH_MAX],
}

impl DynamicEntry {
    pub fn new(string_len: u8, buffer: [u8; PATH_MAX]) -> Self {
        Self { string_len, buffer }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..usize::from(self.string_len).min(PATH_MAX)]
    }
}

impl fmt::Debug for DynamicEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicEntry")
            .field("string_len", &self.string_len)
            .field("value", &String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}
