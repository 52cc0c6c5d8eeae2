//! In-flight stream records and their lifecycle collaborators.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::{debug, trace};

use crate::clock::{Clock, MonotonicClock};
use crate::tables::StaticLabel;
use crate::types::{ConnTuple, StreamKey, PATH_MAX};

/// Default number of in-flight streams held by [`InMemoryStreams`].
pub const DEFAULT_MAX_STREAMS: usize = 4096;

/// Default number of completed streams buffered by [`BatchFinisher`].
pub const DEFAULT_BATCH_CAPACITY: usize = 256;

/// Telemetry collected for one HTTP/2 stream.
#[derive(Clone, PartialEq, Eq)]
pub struct Http2Stream {
    /// Set when the record is handed off as a completed transaction.
    pub tuple: Option<ConnTuple>,
    pub tags: u64,
    pub request_started: u64,
    pub response_last_seen: u64,
    pub request_method: Option<StaticLabel>,
    pub response_status_code: Option<StaticLabel>,
    pub request_path: [u8; PATH_MAX],
    pub path_size: u8,
    pub request_end_of_stream: bool,
}

impl Default for Http2Stream {
    fn default() -> Self {
        Self {
            tuple: None,
            tags: 0,
            request_started: 0,
            response_last_seen: 0,
            request_method: None,
            response_status_code: None,
            request_path: [0; PATH_MAX],
            path_size: 0,
            request_end_of_stream: false,
        }
    }
}

impl Http2Stream {
    /// The valid prefix of the path buffer.
    pub fn path(&self) -> &[u8] {
        &self.request_path[..usize::from(self.path_size).min(PATH_MAX)]
    }

    /// Overwrite the whole path buffer.
    pub fn set_path(&mut self, buffer: &[u8; PATH_MAX], size: u8) {
        self.request_path = *buffer;
        self.path_size = size;
    }

    /// Store a short constant path, zeroing the rest of the buffer.
    pub fn set_path_str(&mut self, path: &str) {
        let bytes = &path.as_bytes()[..path.len().min(PATH_MAX)];
        self.request_path = [0; PATH_MAX];
        self.request_path[..bytes.len()].copy_from_slice(bytes);
        self.path_size = bytes.len() as u8;
    }
}

impl fmt::Debug for Http2Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Http2Stream")
            .field("tuple", &self.tuple)
            .field("tags", &self.tags)
            .field("request_started", &self.request_started)
            .field("response_last_seen", &self.response_last_seen)
            .field("request_method", &self.request_method.map(|l| l.value))
            .field("response_status_code", &self.response_status_code.map(|l| l.value))
            .field("path", &String::from_utf8_lossy(self.path()))
            .field("request_end_of_stream", &self.request_end_of_stream)
            .finish()
    }
}

/// Keyed storage of in-flight stream records.
pub trait StreamTable {
    /// The record for `key`, allocating a zeroed one on first use. `None`
    /// when no record can be provided.
    fn fetch(&mut self, key: &StreamKey) -> Option<&mut Http2Stream>;

    fn retire(&mut self, key: &StreamKey) -> Option<Http2Stream>;

    /// Drop every record of the connection, whichever direction `tuple` is.
    fn forget_connection(&mut self, tuple: &ConnTuple);
}

/// What to do with a record after an END_STREAM handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDisposition {
    Keep,
    Retire,
}

/// Terminal handoff for streams that saw END_STREAM.
pub trait EndOfStream {
    fn handle_end_of_stream(&mut self, stream: &mut Http2Stream, key: &StreamKey, tags: u64) -> StreamDisposition;
}

/// Bounded stream table. When full, a new key evicts the oldest record.
/// A capacity of 0 stores nothing.
#[derive(Debug)]
pub struct InMemoryStreams {
    streams: HashMap<StreamKey, (u64, Http2Stream)>,
    /// Insertion sequence -> key, oldest first.
    order: BTreeMap<u64, StreamKey>,
    next_seq: u64,
    capacity: usize,
}

impl Default for InMemoryStreams {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STREAMS)
    }
}

impl InMemoryStreams {
    pub fn new(capacity: usize) -> Self {
        Self {
            streams: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            capacity,
        }
    }

    pub fn get(&self, key: &StreamKey) -> Option<&Http2Stream> {
        self.streams.get(key).map(|(_, stream)| stream)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl StreamTable for InMemoryStreams {
    fn fetch(&mut self, key: &StreamKey) -> Option<&mut Http2Stream> {
        if self.capacity == 0 {
            return None;
        }
        if !self.streams.contains_key(key) {
            while self.streams.len() >= self.capacity {
                let Some((_, oldest)) = self.order.pop_first() else {
                    break;
                };
                trace!(stream_id = oldest.stream_id, tuple = %oldest.tuple, "stream table full, evicting oldest");
                self.streams.remove(&oldest);
            }
            let seq = self.next_seq;
            self.next_seq += 1;
            self.order.insert(seq, *key);
            self.streams.insert(*key, (seq, Http2Stream::default()));
        }
        self.streams.get_mut(key).map(|(_, stream)| stream)
    }

    fn retire(&mut self, key: &StreamKey) -> Option<Http2Stream> {
        let (seq, stream) = self.streams.remove(key)?;
        self.order.remove(&seq);
        Some(stream)
    }

    fn forget_connection(&mut self, tuple: &ConnTuple) {
        let tuple = tuple.normalized();
        let order = &mut self.order;
        self.streams.retain(|key, (seq, _)| {
            let keep = key.tuple != tuple;
            if !keep {
                order.remove(&*seq);
            }
            keep
        });
    }
}

/// Two-phase END_STREAM handling with a bounded completion batch.
///
/// The first END_STREAM on a stream closes the request side and keeps the
/// record. The second closes the response side: the record is stamped with
/// the response time, tuple and tags, queued, and retired.
#[derive(Debug)]
pub struct BatchFinisher<C = MonotonicClock> {
    clock: C,
    batch: Vec<Http2Stream>,
    capacity: usize,
    dropped: u64,
}

impl Default for BatchFinisher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_CAPACITY)
    }
}

impl BatchFinisher {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, MonotonicClock)
    }
}

impl<C: Clock> BatchFinisher<C> {
    pub fn with_clock(capacity: usize, clock: C) -> Self {
        Self {
            clock,
            batch: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Completed streams waiting to be shipped.
    pub fn pending(&self) -> &[Http2Stream] {
        &self.batch
    }

    /// Take every completed stream queued so far.
    pub fn drain(&mut self) -> Vec<Http2Stream> {
        std::mem::take(&mut self.batch)
    }

    /// Completed streams discarded because the batch was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<C: Clock> EndOfStream for BatchFinisher<C> {
    fn handle_end_of_stream(&mut self, stream: &mut Http2Stream, key: &StreamKey, tags: u64) -> StreamDisposition {
        if !stream.request_end_of_stream {
            stream.request_end_of_stream = true;
            return StreamDisposition::Keep;
        }

        debug!(stream_id = key.stream_id, tags, "stream completed");
        stream.response_last_seen = self.clock.now_ns();
        stream.tuple = Some(key.tuple);
        stream.tags = tags;

        if self.batch.len() >= self.capacity {
            self.dropped += 1;
        } else {
            self.batch.push(stream.clone());
        }
        StreamDisposition::Retire
    }
}
