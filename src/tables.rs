//! Static and dynamic header tables consulted by the decoder.
//!
//! Both are collaborators: the decoder only reads and writes entries through
//! the traits below. The in-memory implementations are bounded the way
//! kernel maps are, and refuse new keys once full instead of growing.

use std::collections::HashMap;

use tracing::trace;

use crate::hpack::static_index;
use crate::types::{ConnTuple, DynamicEntry, DynamicIndex};

/// Default number of connections tracked by [`InMemoryDynamicTable`].
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Default number of captured paths held by [`InMemoryDynamicTable`].
pub const DEFAULT_MAX_DYNAMIC_ENTRIES: usize = 16 * 1024;

/// Label of a static-table entry, used for methods and status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticLabel {
    pub name: &'static str,
    pub value: &'static str,
}

impl StaticLabel {
    pub const fn new(name: &'static str, value: &'static str) -> Self {
        Self { name, value }
    }
}

pub trait StaticTable {
    fn get(&self, index: u64) -> Option<StaticLabel>;
}

/// The telemetry-relevant subset of the HPACK static table
/// (RFC 7541 Appendix A).
#[derive(Debug, Default, Clone, Copy)]
pub struct HpackStaticTable;

impl StaticTable for HpackStaticTable {
    fn get(&self, index: u64) -> Option<StaticLabel> {
        let label = match index {
            static_index::GET => StaticLabel::new(":method", "GET"),
            static_index::POST => StaticLabel::new(":method", "POST"),
            static_index::EMPTY_PATH => StaticLabel::new(":path", "/"),
            static_index::INDEX_PATH => StaticLabel::new(":path", "/index.html"),
            static_index::STATUS_200 => StaticLabel::new(":status", "200"),
            static_index::STATUS_204 => StaticLabel::new(":status", "204"),
            static_index::STATUS_206 => StaticLabel::new(":status", "206"),
            static_index::STATUS_304 => StaticLabel::new(":status", "304"),
            static_index::STATUS_400 => StaticLabel::new(":status", "400"),
            static_index::STATUS_404 => StaticLabel::new(":status", "404"),
            static_index::STATUS_500 => StaticLabel::new(":status", "500"),
            _ => return None,
        };
        Some(label)
    }
}

/// Per-connection dynamic counters plus the `(tuple, index) -> path` table.
pub trait DynamicTable {
    /// Current counter of the connection, created at zero on first use.
    /// `None` when no storage is left for a new connection.
    fn counter(&mut self, tuple: &ConnTuple) -> Option<u64>;

    fn set_counter(&mut self, tuple: &ConnTuple, value: u64);

    fn get(&self, index: &DynamicIndex) -> Option<&DynamicEntry>;

    fn insert(&mut self, index: DynamicIndex, entry: DynamicEntry);

    /// Drop the counter and every entry of a connection direction.
    fn forget_connection(&mut self, tuple: &ConnTuple);
}

#[derive(Debug)]
pub struct InMemoryDynamicTable {
    counters: HashMap<ConnTuple, u64>,
    entries: HashMap<DynamicIndex, DynamicEntry>,
    max_connections: usize,
    max_entries: usize,
}

impl Default for InMemoryDynamicTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_DYNAMIC_ENTRIES)
    }
}

impl InMemoryDynamicTable {
    pub fn new(max_connections: usize, max_entries: usize) -> Self {
        Self {
            counters: HashMap::new(),
            entries: HashMap::new(),
            max_connections,
            max_entries,
        }
    }

    /// Counter value without creating it.
    pub fn peek_counter(&self, tuple: &ConnTuple) -> Option<u64> {
        self.counters.get(tuple).copied()
    }

    pub fn connections(&self) -> usize {
        self.counters.len()
    }

    pub fn entries(&self) -> usize {
        self.entries.len()
    }
}

impl DynamicTable for InMemoryDynamicTable {
    fn counter(&mut self, tuple: &ConnTuple) -> Option<u64> {
        if let Some(&value) = self.counters.get(tuple) {
            return Some(value);
        }
        if self.counters.len() >= self.max_connections {
            trace!(%tuple, "dynamic counter table full");
            return None;
        }
        self.counters.insert(*tuple, 0);
        Some(0)
    }

    fn set_counter(&mut self, tuple: &ConnTuple, value: u64) {
        if let Some(counter) = self.counters.get_mut(tuple) {
            *counter = value;
        }
    }

    fn get(&self, index: &DynamicIndex) -> Option<&DynamicEntry> {
        self.entries.get(index)
    }

    fn insert(&mut self, index: DynamicIndex, entry: DynamicEntry) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&index) {
            trace!(tuple = %index.tuple, index = index.index, "dynamic table full, dropping entry");
            return;
        }
        self.entries.insert(index, entry);
    }

    fn forget_connection(&mut self, tuple: &ConnTuple) {
        self.counters.remove(tuple);
        self.entries.retain(|index, _| index.tuple != *tuple);
    }
}
