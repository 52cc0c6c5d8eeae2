//! HPACK: Header Compression for HTTP/2 (RFC 7541), telemetry subset
//!
//! Decodes one header-field representation at a time, and only the two that
//! matter for telemetry:
//! - indexed fields (Section 6.1), resolved against the static table or the
//!   connection's dynamic table
//! - literals with incremental indexing (Section 6.2.1), whose `:path` values
//!   are captured into the dynamic table
//!
//! Huffman-coded strings, table size updates and the never-indexed form are
//! not decoded.

use tracing::trace;

use crate::error::DecodeError;
use crate::reader::BoundedReader;
use crate::tables::DynamicTable;
use crate::types::{ConnTuple, DynamicIndex, PATH_MAX};

pub const MAX_6_BITS: u8 = 63;
pub const MAX_7_BITS: u8 = 127;

/// Number of entries in the HPACK static table.
pub const STATIC_TABLE_SIZE: u64 = 61;

/// Static-table indices the decoder acts on (RFC 7541 Appendix A).
pub mod static_index {
    pub const GET: u64 = 2;
    pub const POST: u64 = 3;
    /// `:path /`. Its name is also what literal `:path` fields reference.
    pub const EMPTY_PATH: u64 = 4;
    /// `:path /index.html`
    pub const INDEX_PATH: u64 = 5;
    pub const STATUS_200: u64 = 8;
    pub const STATUS_204: u64 = 9;
    pub const STATUS_206: u64 = 10;
    pub const STATUS_304: u64 = 11;
    pub const STATUS_400: u64 = 12;
    pub const STATUS_404: u64 = 13;
    pub const STATUS_500: u64 = 14;
}

/// Method, path and status entries of the static table.
pub fn is_interesting_static_entry(index: u64) -> bool {
    (static_index::GET..=static_index::INDEX_PATH).contains(&index)
        || (static_index::STATUS_200..=static_index::STATUS_500).contains(&index)
}

pub fn is_static_table_entry(index: u64) -> bool {
    index <= STATIC_TABLE_SIZE
}

/// A header field worth binding to the stream record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDescriptor {
    /// Static-table entry, by HPACK index.
    Static(u64),
    /// Previously captured path, by dynamic-table index.
    ExistingDynamic(u64),
    /// Path literal to be captured under `index`. `offset` and `size` locate
    /// the value inside the input buffer.
    NewDynamic { index: u64, offset: u32, size: u8 },
}

impl Default for HeaderDescriptor {
    fn default() -> Self {
        Self::Static(0)
    }
}

/// Finish decoding a prefixed integer whose first byte has already been
/// consumed (RFC 7541 Section 5.1).
///
/// Only a single continuation byte is accepted; anything longer fails.
pub fn read_var_int_with(reader: &mut BoundedReader, current: u8, max_number_for_bits: u8) -> Result<u8, DecodeError> {
    let value = current & max_number_for_bits;
    if value < max_number_for_bits {
        return Ok(value);
    }

    let offset = reader.offset();
    let next = reader.read_u8()?;
    if next & 0x80 != 0 {
        return Err(DecodeError::IntegerOverflow { offset });
    }
    reader.advance(1)?;
    // The mask applies to the sum, not to the continuation byte alone, so
    // results past 127 wrap.
    Ok(value.wrapping_add(next) & MAX_7_BITS)
}

/// Decode a prefixed integer starting at the current offset.
pub fn read_var_int(reader: &mut BoundedReader, max_number_for_bits: u8) -> Result<u8, DecodeError> {
    let current = reader.next_u8()?;
    read_var_int_with(reader, current, max_number_for_bits)
}

/// Classify an indexed field (RFC 7541 Section 6.1).
///
/// Uninteresting static entries and dynamic references the table does not
/// hold produce nothing. The dynamic index is taken relative to `counter`, so
/// it addresses the entry that was current when the field was parsed.
pub fn parse_field_indexed<D: DynamicTable + ?Sized>(
    dynamic: &D,
    tuple: &ConnTuple,
    has_slot: bool,
    index: u8,
    counter: u64,
) -> Option<HeaderDescriptor> {
    if !has_slot {
        return None;
    }
    let index = u64::from(index);
    if is_interesting_static_entry(index) {
        return Some(HeaderDescriptor::Static(index));
    }
    if is_static_table_entry(index) {
        return None;
    }

    let dynamic_index = counter.wrapping_sub(index - STATIC_TABLE_SIZE);
    if dynamic.get(&DynamicIndex::new(*tuple, dynamic_index)).is_none() {
        trace!(index, dynamic_index, "dynamic reference not in table");
        return None;
    }
    Some(HeaderDescriptor::ExistingDynamic(dynamic_index))
}

/// Parse a literal with incremental indexing (RFC 7541 Section 6.2.1) whose
/// first byte, carrying the 6-bit name `index`, was already consumed.
///
/// `counter` must already account for this field. Only `:path` values short
/// enough to store become descriptors; everything else is skipped.
pub fn parse_field_literal(
    reader: &mut BoundedReader,
    has_slot: bool,
    index: u8,
    counter: u64,
) -> Result<Option<HeaderDescriptor>, DecodeError> {
    let str_len = read_var_int(reader, MAX_6_BITS)?;

    if index == 0 {
        // New name: skip it, then skip its value.
        reader.advance(u32::from(str_len))?;
        let value_len = read_var_int(reader, MAX_6_BITS)?;
        reader.advance(u32::from(value_len))?;
        return Ok(None);
    }

    let offset = reader.offset();
    reader.advance(u32::from(str_len))?;

    if usize::from(str_len) > PATH_MAX || u64::from(index) != static_index::EMPTY_PATH || !has_slot {
        return Ok(None);
    }
    Ok(Some(HeaderDescriptor::NewDynamic {
        index: counter.wrapping_sub(1),
        offset,
        size: str_len,
    }))
}
