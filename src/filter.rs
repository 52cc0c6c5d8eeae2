//! Header filter: one bounded pass over a header block that keeps only the
//! fields worth binding to the stream record.

use tracing::{debug, trace};

use crate::error::DecodeError;
use crate::hpack::{parse_field_indexed, parse_field_literal, read_var_int_with, HeaderDescriptor, MAX_6_BITS, MAX_7_BITS};
use crate::reader::BoundedReader;
use crate::tables::DynamicTable;
use crate::types::{ConnTuple, H_FILT, H_PROC};

/// Fixed-capacity descriptor vector. Pushing onto a full batch drops the
/// descriptor.
#[derive(Debug, Clone)]
pub struct HeaderBatch {
    items: [HeaderDescriptor; H_PROC],
    len: usize,
}

impl Default for HeaderBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderBatch {
    pub fn new() -> Self {
        Self {
            items: [HeaderDescriptor::Static(0); H_PROC],
            len: 0,
        }
    }

    /// Zero every slot.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn is_full(&self) -> bool {
        self.len >= H_PROC
    }

    pub fn push(&mut self, descriptor: HeaderDescriptor) -> bool {
        if self.is_full() {
            return false;
        }
        self.items[self.len] = descriptor;
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[HeaderDescriptor] {
        &self.items[..self.len]
    }
}

/// Result of one filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Descriptors written into the batch.
    pub interesting: usize,
    /// Loop iterations that consumed a byte. Never exceeds `H_FILT`.
    pub steps: usize,
    /// Why the pass ended before the block end, if it did.
    pub stop: Option<DecodeError>,
}

/// Walk the header block at the reader's offset, filling `headers`.
///
/// The block end is `min(offset + frame_length, len + 1)`: the pass may try
/// one read at the declared end, which the reader refuses. Every literal with
/// incremental indexing bumps the connection's dynamic counter, whether or
/// not it is kept.
pub fn filter_relevant_headers<D: DynamicTable + ?Sized>(
    reader: &mut BoundedReader,
    tuple: &ConnTuple,
    frame_length: u32,
    dynamic: &mut D,
    headers: &mut HeaderBatch,
) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();
    let frame_end = u64::from(reader.offset()) + u64::from(frame_length);
    let end = frame_end.min(u64::from(reader.len()) + 1);

    let Some(mut counter) = dynamic.counter(tuple) else {
        outcome.stop = Some(DecodeError::CounterUnavailable);
        return outcome;
    };

    for _ in 0..H_FILT {
        if u64::from(reader.offset()) >= end {
            break;
        }
        outcome.steps += 1;
        if let Err(err) = filter_step(reader, tuple, dynamic, headers, &mut counter) {
            trace!(%err, offset = reader.offset(), "header filter stopped");
            outcome.stop = Some(err);
            break;
        }
    }

    outcome.interesting = headers.len();
    debug!(interesting = outcome.interesting, steps = outcome.steps, counter, "interesting headers");
    outcome
}

fn filter_step<D: DynamicTable + ?Sized>(
    reader: &mut BoundedReader,
    tuple: &ConnTuple,
    dynamic: &mut D,
    headers: &mut HeaderBatch,
    counter: &mut u64,
) -> Result<(), DecodeError> {
    let current = reader.next_u8()?;

    let is_indexed = current & 0x80 != 0;
    let is_literal = current & 0xc0 == 0x40;
    let max_bits = if is_indexed {
        MAX_7_BITS
    } else if is_literal {
        MAX_6_BITS
    } else {
        // Literal without indexing, table size update, never indexed.
        return Ok(());
    };

    let index = read_var_int_with(reader, current, max_bits)?;
    let has_slot = !headers.is_full();

    if is_indexed {
        if let Some(descriptor) = parse_field_indexed(dynamic, tuple, has_slot, index, *counter) {
            headers.push(descriptor);
        }
        return Ok(());
    }

    // The new slot is allocated before parsing so the descriptor can name it
    // as `counter - 1`.
    *counter += 1;
    dynamic.set_counter(tuple, *counter);
    if let Some(descriptor) = parse_field_literal(reader, has_slot, index, *counter)? {
        headers.push(descriptor);
    }
    Ok(())
}
