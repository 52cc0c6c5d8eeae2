//! Telemetry binder: applies filtered header descriptors to a stream record.

use tracing::{debug, trace};

use crate::clock::Clock;
use crate::error::DecodeError;
use crate::hpack::{static_index, HeaderDescriptor};
use crate::reader::BoundedReader;
use crate::stream::Http2Stream;
use crate::tables::{DynamicTable, StaticTable};
use crate::types::{ConnTuple, DynamicEntry, DynamicIndex, H_PROC};

pub const HTTP_ROOT_PATH: &str = "/";
pub const HTTP_INDEX_PATH: &str = "/index.html";

/// Tables and clock the binder reads from and writes to.
pub struct BindContext<'a, S: ?Sized, D: ?Sized, C: ?Sized> {
    pub tuple: &'a ConnTuple,
    pub static_table: &'a S,
    pub dynamic: &'a mut D,
    pub clock: &'a C,
}

/// Result of one binder pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindOutcome {
    /// Descriptors applied to the stream. Never exceeds `H_PROC`.
    pub processed: usize,
    /// Lookup failure that ended the pass early.
    pub stop: Option<DecodeError>,
}

/// Apply up to `H_PROC` descriptors to `stream`.
///
/// New path literals are read out of `reader` at their recorded offset,
/// published into the dynamic table, and copied into the stream. A failed
/// table lookup ends the pass; fields written before it stay.
pub fn process_headers<S, D, C>(
    reader: &BoundedReader,
    headers: &[HeaderDescriptor],
    stream: &mut Http2Stream,
    mut ctx: BindContext<'_, S, D, C>,
) -> BindOutcome
where
    S: StaticTable + ?Sized,
    D: DynamicTable + ?Sized,
    C: Clock + ?Sized,
{
    let mut outcome = BindOutcome::default();
    for header in headers.iter().take(H_PROC) {
        if let Err(err) = bind_header(reader, header, stream, &mut ctx) {
            debug!(%err, "header binding stopped");
            outcome.stop = Some(err);
            break;
        }
        outcome.processed += 1;
    }
    outcome
}

fn bind_header<S, D, C>(
    reader: &BoundedReader,
    header: &HeaderDescriptor,
    stream: &mut Http2Stream,
    ctx: &mut BindContext<'_, S, D, C>,
) -> Result<(), DecodeError>
where
    S: StaticTable + ?Sized,
    D: DynamicTable + ?Sized,
    C: Clock + ?Sized,
{
    match *header {
        HeaderDescriptor::Static(index) => {
            let label = ctx.static_table.get(index).ok_or(DecodeError::MissingStaticEntry(index))?;
            match index {
                static_index::GET | static_index::POST => {
                    trace!(method = label.value, "request method");
                    stream.request_started = ctx.clock.now_ns();
                    stream.request_method = Some(label);
                }
                static_index::STATUS_200..=static_index::STATUS_500 => {
                    trace!(status = label.value, "response status");
                    stream.response_status_code = Some(label);
                }
                static_index::EMPTY_PATH => stream.set_path_str(HTTP_ROOT_PATH),
                static_index::INDEX_PATH => stream.set_path_str(HTTP_INDEX_PATH),
                _ => {}
            }
        }
        HeaderDescriptor::ExistingDynamic(index) => {
            let entry = ctx
                .dynamic
                .get(&DynamicIndex::new(*ctx.tuple, index))
                .ok_or(DecodeError::MissingDynamicEntry(index))?;
            trace!(index, size = entry.string_len, "existing dynamic path");
            stream.set_path(&entry.buffer, entry.string_len);
        }
        HeaderDescriptor::NewDynamic { index, offset, size } => {
            trace!(index, offset, size, "new dynamic path");
            let buffer = reader.read_path(offset);
            ctx.dynamic
                .insert(DynamicIndex::new(*ctx.tuple, index), DynamicEntry::new(size, buffer));
            stream.set_path(&buffer, size);
        }
    }
    Ok(())
}
