//! HPACK block encoder (RFC 7541).
//!
//! Encodes one header block at a time into caller-provided fragments of
//! at most one frame payload each. A field is only committed once its
//! bytes fit in the current fragment; the dynamic table is mutated after
//! the commit, so a full fragment never leaves the table out of sync
//! with the wire.

use http::{HeaderMap, HeaderValue};

use super::dynamic_table::DynamicTable;
use super::error::HpackError;
use super::integer::{write_integer, write_string};
use super::static_table;

const STATIC_TABLE_SIZE: usize = 61;

// Representation patterns and prefix masks per RFC 7541 Section 6.
const INDEXED: (u8, u8) = (0x80, 0x7f);
const INCREMENTAL: (u8, u8) = (0x40, 0x3f);
const WITHOUT_INDEXING: (u8, u8) = (0x00, 0x0f);
const TABLE_SIZE_UPDATE: (u8, u8) = (0x20, 0x1f);

/// Pre-encoded header block for an interim 100-Continue response:
/// literal-without-indexing with the `:status` name index, value "100".
pub const STATUS_100_BLOCK: [u8; 5] = [0x08, 0x03, b'1', b'0', b'0'];

/// Cursor over the fields of a header map.
///
/// The cursor only moves past a field once the encoder has committed its
/// bytes, so a block can resume across fragments without re-emitting or
/// skipping fields.
pub struct FieldCursor<'a> {
    iter: http::header::Iter<'a, HeaderValue>,
    pending: Option<(&'a http::header::HeaderName, &'a HeaderValue)>,
}

impl<'a> FieldCursor<'a> {
    /// Create a cursor over `headers`. Names in an `http::HeaderMap` are
    /// already lowercase.
    pub fn new(headers: &'a HeaderMap) -> Self {
        Self {
            iter: headers.iter(),
            pending: None,
        }
    }

    fn peek(&mut self) -> Option<(&'a [u8], &'a [u8])> {
        if self.pending.is_none() {
            self.pending = self.iter.next();
        }
        self.pending
            .map(|(name, value)| (name.as_str().as_bytes(), value.as_bytes()))
    }

    fn advance(&mut self) {
        self.pending = None;
    }
}

/// HPACK encoder for response header blocks.
pub struct HpackEncoder {
    table: DynamicTable,
    max_table_size: usize,
    pending_size_update: Option<usize>,
    compression: bool,
}

impl HpackEncoder {
    /// Create an encoder with the given dynamic table size.
    ///
    /// With `compression` disabled every field is emitted as
    /// literal-without-indexing and the dynamic table stays empty.
    pub fn new(max_table_size: u32, compression: bool) -> Self {
        Self {
            table: DynamicTable::new(max_table_size as usize),
            max_table_size: max_table_size as usize,
            pending_size_update: None,
            compression,
        }
    }

    /// Apply a peer-advertised maximum table size.
    ///
    /// Evicts immediately; the size-update instruction is emitted at the
    /// start of the next header block per RFC 7541 Section 4.2.
    pub fn set_max_table_size(&mut self, size: u32) {
        let size = size as usize;
        if size == self.max_table_size {
            return;
        }
        self.max_table_size = size;
        self.table.set_max_size(size);
        self.pending_size_update = Some(size);
    }

    /// Start a header block, emitting `:status` first when given, then as
    /// many fields as fit in `out`.
    ///
    /// Returns the fragment length and whether the block is complete.
    pub fn begin_block(
        &mut self,
        status: Option<u16>,
        fields: &mut FieldCursor<'_>,
        out: &mut [u8],
    ) -> Result<(usize, bool), HpackError> {
        let mut pos = 0;

        if let Some(size) = self.pending_size_update.take() {
            write_integer(size, TABLE_SIZE_UPDATE.0, TABLE_SIZE_UPDATE.1, out, &mut pos)
                .map_err(|_| HpackError::FieldTooLarge)?;
        }

        if let Some(status) = status {
            self.write_status(status, out, &mut pos)
                .map_err(|_| HpackError::FieldTooLarge)?;
        }

        self.write_fields(fields, out, pos)
    }

    /// Emit the next fragment of a block started with [`begin_block`].
    ///
    /// Returns the fragment length and whether the block is complete.
    ///
    /// [`begin_block`]: Self::begin_block
    pub fn resume_block(
        &mut self,
        fields: &mut FieldCursor<'_>,
        out: &mut [u8],
    ) -> Result<(usize, bool), HpackError> {
        self.write_fields(fields, out, 0)
    }

    fn write_fields(
        &mut self,
        fields: &mut FieldCursor<'_>,
        out: &mut [u8],
        mut pos: usize,
    ) -> Result<(usize, bool), HpackError> {
        while let Some((name, value)) = fields.peek() {
            let checkpoint = pos;
            match self.write_field(name, value, out, &mut pos) {
                Ok(index) => {
                    if index {
                        self.table.add(name.to_vec(), value.to_vec());
                    }
                    fields.advance();
                }
                Err(HpackError::BufferFull) => {
                    if checkpoint == 0 {
                        // Does not fit even in an empty fragment.
                        return Err(HpackError::FieldTooLarge);
                    }
                    return Ok((checkpoint, false));
                }
                Err(e) => return Err(e),
            }
        }
        Ok((pos, true))
    }

    /// Encode one field. Returns whether the field should enter the
    /// dynamic table; on error the caller discards any partial bytes.
    fn write_field(
        &self,
        name: &[u8],
        value: &[u8],
        out: &mut [u8],
        pos: &mut usize,
    ) -> Result<bool, HpackError> {
        if !self.compression {
            match static_table::find_entry_by_name(name) {
                Some(idx) => {
                    write_integer(idx, WITHOUT_INDEXING.0, WITHOUT_INDEXING.1, out, pos)?;
                }
                None => {
                    write_integer(0, WITHOUT_INDEXING.0, WITHOUT_INDEXING.1, out, pos)?;
                    write_string(name, out, pos)?;
                }
            }
            write_string(value, out, pos)?;
            return Ok(false);
        }

        if let Some(idx) = static_table::find_entry(name, value) {
            write_integer(idx, INDEXED.0, INDEXED.1, out, pos)?;
            return Ok(false);
        }

        if let Some(idx) = self.table.find(name, value) {
            write_integer(STATIC_TABLE_SIZE + idx, INDEXED.0, INDEXED.1, out, pos)?;
            return Ok(false);
        }

        let name_index = static_table::find_entry_by_name(name)
            .or_else(|| self.table.find_by_name(name).map(|i| STATIC_TABLE_SIZE + i));

        match name_index {
            Some(idx) => {
                write_integer(idx, INCREMENTAL.0, INCREMENTAL.1, out, pos)?;
            }
            None => {
                write_integer(0, INCREMENTAL.0, INCREMENTAL.1, out, pos)?;
                write_string(name, out, pos)?;
            }
        }
        write_string(value, out, pos)?;
        Ok(true)
    }

    /// Encode the `:status` pseudo-header. Statically indexed status
    /// codes use the static table; anything else is sent as a literal
    /// with the `:status` name index, like the 100-Continue block.
    fn write_status(&self, status: u16, out: &mut [u8], pos: &mut usize) -> Result<(), HpackError> {
        if let Some(idx) = static_table::status_index(status) {
            return write_integer(idx, INDEXED.0, INDEXED.1, out, pos);
        }

        write_integer(
            static_table::STATUS_NAME_INDEX,
            WITHOUT_INDEXING.0,
            WITHOUT_INDEXING.1,
            out,
            pos,
        )?;
        write_string(status.to_string().as_bytes(), out, pos)
    }
}
