//! Operations opcode stream decoder
//!
//! Parses one batch's opcode stream into typed [`TreeOp`] events. The
//! decoder is stateful per runtime connection: observing any suspense
//! opcode (8..=13) latches the extended ADD shape for every later ADD on
//! that connection, mirroring the runtime's own format detection. Unknown
//! opcodes advance the cursor by one integer and parsing continues; later
//! batches are self-contained and realign.

use tracing::{debug, warn};

use crate::tree::ElementKind;
use crate::wire::StringTable;
use crate::{DevtoolsError, Result};

pub const OP_ADD: i64 = 1;
pub const OP_REMOVE: i64 = 2;
pub const OP_REORDER_CHILDREN: i64 = 3;
pub const OP_UPDATE_TREE_BASE_DURATION: i64 = 4;
pub const OP_UPDATE_ERRORS_OR_WARNINGS: i64 = 5;
pub const OP_REMOVE_ROOT: i64 = 6;
pub const OP_SET_SUBTREE_MODE: i64 = 7;
pub const OP_SUSPENSE_ADD: i64 = 8;
pub const OP_SUSPENSE_REMOVE: i64 = 9;
pub const OP_SUSPENSE_REORDER_CHILDREN: i64 = 10;
pub const OP_SUSPENSE_RESIZE: i64 = 11;
pub const OP_SUSPENSE_SUSPENDERS: i64 = 12;
pub const OP_APPLIED_ACTIVITY_SLICE_CHANGE: i64 = 13;

/// Element-kind wire code for roots (kinds map in [`ElementKind::from_code`])
const KIND_CODE_ROOT: i64 = 11;

/// One typed mutation event decoded from the opcode stream
#[derive(Debug, Clone, PartialEq)]
pub enum TreeOp {
    /// ADD of a root element; becomes a tree root with a null parent
    AddRoot { id: u32 },
    /// ADD of a regular element
    Add {
        id: u32,
        kind: ElementKind,
        parent_id: u32,
        display_name: Option<String>,
        key: Option<String>,
    },
    /// REMOVE of one or more subtrees
    Remove { ids: Vec<u32> },
    /// REORDER_CHILDREN: replaces the parent's child list wholesale
    ReorderChildren { parent_id: u32, children: Vec<u32> },
    /// REMOVE_ROOT: removes the batch's own root
    RemoveRoot,
}

/// Decoded form of one operations batch
#[derive(Debug, Clone)]
pub struct DecodedBatch {
    pub renderer_id: u32,
    pub root_id: u32,
    pub ops: Vec<TreeOp>,
}

/// Stateful per-connection operations decoder
#[derive(Debug, Default)]
pub struct OpsDecoder {
    /// Latched once any suspense opcode has been seen on this connection;
    /// every ADD decoded after the latch carries a trailing nameProp id
    extended_adds: bool,
}

impl OpsDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the extended ADD shape has been latched
    pub fn extended_adds(&self) -> bool {
        self.extended_adds
    }

    /// Decode one batch: `[rendererId, rootId, stringTableSize, ...table, ...ops]`.
    ///
    /// Fails with `MalformedBatch` when the header is short or the declared
    /// string table overruns the buffer. A truncated opcode payload at the
    /// tail ends the batch without error.
    pub fn decode(&mut self, ints: &[i64]) -> Result<DecodedBatch> {
        if ints.len() < 3 {
            return Err(DevtoolsError::malformed(format!(
                "batch header requires 3 integers, got {}",
                ints.len()
            )));
        }

        let renderer_id = ints[0] as u32;
        let root_id = ints[1] as u32;
        let table_size = ints[2];
        if table_size < 0 || table_size as usize > ints.len() - 3 {
            return Err(DevtoolsError::malformed(format!(
                "string table of size {table_size} overruns batch of {} integers",
                ints.len()
            )));
        }
        let table_end = 3 + table_size as usize;
        let table = StringTable::decode(&ints[3..table_end])?;

        let mut cursor = Cursor::new(&ints[table_end..]);
        let mut ops = Vec::new();

        while let Some(opcode) = cursor.next() {
            match opcode {
                OP_ADD => {
                    if let Some(op) = self.decode_add(&mut cursor, &table) {
                        ops.push(op);
                    }
                }
                OP_REMOVE => {
                    let Some(count) = cursor.next() else { break };
                    let Some(ids) = cursor.take_ids(count) else { break };
                    ops.push(TreeOp::Remove { ids });
                }
                OP_REORDER_CHILDREN => {
                    let Some(parent_id) = cursor.next() else { break };
                    let Some(count) = cursor.next() else { break };
                    let Some(children) = cursor.take_ids(count) else {
                        break;
                    };
                    ops.push(TreeOp::ReorderChildren {
                        parent_id: parent_id as u32,
                        children,
                    });
                }
                OP_UPDATE_TREE_BASE_DURATION => {
                    // id, scaled duration
                    if !cursor.skip(2) {
                        break;
                    }
                }
                OP_UPDATE_ERRORS_OR_WARNINGS => {
                    // id, numErrors, numWarnings
                    if !cursor.skip(3) {
                        break;
                    }
                }
                OP_REMOVE_ROOT => {
                    ops.push(TreeOp::RemoveRoot);
                }
                OP_SET_SUBTREE_MODE => {
                    // id, mode
                    if !cursor.skip(2) {
                        break;
                    }
                }
                OP_SUSPENSE_ADD => {
                    self.latch_extended();
                    // fiberId, parentId, nameStrId, isSuspended
                    if !cursor.skip(4) || !cursor.skip_rects() {
                        break;
                    }
                }
                OP_SUSPENSE_REMOVE => {
                    self.latch_extended();
                    let Some(count) = cursor.next() else { break };
                    if cursor.take_ids(count).is_none() {
                        break;
                    }
                }
                OP_SUSPENSE_REORDER_CHILDREN => {
                    self.latch_extended();
                    let Some(_parent) = cursor.next() else { break };
                    let Some(count) = cursor.next() else { break };
                    if cursor.take_ids(count).is_none() {
                        break;
                    }
                }
                OP_SUSPENSE_RESIZE => {
                    self.latch_extended();
                    if !cursor.skip(1) || !cursor.skip_rects() {
                        break;
                    }
                }
                OP_SUSPENSE_SUSPENDERS => {
                    self.latch_extended();
                    let Some(changes) = cursor.next() else { break };
                    let Some(span) = usize::try_from(changes).ok().and_then(|c| c.checked_mul(4))
                    else {
                        break;
                    };
                    if !cursor.skip(span) {
                        break;
                    }
                }
                OP_APPLIED_ACTIVITY_SLICE_CHANGE => {
                    self.latch_extended();
                    if !cursor.skip(1) {
                        break;
                    }
                }
                other => {
                    // Forward compatibility: skip the opcode itself and keep
                    // going. Misalignment within this batch is tolerated.
                    debug!(opcode = other, "skipping unknown opcode");
                }
            }
        }

        Ok(DecodedBatch {
            renderer_id,
            root_id,
            ops,
        })
    }

    fn latch_extended(&mut self) {
        if !self.extended_adds {
            debug!("suspense opcode observed, latching extended ADD shape");
            self.extended_adds = true;
        }
    }

    /// Decode an ADD payload. Root ADDs carry four trailing flags instead
    /// of parent/name/key.
    fn decode_add(&mut self, cursor: &mut Cursor<'_>, table: &StringTable) -> Option<TreeOp> {
        let id = cursor.next()? as u32;
        let kind_code = cursor.next()?;

        if kind_code == KIND_CODE_ROOT {
            // strict-mode-compliant, supports-profiling, supports-strict-mode,
            // has-owner-metadata
            if !cursor.skip(4) {
                warn!(id, "truncated root ADD payload");
                return None;
            }
            return Some(TreeOp::AddRoot { id });
        }

        let parent_id = cursor.next()? as u32;
        let _owner_id = cursor.next()?;
        let name_id = cursor.next()?;
        let key_id = cursor.next()?;
        if self.extended_adds {
            let _name_prop_id = cursor.next()?;
        }

        Some(TreeOp::Add {
            id,
            kind: ElementKind::from_code(kind_code),
            parent_id,
            display_name: table.get(name_id).map(str::to_owned),
            key: table.get(key_id).map(str::to_owned),
        })
    }
}

/// Bounds-checked forward cursor over the opcode section
struct Cursor<'a> {
    ints: &'a [i64],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(ints: &'a [i64]) -> Self {
        Self { ints, pos: 0 }
    }

    fn next(&mut self) -> Option<i64> {
        let v = self.ints.get(self.pos).copied()?;
        self.pos += 1;
        Some(v)
    }

    fn skip(&mut self, n: usize) -> bool {
        if self.pos + n > self.ints.len() {
            self.pos = self.ints.len();
            return false;
        }
        self.pos += n;
        true
    }

    /// Consume `count` ids; None when the count is negative or overruns
    fn take_ids(&mut self, count: i64) -> Option<Vec<u32>> {
        if count < 0 || self.pos + count as usize > self.ints.len() {
            self.pos = self.ints.len();
            return None;
        }
        let ids = self.ints[self.pos..self.pos + count as usize]
            .iter()
            .map(|&v| v as u32)
            .collect();
        self.pos += count as usize;
        Some(ids)
    }

    /// Rects: leading count C; C == -1 means no rects and nothing further,
    /// otherwise 4*C values follow
    fn skip_rects(&mut self) -> bool {
        let Some(count) = self.next() else {
            return false;
        };
        if count == -1 {
            return true;
        }
        usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(4))
            .is_some_and(|span| self.skip(span))
    }
}
