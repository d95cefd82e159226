//! Wire-format decoding for the DevTools operations stream
//!
//! Runtimes describe component-tree mutations as flat integer arrays:
//! a header, an interned string table, then a variable-length opcode
//! stream. This module turns one batch into typed [`TreeOp`] events;
//! applying them to the store lives in [`crate::tree`].
//!
//! Batch layout:
//!
//! ```text
//! [rendererId, rootId, stringTableSize, ...stringTable, ...ops]
//! ```

pub mod ops;
pub mod string_table;

pub use ops::{DecodedBatch, OpsDecoder, TreeOp};
pub use string_table::StringTable;
