//! Common test utilities for the integration suite
//!
//! Provides a fluent operations-batch builder (so scenarios read like the
//! wire traffic they simulate) and small async polling helpers.

#![allow(dead_code)]

use std::time::Duration;

/// Wire element-kind codes used by the builder
pub const KIND_CLASS: i64 = 1;
pub const KIND_FUNCTION: i64 = 5;
pub const KIND_HOST: i64 = 7;
pub const KIND_ROOT: i64 = 11;

/// Builds one operations batch as the runtime would encode it
pub struct BatchBuilder {
    renderer_id: i64,
    root_id: i64,
    strings: Vec<String>,
    ops: Vec<i64>,
}

impl BatchBuilder {
    pub fn new(renderer_id: i64, root_id: i64) -> Self {
        Self {
            renderer_id,
            root_id,
            strings: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Intern a string, returning its 1-based table id
    fn intern(&mut self, s: &str) -> i64 {
        if let Some(pos) = self.strings.iter().position(|e| e == s) {
            return pos as i64 + 1;
        }
        self.strings.push(s.to_string());
        self.strings.len() as i64
    }

    /// ADD of the batch's root element
    pub fn add_root(mut self) -> Self {
        self.ops.extend([1, self.root_id, KIND_ROOT, 1, 1, 1, 0]);
        self
    }

    /// ADD of a named element
    pub fn add(mut self, id: i64, kind: i64, parent: i64, name: &str) -> Self {
        let name_id = self.intern(name);
        self.ops.extend([1, id, kind, parent, 0, name_id, 0]);
        self
    }

    /// ADD with a key
    pub fn add_keyed(mut self, id: i64, kind: i64, parent: i64, name: &str, key: &str) -> Self {
        let name_id = self.intern(name);
        let key_id = self.intern(key);
        self.ops.extend([1, id, kind, parent, 0, name_id, key_id]);
        self
    }

    /// REMOVE of the given subtree roots
    pub fn remove(mut self, ids: &[i64]) -> Self {
        self.ops.push(2);
        self.ops.push(ids.len() as i64);
        self.ops.extend_from_slice(ids);
        self
    }

    /// REORDER_CHILDREN
    pub fn reorder(mut self, parent: i64, children: &[i64]) -> Self {
        self.ops.push(3);
        self.ops.push(parent);
        self.ops.push(children.len() as i64);
        self.ops.extend_from_slice(children);
        self
    }

    /// Append raw integers to the opcode stream
    pub fn raw(mut self, ints: &[i64]) -> Self {
        self.ops.extend_from_slice(ints);
        self
    }

    pub fn build(self) -> Vec<i64> {
        let mut table = Vec::new();
        for s in &self.strings {
            table.push(s.chars().count() as i64);
            table.extend(s.chars().map(|c| c as i64));
        }
        let mut out = vec![self.renderer_id, self.root_id, table.len() as i64];
        out.extend(table);
        out.extend(self.ops);
        out
    }
}

/// Poll a condition until it holds or the deadline passes
pub async fn wait_until<F>(mut condition: F, deadline: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
