// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// WaitGroup: aggregates a dynamic set of outstanding task handles and
// resolves once all of them complete.

use serde_json::Value;

use crate::error::Result;
use crate::task::TaskHandle;

/// Aggregator over submission handles.
///
/// `add` appends a handle; `wait` blocks until every added handle has
/// completed and returns the results in add order, or fails with the first
/// rejection observed. After `wait` returns the group is empty and may be
/// reused.
#[derive(Default)]
pub struct WaitGroup {
    handles: Vec<TaskHandle>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outstanding handle.
    pub fn add(&mut self, handle: TaskHandle) {
        self.handles.push(handle);
    }

    /// Advisory: handles added and not yet finished.
    pub fn count(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Block until every added handle resolves. On the first rejection
    /// observed the group still empties; remaining handles are dropped.
    pub fn wait(&mut self) -> Result<Vec<Value>> {
        let handles = std::mem::take(&mut self.handles);
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.wait()?);
        }
        Ok(results)
    }
}
