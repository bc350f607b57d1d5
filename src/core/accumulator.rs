//! Reassembly of fragmented tool-call deltas.
//!
//! Providers interleave text and tool fragments and may split one call's
//! argument JSON across many frames. The accumulator keeps exactly one
//! pending slot: fragments matching the pending id append; a fragment with a
//! new id finalizes the pending call first. A call is therefore complete only
//! when superseded or at stream end, which is the earliest point all of its
//! fragments can be known to have arrived.

use crate::api::ToolCallDelta;

/// A fully reassembled tool invocation, ready for execution. The argument
/// buffer is raw model-supplied text and may still fail to parse as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Default)]
pub struct ToolCallAccumulator {
    pending: Option<PendingCall>,
}

struct PendingCall {
    id: String,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one delta. Returns the previously pending call when this delta
    /// supersedes it with a new id.
    pub fn push(&mut self, delta: ToolCallDelta) -> Option<CompletedToolCall> {
        let mut finalized = None;

        match (&mut self.pending, delta.id) {
            (Some(pending), Some(id)) if pending.id != id => {
                finalized = self.pending.take().map(PendingCall::complete);
                self.pending = Some(PendingCall {
                    id,
                    name: None,
                    arguments: String::new(),
                });
            }
            (Some(_), _) => {}
            (None, Some(id)) => {
                self.pending = Some(PendingCall {
                    id,
                    name: None,
                    arguments: String::new(),
                });
            }
            // An id-less fragment with nothing pending has nowhere to go.
            (None, None) => return None,
        }

        if let Some(pending) = &mut self.pending {
            if let Some(name) = delta.name {
                pending.name.get_or_insert(name);
            }
            if let Some(fragment) = delta.arguments {
                pending.arguments.push_str(&fragment);
            }
        }
        finalized
    }

    /// Finalize the still-pending call at stream end.
    pub fn finish(&mut self) -> Option<CompletedToolCall> {
        self.pending.take().map(PendingCall::complete)
    }
}

impl PendingCall {
    fn complete(self) -> CompletedToolCall {
        CompletedToolCall {
            name: self.name.unwrap_or_default(),
            id: self.id,
            arguments: self.arguments,
        }
    }
}
