// SPDX-License-Identifier: CEPL-1.0
use std::sync::atomic::Ordering;

use portable_atomic::AtomicU32;
use tilelint_api::{Message, MessageSink};
use tilelint_core::MessageCode;

/// Counts every emitted diagnostic and forwards it to a sink.
pub struct Reporter {
    counts: [AtomicU32; MessageCode::COUNT],
    sink: Box<dyn MessageSink>,
}

impl Reporter {
    pub fn new(sink: Box<dyn MessageSink>) -> Self {
        Reporter {
            counts: std::array::from_fn(|_| AtomicU32::new(0)),
            sink,
        }
    }

    pub fn emit(&self, message: &Message<'_>) {
        self.counts[message.code.index()].fetch_add(1, Ordering::Relaxed);
        self.sink.deliver(message);
    }

    pub fn count(&self, code: MessageCode) -> u32 {
        self.counts[code.index()].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .map(|c| u64::from(c.load(Ordering::Relaxed)))
            .sum()
    }

    pub fn reset(&self) {
        for c in &self.counts {
            c.store(0, Ordering::Relaxed);
        }
    }
}
