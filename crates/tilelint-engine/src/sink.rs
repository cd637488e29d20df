// SPDX-License-Identifier: CEPL-1.0
//! Where diagnostics go once counted.
use std::fs::File;
use std::io::{self, LineWriter, Write};

use parking_lot::Mutex;
use tilelint_api::{Message, MessageSink};
use tilelint_config::Config;
use tilelint_core::MessageCode;
use tracing::warn;

/// Logs each diagnostic as a `warn!` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn deliver(&self, m: &Message<'_>) {
        warn!(
            code = m.code.as_raw(),
            name = m.code.name(),
            object_type = ?m.object_type,
            object = m.object,
            "{}",
            m.text
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn deliver(&self, _: &Message<'_>) {}
}

/// One `tilelint [<code> <NAME>] <text>` line per diagnostic.
pub struct WriterSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(out: W) -> Self {
        WriterSink { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> MessageSink for WriterSink<W> {
    fn deliver(&self, m: &Message<'_>) {
        let mut out = self.out.lock();
        // A broken log stream must not take the application down with it.
        let _ = writeln!(out, "tilelint [{} {}] {}", m.code.as_raw(), m.code.name(), m.text);
        let _ = out.flush();
    }
}

/// Keeps every diagnostic in memory; for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<(MessageCode, u64, String)>>,
}

impl MemorySink {
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn codes(&self) -> Vec<MessageCode> {
        self.messages.lock().iter().map(|(code, ..)| *code).collect()
    }

    pub fn take(&self) -> Vec<(MessageCode, u64, String)> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl MessageSink for MemorySink {
    fn deliver(&self, m: &Message<'_>) {
        self.messages.lock().push((m.code, m.object, m.text.to_owned()));
    }
}

/// Picks the sink named by `loggingFilename`.
pub fn open_sink(config: &Config) -> io::Result<Box<dyn MessageSink>> {
    Ok(match config.thresholds.logging_filename.as_str() {
        "" => Box::new(TracingSink),
        "stdout" => Box::new(WriterSink::new(io::stdout())),
        "stderr" => Box::new(WriterSink::new(io::stderr())),
        path => {
            let file = File::options().create(true).append(true).open(path)?;
            Box::new(WriterSink::new(LineWriter::new(file)))
        }
    })
}
