//! Output sink for the `print`/`printf` builtins.
//!
//! Embedders that want to capture script output install a writer with
//! `Engine::set_print_writer`; the default writes to stdout.

use std::{
    io::{self, Write as _},
    sync::{Arc, Mutex, PoisonError},
};

/// Destination for text produced by `print` and `printf`.
pub trait PrintWriter: Send {
    /// Writes one chunk of already-formatted output. No separators or
    /// newlines are added by the engine.
    fn write(&mut self, text: &str);
}

/// Shared handle to the engine's current writer. Builtins capture a clone at
/// registration time, so replacing the writer affects subsequent calls.
pub type PrintSink = Arc<Mutex<Box<dyn PrintWriter>>>;

pub(crate) fn write_to_sink(sink: &PrintSink, text: &str) {
    let mut guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
    guard.write(text);
}

/// Default writer: stdout, flushed per write so output interleaves sanely
/// with host logging.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write(&mut self, text: &str) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// Writer that accumulates output in memory. Clones share one buffer, so a
/// handle kept by the host still reads everything written after the writer
/// was installed.
#[derive(Debug, Clone, Default)]
pub struct CollectPrint {
    buffer: Arc<Mutex<String>>,
}

impl CollectPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl PrintWriter for CollectPrint {
    fn write(&mut self, text: &str) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
    }
}
