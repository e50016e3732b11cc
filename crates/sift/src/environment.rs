//! Name→value bindings and the host-function registry.
//!
//! The environment holds one global map shared by every execution, plus a
//! stack of frames pushed for script-function invocations. A frame shadows
//! only its parameter names and `local`-declared names; every other lookup
//! and write falls through to the enclosing scope.

use ahash::AHashMap;

use crate::value::Value;

/// Calling convention shared by builtins and host-registered functions.
///
/// An `Err` surfaces to the script as a run-time error carrying the
/// function's registered name.
pub type HostFunction = Box<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Variable bindings and callable registry for one engine.
#[derive(Default)]
pub struct Environment {
    globals: AHashMap<String, Value>,
    functions: AHashMap<String, HostFunction>,
    frames: Vec<Frame>,
}

#[derive(Default)]
struct Frame {
    bindings: AHashMap<String, Value>,
}

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `name`, searching the frame stack innermost-first, then the
    /// globals.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.bindings.get(name) {
                return Some(value);
            }
        }
        self.globals.get(name)
    }

    /// Writes `name`. A frame that already binds the name (parameter or
    /// `local`) takes the write; otherwise the global map does.
    pub fn set(&mut self, name: &str, value: Value) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(slot) = frame.bindings.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.globals.insert(name.to_owned(), value);
    }

    /// Removes `name` from the binding that currently resolves it.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        for frame in self.frames.iter_mut().rev() {
            if frame.bindings.contains_key(name) {
                return frame.bindings.remove(name);
            }
        }
        self.globals.remove(name)
    }

    /// Declares `name` as belonging to the current frame, initialized to
    /// `Null`. Outside any frame this is a plain global write.
    pub fn declare_local(&mut self, name: &str) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.bindings.insert(name.to_owned(), Value::Null);
            }
            None => {
                self.globals.insert(name.to_owned(), Value::Null);
            }
        }
    }

    /// Enters a script-function scope with its parameters pre-bound.
    pub fn push_frame(&mut self, bindings: impl IntoIterator<Item = (String, Value)>) {
        self.frames.push(Frame {
            bindings: bindings.into_iter().collect(),
        });
    }

    /// Leaves the innermost script-function scope, discarding its bindings.
    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<&HostFunction> {
        self.functions.get(name)
    }

    /// Registers `function` under `name`, replacing any previous callable of
    /// that name.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        function: impl Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.functions.insert(name.into(), Box::new(function));
    }
}
