//! File helpers delegating to the interpreter's `io` library.
//!
//! Files are opened and closed by the interpreter; the host only holds a
//! [`FileHandle`] naming the interpreter's file object.

use crate::bridge::InterpreterBridge;
use crate::error::{BridgeError, BridgeResult};
use crate::reference::RefHandle;
use crate::value::render;
use std::fmt;

/// Coarse direction of the last opened file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Opened for reading
    Input,
    /// Opened for writing or appending
    Output,
}

impl FileStatus {
    /// Classify an `io.open` mode string. Only exact modes are recognised.
    pub fn classify(mode: &str) -> Option<Self> {
        match mode {
            "r" | "rb" | "r+" => Some(FileStatus::Input),
            "w" | "wb" | "w+" | "a" | "ab" | "a+" => Some(FileStatus::Output),
            _ => None,
        }
    }

    /// `"input"` or `"output"`
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Input => "input",
            FileStatus::Output => "output",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open interpreter file object
#[derive(Debug, PartialEq, Eq)]
pub struct FileHandle {
    reference: RefHandle,
    status: FileStatus,
}

impl FileHandle {
    /// Reference to the interpreter's file object, usable with
    /// [`crate::Stack::push_reference`]
    pub fn reference(&self) -> RefHandle {
        self.reference
    }

    /// Direction the file was opened in
    pub fn status(&self) -> FileStatus {
        self.status
    }
}

impl InterpreterBridge {
    /// Open a file through `io.open`.
    ///
    /// Unsupported modes return `Ok(None)` without touching the interpreter.
    /// For supported modes the file status is recorded first; a failed open
    /// is logged and also returns `Ok(None)`.
    pub fn open(&mut self, name: &str, mode: &str) -> BridgeResult<Option<FileHandle>> {
        let Some(status) = FileStatus::classify(mode) else {
            log::debug!("unsupported file mode '{}' for {}", mode, name);
            return Ok(None);
        };
        self.status = Some(status);

        let depth = self.top();
        self.get_global_path("io.open")?;
        self.push_string(name)?;
        self.push_string(mode)?;
        if self.call(2, 2).is_err() {
            self.truncate(depth);
            return Ok(None);
        }

        if self.is_nil(-2) {
            let message = self.peek(-1).map(render).unwrap_or_default();
            log::error!("Error opening file {}: {}", name, message);
            self.truncate(depth);
            return Ok(None);
        }

        self.pop();
        let reference = self.to_reference()?;
        Ok(Some(FileHandle { reference, status }))
    }

    /// Close a file opened with [`Self::open`], consuming its handle
    pub fn close(&mut self, handle: FileHandle) -> BridgeResult<()> {
        let depth = self.top();
        self.get_global_path("io.close")?;
        if let Err(e) = self.from_reference(handle.reference) {
            self.truncate(depth);
            return Err(e);
        }
        self.finish_close(depth, 1)
    }

    /// Close the interpreter's default output file, as `io.close()` does
    pub fn close_default_output(&mut self) -> BridgeResult<()> {
        let depth = self.top();
        self.get_global_path("io.close")?;
        self.finish_close(depth, 0)
    }

    fn finish_close(&mut self, depth: usize, nargs: usize) -> BridgeResult<()> {
        let outcome = match self.call(nargs, 2) {
            Ok(()) if self.is_nil(-2) => {
                let message = self.peek(-1).map(render).unwrap_or_default();
                log::error!("Error closing file: {}", message);
                Err(BridgeError::Io(message))
            }
            other => other,
        };
        self.truncate(depth);
        outcome
    }

    /// Direction of the last file opened with a supported mode
    pub fn status(&self) -> Option<FileStatus> {
        self.status
    }
}
