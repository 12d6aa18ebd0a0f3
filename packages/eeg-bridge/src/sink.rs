// Append-only metrics log
//
// One compact JSON document per line. The file is opened lazily in append
// mode on the first record, creating missing parent directories. A file left
// without a trailing newline (a torn write) is terminated before appending.

use crate::error::SinkError;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct MetricsSink {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
}

impl MetricsSink {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append `line` followed by a newline
    ///
    /// The line is written with a single `write_all` while the file lock is
    /// held, so concurrent records never interleave. `line` must not contain
    /// a newline of its own.
    pub fn record(&self, line: &str) -> Result<(), SinkError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let mut buf = Vec::with_capacity(line.len() + 2);

        let mut guard = self.file.lock();
        if guard.is_none() {
            let (file, torn) = open_append(path).map_err(|source| SinkError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if torn {
                buf.push(b'\n');
            }
            *guard = Some(file);
        }

        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        if let Some(file) = guard.as_mut() {
            if let Err(source) = file.write_all(&buf) {
                // Reopen on the next record in case the file was rotated away;
                // reopening also terminates any partial line left behind
                *guard = None;
                return Err(SinkError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        Ok(())
    }

    pub fn record_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), SinkError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let line = serde_json::to_string(value)?;
        self.record(&line)
    }
}

/// Open for appending; the flag is set when the last line is unterminated
fn open_append(path: &Path) -> std::io::Result<(File, bool)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    let torn = if file.metadata()?.len() > 0 {
        // Appends always land at the end regardless of this seek
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        last[0] != b'\n'
    } else {
        false
    };

    Ok((file, torn))
}
