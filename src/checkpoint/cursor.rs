//! Durable feed cursor.
//!
//! Epistemic foundation:
//! - K_i: The cursor file holds the next position to read, optionally
//!   followed by `:n` when the first n events at that position are done
//! - K_i: State is persisted to disk atomically (write-then-rename)
//! - B_i: Cursor file may not exist → Option
//! - I^B: Crash during write → backup file provides recovery
//!
//! Delivery is at-least-once: an event in flight when the process dies is
//! read again on restart.

use crate::models::{CuratorError, FeedEvent, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persistent resume position for the feed.
pub struct StreamCursor {
    path: PathBuf,
    backup_path: PathBuf,
    temp_path: PathBuf,
    position: Option<u64>,
    handled: u32,
}

impl StreamCursor {
    /// Open the cursor at `path`, loading any stored position.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| CuratorError::io("creating cursor dir", e))?;
        }

        let mut cursor = Self {
            path: path.to_path_buf(),
            backup_path: with_suffix(path, "bak"),
            temp_path: with_suffix(path, "tmp"),
            position: None,
            handled: 0,
        };
        if let Some((position, handled)) = cursor.load()? {
            cursor.position = Some(position);
            cursor.handled = handled;
        }

        match cursor.position {
            Some(position) => info!(position, handled = cursor.handled, "Resuming from cursor"),
            None => info!(path = %path.display(), "No cursor found, starting fresh"),
        }

        Ok(cursor)
    }

    /// Stored position, if any.
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    /// Events at the stored position that were already handled.
    pub fn handled(&self) -> u32 {
        self.handled
    }

    /// Stored position, or `default` when none is stored.
    pub fn resume_from(&self, default: u64) -> u64 {
        self.position.unwrap_or(default)
    }

    /// Move the cursor to `next` and persist it.
    ///
    /// The cursor never moves backwards; a lower value is ignored.
    pub fn advance(&mut self, next: u64) -> Result<()> {
        if let Some(current) = self.position {
            if next < current {
                warn!(current, next, "Ignoring backwards cursor move");
                return Ok(());
            }
            if next == current {
                return Ok(());
            }
        }
        self.write(next, 0)
    }

    /// Mark `event` as handled.
    ///
    /// The last event of a position moves the cursor past it; any other
    /// event bumps the handled count so a restart skips it.
    pub fn record(&mut self, event: &FeedEvent) -> Result<()> {
        if event.closes_position {
            return self.advance(event.resume_position());
        }

        let handled = match self.position {
            Some(current) if event.position < current => {
                warn!(current, position = event.position, "Ignoring backwards cursor move");
                return Ok(());
            }
            Some(current) if event.position == current => self.handled + 1,
            _ => 1,
        };
        self.write(event.position, handled)
    }

    /// Overwrite the cursor unconditionally (operator override).
    pub fn reset(&mut self, position: u64) -> Result<()> {
        self.write(position, 0)
    }

    fn write(&mut self, position: u64, handled: u32) -> Result<()> {
        if self.path.exists() {
            fs::copy(&self.path, &self.backup_path)
                .map_err(|e| CuratorError::io("backing up cursor", e))?;
        }

        let content = if handled == 0 {
            format!("{position}\n")
        } else {
            format!("{position}:{handled}\n")
        };
        fs::write(&self.temp_path, content)
            .map_err(|e| CuratorError::io("writing temp cursor", e))?;
        fs::rename(&self.temp_path, &self.path)
            .map_err(|e| CuratorError::io("renaming cursor", e))?;

        self.position = Some(position);
        self.handled = handled;
        debug!(position, handled, "Cursor saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<(u64, u32)>> {
        match read_position(&self.path) {
            Ok(position) => Ok(position),
            Err(e) => {
                warn!(error = %e, "Cursor unreadable, trying backup");
                read_position(&self.backup_path)
            }
        }
    }
}

fn read_position(path: &Path) -> Result<Option<(u64, u32)>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| CuratorError::io("reading cursor", e))?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let invalid = |e: std::num::ParseIntError| {
        CuratorError::ParseError(format!("Invalid cursor '{trimmed}': {e}"))
    };
    let (position, handled) = trimmed.split_once(':').unwrap_or((trimmed, "0"));
    Ok(Some((
        position.parse().map_err(invalid)?,
        handled.parse().map_err(invalid)?,
    )))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
