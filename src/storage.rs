//! Backup-and-replace file writes.
//!
//! A write goes to `<file>.new` first. Committing renames the current file
//! (if any) to a timestamped `<file>.<stamp>.bak` and then moves the
//! temporary into place. Splitting the two steps lets a caller stage several
//! files before touching any of the live ones.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::env::Environment;
use crate::error::Result;

const BACKUP_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.9f";

/// A temporary file written next to its destination, not yet in place.
#[derive(Debug)]
#[must_use = "a staged write does nothing until committed"]
pub struct StagedWrite {
    path: PathBuf,
    temp: PathBuf,
}

impl StagedWrite {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }
}

/// Writes documents with backup-and-replace semantics.
#[derive(Debug, Clone, Copy)]
pub struct AtomicWriter<'a> {
    env: &'a dyn Environment,
}

impl<'a> AtomicWriter<'a> {
    /// `env` supplies the timestamp used in backup names.
    pub fn new(env: &'a dyn Environment) -> Self {
        Self { env }
    }

    /// Stage and commit in one go. Returns the backup path, if one was made.
    pub fn write(&self, path: &Path, text: &str) -> Result<Option<PathBuf>> {
        let staged = self.stage(path, text)?;
        self.commit(staged)
    }

    /// Write `text` to the temporary sibling of `path`.
    pub fn stage(&self, path: &Path, text: &str) -> Result<StagedWrite> {
        let temp = temp_path(path);
        let result = File::create(&temp).and_then(|mut file| {
            file.write_all(text.as_bytes())?;
            file.sync_all()
        });
        if let Err(err) = result {
            warn!(temp = %temp.display(), error = %err, "staging write failed");
            return Err(err.into());
        }
        debug!(path = %path.display(), temp = %temp.display(), "staged write");
        Ok(StagedWrite {
            path: path.to_path_buf(),
            temp,
        })
    }

    /// Move an existing file aside and put the staged temporary in its place.
    ///
    /// On failure the temporary is left where it is.
    pub fn commit(&self, staged: StagedWrite) -> Result<Option<PathBuf>> {
        let StagedWrite { path, temp } = staged;

        let backup = if path.exists() {
            let backup = self.backup_path(&path);
            if let Err(err) = fs::rename(&path, &backup) {
                warn!(path = %path.display(), temp = %temp.display(), error = %err, "backup rename failed");
                return Err(err.into());
            }
            debug!(path = %path.display(), backup = %backup.display(), "moved previous version aside");
            Some(backup)
        } else {
            None
        };

        if let Err(err) = fs::rename(&temp, &path) {
            warn!(path = %path.display(), temp = %temp.display(), error = %err, "replace rename failed");
            return Err(err.into());
        }
        debug!(path = %path.display(), "committed write");
        Ok(backup)
    }

    /// `<file>.<stamp>.bak`, with a numeric suffix if that name is taken.
    fn backup_path(&self, path: &Path) -> PathBuf {
        let stamp = self.env.now().format(BACKUP_STAMP_FORMAT).to_string();
        let base = append_to_file_name(path, &format!(".{stamp}"));
        let mut candidate = append_to_file_name(&base, ".bak");
        let mut n = 1;
        while candidate.exists() {
            candidate = append_to_file_name(&base, &format!(".{n}.bak"));
            n += 1;
        }
        candidate
    }
}

/// The temporary sibling used while staging `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    append_to_file_name(path, ".new")
}

fn append_to_file_name(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
