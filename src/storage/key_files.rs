// src/storage/key_files.rs
//! Durable storage for PEM-encoded key material.
//!
//! Keys live as individual PEM files in one directory. Every file is written
//! under a temporary name first and only then published, so readers never see
//! a partial key. Private key files are published exclusively (never
//! overwritten) and, on Unix, readable by the owner only. Public key files may
//! be rewritten from their private half.

use crate::error::{KeyStoreError, KeyStoreResult};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Directory of PEM files.
#[derive(Debug, Clone)]
pub struct KeyFiles {
    dir: PathBuf,
}

/// What happened when a private key was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Someone else created the file first; nothing was written.
    AlreadyExists,
}

impl KeyFiles {
    /// Opens (and creates if needed) a key directory.
    pub fn open(dir: impl Into<PathBuf>) -> KeyStoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| KeyStoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Reads a PEM file, `None` if it does not exist.
    pub fn read(&self, file_name: &str) -> KeyStoreResult<Option<String>> {
        let path = self.path(file_name);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(KeyStoreError::Io { path, source }),
        }
    }

    /// Writes a private key file, refusing to replace an existing one.
    ///
    /// The PEM is written and synced under a temporary name, then hard-linked
    /// into place, so the final name only ever refers to a complete key.
    pub fn write_private(&self, file_name: &str, pem: &str) -> KeyStoreResult<WriteOutcome> {
        let path = self.path(file_name);
        let staged = self.write_staged(file_name, pem)?;

        let published = fs::hard_link(&staged, &path);
        let _ = fs::remove_file(&staged);
        match published {
            Ok(()) => Ok(WriteOutcome::Written),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(WriteOutcome::AlreadyExists),
            Err(source) => Err(KeyStoreError::Io { path, source }),
        }
    }

    /// Writes (or replaces) a public key file.
    pub fn write_public(&self, file_name: &str, pem: &str) -> KeyStoreResult<()> {
        let path = self.path(file_name);
        let staged = self.write_staged(file_name, pem)?;
        fs::rename(&staged, &path).map_err(|source| {
            let _ = fs::remove_file(&staged);
            KeyStoreError::Io { path, source }
        })
    }

    /// Writes `contents` to a fresh owner-only file next to `file_name` and syncs it.
    fn write_staged(&self, file_name: &str, contents: &str) -> KeyStoreResult<PathBuf> {
        let staged = self.path(&format!(
            ".{}.{}-{:016x}.tmp",
            file_name,
            std::process::id(),
            rand::random::<u64>()
        ));
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let written = options.open(&staged).and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        });
        match written {
            Ok(()) => Ok(staged),
            Err(source) => {
                let _ = fs::remove_file(&staged);
                Err(KeyStoreError::Io {
                    path: staged,
                    source,
                })
            }
        }
    }
}
