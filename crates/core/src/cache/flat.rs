//! Flat-file cache tier.
//!
//! Each key maps to two files named by the SHA-256 of the key:
//! `<stem>.bin` holds the payload and `<stem>.expiry` holds the expiry as
//! decimal Unix milliseconds. Writes land in a `.tmp` sibling first and are
//! renamed into place, so readers never observe a half-written file.
//! All I/O is synchronous.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::expiry::{from_millis, to_millis};
use super::hash::file_stem;
use super::store::{KeyValueStore, Tier};
use crate::Error;

const PROBE_FILE: &str = ".probe";

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Directory-backed fallback tier.
#[derive(Clone, Debug)]
pub struct FlatStore {
    root: PathBuf,
}

impl FlatStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Fails if the directory cannot be created or is not writable.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let probe = root.join(PROBE_FILE);
        fs::write(&probe, b"ok")?;
        fs::remove_file(&probe)?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.bin", file_stem(key)))
    }

    fn expiry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.expiry", file_stem(key)))
    }

    fn read(path: &Path) -> Result<Option<Vec<u8>>, Error> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(path: &Path, bytes: &[u8]) -> Result<(), Error> {
        let tmp = tmp_path(path);
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove both files for `key`. Missing files are not an error.
    pub fn remove(&self, key: &str) -> Result<(), Error> {
        for path in [self.data_path(key), self.expiry_path(key)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlatStore {
    fn tier(&self) -> Tier {
        Tier::Flat
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        Ok(Self::read(&self.data_path(key))?.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), Error> {
        Self::write(&self.data_path(key), &value)
    }

    async fn get_expiry(&self, key: &str) -> Result<Option<DateTime<Utc>>, Error> {
        let Some(raw) = Self::read(&self.expiry_path(key))? else {
            return Ok(None);
        };
        let millis = std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| Error::StorageUnavailable(format!("corrupt expiry file for {key}")))?;
        Ok(Some(from_millis(millis)))
    }

    async fn set_expiry(&self, key: &str, expiry: DateTime<Utc>) -> Result<(), Error> {
        Self::write(&self.expiry_path(key), to_millis(expiry).to_string().as_bytes())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.remove(key)
    }
}
