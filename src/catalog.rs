//! Image metadata catalog.
//!
//! The pipeline needs only three operations from its metadata store,
//! captured by [`ImageRepository`]: insert with a uniqueness check, lookup
//! by name, and an optimistic-version update. [`Catalog`] is the bundled
//! implementation: an in-memory map behind a mutex, optionally persisted as
//! a JSON file after every successful write.
//!
//! ## Storage
//!
//! ```json
//! {
//!   "next_id": 2,
//!   "images": { "sunset-…": { "id": 1, "name": "sunset-…", ... } }
//! }
//! ```
//!
//! Writes go to a temporary file in the same directory and are renamed over
//! the catalog, so a crash never leaves a half-written file. A write that
//! fails to persist is not applied in memory either.
//!
//! Several processes may share one catalog file. Every write takes an
//! exclusive lock on `<catalog>.lock`, reloads the file and applies the
//! change to what it finds there. Reads reload under a shared lock.

use crate::error::{Result, StoreError};
use crate::types::Image;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Narrow persistence contract for image metadata.
pub trait ImageRepository: Send + Sync {
    /// Store a new record. Assigns `id`, `created_at`, `updated_at` and
    /// `version` on `image`.
    ///
    /// Fails with [`StoreError::DuplicateName`] if the name or stored file
    /// name is already taken.
    fn insert(&self, image: &mut Image) -> Result<()>;

    /// Fails with [`StoreError::NotFound`].
    fn get_by_name(&self, name: &str) -> Result<Image>;

    /// Persist `alt` and `is_temp` changes, bumping `version` on `image`.
    ///
    /// Fails with [`StoreError::EditConflict`] if the stored version no
    /// longer matches `image.version`.
    fn update(&self, image: &mut Image) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogState {
    next_id: i64,
    images: BTreeMap<String, Image>,
}

#[derive(Debug)]
pub struct Catalog {
    state: Mutex<CatalogState>,
    path: Option<PathBuf>,
}

impl Catalog {
    /// A catalog that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(CatalogState::default()),
            path: None,
        }
    }

    /// Load the catalog at `path`, or start empty if the file doesn't exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = {
            let _lock = CatalogLock::shared(&path)?;
            read_state(&path)?
        };
        debug!(path = %path.display(), images = state.images.len(), "opened catalog");
        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
        })
    }

    /// All records, ordered by id.
    pub fn images(&self) -> Result<Vec<Image>> {
        self.read(|state| {
            let mut images: Vec<Image> = state.images.values().cloned().collect();
            images.sort_by_key(|image| image.id);
            images
        })
    }

    /// Write the current state to disk. A no-op for in-memory catalogs.
    pub fn save(&self) -> Result<()> {
        self.write(|_| Ok(()))
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the latest state, reloading it from disk under a
    /// shared lock when the catalog is file-backed.
    fn read<T>(&self, f: impl FnOnce(&CatalogState) -> T) -> Result<T> {
        let mut state = self.lock();
        if let Some(path) = &self.path {
            let _lock = CatalogLock::shared(path)?;
            *state = read_state(path)?;
        }
        Ok(f(&state))
    }

    /// Apply `f` to a copy of the latest state and make it current once it
    /// is persisted.
    ///
    /// File-backed catalogs hold an exclusive lock from the reload through
    /// the write, so concurrent writers in other processes are serialized
    /// and never drop each other's records.
    fn write<T>(&self, f: impl FnOnce(&mut CatalogState) -> Result<T>) -> Result<T> {
        let mut state = self.lock();
        let Some(path) = &self.path else {
            let mut next = state.clone();
            let out = f(&mut next)?;
            *state = next;
            return Ok(out);
        };

        let _lock = CatalogLock::exclusive(path)?;
        let mut next = read_state(path)?;
        let out = f(&mut next)?;
        write_atomic(path, &next).map_err(StoreError::System)?;
        *state = next;
        Ok(out)
    }
}

/// Advisory lock on `<catalog>.lock`, released when dropped.
struct CatalogLock(File);

impl CatalogLock {
    fn shared(catalog: &Path) -> Result<Self> {
        let file = Self::open_lock_file(catalog)?;
        file.lock_shared().map_err(StoreError::System)?;
        Ok(Self(file))
    }

    fn exclusive(catalog: &Path) -> Result<Self> {
        let file = Self::open_lock_file(catalog)?;
        file.lock().map_err(StoreError::System)?;
        Ok(Self(file))
    }

    fn open_lock_file(catalog: &Path) -> Result<File> {
        fs::create_dir_all(parent_dir(catalog)).map_err(StoreError::System)?;
        let mut lock_path = catalog.as_os_str().to_owned();
        lock_path.push(".lock");
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(PathBuf::from(lock_path))
            .map_err(StoreError::System)
    }
}

impl Drop for CatalogLock {
    fn drop(&mut self) {
        if let Err(e) = self.0.unlock() {
            warn!(error = %e, "failed to release catalog lock");
        }
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn read_state(path: &Path) -> Result<CatalogState> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| StoreError::System(io::Error::new(io::ErrorKind::InvalidData, e))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(CatalogState::default()),
        Err(e) => Err(StoreError::System(e)),
    }
}

fn write_atomic(path: &Path, state: &CatalogState) -> io::Result<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(state)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl ImageRepository for Catalog {
    fn insert(&self, image: &mut Image) -> Result<()> {
        let record = self.write(|state| {
            let taken = state.images.values().any(|existing| {
                existing.name == image.name || existing.file_name == image.file_name
            });
            if taken {
                return Err(StoreError::DuplicateName);
            }

            let now = Utc::now();
            let mut record = image.clone();
            record.id = state.next_id + 1;
            record.created_at = now;
            record.updated_at = now;
            record.version = 1;

            state.next_id = record.id;
            state.images.insert(record.name.clone(), record.clone());
            Ok(record)
        })?;

        debug!(id = record.id, name = %record.name, "inserted image");
        *image = record;
        Ok(())
    }

    fn get_by_name(&self, name: &str) -> Result<Image> {
        self.read(|state| state.images.get(name).cloned())?
            .ok_or(StoreError::NotFound)
    }

    fn update(&self, image: &mut Image) -> Result<()> {
        let record = self.write(|state| {
            let mut record = match state.images.get(&image.name) {
                Some(r) if r.id == image.id && r.version == image.version => r.clone(),
                _ => return Err(StoreError::EditConflict),
            };
            record.alt = image.alt.clone();
            record.is_temp = image.is_temp;
            record.updated_at = Utc::now();
            record.version += 1;

            state.images.insert(record.name.clone(), record.clone());
            Ok(record)
        })?;

        debug!(id = record.id, version = record.version, "updated image");
        *image = record;
        Ok(())
    }
}
