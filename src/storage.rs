//! On-disk persistence for uploaded originals.
//!
//! Two root directories hold stored files by their generated file name:
//!
//! ```text
//! <temp_path>/sunset-<uuid>-<ts>.jpg   ← written by upload
//! <path>/sunset-<uuid>-<ts>.jpg        ← after promotion
//! ```
//!
//! ## Write discipline
//!
//! Nothing is ever written directly to a final path. [`ImageStorage::save`]
//! streams into a temporary file in the target directory, syncs it, then
//! links it into place with no-clobber semantics, so a crash mid-write
//! leaves no partial file under a stored name and an existing file is never
//! overwritten.
//!
//! [`move_file`] links the file into place and removes the source when both
//! roots share a filesystem. Across filesystems it copies into a temporary file next to
//! the destination, keeps the source's permission bits, verifies the copy
//! by SHA-256, links it into place and only then removes the source.
//! Repeating a move that already completed is a no-op.

use crate::error::{Result, StoreError};
use crate::types::Image;
use sha2::{Digest, Sha256};
use std::fs::{self, File, Permissions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const COPY_BUF_LEN: usize = 64 * 1024;

/// The permanent and temporary storage roots.
#[derive(Debug, Clone)]
pub struct ImageStorage {
    path: PathBuf,
    temp_path: PathBuf,
}

impl ImageStorage {
    /// Open storage rooted at `path` (permanent) and `temp_path` (uploads).
    ///
    /// Both directories are created if missing; calling this on existing
    /// directories is fine.
    ///
    /// Fails with [`StoreError::InvalidPath`] if both roots resolve to the
    /// same directory, through `.` segments, symlinks or otherwise.
    pub fn new(path: impl Into<PathBuf>, temp_path: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self {
            path: path.into(),
            temp_path: temp_path.into(),
        };
        for dir in [&storage.path, &storage.temp_path] {
            fs::create_dir_all(dir).map_err(StoreError::System)?;
        }
        if same_file(&storage.path, &storage.temp_path) {
            warn!(
                path = %storage.path.display(),
                temp_path = %storage.temp_path.display(),
                "permanent and temporary roots are the same directory"
            );
            return Err(StoreError::InvalidPath);
        }
        debug!(
            path = %storage.path.display(),
            temp_path = %storage.temp_path.display(),
            "storage ready"
        );
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Root directory for temporary or permanent files.
    pub fn base_path(&self, is_temp: bool) -> &Path {
        if is_temp { &self.temp_path } else { &self.path }
    }

    /// Where `image`'s original currently lives.
    pub fn full_path(&self, image: &Image) -> Result<PathBuf> {
        self.file_path(image.is_temp, &image.file_name)
    }

    /// Path of stored file `file_name` under the chosen root.
    ///
    /// Fails with [`StoreError::InvalidPath`] for an empty root or a file
    /// name that is not a single plain path component.
    pub fn file_path(&self, is_temp: bool, file_name: &str) -> Result<PathBuf> {
        let base = self.base_path(is_temp);
        if base.as_os_str().is_empty() || !is_plain_file_name(file_name) {
            return Err(StoreError::InvalidPath);
        }
        Ok(base.join(file_name))
    }

    /// Write the whole of `reader` to `file_name` under the chosen root.
    ///
    /// The stream is rewound first. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// - [`StoreError::FileRead`] if reading the stream fails
    /// - [`StoreError::FileCreate`] if the file cannot be written, or a file
    ///   with that name already exists
    /// - [`StoreError::System`] if the stream cannot be rewound
    pub fn save<R: Read + Seek>(
        &self,
        reader: &mut R,
        is_temp: bool,
        file_name: &str,
    ) -> Result<u64> {
        let dest = self.file_path(is_temp, file_name)?;
        reader.seek(SeekFrom::Start(0)).map_err(StoreError::System)?;

        let mut tmp =
            NamedTempFile::new_in(self.base_path(is_temp)).map_err(StoreError::FileCreate)?;
        let (written, _) = copy_stream(reader, tmp.as_file_mut()).map_err(|e| match e {
            CopyError::Read(e) => StoreError::FileRead(e),
            CopyError::Write(e) => StoreError::FileCreate(e),
        })?;
        tmp.as_file().sync_all().map_err(StoreError::FileCreate)?;
        tmp.persist_noclobber(&dest)
            .map_err(|e| StoreError::FileCreate(e.error))?;

        debug!(path = %dest.display(), bytes = written, "saved file");
        Ok(written)
    }

    /// Move `file_name` from the temporary root to the permanent one.
    pub fn promote_file(&self, file_name: &str) -> Result<PathBuf> {
        let src = self.file_path(true, file_name)?;
        let dst = self.file_path(false, file_name)?;
        move_file(&src, &dst)?;
        Ok(dst)
    }

    /// Best-effort removal of a stored file, used to undo an upload whose
    /// catalog insert failed. Failure is logged, never returned.
    pub fn discard(&self, is_temp: bool, file_name: &str) {
        let Ok(path) = self.file_path(is_temp, file_name) else {
            return;
        };
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "discarded file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to discard file"),
        }
    }

    /// Names of the stored files directly under the chosen root, sorted.
    /// Hidden files (including in-flight temporary files) are skipped.
    pub fn list_files(&self, is_temp: bool) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(self.base_path(is_temp))
            .min_depth(1)
            .max_depth(1)
        {
            let entry = entry.map_err(|e| StoreError::System(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !name.starts_with('.') {
                names.push(name.into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// Move `src` to `dst`, never overwriting a different file at `dst`.
///
/// The destination is created with a hard link, which fails instead of
/// replacing a file that appears at `dst` after the call starts. If `src`
/// and `dst` name the same file nothing is removed.
///
/// # Errors
///
/// - [`StoreError::FileMove`] if the cross-device copy fails or does not
///   verify, or `dst` already holds different content
/// - [`StoreError::System`] for any other filesystem failure, including
///   removing the source after a committed copy
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if same_file(src, dst) {
        debug!(path = %src.display(), "source and destination are the same file");
        return Ok(());
    }
    if !src.exists() && dst.exists() {
        debug!(dst = %dst.display(), "already moved");
        return Ok(());
    }

    match fs::hard_link(src, dst) {
        Ok(()) => {
            fs::remove_file(src).map_err(StoreError::System)?;
            debug!(src = %src.display(), dst = %dst.display(), "linked file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => finish_move(src, dst),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::CrossesDevices | io::ErrorKind::Unsupported
            ) =>
        {
            copy_across(src, dst)
        }
        Err(e) => Err(StoreError::System(e)),
    }
}

/// Both paths exist and are distinct files. A previous move committed the
/// copy but did not remove the source; finish it if the bytes match.
fn finish_move(src: &Path, dst: &Path) -> Result<()> {
    let same = hash_file(src).map_err(StoreError::System)?
        == hash_file(dst).map_err(StoreError::System)?;
    if !same {
        return Err(StoreError::FileMove(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "destination exists with different content",
        )));
    }
    fs::remove_file(src).map_err(StoreError::System)?;
    info!(src = %src.display(), dst = %dst.display(), "completed interrupted move");
    Ok(())
}

/// Whether `a` and `b` both exist and resolve to the same path.
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn copy_across(src: &Path, dst: &Path) -> Result<()> {
    let mut file = File::open(src).map_err(StoreError::System)?;
    let perms = file.metadata().map_err(StoreError::System)?.permissions();
    copy_across_from(&mut file, perms, src, dst)
}

/// Copy the contents of `src`, read through `reader`, to `dst`, then remove
/// `src`. The source is only removed after the copy is verified and in
/// place; on failure it is left untouched.
fn copy_across_from<R: Read>(
    reader: &mut R,
    perms: Permissions,
    src: &Path,
    dst: &Path,
) -> Result<()> {
    copy_verified(reader, dst, perms)?;
    fs::remove_file(src).map_err(StoreError::System)?;
    debug!(src = %src.display(), dst = %dst.display(), "copied file across devices");
    Ok(())
}

/// Copy `reader` to a new file at `dst` with `perms`, verifying the written
/// bytes against the digest of what was read.
///
/// On failure no file is left at `dst`.
fn copy_verified<R: Read>(reader: &mut R, dst: &Path, perms: Permissions) -> Result<()> {
    let dir = dst.parent().ok_or(StoreError::InvalidPath)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(StoreError::System)?;

    let expected = match copy_stream(reader, tmp.as_file_mut()) {
        Ok((_, digest)) => digest,
        Err(CopyError::Read(e) | CopyError::Write(e)) => {
            close_temp(tmp);
            return Err(StoreError::FileMove(e));
        }
    };

    let committed = tmp
        .as_file()
        .set_permissions(perms)
        .and_then(|()| tmp.as_file().sync_all())
        .and_then(|()| tmp.as_file_mut().seek(SeekFrom::Start(0)))
        .and_then(|_| hash_reader(tmp.as_file_mut()));
    match committed {
        Ok(actual) if actual == expected => {}
        Ok(_) => {
            close_temp(tmp);
            return Err(StoreError::FileMove(io::Error::other("copy checksum mismatch")));
        }
        Err(e) => {
            close_temp(tmp);
            return Err(StoreError::System(e));
        }
    }

    tmp.persist_noclobber(dst)
        .map_err(|e| StoreError::FileMove(e.error))?;
    Ok(())
}

/// Delete a partial copy. A failure here is logged so it cannot mask the
/// error that caused the cleanup.
fn close_temp(tmp: NamedTempFile) {
    let path = tmp.path().to_path_buf();
    if let Err(e) = tmp.close() {
        warn!(path = %path.display(), error = %e, "failed to remove partial copy");
    }
}

enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

/// Copy until EOF, returning the byte count and SHA-256 of what was copied.
fn copy_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> std::result::Result<(u64, String), CopyError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_BUF_LEN];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(CopyError::Write)?;
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    writer.flush().map_err(CopyError::Write)?;
    Ok((total, format!("{:x}", hasher.finalize())))
}

fn hash_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of a file's contents, as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    hash_reader(&mut File::open(path)?)
}
