//! Storage operations
//!
//! Directory listing plus the two file-transfer endpoints: `OutgoingFile`
//! reads a stored file in bounded chunks for download, `IncomingFile` accepts
//! upload bytes into a temp file and atomically publishes the result under a
//! collision-free name.

use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::storage::validation::sanitize_filename;

/// Subdirectory of the server root holding in-progress uploads.
pub const INCOMING_DIR: &str = ".incoming";

/// Listing text when the served directory holds no regular files.
pub const EMPTY_LIST_SENTINEL: &str = "No files available on server";

/// Suffixed-name attempts before an upload is refused.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Names of the regular files directly under `root`, sorted and joined with
/// newlines. Subdirectories (including the incoming area) are skipped.
pub fn list_files(root: &Path) -> Result<String, StorageError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    if names.is_empty() {
        return Ok(EMPTY_LIST_SENTINEL.to_string());
    }
    names.sort();
    Ok(names.join("\n"))
}

/// A stored file opened for download.
#[derive(Debug)]
pub struct OutgoingFile {
    file: File,
    size: u64,
}

impl OutgoingFile {
    pub fn open(root: &Path, name: &str) -> Result<Self, StorageError> {
        let name = sanitize_filename(name)?;
        let path = root.join(name);
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::FileNotFound(name.to_string()),
            _ => StorageError::Io(e),
        })?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(StorageError::FileNotFound(name.to_string()));
        }
        Ok(Self {
            file,
            size: metadata.len(),
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// An upload in progress.
///
/// The final name is reserved up front with an exclusive create, so two
/// concurrent uploads can never settle on the same suffixed name. Payload
/// bytes stream into a temp file under the incoming area; `commit` renames it
/// over the reservation, and dropping an uncommitted upload removes both
/// files. A partial upload is therefore never visible under the stored name.
#[derive(Debug)]
pub struct IncomingFile {
    temp: Option<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl IncomingFile {
    pub fn create(root: &Path, requested_name: &str) -> Result<Self, StorageError> {
        let name = sanitize_filename(requested_name)?;
        let incoming = root.join(INCOMING_DIR);
        fs::create_dir_all(&incoming)?;

        let final_path = reserve_destination(root, name)?;
        // The reserved name is unique within the root, so it also keys the
        // temp file uniquely among concurrent uploads.
        let temp_path = match final_path.file_name() {
            Some(final_name) => incoming.join(final_name),
            None => return Err(StorageError::InvalidFileName(name.to_string())),
        };
        let temp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        Ok(Self {
            temp: Some(temp),
            temp_path,
            final_path,
            committed: false,
        })
    }

    /// Final name the upload will be stored under.
    pub fn stored_name(&self) -> String {
        self.final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        match &mut self.temp {
            Some(file) => file.write_all(bytes),
            None => Err(io::Error::other("upload already committed")),
        }
    }

    /// Flushes the temp file and atomically renames it over the reserved
    /// destination.
    pub fn commit(&mut self) -> io::Result<PathBuf> {
        if let Some(mut file) = self.temp.take() {
            file.flush()?;
        }
        fs::rename(&self.temp_path, &self.final_path)?;
        self.committed = true;
        Ok(self.final_path.clone())
    }
}

impl Drop for IncomingFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // Aborted transfer: close the handle, then discard temp bytes and
        // the empty reservation.
        self.temp.take();
        if let Err(e) = fs::remove_file(&self.temp_path) {
            debug!("Could not remove temp file {}: {}", self.temp_path.display(), e);
        }
        if let Err(e) = fs::remove_file(&self.final_path) {
            debug!(
                "Could not remove reservation {}: {}",
                self.final_path.display(),
                e
            );
        }
    }
}

/// Picks a name that collides with nothing in `root` and reserves it with an
/// exclusive create: `name.ext`, then `name(1).ext`, `name(2).ext`, ... until
/// a create-new succeeds.
fn reserve_destination(root: &Path, name: &str) -> Result<PathBuf, StorageError> {
    let (stem, extension) = split_extension(name);
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = if attempt == 0 {
            name.to_string()
        } else {
            format!("{stem}({attempt}){extension}")
        };
        let path = root.join(&candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                if attempt > 0 {
                    info!("Resolved name collision: {} -> {}", name, candidate);
                }
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(StorageError::Io(e)),
        }
    }
    Err(StorageError::NoAvailableName(name.to_string()))
}

/// `a.txt` -> `("a", ".txt")`. Names without a dot, and dotfiles like
/// `.hidden`, keep an empty extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(root: &Path, name: &str, contents: &[u8]) {
        fs::write(root.join(name), contents).unwrap();
    }

    #[test]
    fn listing_empty_directory_returns_sentinel() {
        let dir = tempdir().unwrap();
        assert_eq!(list_files(dir.path()).unwrap(), EMPTY_LIST_SENTINEL);
    }

    #[test]
    fn listing_is_sorted_and_skips_directories() {
        let dir = tempdir().unwrap();
        store(dir.path(), "b.txt", b"b");
        store(dir.path(), "a.txt", b"a");
        fs::create_dir(dir.path().join(INCOMING_DIR)).unwrap();
        assert_eq!(list_files(dir.path()).unwrap(), "a.txt\nb.txt");
    }

    #[test]
    fn upload_lands_under_requested_name_when_free() {
        let dir = tempdir().unwrap();
        let mut upload = IncomingFile::create(dir.path(), "fresh.txt").unwrap();
        upload.write_chunk(b"payload").unwrap();
        let path = upload.commit().unwrap();
        assert_eq!(path, dir.path().join("fresh.txt"));
        assert_eq!(fs::read(path).unwrap(), b"payload");
    }

    #[test]
    fn collision_resolution_is_deterministic() {
        let dir = tempdir().unwrap();
        store(dir.path(), "a.txt", b"first");
        store(dir.path(), "a(1).txt", b"second");

        let mut upload = IncomingFile::create(dir.path(), "a.txt").unwrap();
        assert_eq!(upload.stored_name(), "a(2).txt");
        upload.write_chunk(b"third").unwrap();
        upload.commit().unwrap();

        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"first");
        assert_eq!(fs::read(dir.path().join("a(1).txt")).unwrap(), b"second");
        assert_eq!(fs::read(dir.path().join("a(2).txt")).unwrap(), b"third");
    }

    #[test]
    fn extensionless_names_get_plain_suffix() {
        let dir = tempdir().unwrap();
        store(dir.path(), "README", b"old");
        let upload = IncomingFile::create(dir.path(), "README").unwrap();
        assert_eq!(upload.stored_name(), "README(1)");
    }

    #[test]
    fn dropped_upload_leaves_no_trace() {
        let dir = tempdir().unwrap();
        {
            let mut upload = IncomingFile::create(dir.path(), "doomed.bin").unwrap();
            upload.write_chunk(b"half a fil").unwrap();
        }
        assert_eq!(list_files(dir.path()).unwrap(), EMPTY_LIST_SENTINEL);
        assert!(!dir.path().join(INCOMING_DIR).join("doomed.bin").exists());
    }

    #[test]
    fn download_of_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = OutgoingFile::open(dir.path(), "ghost.txt").unwrap_err();
        assert!(matches!(err, StorageError::FileNotFound(_)));
    }

    #[test]
    fn download_reads_size_and_bytes() {
        let dir = tempdir().unwrap();
        store(dir.path(), "data.bin", b"0123456789");
        let mut out = OutgoingFile::open(dir.path(), "data.bin").unwrap();
        assert_eq!(out.size(), 10);
        let mut buf = [0u8; 4];
        assert_eq!(out.read_chunk(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
    }
}
