use std::collections::HashSet;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Byte-level copy and move primitives.
///
/// Nothing here ever exposes a half-written destination: data goes to a hidden
/// sibling first, is flushed to disk, then renamed into place.
#[derive(Debug, Clone)]
pub struct FileOperations {
    buffer_size: usize,
    force_copy: bool,
}

impl FileOperations {
    pub fn new() -> Self {
        Self {
            buffer_size: 64 * 1024, // 64KB buffer
            force_copy: false,
        }
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(4096); // Minimum 4KB buffer
        self
    }

    pub fn with_force_copy(mut self, force: bool) -> Self {
        self.force_copy = force;
        self
    }

    /// Copy `source` to `dest`, which must not exist yet. Returns bytes copied.
    pub fn copy_durable(&self, source: &Path, dest: &Path) -> io::Result<u64> {
        if !fs::metadata(source)?.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", source.display()),
            ));
        }
        ensure_vacant(dest)?;

        let partial = partial_path(dest);
        // Leftover from an interrupted run
        let _ = fs::remove_file(&partial);

        let result = self
            .copy_file_with_buffer(source, &partial)
            .and_then(|bytes| {
                fs::rename(&partial, dest)?;
                Ok(bytes)
            });

        if result.is_err() {
            let _ = fs::remove_file(&partial);
        }
        result
    }

    /// Move `source` to `dest`, which must not exist yet.
    ///
    /// A plain rename is tried first. Across volumes this falls back to a
    /// durable copy, and the source is only removed once the copy is on disk.
    /// If the source cannot be removed the copy is rolled back, so the file
    /// ends up in exactly one place.
    pub fn move_file(&self, source: &Path, dest: &Path) -> io::Result<()> {
        ensure_vacant(dest)?;

        if !self.force_copy {
            match fs::rename(source, dest) {
                Ok(()) => return Ok(()),
                Err(e) if is_cross_device(&e) => {
                    debug!(source = %source.display(), "cross-device move, copying");
                }
                Err(e) => return Err(e),
            }
        }

        self.copy_then_remove(source, dest, |path| fs::remove_file(path))
    }

    fn copy_then_remove<F>(&self, source: &Path, dest: &Path, remove_source: F) -> io::Result<()>
    where
        F: FnOnce(&Path) -> io::Result<()>,
    {
        self.copy_durable(source, dest)?;

        if let Err(e) = remove_source(source) {
            debug!(source = %source.display(), error = %e, "source not removable, rolling back copy");
            let _ = fs::remove_file(dest);
            return Err(e);
        }

        Ok(())
    }

    fn copy_file_with_buffer(&self, source: &Path, dest: &Path) -> io::Result<u64> {
        let source_file = fs::File::open(source)?;
        let dest_file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)?;

        let mut reader = BufReader::with_capacity(self.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.buffer_size, dest_file);

        let mut total_bytes = 0u64;
        let mut buffer = vec![0u8; 8192]; // 8KB chunks

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            writer.write_all(&buffer[..bytes_read])?;
            total_bytes += bytes_read as u64;
        }

        let dest_file = writer.into_inner().map_err(|e| e.into_error())?;
        dest_file.sync_all()?;

        // Keep the source's modification time on the copy
        if let Ok(modified_time) = fs::metadata(source).and_then(|m| m.modified()) {
            let _ = filetime::set_file_mtime(
                dest,
                filetime::FileTime::from_system_time(modified_time),
            );
        }

        Ok(total_bytes)
    }
}

impl Default for FileOperations {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_vacant(dest: &Path) -> io::Result<()> {
    if dest.symlink_metadata().is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("destination already exists: {}", dest.display()),
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    // EXDEV
    err.raw_os_error() == Some(18)
}

#[cfg(windows)]
fn is_cross_device(err: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    err.raw_os_error() == Some(17)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_err: &io::Error) -> bool {
    true
}

/// Short per-file reason for a batch report.
pub fn failure_reason(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "file no longer exists".to_string(),
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        io::ErrorKind::AlreadyExists => "destination already exists".to_string(),
        _ => err.to_string(),
    }
}

/// Hidden sibling used while `dest` is being written.
pub fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    dest.with_file_name(format!(".{}.part", name))
}

/// Replace `path` with `data` via write-new-then-rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Picks file names that do not collide, case-insensitively, with names
/// already taken in one directory. The first claim of a name keeps it; later
/// claims get `stem (n).ext` with the smallest free `n`.
#[derive(Debug, Default)]
pub struct NameAllocator {
    taken: HashSet<String>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with the regular entries already present in `dir`.
    pub fn from_directory(dir: &Path) -> io::Result<Self> {
        let mut allocator = Self::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            allocator.reserve(&entry.file_name().to_string_lossy());
        }
        Ok(allocator)
    }

    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_lowercase());
    }

    pub fn claim(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_lowercase()) {
            return name.to_string();
        }

        let path = Path::new(name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

        let mut n = 1;
        loop {
            let candidate = match &ext {
                Some(ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            };
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}
