//! Zip archives for bulk and folder downloads.
//!
//! Entries are planned from records first. The zip itself is written to an
//! anonymous temp file on a blocking thread and sent from there.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::{Result, VaultError};

/// A finished archive in a temp file, positioned at the start.
#[derive(Debug)]
pub struct Archive {
    /// Zip content. The file has no name on disk and goes away on drop.
    pub file: File,
    /// Size of the zip in bytes.
    pub size: u64,
    /// Number of file entries written.
    pub entries: usize,
    /// Number of entries that could not be read and were left out.
    pub skipped: usize,
}

/// Reduce a display name to a single safe path component.
fn sanitize_entry_name(name: &str, fallback: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

/// `name (n).ext` for the n-th duplicate of `name.ext`.
fn numbered(name: &str, n: usize) -> String {
    let path = Path::new(name);
    match (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|s| s.to_str()),
    ) {
        (Some(stem), Some(ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{name} ({n})"),
    }
}

/// Incrementally writes a zip archive.
///
/// Entry names are unique within the archive; a clash gets a ` (n)` suffix
/// before the extension.
pub struct ArchiveBuilder<W: Write + Seek> {
    zip: ZipWriter<W>,
    used: HashSet<String>,
    entries: usize,
    skipped: usize,
}

impl<W: Write + Seek> ArchiveBuilder<W> {
    /// Start an empty archive over `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            zip: ZipWriter::new(writer),
            used: HashSet::new(),
            entries: 0,
            skipped: 0,
        }
    }

    fn options() -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644)
    }

    fn directory_prefix(dir: &[String]) -> String {
        dir.iter()
            .map(|segment| sanitize_entry_name(segment, "folder"))
            .map(|segment| format!("{segment}/"))
            .collect()
    }

    fn unique_path(&mut self, dir: &[String], name: &str, fallback: &str) -> String {
        let prefix = Self::directory_prefix(dir);
        let name = sanitize_entry_name(name, fallback);

        let mut candidate = format!("{prefix}{name}");
        let mut n = 1;
        while self.used.contains(&candidate.to_lowercase()) {
            candidate = format!("{prefix}{}", numbered(&name, n));
            n += 1;
        }
        self.used.insert(candidate.to_lowercase());
        candidate
    }

    /// Copy `source` into a file entry under `dir` and return the entry path used.
    pub fn add_file(
        &mut self,
        dir: &[String],
        name: &str,
        fallback: &str,
        source: &mut impl Read,
    ) -> Result<String> {
        let path = self.unique_path(dir, name, fallback);
        self.zip
            .start_file(path.as_str(), Self::options())
            .map_err(|e| VaultError::Storage(format!("cannot add {path} to archive: {e}")))?;
        io::copy(source, &mut self.zip)
            .map_err(|e| VaultError::Storage(format!("cannot write {path} to archive: {e}")))?;
        self.entries += 1;
        Ok(path)
    }

    /// Add an Internet shortcut (`.url`) pointing at `url`.
    pub fn add_shortcut(&mut self, dir: &[String], name: &str, url: &str) -> Result<String> {
        let name = sanitize_entry_name(name, "link");
        let shortcut_name = if name.to_lowercase().ends_with(".url") {
            name
        } else {
            format!("{name}.url")
        };
        let body = format!("[InternetShortcut]\r\nURL={url}\r\n");
        self.add_file(dir, &shortcut_name, "link.url", &mut body.as_bytes())
    }

    /// Add an empty directory entry so empty folders survive extraction.
    pub fn add_directory(&mut self, dir: &[String]) -> Result<()> {
        if dir.is_empty() {
            return Ok(());
        }
        let path = Self::directory_prefix(dir);
        if !self.used.insert(path.to_lowercase()) {
            return Ok(());
        }
        self.zip
            .add_directory(path.as_str(), Self::options())
            .map_err(|e| VaultError::Storage(format!("cannot add {path} to archive: {e}")))
    }

    /// Record an entry that was left out.
    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    /// Number of file entries written so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Number of entries left out so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Write the central directory and hand back the writer.
    pub fn finish(mut self) -> Result<W> {
        self.zip
            .finish()
            .map_err(|e| VaultError::Storage(format!("cannot finalize archive: {e}")))
    }
}

/// One planned archive entry.
#[derive(Debug, Clone)]
enum PlannedEntry {
    Directory(Vec<String>),
    Stored {
        dir: Vec<String>,
        name: String,
        path: PathBuf,
        file_id: i64,
    },
    Shortcut {
        dir: Vec<String>,
        name: String,
        url: String,
    },
    Missing {
        file_id: i64,
    },
}

/// Entries to pack, collected before any bytes are read.
#[derive(Debug, Clone, Default)]
pub struct ArchivePlan {
    entries: Vec<PlannedEntry>,
}

impl ArchivePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty directory entry, so empty folders survive extraction.
    pub fn directory(&mut self, dir: Vec<String>) {
        self.entries.push(PlannedEntry::Directory(dir));
    }

    /// A stored file read from `path` when the archive is written.
    pub fn stored(&mut self, dir: Vec<String>, name: &str, path: PathBuf, file_id: i64) {
        self.entries.push(PlannedEntry::Stored {
            dir,
            name: name.to_string(),
            path,
            file_id,
        });
    }

    /// An Internet shortcut for a link kept by reference.
    pub fn shortcut(&mut self, dir: Vec<String>, name: &str, url: &str) {
        self.entries.push(PlannedEntry::Shortcut {
            dir,
            name: name.to_string(),
            url: url.to_string(),
        });
    }

    /// A record with no content; counted as skipped.
    pub fn missing(&mut self, file_id: i64) {
        self.entries.push(PlannedEntry::Missing { file_id });
    }

    /// Write the archive into an anonymous temp file under `temp_dir`.
    ///
    /// Runs on the blocking pool. Fails with `Storage` when no file entry
    /// could be written.
    pub async fn write(self, temp_dir: PathBuf) -> Result<Archive> {
        tokio::task::spawn_blocking(move || self.write_blocking(&temp_dir))
            .await
            .map_err(|e| VaultError::Storage(format!("archive task failed: {e}")))?
    }

    fn write_blocking(self, temp_dir: &Path) -> Result<Archive> {
        let file = tempfile::tempfile_in(temp_dir)
            .map_err(|e| VaultError::Storage(format!("cannot create archive file: {e}")))?;
        let mut builder = ArchiveBuilder::new(file);

        for entry in self.entries {
            match entry {
                PlannedEntry::Directory(dir) => builder.add_directory(&dir)?,
                PlannedEntry::Stored {
                    dir,
                    name,
                    path,
                    file_id,
                } => match File::open(&path) {
                    Ok(mut source) => {
                        builder.add_file(&dir, &name, "file", &mut source)?;
                    }
                    Err(e) => {
                        warn!(file_id, error = %e, "Leaving unreadable file out of archive");
                        builder.skip();
                    }
                },
                PlannedEntry::Shortcut { dir, name, url } => {
                    builder.add_shortcut(&dir, &name, &url)?;
                }
                PlannedEntry::Missing { file_id } => {
                    warn!(file_id, "Leaving file without content out of archive");
                    builder.skip();
                }
            }
        }

        if builder.entries() == 0 {
            return Err(VaultError::Storage(
                "none of the files could be read".to_string(),
            ));
        }

        let (entries, skipped) = (builder.entries(), builder.skipped());
        let mut file = builder.finish()?;
        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        Ok(Archive {
            file,
            size,
            entries,
            skipped,
        })
    }
}
