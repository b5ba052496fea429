//! Archive extraction with path containment
//!
//! # Flow
//!
//! ```text
//! ArchiveSet::open(paths)      every archive opened, members counted
//!     ↓
//! ArchiveSet::extract_to(root) destination canonicalized
//!     ↓
//! Extraction (Iterator)        one EntryOutcome per archive member
//! ```
//!
//! Every entry path is joined onto the canonical destination root and
//! normalized; anything that lands on or outside the root is rejected with
//! [`InstallError::PathTraversal`]. Parent directories are canonicalized
//! again after creation so a symlinked directory cannot redirect writes, and
//! a symlink already present at a file's destination must resolve inside the
//! root as well.
//!
//! A failing entry never stops the iteration. Only opening an archive is
//! fatal, and that happens in [`ArchiveSet::open`] before anything is written.

use crate::error::{InstallError, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

/// An opened archive kept alive for the whole run
struct OpenArchive {
    path: PathBuf,
    zip: ZipArchive<File>,
}

/// The ordered set of archives for one installation.
///
/// File handles stay open until the set is dropped, which happens at the
/// end of the run or on the first fatal error.
pub struct ArchiveSet {
    archives: Vec<OpenArchive>,
    total: u64,
}

impl std::fmt::Debug for ArchiveSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSet")
            .field(
                "archives",
                &self.archives.iter().map(|a| &a.path).collect::<Vec<_>>(),
            )
            .field("total", &self.total)
            .finish()
    }
}

impl ArchiveSet {
    /// Open every archive and count its members.
    ///
    /// # Errors
    ///
    /// `FatalConfig` naming the first archive that cannot be opened or read
    /// as a zip file.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut archives = Vec::with_capacity(paths.len());
        let mut total = 0u64;

        for path in paths {
            let path = path.as_ref();
            let zip = File::open(path)
                .map_err(|e| e.to_string())
                .and_then(|file| ZipArchive::new(file).map_err(|e| e.to_string()))
                .map_err(|e| {
                    InstallError::fatal(format!(
                        "Failed to open archive {}: {}",
                        path.display(),
                        e
                    ))
                })?;

            tracing::debug!("Opened archive {} ({} entries)", path.display(), zip.len());
            total += zip.len() as u64;
            archives.push(OpenArchive {
                path: path.to_path_buf(),
                zip,
            });
        }

        Ok(Self { archives, total })
    }

    /// Sum of member counts across all archives
    pub fn total_entries(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Start a lazy extraction into `destination`, which must exist.
    pub fn extract_to(&mut self, destination: &Path) -> Result<Extraction<'_>> {
        let root = fs::canonicalize(destination).map_err(|e| {
            InstallError::fatal(format!(
                "Cannot resolve install root {}: {}",
                destination.display(),
                e
            ))
        })?;

        Ok(Extraction {
            archives: &mut self.archives,
            root,
            total: self.total,
            archive_idx: 0,
            entry_idx: 0,
            completed: 0,
        })
    }
}

/// Result of processing one archive member
#[derive(Debug)]
pub enum EntryOutcome {
    /// A directory entry was created
    Directory(PathBuf),
    /// A file entry was written
    File { path: PathBuf, bytes: u64 },
    /// The entry was skipped; extraction continues
    Rejected { entry: String, error: InstallError },
}

impl EntryOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Lazy iterator over archive members, in archive order.
pub struct Extraction<'a> {
    archives: &'a mut [OpenArchive],
    root: PathBuf,
    total: u64,
    archive_idx: usize,
    entry_idx: usize,
    completed: u64,
}

impl Extraction<'_> {
    /// Entries successfully extracted so far
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Progress denominator
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Canonical destination root
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Iterator for Extraction<'_> {
    type Item = EntryOutcome;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let archive = self.archives.get_mut(self.archive_idx)?;
            if self.entry_idx >= archive.zip.len() {
                self.archive_idx += 1;
                self.entry_idx = 0;
                continue;
            }

            let index = self.entry_idx;
            self.entry_idx += 1;

            let outcome = extract_entry(&self.root, archive, index);
            if !outcome.is_rejected() {
                self.completed += 1;
            }
            return Some(outcome);
        }
    }
}

fn extract_entry(root: &Path, archive: &mut OpenArchive, index: usize) -> EntryOutcome {
    let mut file = match archive.zip.by_index(index) {
        Ok(file) => file,
        Err(e) => {
            return EntryOutcome::Rejected {
                entry: format!("{}#{}", archive.path.display(), index),
                error: InstallError::extraction(format!(
                    "Failed to open entry in archive: {}",
                    e
                )),
            };
        }
    };

    let entry = file.name().to_string();
    let reject = |error: InstallError| EntryOutcome::Rejected {
        entry: entry.clone(),
        error,
    };

    let dest = match contained_path(root, &entry) {
        Ok(dest) => dest,
        Err(e) => return reject(e),
    };

    if file.is_dir() {
        if let Err(e) = create_dir_within(root, &dest) {
            return reject(e);
        }
        tracing::debug!("Created directory {}", dest.display());
        return EntryOutcome::Directory(dest);
    }

    if let Some(parent) = dest.parent() {
        if let Err(e) = create_dir_within(root, parent) {
            return reject(e);
        }
    }

    if let Err(e) = check_existing_link(root, &dest) {
        return reject(e);
    }

    let mut out = match File::create(&dest) {
        Ok(out) => out,
        Err(e) => {
            return reject(InstallError::extraction(format!(
                "Failed to create file {}: {}",
                dest.display(),
                e
            )));
        }
    };

    match io::copy(&mut file, &mut out) {
        Ok(bytes) => {
            tracing::debug!("Extracted {} ({} bytes)", dest.display(), bytes);
            EntryOutcome::File { path: dest, bytes }
        }
        Err(e) => reject(InstallError::extraction(format!(
            "Failed to copy data for {}: {}",
            entry, e
        ))),
    }
}

/// Create `dir` (recursively) and confirm its canonical form stays inside
/// `root`.
fn create_dir_within(root: &Path, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        InstallError::extraction(format!(
            "Failed to create directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let canonical = fs::canonicalize(dir)?;
    if canonical != root && !canonical.starts_with(root) {
        return Err(InstallError::PathTraversal {
            entry: dir.display().to_string(),
            resolved: canonical,
        });
    }
    Ok(())
}

/// A symlink already sitting at `dest` must resolve strictly inside `root`,
/// otherwise creating the file would write through it.
fn check_existing_link(root: &Path, dest: &Path) -> Result<()> {
    let is_link = fs::symlink_metadata(dest)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        return Ok(());
    }

    let target = fs::canonicalize(dest).unwrap_or_else(|_| {
        fs::read_link(dest).unwrap_or_else(|_| dest.to_path_buf())
    });
    if target == root || !target.starts_with(root) {
        return Err(InstallError::PathTraversal {
            entry: dest.display().to_string(),
            resolved: target,
        });
    }
    Ok(())
}

/// Resolve an archive entry name against `root` without touching the disk.
///
/// The result is strictly inside `root`: absolute names, names that climb
/// above the root and names that resolve to the root itself are rejected.
pub fn contained_path(root: &Path, entry: &str) -> Result<PathBuf> {
    let mut resolved = root.to_path_buf();
    let traversal = |resolved: PathBuf| InstallError::PathTraversal {
        entry: entry.to_string(),
        resolved,
    };

    for component in Path::new(entry).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved == root {
                    return Err(traversal(root.parent().unwrap_or(root).to_path_buf()));
                }
                resolved.pop();
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(traversal(PathBuf::from(entry)));
            }
        }
    }

    if resolved == root || !resolved.starts_with(root) {
        return Err(traversal(resolved));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, Option<&str>)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).expect("create zip"));
        for (name, data) in entries {
            match data {
                Some(bytes) => {
                    writer
                        .start_file(*name, SimpleFileOptions::default())
                        .expect("start file");
                    writer.write_all(bytes.as_bytes()).expect("write");
                }
                None => writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .expect("add dir"),
            }
        }
        writer.finish().expect("finish");
    }

    #[test]
    fn test_contained_path_accepts_nested() {
        let root = Path::new("/opt/game");
        assert_eq!(
            contained_path(root, "bin/run.sh").expect("inside"),
            PathBuf::from("/opt/game/bin/run.sh")
        );
        assert_eq!(
            contained_path(root, "./a/../b").expect("inside"),
            PathBuf::from("/opt/game/b")
        );
    }

    #[test]
    fn test_contained_path_rejects_escape() {
        let root = Path::new("/opt/game");
        for entry in ["../../etc/passwd", "a/../../x", "/etc/passwd", ".", "a/.."] {
            let err = contained_path(root, entry).unwrap_err();
            assert!(
                matches!(err, InstallError::PathTraversal { .. }),
                "{} should be rejected",
                entry
            );
        }
    }

    #[test]
    fn test_contained_path_rejects_sibling_prefix() {
        // "/opt/game-evil" shares a string prefix with "/opt/game"
        let err = contained_path(Path::new("/opt/game"), "../game-evil/x").unwrap_err();
        assert!(matches!(err, InstallError::PathTraversal { .. }));
    }

    #[test]
    fn test_open_counts_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.zip");
        let b = dir.path().join("b.zip");
        write_zip(&a, &[("data/", None), ("data/x.txt", Some("x"))]);
        write_zip(&b, &[("run.sh", Some("#!/bin/sh\n"))]);

        let set = ArchiveSet::open(&[a, b]).expect("open");
        assert_eq!(set.total_entries(), 3);
        assert!(!set.is_empty());
    }

    #[test]
    fn test_open_names_bad_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bad = dir.path().join("broken.zip");
        fs::write(&bad, b"not a zip").expect("write");

        let err = ArchiveSet::open(&[bad]).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("broken.zip"));
    }

    #[test]
    fn test_extraction_writes_files_and_counts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("game.zip");
        write_zip(
            &archive,
            &[
                ("Game/", None),
                ("Game/Content/level.bin", Some("level")),
                ("Game/readme.txt", Some("hello")),
            ],
        );
        let dest = dir.path().join("install");
        fs::create_dir(&dest).expect("mkdir");

        let mut set = ArchiveSet::open(&[archive]).expect("open");
        let mut extraction = set.extract_to(&dest).expect("start");
        let outcomes: Vec<_> = extraction.by_ref().collect();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| !o.is_rejected()));
        assert_eq!(extraction.completed(), 3);
        assert_eq!(
            fs::read(dest.join("Game/readme.txt")).expect("read"),
            b"hello"
        );
        assert!(dest.join("Game/Content/level.bin").is_file());
    }

    #[test]
    fn test_extraction_rejects_traversal_and_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("evil.zip");
        write_zip(
            &archive,
            &[
                ("../escaped.txt", Some("pwned")),
                ("ok.txt", Some("fine")),
            ],
        );
        let dest = dir.path().join("install");
        fs::create_dir(&dest).expect("mkdir");

        let mut set = ArchiveSet::open(&[archive]).expect("open");
        let mut extraction = set.extract_to(&dest).expect("start");
        let outcomes: Vec<_> = extraction.by_ref().collect();

        assert!(matches!(
            &outcomes[0],
            EntryOutcome::Rejected {
                error: InstallError::PathTraversal { .. },
                ..
            }
        ));
        assert!(matches!(&outcomes[1], EntryOutcome::File { .. }));
        assert_eq!(extraction.completed(), 1);
        assert!(!dir.path().join("escaped.txt").exists());
        assert!(dest.join("ok.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_extraction_refuses_symlinked_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).expect("mkdir");
        let dest = dir.path().join("install");
        fs::create_dir(&dest).expect("mkdir");
        std::os::unix::fs::symlink(&outside, dest.join("link")).expect("symlink");

        let archive = dir.path().join("sneaky.zip");
        write_zip(&archive, &[("link/payload.txt", Some("x"))]);

        let mut set = ArchiveSet::open(&[archive]).expect("open");
        let outcomes: Vec<_> = set.extract_to(&dest).expect("start").collect();

        assert!(outcomes[0].is_rejected());
        assert!(!outside.join("payload.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_extraction_refuses_existing_file_symlink() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outside = dir.path().join("outside.txt");
        fs::write(&outside, "original").expect("write");
        let dest = dir.path().join("install");
        fs::create_dir(&dest).expect("mkdir");
        std::os::unix::fs::symlink(&outside, dest.join("config.ini")).expect("symlink");

        let archive = dir.path().join("overwrite.zip");
        write_zip(
            &archive,
            &[("config.ini", Some("pwned")), ("ok.txt", Some("fine"))],
        );

        let mut set = ArchiveSet::open(&[archive]).expect("open");
        let outcomes: Vec<_> = set.extract_to(&dest).expect("start").collect();

        assert!(matches!(
            &outcomes[0],
            EntryOutcome::Rejected {
                error: InstallError::PathTraversal { .. },
                ..
            }
        ));
        assert!(!outcomes[1].is_rejected());
        assert_eq!(fs::read_to_string(&outside).expect("read"), "original");
    }

    #[cfg(unix)]
    #[test]
    fn test_extraction_writes_through_link_inside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("install");
        fs::create_dir(&dest).expect("mkdir");
        fs::write(dest.join("real.ini"), "old").expect("write");
        std::os::unix::fs::symlink(dest.join("real.ini"), dest.join("config.ini"))
            .expect("symlink");

        let archive = dir.path().join("update.zip");
        write_zip(&archive, &[("config.ini", Some("new"))]);

        let mut set = ArchiveSet::open(&[archive]).expect("open");
        let outcomes: Vec<_> = set.extract_to(&dest).expect("start").collect();

        assert!(!outcomes[0].is_rejected());
        assert_eq!(fs::read_to_string(dest.join("real.ini")).expect("read"), "new");
    }
}
