//! Background directory crawler.
//!
//! The crawler runs on its own thread and sends one [`Batch`] per directory
//! that contains supported image files. Listing errors are logged and the
//! directory is skipped. The receiving side sees the channel disconnect
//! once the crawl is complete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::Batch;

/// Supported image types, grouped by family.
pub const SUPPORTED_TYPES: &[(&str, &[&str])] = &[
    (
        "JPEG",
        &[
            "jpg", "jpeg", "jpe", "jif", "jfif", "jfi", "jp2", "j2k", "jpf", "jpx", "jpm", "mj2",
        ],
    ),
    ("PNG", &["png"]),
    ("GIF", &["gif"]),
    ("TIFF", &["tiff", "tif"]),
    ("WEBP", &["webp"]),
    ("HEIF", &["heif", "heic"]),
    (
        "RAW",
        &[
            "raw", "arw", "cr2", "cr3", "dng", "nef", "nrw", "orf", "pef", "raf", "rw2", "srw",
            "x3f", "erf", "kdc", "rwl",
        ],
    ),
];

/// Returns the family of a file extension, with or without a leading dot.
///
/// ```
/// use phototag::crawler::file_type;
///
/// assert_eq!(file_type(".NEF"), Some("RAW"));
/// assert_eq!(file_type("png"), Some("PNG"));
/// assert_eq!(file_type("txt"), None);
/// ```
pub fn file_type(extension: &str) -> Option<&'static str> {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    SUPPORTED_TYPES
        .iter()
        .find(|(_, extensions)| extensions.contains(&extension.as_str()))
        .map(|(family, _)| *family)
}

/// Family of the file at `path`, judged by its extension.
pub fn path_file_type(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(file_type)
}

/// Handle to a running crawl.
pub struct Crawler {
    receiver: Receiver<Batch>,
    handle: JoinHandle<usize>,
}

impl Crawler {
    /// Starts crawling `root` on a background thread.
    ///
    /// With `recursive` unset only `root` itself is listed.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a readable directory or the thread
    /// cannot be spawned.
    pub fn start(root: &Path, recursive: bool) -> io::Result<Self> {
        if !fs::metadata(root)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", root.display()),
            ));
        }

        let (sender, receiver) = mpsc::channel();
        let root = root.to_path_buf();
        let handle = thread::Builder::new()
            .name("phototag-crawler".to_string())
            .spawn(move || {
                let mut found = 0usize;
                for directory in directories(&root, recursive) {
                    let files = list_supported(&directory);
                    if files.is_empty() {
                        continue;
                    }
                    found += files.len();
                    debug!(directory = %directory.display(), files = files.len(), "queued batch");
                    if sender.send(Batch::new(directory, files)).is_err() {
                        debug!("batch receiver dropped; stopping crawl");
                        break;
                    }
                }
                found
            })?;

        Ok(Self { receiver, handle })
    }

    pub fn receiver(&self) -> &Receiver<Batch> {
        &self.receiver
    }

    /// Drops the receiver and waits for the crawl thread, returning the
    /// number of files it queued.
    pub fn finish(self) -> usize {
        drop(self.receiver);
        self.handle.join().unwrap_or_else(|_| {
            warn!("crawler thread panicked");
            0
        })
    }
}

/// Walks directories lazily, so each batch is sent as soon as its directory
/// is reached rather than after the whole tree has been read.
fn directories(root: &Path, recursive: bool) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .max_depth(if recursive { usize::MAX } else { 0 })
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
}

fn list_supported(directory: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(directory = %directory.display(), error = %e, "failed to list directory");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path_file_type(path).is_some())
        .collect();
    files.sort();
    files
}
