use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{FileId, Status};

/// The de-aliased view of one file's metadata.
///
/// Only the four fields the tagger manages are represented here; everything
/// else in the file is left untouched on write. Keywords are held in a
/// `BTreeSet`, so exact duplicates collapse and the written order is stable
/// across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Path of the image this record was read from.
    pub source_file: PathBuf,
    /// Stable identifier, assigned once and never changed afterwards.
    pub identifier: Option<FileId>,
    /// Processing status; `None` means unset.
    pub status: Option<Status>,
    /// Image description, if any.
    pub description: Option<String>,
    /// Keyword set.
    pub keywords: BTreeSet<String>,
}

impl CanonicalRecord {
    /// Creates an empty record for the given file.
    pub fn new(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            identifier: None,
            status: None,
            description: None,
            keywords: BTreeSet::new(),
        }
    }

    /// Sets the identifier.
    pub fn with_identifier(mut self, identifier: FileId) -> Self {
        self.identifier = Some(identifier);
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds keywords to the set.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    /// Returns the path of the image.
    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    /// True when the file carries an identifier and keywords but no status,
    /// i.e. it was tagged before status tracking existed.
    pub fn is_orphan(&self) -> bool {
        self.identifier.is_some() && self.status.is_none() && !self.keywords.is_empty()
    }

    /// Returns a non-empty description, treating blank text as absent.
    pub fn existing_description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

/// One directory's worth of eligible files, the unit moved through the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub directory: PathBuf,
    pub files: Vec<PathBuf>,
}

impl Batch {
    pub fn new(directory: impl Into<PathBuf>, files: Vec<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            files,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_no_managed_fields() {
        let record = CanonicalRecord::new("/photos/a.jpg");

        assert_eq!(record.source_file(), Path::new("/photos/a.jpg"));
        assert!(record.identifier.is_none());
        assert!(record.status.is_none());
        assert!(record.description.is_none());
        assert!(record.keywords.is_empty());
    }

    #[test]
    fn keywords_collapse_exact_duplicates() {
        let record = CanonicalRecord::new("a.jpg").with_keywords(["sky", "tree", "sky"]);

        assert_eq!(record.keywords.len(), 2);
        assert_eq!(
            record.keywords.iter().collect::<Vec<_>>(),
            vec!["sky", "tree"]
        );
    }

    #[test]
    fn orphan_requires_identifier_keywords_and_no_status() {
        let orphan = CanonicalRecord::new("a.jpg")
            .with_identifier(FileId::new("id"))
            .with_keywords(["sky"]);
        assert!(orphan.is_orphan());

        let tracked = orphan.clone().with_status(Status::Success);
        assert!(!tracked.is_orphan());

        let untagged = CanonicalRecord::new("a.jpg").with_identifier(FileId::new("id"));
        assert!(!untagged.is_orphan());
    }

    #[test]
    fn blank_description_is_treated_as_absent() {
        let record = CanonicalRecord::new("a.jpg").with_description("   ");
        assert_eq!(record.existing_description(), None);

        let record = CanonicalRecord::new("a.jpg").with_description("A red apple.");
        assert_eq!(record.existing_description(), Some("A red apple."));
    }

    #[test]
    fn batch_reports_length() {
        let batch = Batch::new("/photos", vec![PathBuf::from("/photos/a.jpg")]);
        assert_eq!(batch.len(), 1);
        assert!(!batch.is_empty());
    }
}
