/*!
 * Durable pipeline progress record.
 *
 * The checkpoint keeps enough state to resume an interrupted run at the last
 * completed batch: the document ordering fingerprint it was taken against,
 * the current position, the serialized content of fully committed documents
 * and the core replacements already produced for the in-progress document.
 *
 * Saving is all-or-nothing: the record is written to a temporary file in the
 * same directory and atomically renamed over the target, so a subsequent
 * load never observes a half-written file. A missing, truncated or
 * malformed file is treated as "no checkpoint", never as a fatal error.
 */

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Progress record for one translation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Sub-document ids in processing order, the validity fingerprint
    pub document_order: Vec<String>,

    /// Index of the sub-document currently being translated
    pub document_index: usize,

    /// Index of the next fragment to translate within the current document
    pub fragment_index: usize,

    /// Serialized content of fully committed, mutated documents, by id
    #[serde(default)]
    pub committed_documents: BTreeMap<String, String>,

    /// Core replacements already produced for fragments
    /// `0 .. fragment_index` of the current document
    #[serde(default)]
    pub current_texts: Vec<String>,
}

impl Checkpoint {
    /// Create an empty checkpoint pinned to a document order
    pub fn new(document_order: Vec<String>) -> Self {
        Self {
            document_order,
            ..Self::default()
        }
    }

    /// Whether this checkpoint records no progress at all
    pub fn is_empty(&self) -> bool {
        self.document_order.is_empty()
    }

    /// Whether this checkpoint was taken against the given document order
    pub fn matches(&self, document_order: &[String]) -> bool {
        self.document_order == document_order
    }

    /// Record a new in-document position along with the replacements
    /// produced so far for the current document
    pub fn set_position(&mut self, document_index: usize, fragment_index: usize, current_texts: Vec<String>) {
        self.document_index = document_index;
        self.fragment_index = fragment_index;
        self.current_texts = current_texts;
    }

    /// Record completion of a document and move to the next one
    pub fn advance_document(&mut self, committed: Option<(String, String)>) {
        if let Some((id, content)) = committed {
            self.committed_documents.insert(id, content);
        }
        self.document_index += 1;
        self.fragment_index = 0;
        self.current_texts.clear();
    }

    /// Internal consistency check applied on load
    fn is_consistent(&self) -> bool {
        self.document_index <= self.document_order.len()
            && self.current_texts.len() == self.fragment_index
            && self
                .committed_documents
                .keys()
                .all(|id| self.document_order.contains(id))
    }
}

/// File-backed store for the run checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create a store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file - used by tests and external consumers
    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last saved checkpoint, or an empty one if the file is
    /// absent, unreadable or malformed
    pub fn load(&self) -> Checkpoint {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No checkpoint at {}", self.path.display());
                return Checkpoint::default();
            }
            Err(e) => {
                warn!("Could not read checkpoint {}: {}", self.path.display(), e);
                return Checkpoint::default();
            }
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) if checkpoint.is_consistent() => checkpoint,
            Ok(_) => {
                warn!("Inconsistent checkpoint {}, starting over", self.path.display());
                Checkpoint::default()
            }
            Err(e) => {
                warn!("Malformed checkpoint {}: {}", self.path.display(), e);
                Checkpoint::default()
            }
        }
    }

    /// Persist the checkpoint atomically
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let json = serde_json::to_string_pretty(checkpoint)
            .context("Failed to serialize checkpoint")?;

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut temp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir),
            None => tempfile::NamedTempFile::new_in("."),
        }
        .context("Failed to create temporary checkpoint file")?;

        temp.write_all(json.as_bytes())
            .context("Failed to write checkpoint")?;
        temp.flush().context("Failed to flush checkpoint")?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to persist checkpoint to {}", self.path.display()))?;

        Ok(())
    }

    /// Delete the stored checkpoint once the run has completed
    pub fn invalidate(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove checkpoint {}", self.path.display())
            }),
        }
    }
}
