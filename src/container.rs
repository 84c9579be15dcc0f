/*!
 * EPUB container model.
 *
 * Reads the whole OCF archive into memory, keeping every entry's name,
 * bytes and ordering exactly as found. Sub-documents are the XHTML items
 * listed in the package manifest; everything else (styles, images, fonts,
 * navigation and package metadata) is carried through untouched. Writing
 * produces a new archive with the same entries in the same order, taking
 * mutated sub-document content where it was replaced and the original
 * bytes everywhere else.
 */

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::{debug, warn};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::ContainerError;

const MIMETYPE_ENTRY: &str = "mimetype";
const OCF_CONTAINER_ENTRY: &str = "META-INF/container.xml";
const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

static ROOTFILE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("rootfile").unwrap());
static MANIFEST_ITEM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("manifest item").unwrap());

/// One archive entry with its original bytes
#[derive(Debug, Clone)]
struct ContainerEntry {
    name: String,
    bytes: Vec<u8>,
    is_dir: bool,
}

/// Identity of one XHTML sub-document inside the container
///
/// Ordering sorts by `(id, name)`, which is the stable processing order the
/// pipeline and its checkpoints rely on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubDocument {
    /// Manifest item id
    pub id: String,
    /// Archive entry path
    pub name: String,
}

/// In-memory model of an EPUB container
#[derive(Debug)]
pub struct EpubContainer {
    entries: Vec<ContainerEntry>,
    index_by_name: HashMap<String, usize>,
    sub_documents: Vec<SubDocument>,
}

impl EpubContainer {
    /// Open a container file and enumerate its sub-documents
    pub fn open(path: &Path) -> Result<Self, ContainerError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let mut entries = Vec::with_capacity(archive.len());
        let mut index_by_name = HashMap::new();

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            let is_dir = entry.is_dir();

            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;

            index_by_name.insert(name.clone(), entries.len());
            entries.push(ContainerEntry { name, bytes, is_dir });
        }

        let sub_documents = discover_sub_documents(&entries, &index_by_name)?;
        debug!(
            "Opened container with {} entries, {} sub-documents",
            entries.len(),
            sub_documents.len()
        );

        Ok(Self {
            entries,
            index_by_name,
            sub_documents,
        })
    }

    /// Sub-documents in stable `(id, name)` order
    pub fn sub_documents(&self) -> &[SubDocument] {
        &self.sub_documents
    }

    /// Names of all entries in archive order - used by tests and external consumers
    #[allow(dead_code)]
    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Current content of a sub-document as text
    pub fn document_text(&self, document: &SubDocument) -> Result<String, ContainerError> {
        let index = self
            .index_by_name
            .get(&document.name)
            .ok_or_else(|| ContainerError::UnknownDocument(document.id.clone()))?;
        Ok(String::from_utf8_lossy(&self.entries[*index].bytes).into_owned())
    }

    /// Replace a sub-document's content in the in-memory model
    pub fn replace_document_text(&mut self, id: &str, content: String) -> Result<(), ContainerError> {
        let document = self
            .sub_documents
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| ContainerError::UnknownDocument(id.to_string()))?;
        let index = self
            .index_by_name
            .get(&document.name)
            .ok_or_else(|| ContainerError::UnknownDocument(id.to_string()))?;
        self.entries[*index].bytes = content.into_bytes();
        Ok(())
    }

    /// Write the container to the destination path
    ///
    /// Entries are written in their original order; the `mimetype` entry is
    /// stored uncompressed as the OCF format requires. The archive is built
    /// in a temporary file and renamed over the destination, so either the
    /// whole container appears or nothing does.
    pub fn write(&self, destination: &Path) -> Result<(), ContainerError> {
        let dir = destination.parent().filter(|p| !p.as_os_str().is_empty());
        let temp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir),
            None => tempfile::NamedTempFile::new_in("."),
        }?;

        {
            let mut writer = ZipWriter::new(BufWriter::new(temp.as_file()));

            for entry in &self.entries {
                if entry.is_dir {
                    writer.add_directory(entry.name.trim_end_matches('/'), deflated_options())?;
                    continue;
                }

                let options = if entry.name == MIMETYPE_ENTRY {
                    SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
                } else {
                    deflated_options()
                };

                writer.start_file(entry.name.as_str(), options)?;
                writer.write_all(&entry.bytes)?;
            }

            let mut inner = writer.finish()?;
            inner.flush()?;
        }

        temp.persist(destination)
            .map_err(|e| ContainerError::Io(e.error))?;
        Ok(())
    }
}

fn deflated_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Locate the package document through the OCF descriptor and list its
/// XHTML manifest items
fn discover_sub_documents(
    entries: &[ContainerEntry],
    index_by_name: &HashMap<String, usize>,
) -> Result<Vec<SubDocument>, ContainerError> {
    let ocf = entry_text(entries, index_by_name, OCF_CONTAINER_ENTRY).ok_or_else(|| {
        ContainerError::Metadata(format!("missing {}", OCF_CONTAINER_ENTRY))
    })?;

    let ocf_doc = Html::parse_document(&ocf);
    let opf_path = ocf_doc
        .select(&ROOTFILE_SELECTOR)
        .filter_map(|rootfile| rootfile.value().attr("full-path"))
        .next()
        .ok_or_else(|| {
            ContainerError::Metadata("container descriptor names no rootfile".to_string())
        })?
        .to_string();

    let opf = entry_text(entries, index_by_name, &opf_path).ok_or_else(|| {
        ContainerError::Metadata(format!("package document {} not found", opf_path))
    })?;
    let opf_dir = opf_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

    let opf_doc = Html::parse_document(&opf);
    let mut documents = Vec::new();

    for item in opf_doc.select(&MANIFEST_ITEM_SELECTOR) {
        let element = item.value();
        if element.attr("media-type") != Some(XHTML_MEDIA_TYPE) {
            continue;
        }
        // The navigation document is container metadata, not content
        if element
            .attr("properties")
            .is_some_and(|p| p.split_whitespace().any(|token| token == "nav"))
        {
            continue;
        }

        let (Some(id), Some(href)) = (element.attr("id"), element.attr("href")) else {
            warn!("Skipping manifest item without id or href");
            continue;
        };

        let name = resolve_href(opf_dir, href);
        if !index_by_name.contains_key(&name) {
            warn!("Manifest item {} points at missing entry {}", id, name);
            continue;
        }

        documents.push(SubDocument {
            id: id.to_string(),
            name,
        });
    }

    documents.sort();
    Ok(documents)
}

fn entry_text(
    entries: &[ContainerEntry],
    index_by_name: &HashMap<String, usize>,
    name: &str,
) -> Option<String> {
    index_by_name
        .get(name)
        .map(|&i| String::from_utf8_lossy(&entries[i].bytes).into_owned())
}

/// Resolve a manifest href against the package document's directory
fn resolve_href(opf_dir: &str, href: &str) -> String {
    let mut segments: Vec<&str> = if opf_dir.is_empty() {
        Vec::new()
    } else {
        opf_dir.split('/').collect()
    };

    for part in href.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}
