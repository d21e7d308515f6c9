//! Definition sources.
//!
//! A [`DefinitionReader`] yields an ordered sequence of byte streams. The
//! registry hands each stream to a [`Decoder`](decoder::Decoder) and loads
//! the resulting entities in stream order, so later streams override
//! earlier ones.

pub mod decoder;

pub use decoder::{AutoDecoder, Decoder, Format};

use crate::error::{LurryError, LurryResult};
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// One opened definition source.
pub struct SourceStream {
    /// File name or label, used for diagnostics and format detection.
    pub name: String,
    pub reader: Box<dyn Read + Send>,
}

impl SourceStream {
    pub fn new(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Box::new(reader),
        }
    }
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream").field("name", &self.name).finish()
    }
}

/// Produces definition streams in load order.
pub trait DefinitionReader: Send + Sync {
    /// Open the sources. Streams are opened lazily as the iterator advances.
    fn streams(&self) -> Box<dyn Iterator<Item = LurryResult<SourceStream>> + '_>;
}

/// Reads definitions from local files. Directories expand to the files
/// they contain, sorted by name.
#[derive(Debug, Clone, Default)]
pub struct FileReader {
    paths: Vec<PathBuf>,
}

impl FileReader {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    fn expand(&self) -> LurryResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in &self.paths {
            if path.is_dir() {
                let entries = fs::read_dir(path)
                    .map_err(|e| LurryError::source(path.display().to_string(), e))?;
                let mut found = Vec::new();
                for entry in entries {
                    let entry =
                        entry.map_err(|e| LurryError::source(path.display().to_string(), e))?;
                    let file = entry.path();
                    if file.is_file() {
                        found.push(file);
                    }
                }
                found.sort();
                files.extend(found);
            } else {
                files.push(path.clone());
            }
        }
        Ok(files)
    }
}

fn open_file(path: &Path) -> LurryResult<SourceStream> {
    let name = path.display().to_string();
    tracing::debug!("Opening definition file {}", name);
    let file = File::open(path).map_err(|e| {
        tracing::error!("Cannot open definition file {}: {}", name, e);
        LurryError::source(name.clone(), e)
    })?;
    Ok(SourceStream::new(name, file))
}

impl DefinitionReader for FileReader {
    fn streams(&self) -> Box<dyn Iterator<Item = LurryResult<SourceStream>> + '_> {
        match self.expand() {
            Ok(files) => Box::new(files.into_iter().map(|path| open_file(&path))),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}

/// In-memory definition documents, served in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    documents: Vec<(String, String)>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document. The name drives format detection in [`AutoDecoder`].
    pub fn with(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.documents.push((name.into(), content.into()));
        self
    }
}

impl DefinitionReader for MemoryReader {
    fn streams(&self) -> Box<dyn Iterator<Item = LurryResult<SourceStream>> + '_> {
        Box::new(self.documents.iter().map(|(name, content)| {
            Ok(SourceStream::new(
                name.clone(),
                Cursor::new(content.clone().into_bytes()),
            ))
        }))
    }
}
