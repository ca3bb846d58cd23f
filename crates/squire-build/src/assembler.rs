//! Canonical schema document assembly

use crate::walker::{FragmentWalker, WalkError, WalkOptions};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, trace, warn};

/// First line of every assembled document
pub const HEADER: &str = "-- This file is auto-generated. DO NOT EDIT.\n";

const SEPARATOR: &str = "---------------------------------------------------------------------";

/// Errors produced while assembling a schema
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error("error reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error writing schema output: {0}")]
    Write(#[source] std::io::Error),
}

/// What a successful build emitted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Display paths of every fragment written, in output order
    pub fragments: Vec<String>,

    /// Total bytes written to the sink
    pub bytes: usize,
}

impl BuildSummary {
    /// True when no fragment qualified and nothing was written
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Builds one SQL document out of a fragment tree.
///
/// The output is a pure function of the tree contents, the test options and
/// the metadata map. Metadata is emitted sorted by key, so callers that want
/// byte-identical output across runs must not put a timestamp in it.
#[derive(Debug, Clone)]
pub struct SchemaAssembler {
    walker: FragmentWalker,
    metadata: BTreeMap<String, String>,
}

impl SchemaAssembler {
    pub fn new(root: impl Into<PathBuf>, options: WalkOptions) -> Self {
        Self {
            walker: FragmentWalker::new(root, options),
            metadata: BTreeMap::new(),
        }
    }

    /// Add one metadata line (`-- <key>: <value>`) to the header
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn root(&self) -> &Path {
        self.walker.root()
    }

    /// Write the assembled document to `out`.
    ///
    /// Nothing is written when the root is missing or no fragment qualifies.
    /// On any other error the sink may hold a partial document and the
    /// whole build must be treated as failed.
    pub fn build<W: Write + ?Sized>(&self, out: &mut W) -> Result<BuildSummary, BuildError> {
        let span = info_span!("sqlbuild", root = %self.walker.root().display());
        let _enter = span.enter();
        info!("building SQL");

        let mut summary = BuildSummary::default();

        for fragment in self.walker.walk()? {
            let fragment = fragment?;

            let mut contents = Vec::new();
            std::fs::File::open(fragment.path())
                .and_then(|mut f| f.read_to_end(&mut contents))
                .map_err(|source| {
                    warn!(path = %fragment.path().display(), error = %source, "error reading file");
                    BuildError::Read {
                        path: fragment.path().to_path_buf(),
                        source,
                    }
                })?;

            if summary.fragments.is_empty() {
                summary.bytes += self.write_header(out)?;
            }

            let delimiter = delimiter(fragment.display_path());
            write_all(out, delimiter.as_bytes())?;
            write_all(out, &contents)?;

            summary.bytes += delimiter.len() + contents.len();
            summary.fragments.push(fragment.display_path().to_string());
            trace!(path = fragment.display_path(), "added to output");
        }

        debug!(fragments = summary.fragments.len(), bytes = summary.bytes, "build complete");
        Ok(summary)
    }

    /// Assemble into memory
    pub fn build_to_vec(&self) -> Result<(Vec<u8>, BuildSummary), BuildError> {
        let mut buf = Vec::new();
        let summary = self.build(&mut buf)?;
        Ok((buf, summary))
    }

    fn write_header<W: Write + ?Sized>(&self, out: &mut W) -> Result<usize, BuildError> {
        let mut header = String::from(HEADER);
        for (key, value) in &self.metadata {
            header.push_str(&format!("-- {}: {}\n", key, value));
        }
        write_all(out, header.as_bytes())?;
        Ok(header.len())
    }
}

/// The boxed comment written ahead of each fragment
pub fn delimiter(path: &str) -> String {
    format!("\n{SEPARATOR}\n-- File: {path}\n{SEPARATOR}\n")
}

fn write_all<W: Write + ?Sized>(out: &mut W, bytes: &[u8]) -> Result<(), BuildError> {
    out.write_all(bytes).map_err(BuildError::Write)
}
