//! Ordered traversal of a SQL fragment tree

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::{trace, warn};
use walkdir::{DirEntry, FilterEntry, WalkDir};

/// Filename suffix marking a test fragment
pub const TEST_SUFFIX: &str = "_test.sql";

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d\d-").expect("segment pattern is valid"))
}

/// Whether a top-level name participates in the build
pub fn is_segment_name(name: &str) -> bool {
    segment_pattern().is_match(name)
}

/// Which fragments are eligible with respect to tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkOptions {
    /// Include `_test.sql` fragments alongside regular ones
    pub include_tests: bool,

    /// Only `_test.sql` fragments; takes precedence over `include_tests`
    pub tests_only: bool,
}

impl WalkOptions {
    /// Options that include test fragments
    pub fn with_tests() -> Self {
        Self {
            include_tests: true,
            tests_only: false,
        }
    }

    /// Options that select only test fragments
    pub fn tests_only() -> Self {
        Self {
            include_tests: true,
            tests_only: true,
        }
    }

    fn admits(&self, is_test: bool) -> bool {
        if self.tests_only {
            is_test
        } else {
            self.include_tests || !is_test
        }
    }
}

/// A single eligible SQL source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    path: PathBuf,
    display_path: String,
    is_test: bool,
}

impl Fragment {
    /// Filesystem path of the fragment
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as written into the assembled document: the root directory name
    /// followed by the relative path, always `/`-separated
    pub fn display_path(&self) -> &str {
        &self.display_path
    }

    /// True for `_test.sql` fragments
    pub fn is_test(&self) -> bool {
        self.is_test
    }

    /// File extension as found on disk
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }
}

/// Errors that abort a walk
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("SQL directory {} does not exist", path.display())]
    RootNotFound { path: PathBuf },

    #[error("error walking {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Walks a fragment tree in lexicographic order.
///
/// The walker holds no iteration state: each call to [`FragmentWalker::walk`]
/// starts a fresh traversal.
#[derive(Debug, Clone)]
pub struct FragmentWalker {
    root: PathBuf,
    options: WalkOptions,
}

impl FragmentWalker {
    pub fn new(root: impl Into<PathBuf>, options: WalkOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> WalkOptions {
        self.options
    }

    /// Start a traversal. Fails up front if the root does not exist so that
    /// callers can bail out before producing any output.
    pub fn walk(&self) -> Result<Fragments, WalkError> {
        match std::fs::metadata(&self.root) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(root = %self.root.display(), "SQL root not found");
                return Err(WalkError::RootNotFound {
                    path: self.root.clone(),
                });
            }
            Err(e) => {
                return Err(WalkError::Io {
                    path: self.root.clone(),
                    source: e,
                })
            }
        }

        let label = root_label(&self.root);
        let inner = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(participates as fn(&DirEntry) -> bool);

        Ok(Fragments {
            inner,
            root: self.root.clone(),
            label,
            options: self.options,
            done: false,
        })
    }
}

/// Lazy sequence of eligible fragments. The first error ends the sequence.
pub struct Fragments {
    inner: FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>,
    root: PathBuf,
    label: String,
    options: WalkOptions,
    done: bool,
}

impl Fragments {
    fn fragment(&self, entry: &DirEntry) -> Fragment {
        let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
        let mut display_path = self.label.clone();
        for component in relative.components() {
            if let Component::Normal(part) = component {
                if !display_path.is_empty() {
                    display_path.push('/');
                }
                display_path.push_str(&part.to_string_lossy());
            }
        }

        Fragment {
            path: entry.path().to_path_buf(),
            display_path,
            is_test: is_test_name(entry),
        }
    }
}

impl Iterator for Fragments {
    type Item = Result<Fragment, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    self.done = true;
                    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    warn!(path = %path.display(), error = %err, "error during walk");
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
                    return Some(Err(WalkError::Io { path, source }));
                }
            };

            let path = entry.path();
            trace!(path = %path.display(), "walking");

            if entry.file_type().is_dir() {
                continue;
            }

            if !has_sql_extension(path) {
                trace!(path = %path.display(), "ignoring non-SQL file");
                continue;
            }

            let is_test = is_test_name(&entry);
            if !self.options.admits(is_test) {
                trace!(path = %path.display(), is_test, "filtered by test options");
                continue;
            }

            return Some(Ok(self.fragment(&entry)));
        }
    }
}

/// Top-level entries must carry the numeric prefix; deeper entries always pass.
/// Rejecting a directory here prunes its whole subtree.
fn participates(entry: &DirEntry) -> bool {
    if entry.depth() != 1 {
        return true;
    }

    let keep = entry.file_name().to_str().map(is_segment_name).unwrap_or(false);
    if !keep {
        trace!(path = %entry.path().display(), "ignoring non-prefixed path");
    }
    keep
}

fn has_sql_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("sql"))
        .unwrap_or(false)
}

fn is_test_name(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().ends_with(TEST_SUFFIX)
}

fn root_label(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_names() {
        assert!(is_segment_name("01-tables"));
        assert!(is_segment_name("99-z.sql"));
        assert!(!is_segment_name("1-tables"));
        assert!(!is_segment_name("xx-skip"));
        assert!(!is_segment_name("01_tables"));
        assert!(!is_segment_name("notes.txt"));
    }

    #[test]
    fn test_option_matrix() {
        let default = WalkOptions::default();
        assert!(default.admits(false));
        assert!(!default.admits(true));

        let with_tests = WalkOptions::with_tests();
        assert!(with_tests.admits(false));
        assert!(with_tests.admits(true));

        let only = WalkOptions::tests_only();
        assert!(!only.admits(false));
        assert!(only.admits(true));

        // tests_only wins even without include_tests
        let only_flag = WalkOptions {
            include_tests: false,
            tests_only: true,
        };
        assert!(only_flag.admits(true));
        assert!(!only_flag.admits(false));
    }

    #[test]
    fn sql_extension_is_case_insensitive() {
        assert!(has_sql_extension(Path::new("a/01-x.sql")));
        assert!(has_sql_extension(Path::new("a/01-x.SQL")));
        assert!(!has_sql_extension(Path::new("a/01-x.sql.bak")));
        assert!(!has_sql_extension(Path::new("a/README")));
    }

    #[test]
    fn missing_root() {
        let walker = FragmentWalker::new("/definitely/not/here/sql", WalkOptions::default());
        assert!(matches!(walker.walk(), Err(WalkError::RootNotFound { .. })));
    }
}
