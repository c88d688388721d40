use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::VfsError;

/// A canonical absolute path in the virtual file system.
///
/// Parsing normalizes every separator variant to `/`, guarantees a single
/// leading root marker, strips trailing separators (the root itself stays
/// `/`), drops `.` segments and rejects `..` segments (path traversal is
/// not allowed).
///
/// Comparison and hashing are case-insensitive; the casing supplied at
/// parse time is preserved for display.
#[derive(Debug, Clone)]
pub struct VirtualPath {
    /// Display form, original casing: `/Textures/Brick.png`.
    display: String,
    /// Case-folded form used for equality and hashing.
    folded: String,
}

impl VirtualPath {
    /// The root of the virtual file system, `/`.
    pub fn root() -> Self {
        Self {
            display: "/".to_owned(),
            folded: "/".to_owned(),
        }
    }

    /// Parse and normalize a raw path string.
    ///
    /// - Replaces backslashes with forward slashes
    /// - Collapses redundant separators (`a///b` → `a/b`)
    /// - Drops `.` segments
    /// - Rejects `..` segments
    /// - Guarantees a leading `/` and no trailing separator
    ///
    /// `/`, `\` and `` (after a leading separator) all parse to the root.
    /// A completely empty string is rejected.
    pub fn parse(raw: &str) -> Result<Self, VfsError> {
        if raw.is_empty() {
            return Err(VfsError::InvalidPath("empty path".into()));
        }

        let replaced = raw.replace('\\', "/");
        let mut display = String::with_capacity(replaced.len() + 1);

        for segment in replaced.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            if segment == ".." {
                return Err(VfsError::InvalidPath(format!(
                    "path traversal (..) not allowed in \"{raw}\""
                )));
            }
            display.push('/');
            display.push_str(segment);
        }

        if display.is_empty() {
            display.push('/');
        }

        let folded = display.to_lowercase();
        Ok(Self { display, folded })
    }

    /// The normalized path string, original casing preserved.
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Whether this is the root path `/`.
    pub fn is_root(&self) -> bool {
        self.display == "/"
    }

    /// The final segment, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.display.rsplit('/').next()
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        // Case folding can change byte lengths, so the two forms get
        // their own separator positions.
        let cut = self.display.rfind('/').unwrap_or(0);
        let folded_cut = self.folded.rfind('/').unwrap_or(0);
        if cut == 0 {
            return Some(Self::root());
        }
        Some(Self {
            display: self.display[..cut].to_owned(),
            folded: self.folded[..folded_cut].to_owned(),
        })
    }

    /// Append a single child name. A separator is inserted between the
    /// directory and the child; the name itself must not contain one.
    pub fn join(&self, name: &str) -> Result<VirtualPath, VfsError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(VfsError::InvalidPath(format!(
                "\"{name}\" is not a valid entry name"
            )));
        }
        if name == "." || name == ".." {
            return Err(VfsError::InvalidPath(format!(
                "\"{name}\" is not a valid entry name"
            )));
        }
        let mut display = self.display.clone();
        if !self.is_root() {
            display.push('/');
        }
        display.push_str(name);
        let folded = display.to_lowercase();
        Ok(Self { display, folded })
    }

    /// Iterate the path segments, root excluded.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.display.split('/').filter(|s| !s.is_empty())
    }

    /// Case-folded segments, for lookups keyed on canonical names.
    pub(crate) fn folded_segments(&self) -> impl Iterator<Item = &str> {
        self.folded.split('/').filter(|s| !s.is_empty())
    }

    /// Whether `prefix` is this path or one of its ancestors
    /// (case-insensitive, whole segments only).
    pub fn starts_with(&self, prefix: &VirtualPath) -> bool {
        if prefix.is_root() {
            return true;
        }
        match self.folded.strip_prefix(&prefix.folded) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl PartialEq for VirtualPath {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for VirtualPath {}

impl Hash for VirtualPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl PartialOrd for VirtualPath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VirtualPath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.folded.cmp(&other.folded)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// Case-fold a single name the same way [`VirtualPath`] folds segments.
pub(crate) fn fold_name(name: &str) -> String {
    name.to_lowercase()
}
