use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::VfsError;
use crate::path::VirtualPath;

/// A file extension a provider prefers to claim, with a human-readable
/// description (`("empak", "Ember packed file system")`).
#[derive(Debug, Clone)]
pub struct ProviderExtension {
    pub extension: &'static str,
    pub description: &'static str,
}

impl ProviderExtension {
    pub const fn new(extension: &'static str, description: &'static str) -> Self {
        Self {
            extension,
            description,
        }
    }
}

/// Information about one physical file record produced by enumeration.
///
/// For archive-backed entries, `offset` is where the entry's content
/// begins inside the container and `compressed_length` is `Some` when the
/// content is stored compressed. For native files, `offset` is zero and
/// `length` is the on-disk size.
#[derive(Debug, Clone)]
pub struct PhysicalEntryInfo {
    /// The file name (final path segment), display casing.
    pub name: String,
    /// Full virtual path of the file after mounting.
    pub virtual_path: VirtualPath,
    /// Physical location of the backing resource: the native file itself,
    /// or the container holding the entry.
    pub physical_path: PathBuf,
    /// Offset of the entry's content within the container.
    pub offset: u64,
    /// Uncompressed length in bytes.
    pub length: u64,
    /// Stored length when the entry is compressed inside its container.
    pub compressed_length: Option<u64>,
    /// Creation time, if the backend records one.
    pub created: Option<SystemTime>,
    /// Last modification time, if the backend records one.
    pub modified: Option<SystemTime>,
    /// Whether the entry content is encrypted. Encrypted entries are
    /// enumerated but cannot be opened by this crate.
    pub is_encrypted: bool,
}

/// The directories and files discovered by a provider's enumeration.
///
/// Enumeration is all-or-nothing: a provider either returns the complete
/// result set or an error, and nothing is merged into the virtual tree on
/// error.
#[derive(Debug, Default)]
pub struct EnumerateResult {
    pub directories: Vec<VirtualPath>,
    pub files: Vec<PhysicalEntryInfo>,
}

/// A pluggable backend capable of detecting, enumerating and streaming one
/// physical storage format.
///
/// Providers never see the virtual tree; they translate a physical
/// location into [`EnumerateResult`] records under a virtual prefix, and
/// open raw content streams for entries they produced. The
/// [`VirtualFileSystem`](crate::VirtualFileSystem) routes all consumer
/// traffic, so render/animation/editor code never touches a provider
/// directly.
pub trait Provider: Send + Sync {
    /// Human-readable description of the backend.
    fn description(&self) -> &str;

    /// Extensions this provider prefers to claim in a
    /// [`ProviderRegistry`](crate::ProviderRegistry). Folder-style
    /// providers claim none.
    fn preferred_extensions(&self) -> &[ProviderExtension] {
        &[]
    }

    /// Probe whether the physical resource is in this provider's format.
    ///
    /// Archive providers read a fixed-size magic header and compare it
    /// against the format signature; folder-style providers accept any
    /// existing directory.
    fn can_read(&self, physical: &Path) -> bool;

    /// Enumerate every directory and file under `physical`, mapped below
    /// the virtual `prefix`.
    ///
    /// Archive backends perform a sequential scan over the container's
    /// entry records; a header that matches but an entry table that cannot
    /// be fully read fails with [`VfsError::CorruptArchive`].
    fn enumerate(
        &self,
        physical: &Path,
        prefix: &VirtualPath,
    ) -> Result<EnumerateResult, VfsError>;

    /// Open the raw content of an entry previously produced by
    /// [`enumerate`](Provider::enumerate), positioned at the start of the
    /// entry's content.
    fn open_stream(&self, entry: &PhysicalEntryInfo) -> Result<Box<dyn ProviderStream>, VfsError>;
}

/// A provider's native content reader for one entry.
///
/// Reading yields the entry's uncompressed bytes from the current
/// position. Backends over sequentially-decompressed formats cannot
/// reposition arbitrarily; they report `is_random_access() == false` and
/// support only [`restart`](ProviderStream::restart), which re-opens the
/// content from the entry's beginning. The
/// [`VirtualFileStream`](crate::VirtualFileStream) adapter builds the full
/// seek contract on top of this.
pub trait ProviderStream: Read + Send {
    /// Uncompressed length of the entry content.
    fn len(&self) -> u64;

    /// Whether the content is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`seek_to`](ProviderStream::seek_to) can reposition to an
    /// arbitrary offset without re-reading from the start.
    fn is_random_access(&self) -> bool;

    /// Reposition to an absolute offset within the entry content.
    ///
    /// Backends without random access return
    /// [`VfsError::NotSupported`]; callers fall back to
    /// [`restart`](ProviderStream::restart) plus forward reads.
    fn seek_to(&mut self, offset: u64) -> Result<(), VfsError>;

    /// Reposition to the start of the entry content.
    ///
    /// For forward-only decompression this re-opens the compressed stream
    /// at the entry's beginning; it never reuses a decoder past the
    /// target position.
    fn restart(&mut self) -> Result<(), VfsError>;
}
