//! Virtual file system for the Ember Engine.
//!
//! Unifies heterogeneous physical storage — native directory trees and
//! read-only archive containers — into one coherent, `/`-rooted
//! namespace, with a writable overlay for staging edits against content
//! that cannot be modified in place.
//!
//! # Architecture
//!
//! Physical locations are *mounted* into the [`VirtualFileSystem`]: a
//! [`ProviderRegistry`] picks the [`Provider`] able to read each
//! location, the provider enumerates it, and the results are merged into
//! one deduplicated directory tree. When two mounts supply the same
//! virtual path, the later mount shadows the earlier one; the
//! [`WritableOverlay`] shadows everything. Opening a file yields a
//! [`VirtualFileStream`], a bounded random-access reader even when the
//! underlying archive entry only decompresses forward.
//!
//! # Providers
//!
//! - [`FolderProvider`] — native directory trees (always available)
//! - [`ZipProvider`] — zip containers, scanned sequentially
//! - [`PackProvider`] — Ember packed containers (`.empak`)
//!
//! Custom backends implement the [`Provider`] trait and register with the
//! [`ProviderRegistry`].
//!
//! # Example
//!
//! ```ignore
//! let mut vfs = VirtualFileSystem::with_default_providers();
//! vfs.mount("./assets", "/")?;
//! vfs.mount("./patches/weekly.empak", "/")?;
//!
//! let mesh = vfs.read("/models/oak.mesh")?;
//!
//! vfs.set_overlay_root(scratch_dir);
//! vfs.overlay_write("/models/oak.mesh", &edited)?;
//! ```

mod config;
mod error;
mod folder;
mod overlay;
mod pack;
pub mod path;
mod provider;
mod registry;
mod stream;
mod tree;
mod vfs;
mod zip;

pub use config::{build_vfs, load_config, MountConfig, OverlayConfig, VfsConfig};
pub use error::VfsError;
pub use folder::FolderProvider;
pub use overlay::{sweep_stale_sessions, CleanupScope, OverlayStatus, WritableOverlay};
pub use pack::PackProvider;
pub use path::VirtualPath;
pub use provider::{
    EnumerateResult, PhysicalEntryInfo, Provider, ProviderExtension, ProviderStream,
};
pub use registry::ProviderRegistry;
pub use stream::{FileRegionStream, VirtualFileStream};
pub use tree::{
    DirHandle, FileHandle, MountId, VirtualDirectory, VirtualDirectoryTree, VirtualFile,
};
pub use vfs::{MountPoint, VirtualFileSystem};
