use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::VfsError;
use crate::folder::FolderProvider;
use crate::overlay::{CleanupScope, OverlayStatus, WritableOverlay};
use crate::path::{fold_name, VirtualPath};
use crate::provider::{EnumerateResult, PhysicalEntryInfo, Provider, ProviderStream};
use crate::registry::ProviderRegistry;
use crate::stream::{FileRegionStream, VirtualFileStream};
use crate::tree::{DirHandle, MountId, VirtualDirectory, VirtualDirectoryTree, VirtualFile};

/// One mounted physical location: the binding of a physical path and the
/// provider that read it to a virtual directory prefix.
///
/// Mount points are immutable once created and destroyed on unmount. The
/// enumeration snapshot taken at mount time is retained so that
/// unmounting a shadowing mount can restore the entries it hid.
pub struct MountPoint {
    id: MountId,
    physical_location: PathBuf,
    virtual_prefix: VirtualPath,
    provider: Arc<dyn Provider>,
    snapshot: EnumerateResult,
}

impl MountPoint {
    pub fn id(&self) -> MountId {
        self.id
    }

    pub fn physical_location(&self) -> &Path {
        &self.physical_location
    }

    pub fn virtual_prefix(&self) -> &VirtualPath {
        &self.virtual_prefix
    }

    /// Description of the provider backing this mount.
    pub fn provider_description(&self) -> &str {
        self.provider.description()
    }
}

/// The virtual file system: a unified, path-addressable namespace over
/// mounted directory trees and archive containers, plus a writable
/// overlay staging edits against the read-only mounts.
///
/// Mounted content is read-only by design; the overlay is the only write
/// path. Consumers interact exclusively through this type — providers are
/// registered once at startup and never exposed.
///
/// Mount, unmount and overlay mutation are synchronous and take
/// `&mut self`; callers serialize them. Opened streams are independent
/// per-call objects and may be used concurrently with each other.
///
/// # Example
///
/// ```ignore
/// let mut vfs = VirtualFileSystem::with_default_providers();
/// vfs.mount("./assets", "/")?;
/// vfs.mount("./patch.empak", "/")?; // shadows overlapping asset paths
///
/// let bytes = vfs.read("/textures/brick.png")?;
/// ```
pub struct VirtualFileSystem {
    registry: ProviderRegistry,
    folder_provider: Arc<FolderProvider>,
    mounts: Vec<MountPoint>,
    next_mount_id: u32,
    tree: VirtualDirectoryTree,
    overlay: WritableOverlay,
    /// Overlay-staged entries, in stage order, re-applied on rebuilds.
    staged: Vec<PhysicalEntryInfo>,
}

impl VirtualFileSystem {
    /// Create a file system with the given provider registry. The folder
    /// provider is always available and needs no registration.
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            folder_provider: Arc::new(FolderProvider::new()),
            mounts: Vec::new(),
            next_mount_id: 0,
            tree: VirtualDirectoryTree::new(),
            overlay: WritableOverlay::new(),
            staged: Vec::new(),
        }
    }

    /// Create a file system with the built-in archive providers
    /// registered: zip containers and Ember packed containers.
    pub fn with_default_providers() -> Self {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(crate::zip::ZipProvider::new()));
        registry.register(Arc::new(crate::pack::PackProvider::new()));
        Self::new(registry)
    }

    /// The provider registry in use.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Currently mounted physical locations, in mount order.
    pub fn mount_points(&self) -> &[MountPoint] {
        &self.mounts
    }

    /// Mount a physical directory or container file into the virtual
    /// namespace at `virtual_prefix`.
    ///
    /// Directories mount through the folder provider; files go through
    /// the registry, which picks the provider whose format probe accepts
    /// the file ([`VfsError::UnsupportedFormat`] when none does).
    ///
    /// The mount is transactional: enumeration runs to completion before
    /// anything is merged, so a failure leaves the tree exactly as it
    /// was. A later mount shadows earlier ones at identical virtual
    /// paths; mount order is therefore observable and under caller
    /// control.
    pub fn mount(
        &mut self,
        physical: impl AsRef<Path>,
        virtual_prefix: &str,
    ) -> Result<MountId, VfsError> {
        let physical = physical.as_ref();
        let prefix = VirtualPath::parse(virtual_prefix)?;

        let metadata = std::fs::metadata(physical)?;
        let provider: Arc<dyn Provider> = if metadata.is_dir() {
            Arc::clone(&self.folder_provider) as Arc<dyn Provider>
        } else {
            self.registry
                .resolve(physical)
                .ok_or_else(|| VfsError::UnsupportedFormat(physical.display().to_string()))?
        };

        // Enumerate fully before touching the tree.
        let snapshot = provider.enumerate(physical, &prefix)?;

        let id = MountId(self.next_mount_id);
        self.next_mount_id += 1;

        self.tree.ensure_directory(&prefix);
        let stats = self.tree.merge(id, &snapshot);
        log::info!(
            "Mounted \"{}\" at \"{}\" via {}: {} directories, {} files ({} shadowed)",
            physical.display(),
            prefix,
            provider.description(),
            stats.directories,
            stats.files,
            stats.shadowed
        );

        self.mounts.push(MountPoint {
            id,
            physical_location: physical.to_path_buf(),
            virtual_prefix: prefix,
            provider,
            snapshot,
        });
        Ok(id)
    }

    /// Unmount a previously mounted location.
    ///
    /// Every file tagged with the mount is removed and directories left
    /// empty are pruned; entries the mount was shadowing become visible
    /// again.
    pub fn unmount(&mut self, id: MountId) -> Result<(), VfsError> {
        let index = self
            .mounts
            .iter()
            .position(|mount| mount.id == id)
            .ok_or_else(|| VfsError::NotFound(format!("mount point {id:?}")))?;

        let mount = self.mounts.remove(index);
        self.rebuild();
        log::info!(
            "Unmounted \"{}\" from \"{}\"",
            mount.physical_location.display(),
            mount.virtual_prefix
        );
        Ok(())
    }

    /// Re-enumerate every mount and rebuild the namespace, picking up
    /// physical changes.
    ///
    /// All-or-nothing like mounting: if any enumeration fails, the tree
    /// and all snapshots are left untouched.
    pub fn refresh(&mut self) -> Result<(), VfsError> {
        let mut snapshots = Vec::with_capacity(self.mounts.len());
        for mount in &self.mounts {
            snapshots.push(
                mount
                    .provider
                    .enumerate(&mount.physical_location, &mount.virtual_prefix)?,
            );
        }
        for (mount, snapshot) in self.mounts.iter_mut().zip(snapshots) {
            mount.snapshot = snapshot;
        }
        self.rebuild();
        log::info!(
            "Refreshed {} mounts: {} directories, {} files",
            self.mounts.len(),
            self.tree.directory_count(),
            self.tree.file_count()
        );
        Ok(())
    }

    /// Rebuild the tree from the retained mount snapshots (in mount
    /// order) and the overlay's staged entries (highest priority).
    fn rebuild(&mut self) {
        self.tree.clear();
        for mount in &self.mounts {
            self.tree.ensure_directory(&mount.virtual_prefix);
            self.tree.merge(mount.id, &mount.snapshot);
        }
        for entry in &self.staged {
            self.tree.insert_file(MountId::OVERLAY, entry.clone());
        }
    }

    /// Look up a file by virtual path.
    pub fn get_file(&self, path: &str) -> Result<&VirtualFile, VfsError> {
        let path = VirtualPath::parse(path)?;
        let handle = self
            .tree
            .find_file(&path)
            .ok_or_else(|| VfsError::NotFound(path.as_str().to_owned()))?;
        Ok(self.tree.file(handle).expect("freshly resolved handle"))
    }

    /// Look up a directory by virtual path.
    pub fn get_directory(&self, path: &str) -> Result<&VirtualDirectory, VfsError> {
        let path = VirtualPath::parse(path)?;
        let handle = self
            .tree
            .find_directory(&path)
            .ok_or_else(|| VfsError::NotFound(path.as_str().to_owned()))?;
        Ok(self.tree.directory(handle).expect("freshly resolved handle"))
    }

    /// Whether a file or directory exists at the path.
    pub fn exists(&self, path: &str) -> bool {
        let Ok(path) = VirtualPath::parse(path) else {
            return false;
        };
        self.tree.find_file(&path).is_some() || self.tree.find_directory(&path).is_some()
    }

    /// Immediate child directories of a directory.
    pub fn directories_in(&self, path: &str) -> Result<Vec<&VirtualDirectory>, VfsError> {
        let handle = self.resolve_directory(path)?;
        Ok(self
            .tree
            .directories_of(handle)
            .into_iter()
            .filter_map(|h| self.tree.directory(h))
            .collect())
    }

    /// Immediate files of a directory.
    pub fn files_in(&self, path: &str) -> Result<Vec<&VirtualFile>, VfsError> {
        let handle = self.resolve_directory(path)?;
        Ok(self
            .tree
            .files_of(handle)
            .into_iter()
            .filter_map(|h| self.tree.file(h))
            .collect())
    }

    /// Find files whose *name* matches a wildcard mask (`*` and `?`),
    /// starting from `path`. The mask is a name filter, not a path.
    pub fn find_files(
        &self,
        path: &str,
        mask: &str,
        recursive: bool,
    ) -> Result<Vec<&VirtualFile>, VfsError> {
        let start = self.resolve_directory(path)?;
        let mut scope = vec![start];
        if recursive {
            scope.extend(self.tree.descendant_directories(start));
        }

        Ok(scope
            .into_iter()
            .flat_map(|dir| self.tree.files_of(dir))
            .filter_map(|h| self.tree.file(h))
            .filter(|file| mask_matches(file.name(), mask))
            .collect())
    }

    /// Find directories whose name matches a wildcard mask, starting from
    /// `path`.
    pub fn find_directories(
        &self,
        path: &str,
        mask: &str,
        recursive: bool,
    ) -> Result<Vec<&VirtualDirectory>, VfsError> {
        let start = self.resolve_directory(path)?;
        let scope = if recursive {
            self.tree.descendant_directories(start)
        } else {
            self.tree.directories_of(start)
        };

        Ok(scope
            .into_iter()
            .filter_map(|h| self.tree.directory(h))
            .filter(|dir| mask_matches(dir.name(), mask))
            .collect())
    }

    /// Open a random-access read stream over a file.
    ///
    /// Overlay-staged files stream from their staged location; mounted
    /// files stream through the provider that owns the mount. Each call
    /// returns an independent stream with its own cursor.
    pub fn open_stream(&self, path: &str) -> Result<VirtualFileStream, VfsError> {
        let file = self.get_file(path)?;
        let inner: Box<dyn ProviderStream> = if file.is_overlay() {
            Box::new(FileRegionStream::open(
                &file.entry().physical_path,
                0,
                file.entry().length,
            )?)
        } else {
            let mount = self
                .mounts
                .iter()
                .find(|mount| mount.id == file.mount())
                .expect("file is tagged with a live mount");
            mount.provider.open_stream(file.entry())?
        };
        Ok(VirtualFileStream::new(inner))
    }

    /// Read a file's entire contents.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        use std::io::Read;
        let mut stream = self.open_stream(path)?;
        let mut data = Vec::with_capacity(stream.len() as usize);
        stream.read_to_end(&mut data)?;
        Ok(data)
    }

    // --- Overlay -----------------------------------------------------

    /// The writable overlay, for status and session inspection.
    pub fn overlay(&self) -> &WritableOverlay {
        &self.overlay
    }

    /// Probe `root` and activate the overlay there on success, starting a
    /// fresh session. Any previously staged edits are discarded with the
    /// previous session.
    pub fn set_overlay_root(&mut self, root: impl AsRef<Path>) -> OverlayStatus {
        let status = self.overlay.activate(root.as_ref());
        if status == OverlayStatus::Accessible {
            self.discard_staged();
        }
        status
    }

    /// Drive an interactive overlay relocation; see
    /// [`WritableOverlay::relocate`].
    pub fn relocate_overlay<F>(&mut self, chooser: F) -> OverlayStatus
    where
        F: FnOnce(Option<&Path>) -> Option<PathBuf>,
    {
        let status = self.overlay.relocate(chooser);
        if status == OverlayStatus::Accessible {
            self.discard_staged();
        }
        status
    }

    /// Stage file content in the overlay at a virtual path.
    ///
    /// The staged entry immediately shadows any mounted file at the same
    /// path, and keeps shadowing later mounts too — the overlay always
    /// wins. Requires an accessible overlay.
    pub fn overlay_write(&mut self, path: &str, data: &[u8]) -> Result<(), VfsError> {
        let path = VirtualPath::parse(path)?;
        let name = path
            .file_name()
            .ok_or_else(|| VfsError::InvalidPath("cannot write to the root".into()))?
            .to_owned();

        let staged_file = self.overlay.write(&path, data)?;
        let metadata = std::fs::metadata(&staged_file)?;
        let info = PhysicalEntryInfo {
            name,
            virtual_path: path.clone(),
            physical_path: staged_file,
            offset: 0,
            length: data.len() as u64,
            compressed_length: None,
            created: metadata.created().ok(),
            modified: metadata.modified().ok(),
            is_encrypted: false,
        };

        self.staged.retain(|entry| entry.virtual_path != path);
        self.staged.push(info.clone());
        self.tree.insert_file(MountId::OVERLAY, info);
        log::debug!("Staged \"{path}\" in the overlay");
        Ok(())
    }

    /// Remove a staged overlay file, re-exposing whatever mounted entry
    /// it was shadowing.
    pub fn overlay_delete(&mut self, path: &str) -> Result<(), VfsError> {
        let path = VirtualPath::parse(path)?;
        if !self.staged.iter().any(|entry| entry.virtual_path == path) {
            return Err(VfsError::NotFound(format!(
                "\"{path}\" is not staged in the overlay"
            )));
        }

        self.overlay.delete(&path)?;
        self.staged.retain(|entry| entry.virtual_path != path);
        self.rebuild();
        Ok(())
    }

    /// Delete overlay content; see [`WritableOverlay::cleanup`]. Staged
    /// entries disappear from the namespace.
    pub fn overlay_cleanup(&mut self, scope: CleanupScope) -> Result<(), VfsError> {
        self.overlay.cleanup(scope)?;
        self.discard_staged();
        Ok(())
    }

    fn discard_staged(&mut self) {
        if !self.staged.is_empty() {
            self.staged.clear();
            self.rebuild();
        }
    }

    fn resolve_directory(&self, path: &str) -> Result<DirHandle, VfsError> {
        let path = VirtualPath::parse(path)?;
        self.tree
            .find_directory(&path)
            .ok_or_else(|| VfsError::NotFound(path.as_str().to_owned()))
    }
}

impl Default for VirtualFileSystem {
    fn default() -> Self {
        Self::with_default_providers()
    }
}

/// Case-insensitive wildcard match of `name` against `mask` (`*` matches
/// any run of characters, `?` exactly one).
fn mask_matches(name: &str, mask: &str) -> bool {
    let name: Vec<char> = fold_name(name).chars().collect();
    let mask: Vec<char> = fold_name(mask).chars().collect();

    let (mut n, mut m) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if m < mask.len() && (mask[m] == '?' || mask[m] == name[n]) {
            n += 1;
            m += 1;
        } else if m < mask.len() && mask[m] == '*' {
            star = Some((m, n));
            m += 1;
        } else if let Some((star_m, star_n)) = star {
            // Let the last '*' swallow one more character.
            star = Some((star_m, star_n + 1));
            m = star_m + 1;
            n = star_n + 1;
        } else {
            return false;
        }
    }
    mask[m..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::fixtures::{write_pack, PackEntry};
    use crate::zip::fixtures::{write_zip, ZipEntry};
    use std::io::{Read, Seek, SeekFrom};

    fn folder_fixture(root: &Path) {
        std::fs::create_dir_all(root.join("textures")).unwrap();
        std::fs::write(root.join("readme.txt"), b"from folder").unwrap();
        std::fs::write(root.join("textures/brick.png"), b"folder brick").unwrap();
    }

    fn zip_fixture(path: &Path) {
        write_zip(
            path,
            &[
                ZipEntry {
                    name: "textures/brick.png",
                    data: b"zip brick",
                    deflate: true,
                },
                ZipEntry {
                    name: "textures/extra.png",
                    data: b"zip extra",
                    deflate: false,
                },
            ],
        );
    }

    #[test]
    fn mount_folder_and_read() {
        let dir = tempfile::tempdir().unwrap();
        folder_fixture(dir.path());

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(dir.path(), "/").unwrap();

        assert_eq!(vfs.read("/readme.txt").unwrap(), b"from folder");
        assert_eq!(vfs.read("/textures/brick.png").unwrap(), b"folder brick");
    }

    #[test]
    fn mount_missing_path_is_not_found() {
        let mut vfs = VirtualFileSystem::with_default_providers();
        let result = vfs.mount("/no/such/physical/path", "/");
        assert!(matches!(result, Err(VfsError::NotFound(_))));
    }

    #[test]
    fn mount_unknown_format_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.xyz");
        std::fs::write(&file, b"not an archive").unwrap();

        let mut vfs = VirtualFileSystem::with_default_providers();
        let result = vfs.mount(&file, "/");
        assert!(matches!(result, Err(VfsError::UnsupportedFormat(_))));
    }

    #[test]
    fn registry_routes_archives_by_magic() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("a.zip");
        zip_fixture(&zip);
        let pack = dir.path().join("b.empak");
        write_pack(&pack, &[PackEntry::file("pack.txt", b"pack data", true)]);

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(&zip, "/zip").unwrap();
        vfs.mount(&pack, "/pack").unwrap();

        assert_eq!(vfs.read("/zip/textures/brick.png").unwrap(), b"zip brick");
        assert_eq!(vfs.read("/pack/pack.txt").unwrap(), b"pack data");
        assert_eq!(vfs.mount_points().len(), 2);
    }

    #[test]
    fn later_mount_shadows_earlier_and_unmount_restores() {
        let dir = tempfile::tempdir().unwrap();
        folder_fixture(dir.path());
        let zip = dir.path().join("patch.zip");
        zip_fixture(&zip);

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(dir.path(), "/").unwrap();
        let patch = vfs.mount(&zip, "/").unwrap();

        // The zip mounted later, so its brick shadows the folder's.
        assert_eq!(vfs.read("/textures/brick.png").unwrap(), b"zip brick");
        assert_eq!(vfs.read("/textures/extra.png").unwrap(), b"zip extra");
        // Non-overlapping entries are merged, not replaced.
        assert_eq!(vfs.read("/readme.txt").unwrap(), b"from folder");

        // Unmounting the shadowing mount restores the folder's entry.
        vfs.unmount(patch).unwrap();
        assert_eq!(vfs.read("/textures/brick.png").unwrap(), b"folder brick");
        assert!(!vfs.exists("/textures/extra.png"));
    }

    #[test]
    fn unmount_prunes_directories_unless_shared() {
        let dir = tempfile::tempdir().unwrap();
        folder_fixture(dir.path());
        let zip = dir.path().join("patch.zip");
        write_zip(
            &zip,
            &[
                ZipEntry {
                    name: "textures/brick.png",
                    data: b"zip brick",
                    deflate: false,
                },
                ZipEntry {
                    name: "zip-only/lone.txt",
                    data: b"x",
                    deflate: false,
                },
            ],
        );

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(dir.path(), "/").unwrap();
        let patch = vfs.mount(&zip, "/").unwrap();
        assert!(vfs.exists("/zip-only"));

        vfs.unmount(patch).unwrap();
        // The zip's private directory is gone, the shared one stays.
        assert!(!vfs.exists("/zip-only"));
        assert!(vfs.exists("/textures"));
    }

    #[test]
    fn failed_mount_leaves_tree_untouched() {
        let dir = tempfile::tempdir().unwrap();
        folder_fixture(dir.path());

        // A zip whose entry table is cut off partway.
        let zip = dir.path().join("patch.zip");
        zip_fixture(&zip);
        let bytes = std::fs::read(&zip).unwrap();
        let truncated = dir.path().join("broken.zip");
        std::fs::write(&truncated, &bytes[..45]).unwrap();

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(dir.path(), "/").unwrap();
        let before_files = vfs.find_files("/", "*", true).unwrap().len();

        let result = vfs.mount(&truncated, "/");
        assert!(matches!(result, Err(VfsError::CorruptArchive { .. })));

        // No partial merge happened.
        assert_eq!(vfs.find_files("/", "*", true).unwrap().len(), before_files);
        assert_eq!(vfs.mount_points().len(), 1);
        assert_eq!(vfs.read("/textures/brick.png").unwrap(), b"folder brick");
    }

    #[test]
    fn get_directory_and_listings() {
        let dir = tempfile::tempdir().unwrap();
        folder_fixture(dir.path());

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(dir.path(), "/assets").unwrap();

        let textures = vfs.get_directory("/assets/textures").unwrap();
        assert_eq!(textures.name(), "textures");
        assert_eq!(textures.file_count(), 1);

        let dirs = vfs.directories_in("/assets").unwrap();
        assert_eq!(dirs.len(), 1);
        let files = vfs.files_in("/assets").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name(), "readme.txt");

        assert!(matches!(
            vfs.get_directory("/assets/missing"),
            Err(VfsError::NotFound(_))
        ));
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        folder_fixture(dir.path());

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(dir.path(), "/Assets").unwrap();

        assert!(vfs.exists("/assets/TEXTURES/Brick.PNG"));
        let file = vfs.get_file("/ASSETS/textures/brick.png").unwrap();
        assert_eq!(file.name(), "brick.png");
    }

    #[test]
    fn find_files_with_masks() {
        let dir = tempfile::tempdir().unwrap();
        folder_fixture(dir.path());
        std::fs::write(dir.path().join("textures/brick.mat"), b"m").unwrap();

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(dir.path(), "/").unwrap();

        let pngs = vfs.find_files("/", "*.png", true).unwrap();
        assert_eq!(pngs.len(), 1);
        assert_eq!(pngs[0].name(), "brick.png");

        let bricks = vfs.find_files("/textures", "BRICK.*", false).unwrap();
        assert_eq!(bricks.len(), 2);

        let question = vfs.find_files("/", "readme.tx?", true).unwrap();
        assert_eq!(question.len(), 1);

        let none = vfs.find_files("/", "*.wav", true).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn find_directories_recursive_and_not() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(dir.path(), "/").unwrap();

        assert_eq!(vfs.find_directories("/", "*", false).unwrap().len(), 1);
        assert_eq!(vfs.find_directories("/", "*", true).unwrap().len(), 3);
        assert_eq!(vfs.find_directories("/", "b", true).unwrap().len(), 1);
    }

    #[test]
    fn stream_length_matches_entry_and_reread_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("data.zip");
        zip_fixture(&zip);

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(&zip, "/").unwrap();

        let entry_length = vfs.get_file("/textures/brick.png").unwrap().length();
        let mut stream = vfs.open_stream("/textures/brick.png").unwrap();
        assert_eq!(stream.len(), entry_length);

        let mut first = Vec::new();
        stream.read_to_end(&mut first).unwrap();
        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut second = Vec::new();
        stream.read_to_end(&mut second).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len() as u64, entry_length);
    }

    #[test]
    fn refresh_picks_up_physical_changes() {
        let dir = tempfile::tempdir().unwrap();
        folder_fixture(dir.path());

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(dir.path(), "/").unwrap();
        assert!(!vfs.exists("/new.txt"));

        std::fs::write(dir.path().join("new.txt"), b"appeared").unwrap();
        vfs.refresh().unwrap();
        assert_eq!(vfs.read("/new.txt").unwrap(), b"appeared");
    }

    #[test]
    fn overlay_shadows_mounts_and_survives_later_mounts() {
        let assets = tempfile::tempdir().unwrap();
        folder_fixture(assets.path());
        let scratch = tempfile::tempdir().unwrap();

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(assets.path(), "/").unwrap();
        assert_eq!(
            vfs.set_overlay_root(scratch.path()),
            OverlayStatus::Accessible
        );

        // Stage an edit over a mounted file.
        vfs.overlay_write("/textures/brick.png", b"edited brick")
            .unwrap();
        assert_eq!(vfs.read("/textures/brick.png").unwrap(), b"edited brick");
        assert!(vfs.get_file("/textures/brick.png").unwrap().is_overlay());

        // A brand-new staged file also appears in the namespace.
        vfs.overlay_write("/textures/new.png", b"staged new").unwrap();
        assert!(vfs.exists("/textures/new.png"));

        // Even a mount performed after the edit cannot displace it.
        let zip = assets.path().join("patch.zip");
        zip_fixture(&zip);
        vfs.mount(&zip, "/").unwrap();
        assert_eq!(vfs.read("/textures/brick.png").unwrap(), b"edited brick");
        // The mount's non-overlapping entries still landed.
        assert_eq!(vfs.read("/textures/extra.png").unwrap(), b"zip extra");
    }

    #[test]
    fn overlay_delete_reexposes_shadowed_entry() {
        let assets = tempfile::tempdir().unwrap();
        folder_fixture(assets.path());
        let scratch = tempfile::tempdir().unwrap();

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(assets.path(), "/").unwrap();
        vfs.set_overlay_root(scratch.path());

        vfs.overlay_write("/textures/brick.png", b"edited").unwrap();
        assert_eq!(vfs.read("/textures/brick.png").unwrap(), b"edited");

        vfs.overlay_delete("/textures/brick.png").unwrap();
        assert_eq!(vfs.read("/textures/brick.png").unwrap(), b"folder brick");

        assert!(matches!(
            vfs.overlay_delete("/textures/brick.png"),
            Err(VfsError::NotFound(_))
        ));
    }

    #[test]
    fn overlay_write_requires_accessible_overlay() {
        let mut vfs = VirtualFileSystem::with_default_providers();
        assert!(matches!(
            vfs.overlay_write("/a.txt", b"x"),
            Err(VfsError::AccessError(_))
        ));
    }

    #[test]
    fn overlay_cleanup_clears_staged_entries() {
        let assets = tempfile::tempdir().unwrap();
        folder_fixture(assets.path());
        let scratch = tempfile::tempdir().unwrap();

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(assets.path(), "/").unwrap();
        vfs.set_overlay_root(scratch.path());
        vfs.overlay_write("/textures/brick.png", b"edited").unwrap();
        vfs.overlay_write("/loose.txt", b"staged only").unwrap();

        vfs.overlay_cleanup(CleanupScope::Session).unwrap();

        // Mounted content is visible again, staged-only content is gone.
        assert_eq!(vfs.read("/textures/brick.png").unwrap(), b"folder brick");
        assert!(!vfs.exists("/loose.txt"));
        assert_eq!(vfs.overlay().status(), OverlayStatus::Unset);
        // The scratch root holds no leftover session directories.
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn overlay_streams_through_open_stream() {
        let scratch = tempfile::tempdir().unwrap();
        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.set_overlay_root(scratch.path());
        vfs.overlay_write("/notes/draft.txt", b"overlay content")
            .unwrap();

        let mut stream = vfs.open_stream("/notes/draft.txt").unwrap();
        assert_eq!(stream.len(), 15);
        stream.seek(SeekFrom::Start(8)).unwrap();
        let mut tail = Vec::new();
        stream.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, b"content");
    }

    #[test]
    fn every_tree_path_resolves_to_its_mount() {
        let dir = tempfile::tempdir().unwrap();
        folder_fixture(dir.path());
        let zip = dir.path().join("data.zip");
        zip_fixture(&zip);

        let mut vfs = VirtualFileSystem::with_default_providers();
        vfs.mount(dir.path(), "/a").unwrap();
        vfs.mount(&zip, "/b").unwrap();

        for file in vfs.find_files("/", "*", true).unwrap() {
            let mount = vfs
                .mount_points()
                .iter()
                .find(|m| m.id() == file.mount())
                .expect("every file resolves to a live mount");
            // The owning provider still recognizes its physical source.
            assert!(vfs.registry().resolve(mount.physical_location()).is_some()
                || mount.physical_location().is_dir());
        }
    }

    #[test]
    fn mask_matching() {
        assert!(mask_matches("brick.png", "*.png"));
        assert!(mask_matches("BRICK.PNG", "*.png"));
        assert!(mask_matches("brick.png", "brick.*"));
        assert!(mask_matches("brick.png", "*"));
        assert!(mask_matches("brick.png", "br?ck.png"));
        assert!(mask_matches("brick.png", "*png"));
        assert!(!mask_matches("brick.png", "*.jpg"));
        assert!(!mask_matches("brick.png", "?.png"));
        assert!(mask_matches("a", "*a*"));
        assert!(!mask_matches("", "?"));
        assert!(mask_matches("", "*"));
    }
}
