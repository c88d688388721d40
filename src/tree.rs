use std::collections::BTreeMap;

use crate::path::{fold_name, VirtualPath};
use crate::provider::{EnumerateResult, PhysicalEntryInfo};

/// Handle of a mount point in a [`VirtualFileSystem`](crate::VirtualFileSystem).
///
/// Files in the tree are tagged with the mount that produced them; the
/// tag is an index-style handle, never an owning reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MountId(pub(crate) u32);

impl MountId {
    /// Reserved tag for entries staged in the writable overlay. The
    /// overlay always has the highest shadowing priority: a later mount
    /// never overwrites an overlay-tagged file.
    pub(crate) const OVERLAY: MountId = MountId(u32::MAX);

    /// Whether this tag denotes the writable overlay rather than a
    /// regular mount point.
    pub fn is_overlay(self) -> bool {
        self == Self::OVERLAY
    }
}

/// Index of a directory node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirHandle(usize);

/// Index of a file node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

/// A directory in the merged namespace.
///
/// Parent links are arena indices; child maps are keyed by case-folded
/// name so lookups are case-insensitive while nodes keep their display
/// casing.
pub struct VirtualDirectory {
    name: String,
    path: VirtualPath,
    parent: Option<DirHandle>,
    directories: BTreeMap<String, DirHandle>,
    files: BTreeMap<String, FileHandle>,
}

impl VirtualDirectory {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    pub fn parent(&self) -> Option<DirHandle> {
        self.parent
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// A file in the merged namespace, tagged with its owning mount.
pub struct VirtualFile {
    name: String,
    path: VirtualPath,
    mount: MountId,
    entry: PhysicalEntryInfo,
}

impl VirtualFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// The mount point this file currently resolves to.
    pub fn mount(&self) -> MountId {
        self.mount
    }

    /// Whether the file is staged in the writable overlay.
    pub fn is_overlay(&self) -> bool {
        self.mount.is_overlay()
    }

    /// The physical record behind this file.
    pub fn entry(&self) -> &PhysicalEntryInfo {
        &self.entry
    }

    /// Uncompressed length in bytes.
    pub fn length(&self) -> u64 {
        self.entry.length
    }
}

/// Outcome of inserting a file into the tree.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum InsertOutcome {
    /// A new node was created.
    Inserted,
    /// An existing node at the same path was overwritten (shadowed).
    Shadowed(MountId),
    /// The existing node is overlay-staged and was left in place.
    KeptOverlay,
}

/// Counts reported by one merge pass, for mount logging.
#[derive(Debug, Default)]
pub(crate) struct MergeStats {
    pub directories: usize,
    pub files: usize,
    pub shadowed: usize,
}

/// The merged virtual namespace: directories and files from every mount,
/// deduplicated by virtual path.
///
/// Nodes live in arenas and reference each other by index, so there are
/// no ownership cycles and no lifetime entanglement between parents and
/// children. The tree itself is not locked — callers serialize mutation
/// (see the crate-level concurrency notes).
pub struct VirtualDirectoryTree {
    directories: Vec<VirtualDirectory>,
    files: Vec<VirtualFile>,
}

const ROOT: DirHandle = DirHandle(0);

impl VirtualDirectoryTree {
    pub fn new() -> Self {
        let root = VirtualDirectory {
            name: "/".to_owned(),
            path: VirtualPath::root(),
            parent: None,
            directories: BTreeMap::new(),
            files: BTreeMap::new(),
        };
        Self {
            directories: vec![root],
            files: Vec::new(),
        }
    }

    /// The root directory of the namespace.
    pub fn root(&self) -> DirHandle {
        ROOT
    }

    /// Remove every node except the root.
    pub fn clear(&mut self) {
        let root = VirtualDirectory {
            name: "/".to_owned(),
            path: VirtualPath::root(),
            parent: None,
            directories: BTreeMap::new(),
            files: BTreeMap::new(),
        };
        self.directories.clear();
        self.directories.push(root);
        self.files.clear();
    }

    /// Look up a directory node.
    pub fn directory(&self, handle: DirHandle) -> Option<&VirtualDirectory> {
        self.directories.get(handle.0)
    }

    /// Look up a file node.
    pub fn file(&self, handle: FileHandle) -> Option<&VirtualFile> {
        self.files.get(handle.0)
    }

    /// Child directories of a node, in case-folded name order.
    pub fn directories_of(&self, handle: DirHandle) -> Vec<DirHandle> {
        self.directory(handle)
            .map(|dir| dir.directories.values().copied().collect())
            .unwrap_or_default()
    }

    /// Files of a node, in case-folded name order.
    pub fn files_of(&self, handle: DirHandle) -> Vec<FileHandle> {
        self.directory(handle)
            .map(|dir| dir.files.values().copied().collect())
            .unwrap_or_default()
    }

    /// Resolve a directory path to its node.
    pub fn find_directory(&self, path: &VirtualPath) -> Option<DirHandle> {
        let mut current = ROOT;
        for segment in path.folded_segments() {
            let node = self.directory(current)?;
            current = *node.directories.get(segment)?;
        }
        Some(current)
    }

    /// Resolve a file path to its node.
    pub fn find_file(&self, path: &VirtualPath) -> Option<FileHandle> {
        let name = fold_name(path.file_name()?);
        let parent = self.find_directory(&path.parent()?)?;
        self.directory(parent)?.files.get(&name).copied()
    }

    /// Create any missing directories along `path` and return the final
    /// node. Existing directories are reused; the operation is
    /// idempotent.
    pub fn ensure_directory(&mut self, path: &VirtualPath) -> DirHandle {
        let mut current = ROOT;
        let mut current_path = VirtualPath::root();

        for segment in path.segments() {
            current_path = current_path
                .join(segment)
                .expect("path segments are already validated");
            let key = fold_name(segment);

            if let Some(&existing) = self.node(current).directories.get(&key) {
                current = existing;
                continue;
            }

            let child = self.alloc_directory(VirtualDirectory {
                name: segment.to_owned(),
                path: current_path.clone(),
                parent: Some(current),
                directories: BTreeMap::new(),
                files: BTreeMap::new(),
            });
            self.node_mut(current).directories.insert(key, child);
            current = child;
        }

        current
    }

    /// Insert or overwrite the file at its virtual path, tagging it with
    /// `mount`.
    ///
    /// A later insert shadows an earlier one at the same path, except that
    /// overlay-staged files are never displaced by regular mounts.
    pub(crate) fn insert_file(
        &mut self,
        mount: MountId,
        entry: PhysicalEntryInfo,
    ) -> InsertOutcome {
        let parent_path = entry
            .virtual_path
            .parent()
            .unwrap_or_else(VirtualPath::root);
        let parent = self.ensure_directory(&parent_path);
        let key = fold_name(&entry.name);

        if let Some(&existing) = self.node(parent).files.get(&key) {
            let node = &mut self.files[existing.0];
            if node.mount.is_overlay() && !mount.is_overlay() {
                return InsertOutcome::KeptOverlay;
            }
            let previous = node.mount;
            *node = VirtualFile {
                name: entry.name.clone(),
                path: entry.virtual_path.clone(),
                mount,
                entry,
            };
            return InsertOutcome::Shadowed(previous);
        }

        let handle = self.alloc_file(VirtualFile {
            name: entry.name.clone(),
            path: entry.virtual_path.clone(),
            mount,
            entry,
        });
        self.node_mut(parent).files.insert(key, handle);
        InsertOutcome::Inserted
    }

    /// Merge one enumeration result into the tree under `mount`.
    ///
    /// Callers guarantee enumeration fully succeeded before merging, so a
    /// mount is all-or-nothing with respect to the tree.
    pub(crate) fn merge(&mut self, mount: MountId, result: &EnumerateResult) -> MergeStats {
        let mut stats = MergeStats::default();

        for directory in &result.directories {
            self.ensure_directory(directory);
            stats.directories += 1;
        }

        for entry in &result.files {
            match self.insert_file(mount, entry.clone()) {
                InsertOutcome::Inserted => {}
                InsertOutcome::Shadowed(previous) => {
                    log::debug!(
                        "\"{}\" already provided by mount {:?}; now shadowed by mount {:?}",
                        entry.virtual_path,
                        previous,
                        mount
                    );
                    stats.shadowed += 1;
                }
                InsertOutcome::KeptOverlay => {
                    log::debug!(
                        "\"{}\" is staged in the overlay; mount {:?} stays shadowed",
                        entry.virtual_path,
                        mount
                    );
                    stats.shadowed += 1;
                }
            }
            stats.files += 1;
        }

        stats
    }

    /// All directories below `from`, breadth-first.
    pub fn descendant_directories(&self, from: DirHandle) -> Vec<DirHandle> {
        let mut queue = self.directories_of(from);
        let mut index = 0;
        while index < queue.len() {
            let next = self.directories_of(queue[index]);
            queue.extend(next);
            index += 1;
        }
        queue
    }

    /// Total number of file nodes.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total number of directory nodes, root excluded.
    pub fn directory_count(&self) -> usize {
        self.directories.len() - 1
    }

    fn node(&self, handle: DirHandle) -> &VirtualDirectory {
        &self.directories[handle.0]
    }

    fn node_mut(&mut self, handle: DirHandle) -> &mut VirtualDirectory {
        &mut self.directories[handle.0]
    }

    fn alloc_directory(&mut self, node: VirtualDirectory) -> DirHandle {
        self.directories.push(node);
        DirHandle(self.directories.len() - 1)
    }

    fn alloc_file(&mut self, node: VirtualFile) -> FileHandle {
        self.files.push(node);
        FileHandle(self.files.len() - 1)
    }
}

impl Default for VirtualDirectoryTree {
    fn default() -> Self {
        Self::new()
    }
}
