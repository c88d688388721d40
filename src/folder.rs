use std::path::Path;

use crate::error::VfsError;
use crate::path::VirtualPath;
use crate::provider::{
    EnumerateResult, PhysicalEntryInfo, Provider, ProviderStream,
};
use crate::stream::FileRegionStream;

/// Provider that mounts native directory trees.
///
/// This is the default provider of every
/// [`VirtualFileSystem`](crate::VirtualFileSystem): any physical path that
/// is an existing directory mounts through it without a registry lookup.
/// Enumeration is a recursive walk; streams open the file itself.
///
/// Entry names that are not valid UTF-8 are skipped during enumeration —
/// the virtual namespace is a UTF-8 string space.
pub struct FolderProvider;

impl FolderProvider {
    pub fn new() -> Self {
        Self
    }

    fn walk(
        &self,
        physical: &Path,
        prefix: &VirtualPath,
        result: &mut EnumerateResult,
    ) -> Result<(), VfsError> {
        let mut entries: Vec<_> = std::fs::read_dir(physical)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                log::warn!(
                    "Skipping non-UTF-8 entry {:?} under \"{}\"",
                    file_name,
                    physical.display()
                );
                continue;
            };

            let virtual_path = prefix.join(name)?;
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                result.directories.push(virtual_path.clone());
                self.walk(&entry.path(), &virtual_path, result)?;
            } else if file_type.is_file() {
                let metadata = entry.metadata()?;
                result.files.push(PhysicalEntryInfo {
                    name: name.to_owned(),
                    virtual_path,
                    physical_path: entry.path(),
                    offset: 0,
                    length: metadata.len(),
                    compressed_length: None,
                    created: metadata.created().ok(),
                    modified: metadata.modified().ok(),
                    is_encrypted: false,
                });
            }
            // Sockets, device nodes etc. are not part of the namespace.
        }

        Ok(())
    }
}

impl Default for FolderProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for FolderProvider {
    fn description(&self) -> &str {
        "Native directory file system"
    }

    fn can_read(&self, physical: &Path) -> bool {
        physical.is_dir()
    }

    fn enumerate(
        &self,
        physical: &Path,
        prefix: &VirtualPath,
    ) -> Result<EnumerateResult, VfsError> {
        if !physical.is_dir() {
            return Err(VfsError::NotFound(physical.display().to_string()));
        }
        let mut result = EnumerateResult::default();
        self.walk(physical, prefix, &mut result)?;
        Ok(result)
    }

    fn open_stream(&self, entry: &PhysicalEntryInfo) -> Result<Box<dyn ProviderStream>, VfsError> {
        let stream = FileRegionStream::open(&entry.physical_path, 0, entry.length)?;
        Ok(Box::new(stream))
    }
}
