use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::path::fold_name;
use crate::provider::Provider;

/// Maps file extensions to archive providers and resolves which provider
/// can mount a given physical file.
///
/// Providers are tried in registration order. When two providers claim the
/// same extension, the first registration keeps it and the rejected claim
/// is logged; the losing provider stays reachable through the
/// registration-order probe fallback.
///
/// The registry is an explicit instance owned by the
/// [`VirtualFileSystem`](crate::VirtualFileSystem), not process-wide
/// state.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
    /// Case-folded extension → index into `providers`.
    by_extension: HashMap<String, usize>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            by_extension: HashMap::new(),
        }
    }

    /// Register a provider and claim its preferred extensions.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let index = self.providers.len();

        for claim in provider.preferred_extensions() {
            let key = fold_name(claim.extension);
            if let Some(&existing) = self.by_extension.get(&key) {
                log::warn!(
                    "Extension \"{}\" already claimed by \"{}\"; rejecting claim from \"{}\"",
                    claim.extension,
                    self.providers[existing].description(),
                    provider.description()
                );
                continue;
            }
            self.by_extension.insert(key, index);
        }

        self.providers.push(provider);
    }

    /// All registered providers, in registration order.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.iter()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry has no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolve the provider able to read the physical file at `physical`.
    ///
    /// The provider claiming the file's extension is probed first; if it
    /// declines (or no provider claims the extension), every remaining
    /// provider is probed in registration order. Returns `None` when no
    /// provider's `can_read` matches.
    pub fn resolve(&self, physical: &Path) -> Option<Arc<dyn Provider>> {
        let claimed = physical
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension.get(&fold_name(ext)))
            .copied();

        if let Some(index) = claimed {
            if self.providers[index].can_read(physical) {
                return Some(Arc::clone(&self.providers[index]));
            }
        }

        self.providers
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != claimed)
            .find(|(_, provider)| provider.can_read(physical))
            .map(|(_, provider)| Arc::clone(provider))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VfsError;
    use crate::path::VirtualPath;
    use crate::provider::{
        EnumerateResult, PhysicalEntryInfo, ProviderExtension, ProviderStream,
    };

    /// Minimal provider that accepts files with a fixed first byte.
    struct ByteProbe {
        name: &'static str,
        magic: u8,
        extensions: Vec<ProviderExtension>,
    }

    impl Provider for ByteProbe {
        fn description(&self) -> &str {
            self.name
        }

        fn preferred_extensions(&self) -> &[ProviderExtension] {
            &self.extensions
        }

        fn can_read(&self, physical: &Path) -> bool {
            std::fs::read(physical)
                .map(|data| data.first() == Some(&self.magic))
                .unwrap_or(false)
        }

        fn enumerate(
            &self,
            _physical: &Path,
            _prefix: &VirtualPath,
        ) -> Result<EnumerateResult, VfsError> {
            Ok(EnumerateResult::default())
        }

        fn open_stream(
            &self,
            _entry: &PhysicalEntryInfo,
        ) -> Result<Box<dyn ProviderStream>, VfsError> {
            Err(VfsError::NotSupported("test provider"))
        }
    }

    fn probe(name: &'static str, magic: u8, ext: &'static str) -> Arc<dyn Provider> {
        Arc::new(ByteProbe {
            name,
            magic,
            extensions: vec![ProviderExtension::new(ext, name)],
        })
    }

    #[test]
    fn resolves_by_extension_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.pak");
        std::fs::write(&path, [1u8, 0, 0]).unwrap();

        let mut registry = ProviderRegistry::new();
        registry.register(probe("pak", 1, "pak"));
        registry.register(probe("other", 2, "bin"));

        let provider = registry.resolve(&path).unwrap();
        assert_eq!(provider.description(), "pak");
    }

    #[test]
    fn falls_back_to_registration_order_probe() {
        let dir = tempfile::tempdir().unwrap();
        // Extension says "pak" but the content matches the "bin" provider.
        let path = dir.path().join("data.pak");
        std::fs::write(&path, [2u8, 0, 0]).unwrap();

        let mut registry = ProviderRegistry::new();
        registry.register(probe("pak", 1, "pak"));
        registry.register(probe("bin", 2, "bin"));

        let provider = registry.resolve(&path).unwrap();
        assert_eq!(provider.description(), "bin");
    }

    #[test]
    fn unknown_format_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.xyz");
        std::fs::write(&path, [9u8]).unwrap();

        let mut registry = ProviderRegistry::new();
        registry.register(probe("pak", 1, "pak"));
        assert!(registry.resolve(&path).is_none());
    }

    #[test]
    fn first_registration_keeps_collided_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.pak");
        std::fs::write(&path, [1u8]).unwrap();

        let mut registry = ProviderRegistry::new();
        registry.register(probe("first", 1, "pak"));
        registry.register(probe("second", 1, "pak"));

        // Both match the content; the extension claim belongs to "first".
        let provider = registry.resolve(&path).unwrap();
        assert_eq!(provider.description(), "first");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DATA.PAK");
        std::fs::write(&path, [1u8]).unwrap();

        let mut registry = ProviderRegistry::new();
        registry.register(probe("pak", 1, "pak"));
        assert!(registry.resolve(&path).is_some());
    }
}
