use std::path::Path;

use serde::Deserialize;

use crate::overlay::OverlayStatus;
use crate::vfs::VirtualFileSystem;

/// Mount and overlay configuration loaded from a TOML file.
///
/// ```toml
/// [[mount]]
/// physical = "assets"
///
/// [[mount]]
/// physical = "patches/weekly.empak"
/// virtual = "/patches"
///
/// [overlay]
/// root = "/home/bob/.ember/scratch"
/// ```
///
/// Mounts are applied in declaration order; because a later mount shadows
/// earlier ones at identical virtual paths, the order in the file is part
/// of the contract.
#[derive(Debug, Clone, Deserialize)]
pub struct VfsConfig {
    #[serde(default)]
    pub mount: Vec<MountConfig>,
    pub overlay: Option<OverlayConfig>,
}

/// A single mount point definition.
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    /// Physical directory or container file.
    pub physical: String,
    /// Virtual prefix to mount under; the root when omitted.
    #[serde(default = "default_virtual_prefix", rename = "virtual")]
    pub virtual_prefix: String,
}

/// The persisted overlay location, restored at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    pub root: String,
}

fn default_virtual_prefix() -> String {
    "/".into()
}

/// Load a VFS config from a TOML file.
///
/// Returns `Err` with a human-readable message if the file cannot be read
/// or parsed.
pub fn load_config(path: &Path) -> Result<VfsConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    toml::from_str(&content).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

/// Build a [`VirtualFileSystem`] from a config.
///
/// Mounts every entry in declaration order and activates the overlay at
/// its persisted root, if one is configured. Individual mount failures
/// and an unusable overlay root are logged and skipped so one bad entry
/// does not take down the whole file system.
pub fn build_vfs(config: &VfsConfig) -> VirtualFileSystem {
    let mut vfs = VirtualFileSystem::with_default_providers();

    for mount in &config.mount {
        log::info!(
            "VFS mount: {:?} -> \"{}\"",
            mount.physical,
            mount.virtual_prefix
        );
        if let Err(e) = vfs.mount(&mount.physical, &mount.virtual_prefix) {
            log::error!("Failed to mount {:?}: {e}", mount.physical);
        }
    }

    if let Some(overlay) = &config.overlay {
        match vfs.set_overlay_root(Path::new(&overlay.root)) {
            OverlayStatus::Accessible => {}
            status => {
                log::error!(
                    "Overlay root {:?} is not usable ({status:?}); staying without an overlay",
                    overlay.root
                );
            }
        }
    }

    vfs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config: VfsConfig = toml::from_str(
            r#"
            [[mount]]
            physical = "assets"

            [[mount]]
            physical = "patch.empak"
            virtual = "/patches"

            [overlay]
            root = "/tmp/scratch"
            "#,
        )
        .unwrap();

        assert_eq!(config.mount.len(), 2);
        assert_eq!(config.mount[0].physical, "assets");
        assert_eq!(config.mount[0].virtual_prefix, "/");
        assert_eq!(config.mount[1].virtual_prefix, "/patches");
        assert_eq!(config.overlay.unwrap().root, "/tmp/scratch");
    }

    #[test]
    fn mounts_and_overlay_are_optional() {
        let config: VfsConfig = toml::from_str("").unwrap();
        assert!(config.mount.is_empty());
        assert!(config.overlay.is_none());
    }

    #[test]
    fn load_config_missing_file_is_readable_error() {
        let err = load_config(Path::new("/no/such/vfs.toml")).unwrap_err();
        assert!(err.contains("failed to read"));
    }

    #[test]
    fn build_applies_mounts_in_order_and_activates_overlay() {
        let assets = tempfile::tempdir().unwrap();
        std::fs::write(assets.path().join("base.txt"), b"base").unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let config = VfsConfig {
            mount: vec![MountConfig {
                physical: assets.path().to_str().unwrap().to_owned(),
                virtual_prefix: "/".into(),
            }],
            overlay: Some(OverlayConfig {
                root: scratch.path().to_str().unwrap().to_owned(),
            }),
        };

        let vfs = build_vfs(&config);
        assert_eq!(vfs.read("/base.txt").unwrap(), b"base");
        assert_eq!(vfs.overlay().status(), OverlayStatus::Accessible);
    }

    #[test]
    fn build_skips_bad_mounts() {
        let assets = tempfile::tempdir().unwrap();
        std::fs::write(assets.path().join("base.txt"), b"base").unwrap();

        let config = VfsConfig {
            mount: vec![
                MountConfig {
                    physical: "/no/such/place".into(),
                    virtual_prefix: "/".into(),
                },
                MountConfig {
                    physical: assets.path().to_str().unwrap().to_owned(),
                    virtual_prefix: "/".into(),
                },
            ],
            overlay: None,
        };

        let vfs = build_vfs(&config);
        assert_eq!(vfs.mount_points().len(), 1);
        assert!(vfs.exists("/base.txt"));
    }
}
