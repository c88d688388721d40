//! Writable overlay (scratch area) for staging edits against read-only
//! mounted content.
//!
//! The overlay lives in a session subdirectory created under a
//! user-chosen root. Every edit is staged as a plain file below that
//! subdirectory, leaving the original physical resources untouched; the
//! [`VirtualFileSystem`](crate::VirtualFileSystem) gives staged entries
//! the highest shadowing priority. Session directories follow the
//! `.ember.<uuid>` naming convention — the leading dot keeps them hidden
//! and out of content indexing, and the convention doubles as the
//! heuristic for sweeping stale sessions left behind by crashed runs.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::VfsError;
use crate::path::VirtualPath;

/// Prefix of overlay session directory names.
const SESSION_PREFIX: &str = ".ember.";

/// Name of the temporary file used to confirm write permission.
const WRITE_PROBE_NAME: &str = "WriteProbe.tmp";

/// Accessibility of an overlay root, as reported by [`WritableOverlay::probe`].
///
/// Probing returns a status value instead of an error so interactive
/// callers can present a choice rather than crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayStatus {
    /// No overlay root has been chosen yet.
    Unset,
    /// The root is usable and a session can be (or has been) created.
    Accessible,
    /// The candidate path is, or lies under, an OS-critical directory.
    SystemArea,
    /// The candidate's volume is missing or the path is not writable.
    CannotWrite,
    /// An interactive relocation flow was abandoned by the caller.
    Canceled,
}

/// What [`WritableOverlay::cleanup`] should remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupScope {
    /// Only the current session's directory.
    Session,
    /// The current session plus any stale session directories under the
    /// same root, each deleted independently.
    All,
}

struct Session {
    id: Uuid,
    directory: PathBuf,
}

/// The writable scratch area of a virtual file system.
///
/// State machine: starts `Unset`; [`activate`](WritableOverlay::activate)
/// probes a root and on success creates a hidden session subdirectory and
/// moves to `Accessible`. [`cleanup`](WritableOverlay::cleanup) deletes
/// staged content and returns to `Unset`. Probe failures never change
/// state.
pub struct WritableOverlay {
    root: Option<PathBuf>,
    session: Option<Session>,
    status: OverlayStatus,
}

impl WritableOverlay {
    pub fn new() -> Self {
        Self {
            root: None,
            session: None,
            status: OverlayStatus::Unset,
        }
    }

    /// Current state of the overlay.
    pub fn status(&self) -> OverlayStatus {
        self.status
    }

    /// The overlay root, once one has been chosen.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// The current session's identifier.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// The current session's directory.
    pub fn session_dir(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.directory.as_path())
    }

    /// Evaluate whether `candidate` can host the overlay.
    ///
    /// Checks, in order: the path's root volume must exist
    /// (`CannotWrite`), the path must not be an OS-critical location
    /// (`SystemArea`), and a test file must be creatable and deletable at
    /// the candidate (`CannotWrite`). The candidate directory itself is
    /// created when missing. Never mutates overlay state.
    pub fn probe(candidate: &Path) -> OverlayStatus {
        if !candidate.is_absolute() {
            return OverlayStatus::CannotWrite;
        }
        // The volume root (`/`, or a drive prefix on Windows) must exist
        // and be usable before anything else is tried.
        let volume = candidate.ancestors().last().unwrap_or(candidate);
        if volume.as_os_str().is_empty() || !volume.exists() {
            return OverlayStatus::CannotWrite;
        }

        if is_system_location(candidate) {
            return OverlayStatus::SystemArea;
        }

        if let Err(err) = std::fs::create_dir_all(candidate) {
            log::warn!(
                "Overlay candidate \"{}\" cannot be created: {err}",
                candidate.display()
            );
            return OverlayStatus::CannotWrite;
        }

        // Prove we can actually write here.
        let probe_file = candidate.join(WRITE_PROBE_NAME);
        if let Err(err) = std::fs::write(&probe_file, [127u8]) {
            log::warn!(
                "Overlay candidate \"{}\" is not writable: {err}",
                candidate.display()
            );
            return OverlayStatus::CannotWrite;
        }
        if let Err(err) = std::fs::remove_file(&probe_file) {
            log::warn!(
                "Overlay probe file \"{}\" could not be removed: {err}",
                probe_file.display()
            );
            return OverlayStatus::CannotWrite;
        }

        OverlayStatus::Accessible
    }

    /// Probe `root` and, on success, start a fresh session under it.
    ///
    /// A new session identifier is generated and a hidden subdirectory
    /// named after it is created; any previous session is cleaned up
    /// first. On failure the previous state is kept.
    pub fn activate(&mut self, root: &Path) -> OverlayStatus {
        let status = Self::probe(root);
        if status != OverlayStatus::Accessible {
            return status;
        }

        if self.session.is_some() {
            if let Err(err) = self.cleanup(CleanupScope::Session) {
                log::warn!("Failed to clean up previous overlay session: {err}");
            }
        }

        let id = Uuid::new_v4();
        let directory = root.join(format!("{SESSION_PREFIX}{}", id.simple()));
        if let Err(err) = std::fs::create_dir_all(&directory) {
            log::warn!(
                "Failed to create overlay session directory \"{}\": {err}",
                directory.display()
            );
            return OverlayStatus::CannotWrite;
        }

        log::info!(
            "Overlay session {} created at \"{}\"",
            id.simple(),
            directory.display()
        );

        self.root = Some(root.to_path_buf());
        self.session = Some(Session { id, directory });
        self.status = OverlayStatus::Accessible;
        OverlayStatus::Accessible
    }

    /// Drive an interactive relocation flow.
    ///
    /// The chooser receives the current root (if any) and returns the new
    /// candidate, or `None` to abandon the flow — which reports
    /// `Canceled` and mutates nothing. A candidate inside an OS-critical
    /// area is likewise rejected without touching the current session.
    pub fn relocate<F>(&mut self, chooser: F) -> OverlayStatus
    where
        F: FnOnce(Option<&Path>) -> Option<PathBuf>,
    {
        let Some(candidate) = chooser(self.root()) else {
            return OverlayStatus::Canceled;
        };
        if is_system_location(&candidate) {
            return OverlayStatus::SystemArea;
        }
        self.activate(&candidate)
    }

    /// Physical location a virtual path is staged at, if present.
    pub fn lookup(&self, path: &VirtualPath) -> Option<PathBuf> {
        let staged = self.staged_path(path).ok()?;
        staged.is_file().then_some(staged)
    }

    /// Stage file content at a virtual path, creating parent directories
    /// as needed. Returns the staged physical location.
    pub fn write(&self, path: &VirtualPath, data: &[u8]) -> Result<PathBuf, VfsError> {
        let staged = self.staged_path(path)?;
        if let Some(parent) = staged.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&staged, data)?;
        Ok(staged)
    }

    /// Remove a staged file.
    pub fn delete(&self, path: &VirtualPath) -> Result<(), VfsError> {
        let staged = self.staged_path(path)?;
        std::fs::remove_file(&staged)?;
        Ok(())
    }

    /// Delete staged content.
    ///
    /// `Session` removes the current session directory and returns the
    /// overlay to `Unset`. `All` additionally sweeps the root for other
    /// directories matching the session naming convention — stale
    /// sessions from crashed prior runs — deleting each independently and
    /// continuing past individual failures.
    pub fn cleanup(&mut self, scope: CleanupScope) -> Result<(), VfsError> {
        if let Some(session) = self.session.take() {
            log::info!(
                "Cleaning up overlay session {} at \"{}\"",
                session.id.simple(),
                session.directory.display()
            );
            match std::fs::remove_dir_all(&session.directory) {
                Ok(()) => {}
                // Already gone is a successful cleanup.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    // Restore the session so a later attempt can retry.
                    self.session = Some(session);
                    return Err(err.into());
                }
            }
        }
        self.status = OverlayStatus::Unset;

        if scope == CleanupScope::All {
            if let Some(root) = &self.root {
                sweep_stale_sessions(root);
            }
        }

        Ok(())
    }

    fn staged_path(&self, path: &VirtualPath) -> Result<PathBuf, VfsError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| VfsError::AccessError("overlay is not accessible".into()))?;
        let mut staged = session.directory.clone();
        // Staged files live under their case-folded path so that all
        // casings of a virtual path resolve to the same physical file,
        // matching the namespace's case-insensitive contract.
        for segment in path.folded_segments() {
            staged.push(segment);
        }
        Ok(staged)
    }
}

impl Default for WritableOverlay {
    fn default() -> Self {
        Self::new()
    }
}

/// Delete every directory under `root` that matches the session naming
/// convention, independently, logging and continuing past failures.
pub fn sweep_stale_sessions(root: &Path) {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!(
                "Cannot scan overlay root \"{}\" for stale sessions: {err}",
                root.display()
            );
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_session_name(name) || !entry.path().is_dir() {
            continue;
        }
        match std::fs::remove_dir_all(entry.path()) {
            Ok(()) => {
                log::info!("Removed stale overlay session \"{}\"", name);
            }
            Err(err) => {
                // Something else has the directory; try again next run.
                log::warn!("Could not remove stale overlay session \"{name}\": {err}");
            }
        }
    }
}

/// Whether a directory name matches the hidden session convention:
/// the `.ember.` prefix followed by a session identifier.
fn is_session_name(name: &str) -> bool {
    name.strip_prefix(SESSION_PREFIX)
        .is_some_and(|rest| Uuid::try_parse(rest).is_ok())
}

/// Whether `path` equals or lies under an OS-critical directory.
fn is_system_location(path: &Path) -> bool {
    system_locations()
        .iter()
        .any(|system| path == system || path.starts_with(system))
}

#[cfg(unix)]
fn system_locations() -> Vec<PathBuf> {
    [
        "/bin", "/boot", "/dev", "/etc", "/lib", "/lib64", "/proc", "/run", "/sbin", "/sys",
        "/usr",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(windows)]
fn system_locations() -> Vec<PathBuf> {
    ["SystemRoot", "ProgramFiles", "ProgramFiles(x86)", "windir"]
        .into_iter()
        .filter_map(|var| std::env::var_os(var))
        .map(PathBuf::from)
        .collect()
}
