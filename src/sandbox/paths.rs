use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::defaults::{default_denied_paths, DENIED_COMPONENTS};
use crate::config::ConfigError;

/// Why a path was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathDenial {
    #[error("relative paths are not accepted")]
    Relative,

    #[error("path contains a NUL byte")]
    NulByte,

    #[error("path cannot be resolved: {0}")]
    Unresolvable(String),

    #[error("outside the allowed directories")]
    OutsideAllowList,

    #[error("inside protected location {}", .0.display())]
    DenyListed(PathBuf),

    #[error("inside protected directory '{0}'")]
    DeniedComponent(String),
}

impl PathDenial {
    /// True for deny-list hits, false for allow-list misses and
    /// resolution failures. Diagnostic only: both are terminal.
    pub fn is_deny_list_hit(&self) -> bool {
        matches!(self, PathDenial::DenyListed(_) | PathDenial::DeniedComponent(_))
    }
}

/// The authority's decision on a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathVerdict {
    /// Fully resolved form, or the input as given when it could not be
    /// resolved at all.
    pub canonical_path: PathBuf,
    pub allowed: bool,
    /// Set whenever `allowed` is false.
    pub reason: Option<PathDenial>,
}

impl PathVerdict {
    fn allowed(canonical_path: PathBuf) -> Self {
        Self {
            canonical_path,
            allowed: true,
            reason: None,
        }
    }

    fn rejected(canonical_path: PathBuf, reason: PathDenial) -> Self {
        Self {
            canonical_path,
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Decides whether a filesystem path may be touched.
///
/// Built once at startup from the configured roots; read-only afterwards.
#[derive(Debug, Clone)]
pub struct PathAuthority {
    allowed_roots: Vec<PathBuf>,
    denied_paths: Vec<PathBuf>,
    denied_components: Vec<String>,
}

impl PathAuthority {
    /// Builds an authority with the platform deny-list plus `extra_denied`.
    pub fn new(allowed_roots: &[PathBuf], extra_denied: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut denied = default_denied_paths();
        denied.extend(extra_denied.iter().cloned());
        let components = DENIED_COMPONENTS.iter().map(|c| c.to_string()).collect();
        Self::with_deny_list(allowed_roots, &denied, components)
    }

    /// Builds an authority with an explicit deny-list and no platform
    /// defaults.
    pub fn with_deny_list(
        allowed_roots: &[PathBuf],
        denied_paths: &[PathBuf],
        denied_components: Vec<String>,
    ) -> Result<Self, ConfigError> {
        if allowed_roots.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }

        let mut roots = Vec::with_capacity(allowed_roots.len());
        for root in allowed_roots {
            let canonical = resolve(root).map_err(|denial| ConfigError::AllowedRoot {
                path: root.clone(),
                reason: denial.to_string(),
            })?;
            if !canonical.is_dir() {
                return Err(ConfigError::AllowedRoot {
                    path: root.clone(),
                    reason: "not an existing directory".to_string(),
                });
            }
            roots.push(canonical);
        }

        let mut denied = Vec::with_capacity(denied_paths.len());
        for entry in denied_paths {
            if !entry.is_absolute() {
                return Err(ConfigError::RelativeDenyEntry(entry.clone()));
            }
            // Unresolvable entries (e.g. a dangling link) are kept verbatim
            denied.push(resolve(entry).unwrap_or_else(|_| entry.clone()));
        }

        let authority = Self {
            allowed_roots: roots,
            denied_paths: denied,
            denied_components,
        };

        for root in &authority.allowed_roots {
            if let Some(denial) = authority.denial(root) {
                warn!(
                    "Allowed root {} is itself protected ({denial}); nothing under it will be accessible",
                    root.display()
                );
            }
        }

        Ok(authority)
    }

    /// Canonical allowed roots, in configuration order.
    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    /// Runs the full check: resolve, allow-list, deny-list.
    ///
    /// The deny-list is evaluated even when the allow-list check already
    /// failed; if both fail, the deny-list reason is reported.
    pub fn check(&self, raw: &Path) -> PathVerdict {
        let canonical = match resolve(raw) {
            Ok(canonical) => canonical,
            Err(denial) => return PathVerdict::rejected(raw.to_path_buf(), denial),
        };

        let inside = self
            .allowed_roots
            .iter()
            .any(|root| is_within(&canonical, root));
        let denied = self.denial(&canonical);

        debug!(
            "Path check {} → {} (inside={inside}, denied={})",
            raw.display(),
            canonical.display(),
            denied.is_some()
        );

        match (inside, denied) {
            (_, Some(denial)) => PathVerdict::rejected(canonical, denial),
            (false, None) => PathVerdict::rejected(canonical, PathDenial::OutsideAllowList),
            (true, None) => PathVerdict::allowed(canonical),
        }
    }

    /// Deny-list check alone, for paths that are already canonical
    /// (e.g. entries met while walking a directory tree).
    pub fn is_denied(&self, canonical: &Path) -> bool {
        self.denial(canonical).is_some()
    }

    /// Why an already canonical path is protected, if it is.
    pub fn denial(&self, canonical: &Path) -> Option<PathDenial> {
        if let Some(entry) = self
            .denied_paths
            .iter()
            .find(|entry| is_within(canonical, entry))
        {
            return Some(PathDenial::DenyListed(entry.clone()));
        }

        canonical.components().find_map(|component| match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                self.denied_components
                    .iter()
                    .find(|denied| denied.eq_ignore_ascii_case(&name))
                    .map(|denied| PathDenial::DeniedComponent(denied.clone()))
            }
            _ => None,
        })
    }
}

/// Resolves an absolute path to canonical form.
///
/// Links are followed and `.`/`..` segments normalized by the operating
/// system. A path that does not exist yet is resolved through its
/// nearest existing ancestor, with the missing tail appended, so a
/// creation target cannot hide traversal behind an absent leaf.
pub fn resolve(raw: &Path) -> Result<PathBuf, PathDenial> {
    if raw.as_os_str().to_string_lossy().contains('\0') {
        return Err(PathDenial::NulByte);
    }
    if !raw.is_absolute() {
        return Err(PathDenial::Relative);
    }

    for ancestor in raw.ancestors() {
        match dunce::canonicalize(ancestor) {
            Ok(base) => {
                let tail = raw
                    .strip_prefix(ancestor)
                    .map_err(|e| PathDenial::Unresolvable(e.to_string()))?;
                if tail.as_os_str().is_empty() {
                    return Ok(base);
                }
                let joined = join_lexically(base, tail);
                // A `..` in the missing tail may have stepped back onto an
                // existing link; resolve the normalized form once more.
                if tail.components().any(|c| c == Component::ParentDir) {
                    return resolve(&joined);
                }
                return Ok(joined);
            }
            // Present but unresolvable: a dangling link or an unreadable
            // directory. Its real target is unknown, so refuse.
            Err(e) if ancestor.symlink_metadata().is_ok() => {
                return Err(PathDenial::Unresolvable(format!(
                    "{}: {e}",
                    ancestor.display()
                )));
            }
            Err(_) => continue,
        }
    }

    Err(PathDenial::Unresolvable(format!(
        "no existing ancestor for {}",
        raw.display()
    )))
}

/// Appends a tail of non-existent components, applying `..` lexically.
fn join_lexically(mut base: PathBuf, tail: &Path) -> PathBuf {
    for component in tail.components() {
        match component {
            Component::ParentDir => {
                base.pop();
            }
            Component::Normal(part) => base.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    base
}

/// Component-wise descendant test (a path is within itself).
#[cfg(not(windows))]
fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Component-wise descendant test, ignoring case like NTFS does.
#[cfg(windows)]
fn is_within(path: &Path, root: &Path) -> bool {
    let lower = |p: &Path| PathBuf::from(p.to_string_lossy().to_lowercase());
    lower(path).starts_with(lower(root))
}
