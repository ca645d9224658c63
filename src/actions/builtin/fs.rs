//! Builtin filesystem actions.
//!
//! Every path reaching these handlers is canonical and inside an allowed
//! root. Handlers still re-check what can change between validation and
//! execution (a source vanishing, a target appearing) and map it to a
//! specific error instead of a generic OS failure.
//!
//! Validation only vouches for the named paths. Anything derived from
//! them (the entries of a tree, the name a source takes inside a
//! destination folder) is checked against the deny-list here.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::actions::{ActionArgs, ActionContext, ActionError, ActionHandler, ActionOutput};
use crate::sandbox::{PathAuthority, PathDenial};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

// ── Open ────────────────────────────────────────────────

pub struct OpenFolder;

#[async_trait]
impl ActionHandler for OpenFolder {
    async fn run(&self, args: &ActionArgs, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let path = args.existing_path("path")?;
        if !path.is_dir() {
            return Err(ActionError::InvalidRequest(format!(
                "{} is not a folder",
                path.display()
            )));
        }
        ctx.desktop
            .open_path(path)
            .map_err(ActionError::os(format!("cannot open {}", path.display())))?;
        Ok(ActionOutput::message(format!("Opened folder: {}", path.display())))
    }
}

pub struct OpenFile;

#[async_trait]
impl ActionHandler for OpenFile {
    async fn run(&self, args: &ActionArgs, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let path = args.existing_path("path")?;
        if !path.is_file() {
            return Err(ActionError::InvalidRequest(format!(
                "{} is not a file",
                path.display()
            )));
        }
        ctx.desktop
            .open_path(path)
            .map_err(ActionError::os(format!("cannot open {}", path.display())))?;
        Ok(ActionOutput::message(format!("Opened file: {}", path.display())))
    }
}

// ── List / search ───────────────────────────────────────

#[derive(Debug, Serialize)]
struct EntryInfo {
    name: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<String>,
}

pub struct ListDirectory;

#[async_trait]
impl ActionHandler for ListDirectory {
    async fn run(&self, args: &ActionArgs, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let path = args.existing_path("path")?;
        if !path.is_dir() {
            return Err(ActionError::InvalidRequest(format!(
                "{} is not a folder",
                path.display()
            )));
        }

        let context = format!("cannot list {}", path.display());
        let mut reader = tokio::fs::read_dir(path)
            .await
            .map_err(ActionError::os(context.clone()))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(ActionError::os(context.clone()))?
        {
            if ctx.authority.is_denied(&entry.path()) {
                continue;
            }
            // Does not follow links: a link is listed as a link
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Skipping {}: {e}", entry.path().display());
                    continue;
                }
            };
            let kind = if metadata.is_dir() {
                "dir"
            } else if metadata.is_file() {
                "file"
            } else if metadata.file_type().is_symlink() {
                "link"
            } else {
                "other"
            };
            entries.push(EntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
                size: metadata.is_file().then(|| metadata.len()),
                modified: metadata
                    .modified()
                    .ok()
                    .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let count = entries.len();
        Ok(ActionOutput::with_data(
            format!("{count} entries in {}", path.display()),
            json!({
                "path": path.display().to_string(),
                "entries": entries,
                "count": count,
            }),
        ))
    }
}

pub struct SearchFile;

#[async_trait]
impl ActionHandler for SearchFile {
    async fn run(&self, args: &ActionArgs, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let root = args.existing_path("path")?.to_path_buf();
        if !root.is_dir() {
            return Err(ActionError::InvalidRequest(format!(
                "{} is not a folder",
                root.display()
            )));
        }

        let pattern_text = args
            .optional("pattern")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("*")
            .to_string();
        let pattern = Pattern::new(&pattern_text).map_err(|e| {
            ActionError::InvalidRequest(format!("invalid pattern '{pattern_text}': {e}"))
        })?;

        let limit = ctx.search_limit;
        let authority = Arc::clone(&ctx.authority);
        let walk_root = root.clone();
        let (matches, truncated) = tokio::task::spawn_blocking(move || {
            search_tree(&walk_root, &pattern, limit, &authority)
        })
        .await
        .map_err(|e| ActionError::Os {
            context: "search task failed".to_string(),
            source: io::Error::other(e),
        })?;

        let count = matches.len();
        let message = if truncated {
            format!("Found {count}+ matches for '{pattern_text}' in {} (limit reached)", root.display())
        } else {
            format!("Found {count} matches for '{pattern_text}' in {}", root.display())
        };
        Ok(ActionOutput::with_data(
            message,
            json!({
                "pattern": pattern_text,
                "matches": matches,
                "count": count,
                "truncated": truncated,
            }),
        ))
    }
}

/// Walks `root` without following links, skipping protected subtrees.
/// Returns the matching file paths and whether `limit` cut the walk short.
fn search_tree(
    root: &Path,
    pattern: &Pattern,
    limit: usize,
    authority: &PathAuthority,
) -> (Vec<String>, bool) {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !authority.is_denied(entry.path()));

    let mut matches = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if pattern.matches_with(&entry.file_name().to_string_lossy(), MATCH_OPTIONS) {
            if matches.len() == limit {
                return (matches, true);
            }
            matches.push(entry.path().display().to_string());
        }
    }
    (matches, false)
}

// ── Create / delete ─────────────────────────────────────

pub struct CreateFolder;

#[async_trait]
impl ActionHandler for CreateFolder {
    async fn run(&self, args: &ActionArgs, _ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let path = args.path("path")?;
        match tokio::fs::symlink_metadata(path).await {
            Ok(metadata) if metadata.is_dir() => {
                return Ok(ActionOutput::message(format!(
                    "Folder already exists: {}",
                    path.display()
                )))
            }
            Ok(_) => {
                return Err(ActionError::InvalidRequest(format!(
                    "{} exists and is not a folder",
                    path.display()
                )))
            }
            Err(_) => {}
        }

        tokio::fs::create_dir_all(path)
            .await
            .map_err(ActionError::os(format!("cannot create {}", path.display())))?;
        Ok(ActionOutput::message(format!("Created folder: {}", path.display())))
    }
}

pub struct DeleteFile;

#[async_trait]
impl ActionHandler for DeleteFile {
    async fn run(&self, args: &ActionArgs, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let path = args.existing_path("path")?;
        refuse_allowed_root(path, ctx)?;
        refuse_protected(path, None, ctx).await?;

        let metadata = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| classify(e, path, &format!("cannot delete {}", path.display())))?;
        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        removed.map_err(|e| classify(e, path, &format!("cannot delete {}", path.display())))?;

        info!("Deleted {}", path.display());
        Ok(ActionOutput::message(format!("Deleted: {}", path.display())))
    }
}

// ── Move / copy ─────────────────────────────────────────

pub struct MoveFile;

#[async_trait]
impl ActionHandler for MoveFile {
    async fn run(&self, args: &ActionArgs, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let source = args.existing_path("source")?.to_path_buf();
        refuse_allowed_root(&source, ctx)?;
        let target = placement_target(&source, args.path("destination")?, ctx).await?;
        refuse_into_itself(&source, &target)?;
        refuse_protected(&source, Some(&target), ctx).await?;

        let context = format!("cannot move {} to {}", source.display(), target.display());
        match rename_no_replace(&source, &target).await {
            Ok(()) => {}
            Err(e) if is_cross_device(&e) => {
                debug!("Cross-device move, falling back to copy + remove");
                move_across_devices(&source, &target, ctx, &context).await?;
            }
            Err(e) => return Err(classify(e, &source, &context)),
        }

        Ok(ActionOutput::message(format!(
            "Moved {} to {}",
            source.display(),
            target.display()
        )))
    }
}

pub struct CopyFile;

#[async_trait]
impl ActionHandler for CopyFile {
    async fn run(&self, args: &ActionArgs, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let source = args.existing_path("source")?.to_path_buf();
        let target = placement_target(&source, args.path("destination")?, ctx).await?;
        refuse_into_itself(&source, &target)?;

        let context = format!("cannot copy {} to {}", source.display(), target.display());
        let metadata = tokio::fs::symlink_metadata(&source)
            .await
            .map_err(|e| classify(e, &source, &context))?;

        let message = if metadata.is_dir() {
            let stats = copy_tree_blocking(source.clone(), target.clone(), ctx)
                .await
                .map_err(|e| classify(e, &source, &context))?;
            if stats.skipped > 0 {
                warn!("Skipped {} links or special files while copying", stats.skipped);
            }
            let mut message = format!(
                "Copied {} to {} ({} files, {} skipped)",
                source.display(),
                target.display(),
                stats.files,
                stats.skipped
            );
            if stats.protected > 0 {
                warn!("Left {} protected entries out of the copy", stats.protected);
                message.push_str(&format!("; {} protected entries left out", stats.protected));
            }
            message
        } else {
            copy_file_blocking(source.clone(), target.clone())
                .await
                .map_err(|e| classify(e, &source, &context))?;
            format!("Copied {} to {}", source.display(), target.display())
        };

        Ok(ActionOutput::message(message))
    }
}

/// Where `source` lands given `destination`: inside it when it is an
/// existing folder, at it otherwise. The landing path gets the same
/// authority check as a validated one, and existing targets are never
/// overwritten.
async fn placement_target(
    source: &Path,
    destination: &Path,
    ctx: &ActionContext,
) -> Result<PathBuf, ActionError> {
    let target = match tokio::fs::metadata(destination).await {
        Ok(metadata) if metadata.is_dir() => {
            let name = source.file_name().ok_or_else(|| {
                ActionError::InvalidRequest(format!("{} has no file name", source.display()))
            })?;
            destination.join(name)
        }
        _ => destination.to_path_buf(),
    };

    let verdict = ctx.authority.check(&target);
    if !verdict.allowed {
        let reason = verdict.reason.unwrap_or(PathDenial::OutsideAllowList);
        warn!("Refusing to place into {}: {reason}", verdict.canonical_path.display());
        return Err(ActionError::Protected {
            path: verdict.canonical_path,
            reason,
        });
    }

    if tokio::fs::symlink_metadata(&target).await.is_ok() {
        return Err(ActionError::InvalidRequest(format!(
            "{} already exists; refusing to overwrite",
            target.display()
        )));
    }
    Ok(target)
}

fn refuse_into_itself(source: &Path, target: &Path) -> Result<(), ActionError> {
    if source.is_dir() && target.starts_with(source) {
        return Err(ActionError::InvalidRequest(format!(
            "cannot place {} inside itself",
            source.display()
        )));
    }
    Ok(())
}

fn refuse_allowed_root(path: &Path, ctx: &ActionContext) -> Result<(), ActionError> {
    if ctx.authority.allowed_roots().iter().any(|root| root == path) {
        return Err(ActionError::InvalidRequest(format!(
            "{} is an allowed root and cannot be removed",
            path.display()
        )));
    }
    Ok(())
}

/// Refuses to act on a tree that holds a protected location, or that
/// would put an entry inside one once placed at `target`.
async fn refuse_protected(
    source: &Path,
    target: Option<&Path>,
    ctx: &ActionContext,
) -> Result<(), ActionError> {
    let authority = Arc::clone(&ctx.authority);
    let walk_source = source.to_path_buf();
    let walk_target = target.map(Path::to_path_buf);
    let hit = tokio::task::spawn_blocking(move || {
        find_protected(&walk_source, walk_target.as_deref(), &authority)
    })
    .await
    .map_err(io::Error::other)
    .and_then(|scanned| scanned)
    .map_err(|e| classify(e, source, &format!("cannot inspect {}", source.display())))?;

    match hit {
        Some((path, reason)) => {
            warn!("Refusing to touch protected {}: {reason}", path.display());
            Err(ActionError::Protected { path, reason })
        }
        None => Ok(()),
    }
}

/// First protected entry of the tree at `source`. Links are not
/// followed, and an unreadable entry fails the scan: what cannot be
/// inspected is not moved or deleted.
fn find_protected(
    source: &Path,
    target: Option<&Path>,
    authority: &PathAuthority,
) -> io::Result<Option<(PathBuf, PathDenial)>> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        if let Some(hit) = protected_entry(entry.path(), source, target, authority) {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}

/// Protection hit for one entry of a tree rooted at `source`, either
/// where it is now or where it lands under `target`.
fn protected_entry(
    path: &Path,
    source: &Path,
    target: Option<&Path>,
    authority: &PathAuthority,
) -> Option<(PathBuf, PathDenial)> {
    if let Some(reason) = authority.denial(path) {
        return Some((path.to_path_buf(), reason));
    }
    let landing = target?.join(path.strip_prefix(source).ok()?);
    authority.denial(&landing).map(|reason| (landing, reason))
}

/// Renames without replacing anything that appeared at `target` after
/// it was checked.
async fn rename_no_replace(source: &Path, target: &Path) -> io::Result<()> {
    let metadata = tokio::fs::symlink_metadata(source).await?;
    if metadata.is_dir() {
        return rename_dir_no_replace(source, target).await;
    }

    // Linking fails on a taken name where rename would replace it
    match tokio::fs::hard_link(source, target).await {
        Ok(()) => tokio::fs::remove_file(source).await,
        Err(e)
            if matches!(e.kind(), io::ErrorKind::AlreadyExists | io::ErrorKind::NotFound)
                || is_cross_device(&e) =>
        {
            Err(e)
        }
        Err(e) => {
            debug!("Hard link unavailable ({e}), renaming instead");
            tokio::fs::rename(source, target).await
        }
    }
}

/// rename(2) replaces an empty directory and fails on anything else, so
/// an empty placeholder holds the name until the rename lands on it.
#[cfg(unix)]
async fn rename_dir_no_replace(source: &Path, target: &Path) -> io::Result<()> {
    tokio::fs::create_dir(target).await?;
    let renamed = tokio::fs::rename(source, target).await;
    if renamed.is_err() {
        if let Err(e) = tokio::fs::remove_dir(target).await {
            warn!("Could not remove placeholder {}: {e}", target.display());
        }
    }
    renamed
}

/// Directory renames do not replace an existing target here.
#[cfg(not(unix))]
async fn rename_dir_no_replace(source: &Path, target: &Path) -> io::Result<()> {
    tokio::fs::rename(source, target).await
}

async fn move_across_devices(
    source: &Path,
    target: &Path,
    ctx: &ActionContext,
    context: &str,
) -> Result<(), ActionError> {
    let metadata = tokio::fs::symlink_metadata(source)
        .await
        .map_err(|e| classify(e, source, context))?;

    if !metadata.is_dir() {
        copy_file_blocking(source.to_path_buf(), target.to_path_buf())
            .await
            .map_err(|e| classify(e, source, context))?;
        return tokio::fs::remove_file(source)
            .await
            .map_err(ActionError::os(context.to_string()));
    }

    let stats = copy_tree_blocking(source.to_path_buf(), target.to_path_buf(), ctx)
        .await
        .map_err(|e| classify(e, source, context))?;

    // Leave the source untouched if the copy is incomplete
    let left_behind = stats.skipped + stats.protected;
    if left_behind > 0 {
        if let Err(e) = tokio::fs::remove_dir_all(target).await {
            warn!("Could not clean up partial copy {}: {e}", target.display());
        }
        return Err(ActionError::InvalidRequest(format!(
            "{} contains {left_behind} entries that cannot be moved across devices",
            source.display()
        )));
    }

    tokio::fs::remove_dir_all(source)
        .await
        .map_err(ActionError::os(context.to_string()))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CopyStats {
    files: usize,
    /// Links and special files, which are never followed or copied
    skipped: usize,
    /// Entries left out because they are, or would land in, a protected
    /// location
    protected: usize,
}

async fn copy_file_blocking(source: PathBuf, target: PathBuf) -> io::Result<u64> {
    tokio::task::spawn_blocking(move || copy_file_new(&source, &target))
        .await
        .map_err(io::Error::other)?
}

async fn copy_tree_blocking(
    source: PathBuf,
    target: PathBuf,
    ctx: &ActionContext,
) -> io::Result<CopyStats> {
    let authority = Arc::clone(&ctx.authority);
    tokio::task::spawn_blocking(move || copy_tree(&source, &target, &authority))
        .await
        .map_err(io::Error::other)?
}

/// Copies one file, failing if anything exists at `target` by the time
/// it is created.
fn copy_file_new(source: &Path, target: &Path) -> io::Result<u64> {
    let mut reader = std::fs::File::open(source)?;
    let permissions = reader.metadata()?.permissions();
    let mut writer = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)?;

    let copied = io::copy(&mut reader, &mut writer)
        .and_then(|bytes| writer.set_permissions(permissions).map(|()| bytes));
    if copied.is_err() {
        drop(writer);
        if let Err(e) = std::fs::remove_file(target) {
            warn!("Could not clean up partial copy {}: {e}", target.display());
        }
    }
    copied
}

/// Copies the tree at `source` to a new directory `target`. A failure
/// part way removes what was copied.
fn copy_tree(source: &Path, target: &Path, authority: &PathAuthority) -> io::Result<CopyStats> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir(target)?;

    copy_entries(source, target, authority).map_err(|e| {
        if let Err(cleanup) = std::fs::remove_dir_all(target) {
            warn!("Could not clean up partial copy {}: {cleanup}", target.display());
        }
        e
    })
}

fn copy_entries(source: &Path, target: &Path, authority: &PathAuthority) -> io::Result<CopyStats> {
    let mut stats = CopyStats::default();
    let mut protected = 0;
    let walker = WalkDir::new(source)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| match protected_entry(entry.path(), source, Some(target), authority) {
            Some((path, reason)) => {
                debug!("Leaving out {}: {reason}", path.display());
                protected += 1;
                false
            }
            None => true,
        });

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry.path().strip_prefix(source).map_err(io::Error::other)?;
        let destination = target.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir(&destination)?;
        } else if file_type.is_file() {
            copy_file_new(entry.path(), &destination)?;
            stats.files += 1;
        } else {
            stats.skipped += 1;
        }
    }
    stats.protected = protected;
    Ok(stats)
}

/// A NotFound on a source that is now gone means it vanished after
/// validation, and an AlreadyExists means a target appeared after its
/// check. Anything else is a plain OS failure.
fn classify(error: io::Error, source: &Path, context: &str) -> ActionError {
    match error.kind() {
        io::ErrorKind::NotFound if source.symlink_metadata().is_err() => ActionError::Race(format!(
            "{} disappeared before the operation completed",
            source.display()
        )),
        io::ErrorKind::AlreadyExists => ActionError::Race(format!(
            "{context}: the destination appeared after it was checked"
        )),
        _ => ActionError::Os {
            context: context.to_string(),
            source: error,
        },
    }
}

fn is_cross_device(error: &io::Error) -> bool {
    #[cfg(unix)]
    {
        // EXDEV
        error.raw_os_error() == Some(18)
    }
    #[cfg(windows)]
    {
        // ERROR_NOT_SAME_DEVICE
        error.raw_os_error() == Some(17)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = error;
        false
    }
}
