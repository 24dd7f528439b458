//! Managed file contents

use anyhow::{Context, Result};
use changekit::{Change, ChangeContext, ChangeLog, ChangeResult, ParentLink, Target, TargetLock};
use similar::{ChangeTag, TextDiff};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Appended to the file path to name its backup
pub const BACKUP_SUFFIX: &str = ".devbox_backup";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Writes a file with exact contents, keeping a backup of what it replaced
pub struct CreateOrReplaceFile {
    name: String,
    path: PathBuf,
    contents: String,
    timeout: Duration,
    log: Arc<dyn ChangeLog>,
    parent: ParentLink,
}

impl CreateOrReplaceFile {
    /// The path is resolved with [`resolve_path`]; it does not need to exist
    /// yet.
    pub fn new(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        contents: impl Into<String>,
        log: Arc<dyn ChangeLog>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            path: resolve_path(path.as_ref())?,
            contents: contents.into(),
            timeout: DEFAULT_TIMEOUT,
            log,
            parent: ParentLink::new(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut raw = self.path.as_os_str().to_owned();
        raw.push(BACKUP_SUFFIX);
        PathBuf::from(raw)
    }

    fn read_current(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Could not read {}", self.path.display())),
        }
    }

    fn log_diff(&self, current: &[u8]) {
        let current = String::from_utf8_lossy(current);
        let diff = TextDiff::from_lines(current.as_ref(), self.contents.as_str());
        for change in diff.iter_all_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => "-",
                ChangeTag::Insert => "+",
                ChangeTag::Equal => continue,
            };
            self.log
                .info_from(self, &format!("{sign} {}", change.value().trim_end()));
        }
    }
}

/// Absolute path with `..` and symlinks in the directory part resolved
///
/// The file itself need not exist. When the directory does not exist either,
/// `.` and `..` are removed lexically instead.
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("Could not resolve {}", path.display()))?;
    let normalized = normalize(&absolute);

    for candidate in [&absolute, &normalized] {
        if let (Some(dir), Some(file)) = (candidate.parent(), candidate.file_name()) {
            if let Ok(dir) = fs::canonicalize(dir) {
                return Ok(dir.join(file));
            }
        }
    }
    Ok(normalized)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl fmt::Debug for CreateOrReplaceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateOrReplaceFile")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl Change for CreateOrReplaceFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Creates or replaces {}", self.path.display())
    }

    fn parent(&self) -> Option<Arc<dyn Change>> {
        self.parent.get()
    }

    fn locks(&self) -> Vec<TargetLock> {
        let path = self.path.to_string_lossy();
        let target = Target::new(path.as_ref(), "managed file", &[path.as_ref()]);
        vec![TargetLock::new(target, self.timeout)]
    }

    fn is_applied(&self) -> Result<bool> {
        Ok(self.read_current()?.as_deref() == Some(self.contents.as_bytes()))
    }

    fn apply(&self, ctx: &ChangeContext) -> Result<ChangeResult> {
        let current = self.read_current()?;
        if current.as_deref() == Some(self.contents.as_bytes()) {
            return Ok(ChangeResult::success(format!(
                "{} is already up to date",
                self.path.display()
            )));
        }

        if ctx.verbose {
            self.log_diff(current.as_deref().unwrap_or_default());
        }

        if current.is_some() {
            let backup = self.backup_path();
            fs::copy(&self.path, &backup).with_context(|| {
                format!("Could not back up {} to {}", self.path.display(), backup.display())
            })?;
            self.log
                .info_from(self, &format!("Backed up existing file to {}", backup.display()));
        } else if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }

        fs::write(&self.path, &self.contents)
            .with_context(|| format!("Could not write {}", self.path.display()))?;

        let verb = if current.is_some() { "Replaced" } else { "Created" };
        Ok(ChangeResult::success(format!("{verb} {}", self.path.display())))
    }

    fn rollback(&self, _ctx: &ChangeContext) -> Result<ChangeResult> {
        let backup = self.backup_path();
        if !backup.exists() {
            return Ok(ChangeResult::warn(format!(
                "No backup to restore for: {}",
                self.path.display()
            )));
        }

        fs::rename(&backup, &self.path).with_context(|| {
            format!("Could not restore {} from {}", self.path.display(), backup.display())
        })?;
        Ok(ChangeResult::success(format!(
            "Restored {} from backup",
            self.path.display()
        )))
    }
}
