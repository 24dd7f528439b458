//! Homebrew package install

use crate::runner::{CommandOutput, CommandRunner, truncate};
use anyhow::Result;
use changekit::{Change, ChangeContext, ChangeLog, ChangeResult, ParentLink, Target, TargetLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_NAME: &str = "home_brew";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest stdout excerpt logged when not verbose
const OUTPUT_PREVIEW_CHARS: usize = 200;

const BREW: &str = "brew";

/// Installs one Homebrew package
pub struct HomeBrew {
    name: String,
    package: String,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
    log: Arc<dyn ChangeLog>,
    parent: ParentLink,
}

impl HomeBrew {
    pub fn new(
        package: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        log: Arc<dyn ChangeLog>,
    ) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            package: package.into(),
            timeout: DEFAULT_TIMEOUT,
            runner,
            log,
            parent: ParentLink::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach to the composite that owns this unit
    pub fn with_parent(mut self, parent: ParentLink) -> Self {
        self.parent = parent;
        self
    }

    fn brew(&self, ctx: &ChangeContext, subcommand: &str) -> Result<CommandOutput> {
        self.log
            .info_from(self, &format!("Running: {BREW} {subcommand} {}", self.package));
        let output = self.runner.run(BREW, &[subcommand, self.package.as_str()])?;

        let stdout = output.stdout_str();
        if ctx.verbose {
            if !stdout.is_empty() {
                self.log.info_from(self, &format!("stdout: {stdout}"));
            }
            let stderr = output.stderr_str();
            if !stderr.is_empty() {
                self.log.info_from(self, &format!("stderr: {stderr}"));
            }
        } else if !stdout.is_empty() {
            self.log.info_from(
                self,
                &format!("Output: {}", truncate(&stdout, OUTPUT_PREVIEW_CHARS)),
            );
        }
        Ok(output)
    }

    fn failure(&self, subcommand: &str, output: &CommandOutput) -> ChangeResult {
        let code = output
            .code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        ChangeResult::failed(format!(
            "{BREW} {subcommand} {} failed (exit {code}): {}",
            self.package,
            output.stderr_str()
        ))
    }
}

impl fmt::Debug for HomeBrew {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HomeBrew")
            .field("name", &self.name)
            .field("package", &self.package)
            .field("timeout", &self.timeout)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl Change for HomeBrew {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Installs {} via Homebrew", self.package)
    }

    fn parent(&self) -> Option<Arc<dyn Change>> {
        self.parent.get()
    }

    fn locks(&self) -> Vec<TargetLock> {
        let package = self.package.as_str();
        let target = Target::new(package, "homebrew package", &[package]);
        vec![TargetLock::new(target, self.timeout)]
    }

    fn is_applied(&self) -> Result<bool> {
        Ok(self.runner.run(BREW, &["list", self.package.as_str()])?.success)
    }

    fn apply(&self, ctx: &ChangeContext) -> Result<ChangeResult> {
        if self.is_applied()? {
            return Ok(ChangeResult::success(format!(
                "{} is already installed",
                self.package
            )));
        }

        let output = self.brew(ctx, "install")?;
        if !output.success {
            return Ok(self.failure("install", &output));
        }
        Ok(ChangeResult::success(format!("Installed {}", self.package)))
    }

    fn rollback(&self, ctx: &ChangeContext) -> Result<ChangeResult> {
        if !self.is_applied()? {
            return Ok(ChangeResult::success(format!(
                "{} is not installed, nothing to remove",
                self.package
            )));
        }

        let output = self.brew(ctx, "uninstall")?;
        if !output.success {
            return Ok(self.failure("uninstall", &output));
        }
        Ok(ChangeResult::success(format!("Uninstalled {}", self.package)))
    }
}
