//! Built-in CLI tools installed through Homebrew

use super::home_brew::HomeBrew;
use crate::runner::CommandRunner;
use anyhow::Result;
use changekit::{Change, ChangeContext, ChangeLog, ChangeResult, ParentLink, TargetLock};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub const CLAUDE_CODE: &str = "claude_code";
pub const K9S: &str = "k9s";

/// A named tool that delegates to an owned [`HomeBrew`] child
///
/// The child links back to this unit, so its log lines read
/// `[claude_code.home_brew] ...`.
#[derive(Debug)]
pub struct BrewTool {
    name: &'static str,
    description: &'static str,
    package: Arc<HomeBrew>,
}

impl BrewTool {
    pub fn new(
        name: &'static str,
        description: &'static str,
        package: HomeBrew,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let parent: Weak<dyn Change> = weak.clone();
            Self {
                name,
                description,
                package: Arc::new(package.with_parent(ParentLink::to(parent))),
            }
        })
    }
}

impl Change for BrewTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> String {
        self.description.to_string()
    }

    fn locks(&self) -> Vec<TargetLock> {
        self.package.locks()
    }

    fn is_applied(&self) -> Result<bool> {
        self.package.is_applied()
    }

    fn apply(&self, ctx: &ChangeContext) -> Result<ChangeResult> {
        self.package.apply(ctx)
    }

    fn rollback(&self, ctx: &ChangeContext) -> Result<ChangeResult> {
        self.package.rollback(ctx)
    }
}

/// Claude Code CLI
pub fn claude_code(
    runner: Arc<dyn CommandRunner>,
    log: Arc<dyn ChangeLog>,
    timeout: Duration,
) -> Arc<BrewTool> {
    BrewTool::new(
        CLAUDE_CODE,
        "Installs Claude Code CLI via Homebrew",
        HomeBrew::new("claude-code", runner, log).with_timeout(timeout),
    )
}

/// K9s Kubernetes CLI
pub fn k9s(
    runner: Arc<dyn CommandRunner>,
    log: Arc<dyn ChangeLog>,
    timeout: Duration,
) -> Arc<BrewTool> {
    BrewTool::new(
        K9S,
        "Installs K9S Kubernetes CLI via Homebrew",
        HomeBrew::new("k9s", runner, log).with_timeout(timeout),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::home_brew::tests::{Capture, FakeBrew};
    use changekit::{ChangeEngine, ChangeStatus, Registry, RunOptions};

    #[test]
    fn test_child_path_goes_through_tool() {
        let tool = claude_code(
            Arc::new(FakeBrew::default()),
            Arc::new(Capture::default()),
            Duration::from_secs(300),
        );

        assert_eq!(tool.path().unwrap(), "claude_code");
        assert_eq!(tool.package.path().unwrap(), "claude_code.home_brew");
        assert_eq!(tool.locks()[0].target.name(), "claude-code");
        assert_eq!(tool.description(), "Installs Claude Code CLI via Homebrew");
    }

    #[test]
    fn test_tool_shares_lock_with_plain_package() {
        let brew: Arc<FakeBrew> = Arc::new(FakeBrew::default());
        let log: Arc<Capture> = Arc::new(Capture::default());
        let tool = k9s(brew.clone(), log.clone(), Duration::from_secs(10));
        let plain = HomeBrew::new("k9s", brew, log);

        assert_eq!(tool.locks()[0].checksum(), plain.locks()[0].checksum());
        assert_eq!(tool.locks()[0].timeout_secs(), 10);
    }

    #[test]
    fn test_engine_logs_child_lines_with_full_path() {
        let brew = Arc::new(FakeBrew::default());
        let log = Arc::new(Capture::default());
        let tool: Arc<dyn Change> = k9s(brew.clone(), log.clone(), Duration::from_secs(1));
        let engine = ChangeEngine::new(Registry::new(vec![tool]).unwrap(), log.clone());

        let report = engine.apply(&["k9s"], &RunOptions::default()).unwrap();
        assert!(report.is_success());
        assert!(brew.installed.lock().unwrap().contains("k9s"));

        let lines = log.0.lock().unwrap();
        assert!(lines.contains(&"INFO [k9s] Starting apply".to_string()));
        assert!(lines.contains(&"INFO [k9s.home_brew] Running: brew install k9s".to_string()));

        drop(lines);
        let again = engine.apply(&["k9s"], &RunOptions::default()).unwrap();
        assert_eq!(again.units[0].outcome.status(), ChangeStatus::Success);
        let installs = brew.calls().iter().filter(|c| c.starts_with("install")).count();
        assert_eq!(installs, 1);
    }
}
