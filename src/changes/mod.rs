//! Concrete change units and the registry they are wired into

pub mod brew_tool;
pub mod file;
pub mod home_brew;

use crate::config::DevboxConfig;
use crate::runner::CommandRunner;
use anyhow::Result;
use changekit::{Change, ChangeLog, Registry};
use file::CreateOrReplaceFile;
use home_brew::HomeBrew;
use std::sync::Arc;

/// Build the registry: built-in tools first, then configured files and packages
pub fn build_registry(
    config: &DevboxConfig,
    runner: &Arc<dyn CommandRunner>,
    log: &Arc<dyn ChangeLog>,
) -> Result<Registry> {
    let package_timeout = config.defaults.package_lock_timeout();
    let mut changes: Vec<Arc<dyn Change>> = vec![
        brew_tool::claude_code(runner.clone(), log.clone(), package_timeout),
        brew_tool::k9s(runner.clone(), log.clone(), package_timeout),
    ];

    for entry in &config.files {
        let file = CreateOrReplaceFile::new(
            entry.name.as_str(),
            entry.expanded_path()?,
            entry.contents.as_str(),
            log.clone(),
        )?
        .with_timeout(config.defaults.file_lock_timeout());
        changes.push(Arc::new(file));
    }

    for entry in &config.packages {
        let package = HomeBrew::new(entry.package.as_str(), runner.clone(), log.clone())
            .named(entry.unit_name())
            .with_timeout(package_timeout);
        changes.push(Arc::new(package));
    }

    log::debug!("registered {} change(s)", changes.len());
    Ok(Registry::new(changes)?)
}

/// Whether a change is one of the built-in tools
pub fn is_builtin(name: &str) -> bool {
    matches!(name, brew_tool::CLAUDE_CODE | brew_tool::K9S)
}
