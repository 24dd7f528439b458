//! Change trait for reversible, idempotent operations
//!
//! A change represents one operation against external state that can be
//! probed, applied and rolled back.

use crate::error::{Error, Result};
use crate::target::TargetLock;
use crate::types::ChangeResult;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Separator between names in a change path
pub const PATH_SEPARATOR: &str = ".";

/// Context passed to apply and rollback
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeContext {
    /// Whether to surface full external command output
    pub verbose: bool,
}

impl ChangeContext {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

/// Core trait for change units
///
/// Every change unit implements this trait, which provides:
/// - Identity (name, description, parent for path composition)
/// - The targets it must hold exclusively (locks)
/// - A read-only probe of current state (is_applied)
/// - The operation itself and its inverse (apply, rollback)
///
/// # Example
///
/// ```ignore
/// use changekit::{Change, ChangeContext, ChangeResult, Target, TargetLock};
///
/// #[derive(Debug)]
/// struct Marker {
///     path: String,
/// }
///
/// impl Change for Marker {
///     fn name(&self) -> &str {
///         "marker"
///     }
///
///     fn description(&self) -> String {
///         format!("Create marker file {}", self.path)
///     }
///
///     fn locks(&self) -> Vec<TargetLock> {
///         let target = Target::new(&self.path, "marker file", &[&self.path]);
///         vec![TargetLock::secs(target, 30)]
///     }
///
///     fn is_applied(&self) -> anyhow::Result<bool> {
///         Ok(std::path::Path::new(&self.path).exists())
///     }
///
///     fn apply(&self, _ctx: &ChangeContext) -> anyhow::Result<ChangeResult> {
///         std::fs::write(&self.path, "")?;
///         Ok(ChangeResult::success(format!("Created {}", self.path)))
///     }
///
///     fn rollback(&self, _ctx: &ChangeContext) -> anyhow::Result<ChangeResult> {
///         std::fs::remove_file(&self.path)?;
///         Ok(ChangeResult::success(format!("Removed {}", self.path)))
///     }
/// }
/// ```
pub trait Change: Send + Sync + fmt::Debug {
    /// Short identifier, stable for a given configuration
    ///
    /// Examples:
    /// - "home_brew" for a package install
    /// - "gitconfig" for a managed file
    fn name(&self) -> &str;

    /// Human-readable description of what this change does
    fn description(&self) -> String;

    /// The change this one is composed into, if any
    ///
    /// Used only for path composition and log prefixes. The parent is not
    /// owned, locked or otherwise managed through this link.
    fn parent(&self) -> Option<Arc<dyn Change>> {
        None
    }

    /// Locks that must be held before probing, applying or rolling back
    ///
    /// Declaring the same target twice is a configuration error.
    fn locks(&self) -> Vec<TargetLock>;

    /// Whether the external state already matches this change
    ///
    /// Must not modify anything and must be safe to call repeatedly.
    fn is_applied(&self) -> anyhow::Result<bool>;

    /// Apply the change
    ///
    /// This method should:
    /// 1. Tolerate being called when already applied (no-op or re-verify)
    /// 2. Report failures as a FAILED result or an `Err`
    /// 3. Never leave external state corrupted on reentry
    fn apply(&self, ctx: &ChangeContext) -> anyhow::Result<ChangeResult>;

    /// Revert the change
    ///
    /// Changes that cannot be reverted return a WARN result explaining why.
    fn rollback(&self, ctx: &ChangeContext) -> anyhow::Result<ChangeResult>;

    /// Dot-joined names from the root change down to this one
    ///
    /// Fails with [`Error::CyclicParent`] if the parent chain loops.
    ///
    /// A unit is identified by its address together with its name: a child
    /// embedded by value at the start of its parent shares the parent's
    /// address but not its name.
    fn path(&self) -> Result<String> {
        let mut names = vec![self.name().to_string()];
        let mut seen: Vec<(*const (), String)> =
            vec![((self as *const Self).cast::<()>(), self.name().to_string())];
        let mut next = self.parent();

        while let Some(parent) = next {
            let key = (Arc::as_ptr(&parent).cast::<()>(), parent.name().to_string());
            if seen.contains(&key) {
                return Err(Error::CyclicParent { name: key.1 });
            }
            names.push(key.1.clone());
            seen.push(key);
            next = parent.parent();
        }

        names.reverse();
        Ok(names.join(PATH_SEPARATOR))
    }
}

/// Non-owning link from a change to its parent
///
/// Holds a [`Weak`] reference so a composite change can own its children
/// while each child still knows who composed it.
#[derive(Default)]
pub struct ParentLink {
    inner: RwLock<Option<Weak<dyn Change>>>,
}

impl ParentLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link to a parent that may still be under construction
    ///
    /// Pass the `Weak` handed out by [`Arc::new_cyclic`].
    pub fn to(parent: Weak<dyn Change>) -> Self {
        Self {
            inner: RwLock::new(Some(parent)),
        }
    }

    pub fn set(&self, parent: &Arc<dyn Change>) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::downgrade(parent));
    }

    /// The parent, if one is linked and still alive
    pub fn get(&self) -> Option<Arc<dyn Change>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

impl fmt::Debug for ParentLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(parent) => write!(f, "ParentLink({})", parent.name()),
            None => write!(f, "ParentLink(None)"),
        }
    }
}
