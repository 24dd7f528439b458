//! Orchestration engine - drives apply and rollback over a selection
//!
//! Every selected change goes through the same cycle, strictly one after
//! another:
//!
//! ```text
//! PENDING -> acquire locks -> { LOCK TIMEOUT | probe -> { SKIPPED | RUN -> result } }
//! ```
//!
//! A failure in one change is recorded and the batch moves on. Only input
//! and configuration errors abort a batch, and they are detected before any
//! change is probed.

use crate::change::{Change, ChangeContext};
use crate::error::{Error, Result};
use crate::lock::LockManager;
use crate::logging::ChangeLog;
use crate::registry::Registry;
use crate::target::TargetLock;
use crate::types::{
    BatchReport, ChangeResult, ChangeStatus, Operation, RunOptions, UnitOutcome, UnitReport,
};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Progress callback for batch runs
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called once validation passed, before the first change runs
    fn on_batch_start(&mut self, operation: Operation, count: usize);

    /// Called when a change is about to run (1-indexed)
    fn on_unit_start(&mut self, index: usize, count: usize, path: &str);

    /// Called when a change has an outcome
    fn on_unit_complete(&mut self, path: &str, outcome: &UnitOutcome);

    /// Called after the last change
    fn on_batch_complete(&mut self, report: &BatchReport);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _operation: Operation, _count: usize) {}
    fn on_unit_start(&mut self, _index: usize, _count: usize, _path: &str) {}
    fn on_unit_complete(&mut self, _path: &str, _outcome: &UnitOutcome) {}
    fn on_batch_complete(&mut self, _report: &BatchReport) {}
}

/// A selected change that passed validation
struct Planned {
    change: Arc<dyn Change>,
    path: String,
    locks: Vec<TargetLock>,
}

/// Runs batches of registered changes
pub struct ChangeEngine {
    registry: Registry,
    locks: Arc<LockManager>,
    log: Arc<dyn ChangeLog>,
}

impl ChangeEngine {
    /// Create an engine with its own lock manager
    pub fn new(registry: Registry, log: Arc<dyn ChangeLog>) -> Self {
        Self {
            registry,
            locks: Arc::new(LockManager::new()),
            log,
        }
    }

    /// Share a lock manager with other engines
    pub fn with_lock_manager(mut self, locks: Arc<LockManager>) -> Self {
        self.locks = locks;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Registered changes as (name, description), in registration order
    pub fn list(&self) -> Vec<(String, String)> {
        self.registry
            .iter()
            .map(|c| (c.name().to_string(), c.description()))
            .collect()
    }

    /// Apply the named changes
    pub fn apply<S: AsRef<str>>(&self, names: &[S], opts: &RunOptions) -> Result<BatchReport> {
        self.run(Operation::Apply, names, opts, &mut NoProgress)
    }

    /// Roll back the named changes
    ///
    /// This is a direct request over the given selection, not an undo of a
    /// previous apply: no apply history is kept.
    pub fn rollback<S: AsRef<str>>(&self, names: &[S], opts: &RunOptions) -> Result<BatchReport> {
        self.run(Operation::Rollback, names, opts, &mut NoProgress)
    }

    /// Run a batch with a progress callback
    ///
    /// Returns `Err` only for input and configuration errors, in which case
    /// no change has been probed, applied or rolled back.
    pub fn run<S, P>(
        &self,
        operation: Operation,
        names: &[S],
        opts: &RunOptions,
        progress: &mut P,
    ) -> Result<BatchReport>
    where
        S: AsRef<str>,
        P: ProgressCallback,
    {
        let planned = self.plan(names)?;
        let ctx = ChangeContext::new(opts.verbose);
        let total = planned.len();

        self.log
            .info(&format!("Starting {operation} of {total} change(s)"));
        progress.on_batch_start(operation, total);

        let mut report = BatchReport::new(operation);
        for (i, unit) in planned.into_iter().enumerate() {
            self.log.info(&format!(
                "Processing change {}/{total}: {}",
                i + 1,
                unit.path
            ));
            progress.on_unit_start(i + 1, total, &unit.path);

            let outcome = self.run_unit(operation, &unit, &ctx);

            progress.on_unit_complete(&unit.path, &outcome);
            report.units.push(UnitReport {
                name: unit.change.name().to_string(),
                path: unit.path,
                outcome,
            });
        }

        let summary = report.summary();
        self.log.info(&format!(
            "Finished {operation}: {} succeeded, {} failed, {} warned, {} skipped",
            summary.succeeded, summary.failed, summary.warned, summary.skipped
        ));
        progress.on_batch_complete(&report);

        Ok(report)
    }

    /// Resolve and validate a selection without touching any change state
    fn plan<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Planned>> {
        let selected = self.registry.resolve(names)?;

        let mut planned = Vec::with_capacity(selected.len());
        for change in selected {
            let path = change.path()?;
            let locks = change.locks();
            ensure_distinct_targets(&path, &locks)?;

            planned.push(Planned {
                change,
                path,
                locks,
            });
        }
        Ok(planned)
    }

    fn run_unit(&self, operation: Operation, unit: &Planned, ctx: &ChangeContext) -> UnitOutcome {
        let change = unit.change.as_ref();
        self.log.info_from(change, &format!("Starting {operation}"));

        // Held until the end of this function, released in reverse order.
        let _held = match self.locks.acquire_all(&unit.locks) {
            Ok(held) => held,
            Err(e) => {
                let result = ChangeResult::failed(format!("Lock acquisition failed: {e}"));
                self.log.error_from(change, &format!("Result: {result}"));
                return UnitOutcome::LockTimeout { result };
            }
        };

        let result = match operation {
            Operation::Apply => {
                match guarded(|| change.is_applied()) {
                    Ok(true) => {
                        self.log
                            .info_from(change, "Skipping apply (already applied)");
                        return UnitOutcome::Skipped;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        let result = ChangeResult::failed(format!(
                            "Could not determine current state: {e:#}"
                        ));
                        self.log.error_from(change, &format!("Result: {result}"));
                        return UnitOutcome::Completed { result };
                    }
                }
                self.log.info_from(change, "Executing apply");
                invoke(|| change.apply(ctx))
            }
            Operation::Rollback => {
                self.log.info_from(change, "Executing rollback");
                invoke(|| change.rollback(ctx))
            }
        };

        self.log_result(change, operation, &result);
        UnitOutcome::Completed { result }
    }

    fn log_result(&self, change: &dyn Change, operation: Operation, result: &ChangeResult) {
        let line = format!("Finished {operation}. Result: {result}");
        match result.status() {
            ChangeStatus::Success => self.log.info_from(change, &line),
            ChangeStatus::Warn => self.log.warn_from(change, &line),
            ChangeStatus::Failed => self.log.error_from(change, &line),
        }
    }
}

fn ensure_distinct_targets(path: &str, locks: &[TargetLock]) -> Result<()> {
    let mut seen = HashSet::with_capacity(locks.len());
    for lock in locks {
        if !seen.insert(lock.checksum()) {
            return Err(Error::DuplicateLock {
                change: path.to_string(),
                target: lock.target.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Run a change operation, turning errors and panics into a FAILED result
fn invoke<F>(operation: F) -> ChangeResult
where
    F: FnOnce() -> anyhow::Result<ChangeResult>,
{
    match guarded(operation) {
        Ok(result) => result,
        Err(e) => ChangeResult::failed(format!("{e:#}")),
    }
}

fn guarded<T, F>(operation: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(operation)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ParentLink;
    use crate::target::Target;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    type Events = Arc<Mutex<Vec<String>>>;

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Succeed,
        Error,
        Panic,
        Warn,
    }

    #[derive(Debug)]
    struct Probe {
        name: &'static str,
        applied: bool,
        probe_fails: bool,
        behavior: Behavior,
        targets: Vec<&'static str>,
        timeout: Duration,
        hold: Duration,
        events: Events,
        parent: ParentLink,
    }

    impl Probe {
        fn new(name: &'static str, events: &Events) -> Self {
            Self {
                name,
                applied: false,
                probe_fails: false,
                behavior: Behavior::Succeed,
                targets: vec![name],
                timeout: Duration::from_secs(5),
                hold: Duration::ZERO,
                events: Arc::clone(events),
                parent: ParentLink::new(),
            }
        }

        fn record(&self, what: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:{what}", self.name));
        }

        fn outcome(&self, what: &str) -> anyhow::Result<ChangeResult> {
            self.record(what);
            thread::sleep(self.hold);
            match self.behavior {
                Behavior::Succeed => Ok(ChangeResult::success(format!("{what} done"))),
                Behavior::Error => anyhow::bail!("disk on fire"),
                Behavior::Panic => panic!("unexpected condition"),
                Behavior::Warn => Ok(ChangeResult::warn(format!("{what} not supported"))),
            }
        }
    }

    impl Change for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> String {
            format!("probe {}", self.name)
        }

        fn parent(&self) -> Option<Arc<dyn Change>> {
            self.parent.get()
        }

        fn locks(&self) -> Vec<TargetLock> {
            self.targets
                .iter()
                .map(|t| TargetLock::new(Target::new(*t, "probe target", &[*t]), self.timeout))
                .collect()
        }

        fn is_applied(&self) -> anyhow::Result<bool> {
            self.record("probe");
            if self.probe_fails {
                anyhow::bail!("cannot read state");
            }
            Ok(self.applied)
        }

        fn apply(&self, _ctx: &ChangeContext) -> anyhow::Result<ChangeResult> {
            self.outcome("apply")
        }

        fn rollback(&self, _ctx: &ChangeContext) -> anyhow::Result<ChangeResult> {
            self.outcome("rollback")
        }
    }

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl ChangeLog for Capture {
        fn info(&self, message: &str) {
            self.0.lock().unwrap().push(format!("INFO {message}"));
        }

        fn warn(&self, message: &str) {
            self.0.lock().unwrap().push(format!("WARN {message}"));
        }

        fn error(&self, message: &str) {
            self.0.lock().unwrap().push(format!("ERROR {message}"));
        }
    }

    fn engine(changes: Vec<Probe>) -> ChangeEngine {
        let changes = changes
            .into_iter()
            .map(|c| Arc::new(c) as Arc<dyn Change>)
            .collect();
        ChangeEngine::new(Registry::new(changes).unwrap(), Arc::new(Capture::default()))
    }

    fn events() -> Events {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn recorded(events: &Events) -> Vec<String> {
        events.lock().unwrap().clone()
    }

    #[test]
    fn test_applied_change_is_skipped() {
        let ev = events();
        let mut probe = Probe::new("a", &ev);
        probe.applied = true;

        let report = engine(vec![probe])
            .apply(&["a"], &RunOptions::default())
            .unwrap();

        assert_eq!(recorded(&ev), ["a:probe"]);
        assert_eq!(report.units[0].outcome, UnitOutcome::Skipped);
        assert!(report.is_success());
        assert_eq!(report.summary().skipped, 1);
    }

    #[test]
    fn test_failure_is_isolated() {
        let ev = events();
        let mut a = Probe::new("a", &ev);
        a.behavior = Behavior::Error;
        let b = Probe::new("b", &ev);

        let report = engine(vec![a, b])
            .apply(&["a", "b"], &RunOptions::default())
            .unwrap();

        assert_eq!(recorded(&ev), ["a:probe", "a:apply", "b:probe", "b:apply"]);
        let a = report.unit("a").unwrap().outcome.result().unwrap();
        assert_eq!(a.status(), ChangeStatus::Failed);
        assert!(a.message().contains("disk on fire"));
        let b = report.unit("b").unwrap().outcome.result().unwrap();
        assert_eq!(b.status(), ChangeStatus::Success);
        assert!(!report.is_success());
    }

    #[test]
    fn test_panic_becomes_failed_result() {
        let ev = events();
        let mut a = Probe::new("a", &ev);
        a.behavior = Behavior::Panic;
        let b = Probe::new("b", &ev);

        let report = engine(vec![a, b])
            .apply(&["a", "b"], &RunOptions::default())
            .unwrap();

        let a = report.unit("a").unwrap().outcome.result().unwrap();
        assert!(a.is_failed());
        assert!(a.message().contains("unexpected condition"));
        assert!(recorded(&ev).contains(&"b:apply".to_string()));
    }

    #[test]
    fn test_probe_error_fails_without_apply() {
        let ev = events();
        let mut a = Probe::new("a", &ev);
        a.probe_fails = true;

        let report = engine(vec![a])
            .apply(&["a"], &RunOptions::default())
            .unwrap();

        assert_eq!(recorded(&ev), ["a:probe"]);
        assert_eq!(report.summary().failed, 1);
    }

    #[test]
    fn test_unknown_name_touches_nothing() {
        let ev = events();
        let engine = engine(vec![Probe::new("a", &ev), Probe::new("b", &ev)]);

        let err = engine
            .apply(&["a", "nope"], &RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownChange { ref name, .. } if name == "nope"));

        let err = engine
            .rollback(&["nope"], &RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownChange { .. }));
        assert!(recorded(&ev).is_empty());
    }

    #[test]
    fn test_duplicate_lock_target_is_configuration_error() {
        let ev = events();
        let a = Probe::new("a", &ev);
        let mut b = Probe::new("b", &ev);
        b.targets = vec!["shared", "shared"];

        let err = engine(vec![a, b])
            .apply(&["a", "b"], &RunOptions::default())
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateLock { ref target, .. } if target == "shared"));
        assert!(recorded(&ev).is_empty());
    }

    #[test]
    fn test_cyclic_parent_is_configuration_error() {
        let ev = events();
        let a = Arc::new(Probe::new("a", &ev));
        let b = Arc::new(Probe::new("b", &ev));
        let a_dyn: Arc<dyn Change> = a.clone();
        let b_dyn: Arc<dyn Change> = b.clone();
        a.parent.set(&b_dyn);
        b.parent.set(&a_dyn);

        let engine = ChangeEngine::new(
            Registry::new(vec![a_dyn, b_dyn]).unwrap(),
            Arc::new(Capture::default()),
        );
        let err = engine.apply(&["a"], &RunOptions::default()).unwrap_err();

        assert!(matches!(err, Error::CyclicParent { .. }));
        assert!(recorded(&ev).is_empty());
    }

    #[test]
    fn test_rollback_warn_keeps_batch_successful() {
        let ev = events();
        let mut a = Probe::new("a", &ev);
        a.behavior = Behavior::Warn;
        a.applied = true;

        let report = engine(vec![a])
            .rollback(&["a"], &RunOptions::default())
            .unwrap();

        // Rollback does not probe.
        assert_eq!(recorded(&ev), ["a:rollback"]);
        assert!(report.is_success());
        assert_eq!(report.warnings().count(), 1);
        assert_eq!(report.operation, Operation::Rollback);
    }

    #[test]
    fn test_locks_released_after_each_unit() {
        let ev = events();
        let mut a = Probe::new("a", &ev);
        a.behavior = Behavior::Error;
        let mut b = Probe::new("b", &ev);
        b.targets = vec!["a"];
        b.timeout = Duration::from_millis(10);

        let engine = engine(vec![a, b]);
        let report = engine.apply(&["a", "b"], &RunOptions::default()).unwrap();

        // b shares a's target; it only gets in because a released it.
        assert!(matches!(
            report.unit("b").unwrap().outcome,
            UnitOutcome::Completed { .. }
        ));
        let checksum = crate::target::checksum(&["a"]);
        assert!(!engine.lock_manager().is_held(&checksum));
    }

    #[test]
    fn test_lock_timeout_fails_only_that_unit() {
        let ev = events();
        let mut a = Probe::new("a", &ev);
        a.targets = vec!["busy"];
        a.timeout = Duration::from_millis(30);
        let b = Probe::new("b", &ev);

        let manager = Arc::new(LockManager::new());
        let engine = engine(vec![a, b]).with_lock_manager(Arc::clone(&manager));

        let busy = TargetLock::new(
            Target::new("busy", "held elsewhere", &["busy"]),
            Duration::from_secs(1),
        );
        let held = manager.acquire_all(std::slice::from_ref(&busy)).unwrap();
        let report = engine.apply(&["a", "b"], &RunOptions::default()).unwrap();
        drop(held);

        match &report.unit("a").unwrap().outcome {
            UnitOutcome::LockTimeout { result } => {
                assert!(result.is_failed());
                assert!(result.message().contains("timed out"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(recorded(&ev), ["b:probe", "b:apply"]);
        assert_eq!(report.summary().failed, 1);
        assert_eq!(report.summary().succeeded, 1);
    }

    #[test]
    fn test_same_checksum_serializes_across_engines() {
        let ev = events();
        let manager = Arc::new(LockManager::new());

        let mut first = Probe::new("first", &ev);
        first.targets = vec!["/etc/hosts"];
        first.hold = Duration::from_millis(150);
        let mut second = Probe::new("second", &ev);
        second.targets = vec!["/etc/hosts"];

        let first_engine = engine(vec![first]).with_lock_manager(Arc::clone(&manager));
        let second_engine = engine(vec![second]).with_lock_manager(Arc::clone(&manager));

        let hosts = crate::target::checksum(&["/etc/hosts"]);
        let runner = thread::spawn(move || first_engine.apply(&["first"], &RunOptions::default()));

        // Wait until the first engine owns the lock.
        while !manager.is_held(&hosts) {
            thread::yield_now();
        }
        let report = second_engine
            .apply(&["second"], &RunOptions::default())
            .unwrap();

        assert!(runner.join().unwrap().unwrap().is_success());
        assert!(report.is_success());
        let order = recorded(&ev);
        let first_apply = order.iter().position(|e| e == "first:apply").unwrap();
        let second_probe = order.iter().position(|e| e == "second:probe").unwrap();
        assert!(first_apply < second_probe);
    }

    #[test]
    fn test_contender_times_out_while_lock_is_held_too_long() {
        let ev = events();
        let manager = Arc::new(LockManager::new());

        let mut slow = Probe::new("slow", &ev);
        slow.targets = vec!["pkg"];
        slow.hold = Duration::from_millis(300);
        let mut impatient = Probe::new("impatient", &ev);
        impatient.targets = vec!["pkg"];
        impatient.timeout = Duration::from_millis(20);

        let slow_engine = engine(vec![slow]).with_lock_manager(Arc::clone(&manager));
        let impatient_engine = engine(vec![impatient]).with_lock_manager(Arc::clone(&manager));

        let pkg = crate::target::checksum(&["pkg"]);
        let runner = thread::spawn(move || slow_engine.apply(&["slow"], &RunOptions::default()));
        while !manager.is_held(&pkg) {
            thread::yield_now();
        }

        let report = impatient_engine
            .apply(&["impatient"], &RunOptions::default())
            .unwrap();
        assert!(runner.join().unwrap().unwrap().is_success());

        assert!(matches!(
            report.units[0].outcome,
            UnitOutcome::LockTimeout { .. }
        ));
        assert!(!recorded(&ev).iter().any(|e| e.starts_with("impatient:")));
    }

    #[test]
    fn test_source_qualified_logging_around_each_unit() {
        let ev = events();
        let log = Arc::new(Capture::default());
        let parent: Arc<dyn Change> = Arc::new(Probe::new("installer", &ev));
        let child = Probe::new("home_brew", &ev);
        child.parent.set(&parent);

        let engine = ChangeEngine::new(
            Registry::new(vec![Arc::new(child) as Arc<dyn Change>]).unwrap(),
            log.clone(),
        );
        engine.apply(&["home_brew"], &RunOptions::default()).unwrap();

        let lines = log.0.lock().unwrap();
        assert!(lines.contains(&"INFO [installer.home_brew] Starting apply".to_string()));
        assert!(
            lines
                .iter()
                .any(|l| l.starts_with("INFO [installer.home_brew] Finished apply. Result: [SUCCESS]"))
        );
        let report_path = lines.iter().any(|l| l.contains("Processing change 1/1: installer.home_brew"));
        assert!(report_path);
    }

    #[test]
    fn test_list_in_registration_order() {
        let ev = events();
        let engine = engine(vec![Probe::new("b", &ev), Probe::new("a", &ev)]);
        assert_eq!(
            engine.list(),
            [
                ("b".to_string(), "probe b".to_string()),
                ("a".to_string(), "probe a".to_string()),
            ]
        );
        assert!(recorded(&ev).is_empty());
    }

    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
    }

    impl ProgressCallback for Recorder {
        fn on_batch_start(&mut self, operation: Operation, count: usize) {
            self.seen.push(format!("start {operation} {count}"));
        }

        fn on_unit_start(&mut self, index: usize, count: usize, path: &str) {
            self.seen.push(format!("unit {index}/{count} {path}"));
        }

        fn on_unit_complete(&mut self, path: &str, outcome: &UnitOutcome) {
            self.seen.push(format!("done {path} {}", outcome.status()));
        }

        fn on_batch_complete(&mut self, report: &BatchReport) {
            self.seen.push(format!("end {}", report.units.len()));
        }
    }

    #[test]
    fn test_progress_callback_sequence() {
        let ev = events();
        let mut a = Probe::new("a", &ev);
        a.applied = true;
        let engine = engine(vec![a, Probe::new("b", &ev)]);

        let mut progress = Recorder::default();
        engine
            .run(
                Operation::Apply,
                &["a", "b"],
                &RunOptions { verbose: true },
                &mut progress,
            )
            .unwrap();

        assert_eq!(
            progress.seen,
            [
                "start apply 2",
                "unit 1/2 a",
                "done a SUCCESS",
                "unit 2/2 b",
                "done b SUCCESS",
                "end 2",
            ]
        );
    }
}
