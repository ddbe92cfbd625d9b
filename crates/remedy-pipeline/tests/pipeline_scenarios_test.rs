use async_trait::async_trait;
use remedy_core::{
    CorrectnessOutcome, HotspotKind, RemedyError, Result, RollbackPolicy, Settings, Stage,
};
use remedy_pipeline::{CorrectnessRunner, Notification, Notifier, TimingProbe, VerificationPipeline};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const SLOW_FIB: &str = r#"import os, time
from functools import lru_cache

# A deliberately slow Fibonacci implementation (recursive)
def fib(n: int) -> int:
    if n <= 1:
        return n
    return fib(n-1) + fib(n-2)

# Return value type: dict
def busy_cpu_task():
    n = int(os.getenv("FIB_N", "35"))  # large n = high CPU
    start = time.perf_counter()
    value = fib(n)
    elapsed = (time.perf_counter() - start) * 1000
    return {"elapsed_ms": elapsed, "result": value}
"#;

const TREE_WALK: &str = r#"import json


def depth(node):
    if not node:
        return 0
    return 1 + max(depth(child) for child in node.get("children", []))
"#;

const NO_RECURSION: &str = "def busy_cpu_task():\n    return {\"elapsed_ms\": 1.0, \"result\": sum(range(10))}\n";

struct ScriptedProbe {
    readings: Mutex<VecDeque<Result<f64>>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    fn new(readings: Vec<Result<f64>>) -> Self {
        Self {
            readings: Mutex::new(readings.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimingProbe for ScriptedProbe {
    async fn measure(&self) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.readings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RemedyError::Probe("no more readings".into())))
    }
}

struct CannedRunner {
    outcome: Option<CorrectnessOutcome>,
    targets: Mutex<Vec<PathBuf>>,
}

impl CannedRunner {
    fn passing() -> Self {
        Self::with(Some(CorrectnessOutcome {
            success: true,
            output: "3 passed in 0.12s\n".into(),
        }))
    }

    fn failing() -> Self {
        Self::with(Some(CorrectnessOutcome {
            success: false,
            output: "1 failed, 2 passed\n".into(),
        }))
    }

    fn crashing() -> Self {
        Self::with(None)
    }

    fn with(outcome: Option<CorrectnessOutcome>) -> Self {
        Self {
            outcome,
            targets: Mutex::new(Vec::new()),
        }
    }

    fn runs(&self) -> usize {
        self.targets.lock().unwrap().len()
    }
}

#[async_trait]
impl CorrectnessRunner for CannedRunner {
    async fn run(&self, target: &Path) -> Result<CorrectnessOutcome> {
        self.targets.lock().unwrap().push(target.to_path_buf());
        self.outcome
            .clone()
            .ok_or_else(|| RemedyError::Runner("failed to run python: not found".into()))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            Err(RemedyError::Notify("SMTP relay refused".into()))
        } else {
            Ok(())
        }
    }
}

struct Harness {
    _dir: TempDir,
    settings: Settings,
    probe: Arc<ScriptedProbe>,
    runner: Arc<CannedRunner>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new(source: &str, readings: Vec<Result<f64>>, runner: CannedRunner) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let service = dir.path().join("service");
        std::fs::create_dir_all(&service).unwrap();
        std::fs::write(service.join("cpu_task.py"), source).unwrap();

        let mut settings = Settings::default();
        settings.target.source_path = service.join("cpu_task.py");
        settings.target.test_target = dir.path().join("tests").join("test_cpu_task.py");
        settings.artifacts.dir = dir.path().join("agent").join("knowledge");
        settings.pipeline.settle_delay_ms = 0;

        Self {
            _dir: dir,
            settings,
            probe: Arc::new(ScriptedProbe::new(readings)),
            runner: Arc::new(runner),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    fn pipeline(&self) -> VerificationPipeline {
        VerificationPipeline::new(
            self.settings.clone(),
            self.probe.clone(),
            self.runner.clone(),
            self.notifier.clone(),
        )
    }

    fn source(&self) -> String {
        std::fs::read_to_string(&self.settings.target.source_path).unwrap()
    }

    fn artifacts(&self) -> Vec<String> {
        match std::fs::read_dir(&self.settings.artifacts.dir) {
            Ok(entries) => {
                let mut names: Vec<String> = entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }
}

fn ms(values: &[f64]) -> Vec<Result<f64>> {
    values.iter().copied().map(Ok).collect()
}

#[tokio::test]
async fn test_slow_fibonacci_is_rewritten_and_verified() {
    let h = Harness::new(SLOW_FIB, ms(&[5000.0, 4.2]), CannedRunner::passing());
    let result = h.pipeline().run(Stage::Test).await.unwrap();

    assert!(result.changed);
    assert_eq!(result.before_ms, 5000.0);
    assert_eq!(result.after_ms, 4.2);
    assert!(result.improved());
    assert_eq!(result.correctness, Some(true));
    assert!(!result.reverted);

    let hotspot = result.hotspot.as_ref().unwrap();
    assert_eq!(hotspot.kind, HotspotKind::DoublingRecursion);
    assert_eq!(hotspot.function_name, "fib");

    let patched = h.source();
    assert!(patched.contains("def fib(n: int) -> int:\n"));
    assert!(patched.contains("for _ in range(2, n + 1):"));
    assert!(!patched.contains("fib(n-1) + fib(n-2)"));
    assert!(patched.ends_with("return {\"elapsed_ms\": elapsed, \"result\": value}\n"));

    let diff = std::fs::read_to_string(result.diff_path.as_ref().unwrap()).unwrap();
    assert!(diff.starts_with("--- cpu_task.py (before)\n+++ cpu_task.py (after)\n"));
    assert!(diff.contains("-    return fib(n-1) + fib(n-2)"));

    let report = std::fs::read_to_string(result.report_path.as_ref().unwrap()).unwrap();
    assert!(report.contains("Before fix: 5000.0 ms"));
    assert!(report.contains("After fix: 4.2 ms"));
    assert!(report.contains("✅ Improvement detected"));

    let log = std::fs::read_to_string(result.log_path.as_ref().unwrap()).unwrap();
    assert_eq!(log, "3 passed in 0.12s\n");

    assert_eq!(
        h.runner.targets.lock().unwrap().as_slice(),
        &[h.settings.target.test_target.clone()]
    );
    assert!(h.notifier.sent.lock().unwrap().is_empty());

    let names = h.artifacts();
    assert_eq!(names.len(), 3);
    assert!(names.iter().any(|n| n.starts_with("cpu-fix-test-") && n.ends_with(".patch")));
    assert!(names.iter().any(|n| n.starts_with("cpu-report-test-") && n.ends_with(".md")));
    assert!(names.iter().any(|n| n.starts_with("pytest-test-") && n.ends_with(".log")));
}

#[tokio::test]
async fn test_fast_service_exits_early_in_test_stage() {
    let h = Harness::new(SLOW_FIB, ms(&[200.0]), CannedRunner::passing());
    let result = h.pipeline().run(Stage::Test).await.unwrap();

    assert!(!result.changed);
    assert_eq!(result.before_ms, 200.0);
    assert_eq!(result.after_ms, 200.0);
    assert!(result.report_path.is_none());
    assert!(result.hotspot.is_none());
    assert_eq!(h.probe.calls(), 1);
    assert_eq!(h.runner.runs(), 0);
    assert_eq!(h.source(), SLOW_FIB);
    assert!(h.artifacts().is_empty());
}

#[tokio::test]
async fn test_threshold_is_inclusive() {
    let h = Harness::new(SLOW_FIB, ms(&[1500.0]), CannedRunner::passing());
    let result = h.pipeline().run(Stage::Test).await.unwrap();
    assert!(!result.changed);
    assert_eq!(h.source(), SLOW_FIB);
}

#[tokio::test]
async fn test_source_without_recursion_only_reports() {
    let h = Harness::new(NO_RECURSION, ms(&[5000.0]), CannedRunner::passing());
    let result = h.pipeline().run(Stage::Test).await.unwrap();

    assert!(!result.changed);
    assert!(result.diff_path.is_none());
    assert!(result.hotspot.is_none());
    assert_eq!(result.after_ms, result.before_ms);
    assert_eq!(h.source(), NO_RECURSION);
    assert_eq!(h.runner.runs(), 0);

    let report = std::fs::read_to_string(result.report_path.unwrap()).unwrap();
    assert!(report.contains("No self-recursive top-level function found"));
    assert!(report.contains("No change applied"));
    assert_eq!(h.artifacts().len(), 1);
}

#[tokio::test]
async fn test_generic_recursion_is_memoized_once() {
    let h = Harness::new(
        TREE_WALK,
        ms(&[5000.0, 3000.0, 3000.0, 3000.0]),
        CannedRunner::passing(),
    );
    let pipeline = h.pipeline();

    let first = pipeline.run(Stage::Test).await.unwrap();
    assert!(first.changed);
    assert_eq!(first.hotspot.as_ref().unwrap().kind, HotspotKind::GenericRecursion);
    let once = h.source();
    assert!(once.contains("@lru_cache(maxsize=None)\ndef depth(node):"));
    assert_eq!(once.matches("from functools import lru_cache").count(), 1);
    // the import lands after the existing import block
    assert!(once.starts_with("import json\nfrom functools import lru_cache\n"));

    let second = pipeline.run(Stage::Test).await.unwrap();
    assert!(!second.changed);
    assert!(second.diff_path.is_none());
    assert_eq!(h.source(), once);
    assert_eq!(once.matches("@lru_cache(maxsize=None)").count(), 1);
}

#[tokio::test]
async fn test_prod_stage_ignores_threshold_and_notifies() {
    let h = Harness::new(SLOW_FIB, ms(&[200.0, 3.0]), CannedRunner::passing());
    let result = h.pipeline().run(Stage::Prod).await.unwrap();

    assert!(result.changed);
    assert_eq!(result.correctness, None);
    assert!(result.log_path.is_none());
    assert_eq!(h.runner.runs(), 0);

    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "oncall@example.com");
    assert!(sent[0].subject.contains("prod"));
    assert!(sent[0].attachments.contains(result.diff_path.as_ref().unwrap()));
    assert!(sent[0].attachments.contains(result.report_path.as_ref().unwrap()));

    let names = h.artifacts();
    assert!(names.iter().all(|n| n.contains("-prod-")));
}

#[tokio::test]
async fn test_prod_stage_without_change_does_not_notify() {
    let h = Harness::new(NO_RECURSION, ms(&[5000.0]), CannedRunner::passing());
    let result = h.pipeline().run(Stage::Prod).await.unwrap();
    assert!(!result.changed);
    assert!(h.notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_the_run() {
    let mut h = Harness::new(SLOW_FIB, ms(&[5000.0, 3.0]), CannedRunner::passing());
    h.notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..RecordingNotifier::default()
    });

    let result = h.pipeline().run(Stage::Prod).await.unwrap();
    assert!(result.changed);
    assert!(result.report_path.is_some());
    assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_disabled_notifications_are_skipped() {
    let mut h = Harness::new(SLOW_FIB, ms(&[5000.0, 3.0]), CannedRunner::passing());
    h.settings.notify.enabled = false;
    let result = h.pipeline().run(Stage::Prod).await.unwrap();
    assert!(result.changed);
    assert!(h.notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_probe_failure_uses_sentinel() {
    let h = Harness::new(
        SLOW_FIB,
        vec![Err(RemedyError::Probe("connection refused".into()))],
        CannedRunner::passing(),
    );
    let result = h.pipeline().run(Stage::Test).await.unwrap();

    // the sentinel is above the threshold, so the run proceeds
    assert_eq!(result.before_ms, 9999.0);
    assert!(result.changed);
    // the probe is out of readings for the second measurement too
    assert_eq!(result.after_ms, 9999.0);
    assert!(!result.improved());

    let report = std::fs::read_to_string(result.report_path.unwrap()).unwrap();
    assert!(report.contains("❌ No improvement"));
}

#[tokio::test]
async fn test_failing_tests_keep_patch_by_default() {
    let h = Harness::new(SLOW_FIB, ms(&[5000.0, 4.0]), CannedRunner::failing());
    let result = h.pipeline().run(Stage::Test).await.unwrap();

    assert!(result.changed);
    assert_eq!(result.correctness, Some(false));
    assert!(!result.reverted);
    assert_ne!(h.source(), SLOW_FIB);

    let log = std::fs::read_to_string(result.log_path.unwrap()).unwrap();
    assert!(log.contains("1 failed"));
}

#[tokio::test]
async fn test_failing_tests_revert_when_configured() {
    let mut h = Harness::new(SLOW_FIB, ms(&[5000.0, 5100.0]), CannedRunner::failing());
    h.settings.pipeline.rollback = RollbackPolicy::Revert;
    let result = h.pipeline().run(Stage::Test).await.unwrap();

    assert!(result.changed);
    assert!(result.reverted);
    assert_eq!(h.source(), SLOW_FIB);
    // the attempted patch is still recorded
    assert!(result.diff_path.is_some());

    let report = std::fs::read_to_string(result.report_path.unwrap()).unwrap();
    assert!(report.contains("original source restored"));
}

#[tokio::test]
async fn test_runner_crash_is_a_failed_check() {
    let h = Harness::new(SLOW_FIB, ms(&[5000.0, 4.0]), CannedRunner::crashing());
    let result = h.pipeline().run(Stage::Test).await.unwrap();

    assert_eq!(result.correctness, Some(false));
    let log = std::fs::read_to_string(result.log_path.unwrap()).unwrap();
    assert!(log.contains("failed to run python"));
}

#[tokio::test]
async fn test_malformed_source_aborts_without_writing() {
    let broken = "def fib(n:\n    return fib(n-1) +\n";
    let h = Harness::new(broken, ms(&[5000.0]), CannedRunner::passing());
    let err = h.pipeline().run(Stage::Test).await.unwrap_err();

    assert!(matches!(err, RemedyError::Parse(_)));
    assert!(err.is_fatal());
    assert_eq!(h.source(), broken);
    assert!(h.artifacts().is_empty());
}

#[tokio::test]
async fn test_missing_source_is_an_io_error() {
    let h = Harness::new(SLOW_FIB, ms(&[5000.0]), CannedRunner::passing());
    std::fs::remove_file(&h.settings.target.source_path).unwrap();
    let err = h.pipeline().run(Stage::Test).await.unwrap_err();
    assert!(matches!(err, RemedyError::Io(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_runs_on_one_file_are_serialized() {
    let h = Harness::new(
        TREE_WALK,
        ms(&[5000.0, 5000.0, 5000.0, 5000.0]),
        CannedRunner::passing(),
    );
    let a = h.pipeline();
    let b = h.pipeline();

    let (first, second) = tokio::join!(a.run(Stage::Test), b.run(Stage::Test));
    let (first, second) = (first.unwrap(), second.unwrap());

    // exactly one run applies the memoization
    assert!(first.changed ^ second.changed);
    let patched = h.source();
    assert_eq!(patched.matches("@lru_cache(maxsize=None)").count(), 1);
    assert_eq!(patched.matches("from functools import lru_cache").count(), 1);
}

/// Occupies the artifacts directory path with a plain file while the
/// correctness check runs.
struct BlockingRunner {
    artifacts_dir: PathBuf,
}

#[async_trait]
impl CorrectnessRunner for BlockingRunner {
    async fn run(&self, _target: &Path) -> Result<CorrectnessOutcome> {
        std::fs::write(&self.artifacts_dir, "not a directory").unwrap();
        Ok(CorrectnessOutcome {
            success: true,
            output: "3 passed\n".into(),
        })
    }
}

/// Clears the blocking file on the second measurement, after the log write.
struct UnblockingProbe {
    artifacts_dir: PathBuf,
    calls: AtomicUsize,
}

#[async_trait]
impl TimingProbe for UnblockingProbe {
    async fn measure(&self) -> Result<f64> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(5000.0)
        } else {
            std::fs::remove_file(&self.artifacts_dir).unwrap();
            Ok(4.0)
        }
    }
}

#[tokio::test]
async fn test_log_write_failure_still_reports() {
    let h = Harness::new(SLOW_FIB, Vec::new(), CannedRunner::passing());
    let artifacts_dir = h.settings.artifacts.dir.clone();
    std::fs::create_dir_all(artifacts_dir.parent().unwrap()).unwrap();

    let pipeline = VerificationPipeline::new(
        h.settings.clone(),
        Arc::new(UnblockingProbe {
            artifacts_dir: artifacts_dir.clone(),
            calls: AtomicUsize::new(0),
        }),
        Arc::new(BlockingRunner {
            artifacts_dir: artifacts_dir.clone(),
        }),
        h.notifier.clone(),
    );
    let result = pipeline.run(Stage::Test).await.unwrap();

    assert!(result.changed);
    assert_eq!(result.correctness, Some(true));
    assert!(result.log_path.is_none());
    assert!(result.diff_path.is_some());
    let report = std::fs::read_to_string(result.report_path.unwrap()).unwrap();
    assert!(report.contains("Rewrote `fib()` as an iterative loop"));
}
