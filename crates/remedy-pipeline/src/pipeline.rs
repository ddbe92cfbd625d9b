// ABOUTME: Measure, detect, patch, persist, verify and report for one target source
// ABOUTME: Probe, runner and notifier faults are absorbed; parse and synthesis faults abort the run
use crate::artifacts::{unified_diff, ArtifactStore};
use crate::lock;
use crate::notify::{LogNotifier, Notification, Notifier, WebhookNotifier};
use crate::probe::{HttpTimingProbe, TimingProbe};
use crate::report::RunReport;
use crate::runner::{CommandRunner, CorrectnessRunner};
use crate::source::SourceFile;
use chrono::Utc;
use remedy_core::{
    CorrectnessOutcome, Hotspot, Result, RollbackPolicy, RunResult, Settings, Stage,
};
use remedy_parser::{HotspotDetector, PatchSynthesizer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct VerificationPipeline {
    settings: Settings,
    source: SourceFile,
    detector: HotspotDetector,
    synthesizer: PatchSynthesizer,
    artifacts: ArtifactStore,
    probe: Arc<dyn TimingProbe>,
    runner: Arc<dyn CorrectnessRunner>,
    notifier: Arc<dyn Notifier>,
}

impl VerificationPipeline {
    pub fn new(
        settings: Settings,
        probe: Arc<dyn TimingProbe>,
        runner: Arc<dyn CorrectnessRunner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source: SourceFile::new(&settings.target.source_path),
            artifacts: ArtifactStore::new(&settings.artifacts.dir),
            detector: HotspotDetector::new(),
            synthesizer: PatchSynthesizer::new(),
            settings,
            probe,
            runner,
            notifier,
        }
    }

    /// Wire the HTTP probe, command runner and webhook (or log) notifier
    /// described by `settings`.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let probe = Arc::new(HttpTimingProbe::new(&settings.probe)?);
        let runner = Arc::new(CommandRunner::from_config(&settings.runner));
        let notifier: Arc<dyn Notifier> = match &settings.notify.endpoint {
            Some(endpoint) => Arc::new(WebhookNotifier::new(
                endpoint.clone(),
                &settings.notify,
                settings.secrets.notify_token.clone(),
            )?),
            None => Arc::new(LogNotifier),
        };
        Ok(Self::new(settings, probe, runner, notifier))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn source_path(&self) -> &Path {
        self.source.path()
    }

    #[instrument(skip(self), fields(source = %self.source.path().display()))]
    pub async fn run(&self, stage: Stage) -> Result<RunResult> {
        let _guard = lock::acquire(self.source.path()).await;
        info!(%stage, "auto-resolution run started");

        let before_ms = self.measure().await;
        let threshold_ms = self.settings.pipeline.threshold_ms;
        if stage.is_test() && before_ms <= threshold_ms {
            info!(before_ms, threshold_ms, "latency within threshold; nothing to do");
            return Ok(RunResult::unchanged(stage, before_ms));
        }

        let original = self.source.read().await?;
        let hotspot = match self.detector.detect(&original)? {
            Some(hotspot) => hotspot,
            None => return self.report_without_hotspot(stage, before_ms).await,
        };
        info!(
            function = %hotspot.function_name,
            kind = %hotspot.kind,
            line = hotspot.line,
            "hotspot selected"
        );

        let synthesis = self.synthesizer.synthesize(&original, &hotspot)?;
        let changed = synthesis.changed();
        if changed {
            self.source.write_atomic(&synthesis.text).await?;
            info!(function = %hotspot.function_name, "patch persisted");
            self.settle().await;
        } else {
            info!(function = %hotspot.function_name, "already in rewritten form; source untouched");
        }

        let (correctness, log_path) = if stage.is_test() {
            let outcome = self.check_correctness().await;
            let log_path = match self.artifacts.write_log(stage, &outcome.output).await {
                Ok(path) => Some(path),
                Err(e) => {
                    // the source may already be patched; keep going so the report is written
                    warn!(error = %e, "failed to write correctness log");
                    None
                }
            };
            (Some(outcome.success), log_path)
        } else {
            (None, None)
        };

        let mut reverted = false;
        if changed && correctness == Some(false) {
            match self.settings.pipeline.rollback {
                RollbackPolicy::Revert => {
                    warn!(function = %hotspot.function_name, "correctness check failed; restoring original source");
                    self.source.write_atomic(&original).await?;
                    reverted = true;
                    self.settle().await;
                }
                RollbackPolicy::Keep => {
                    warn!(function = %hotspot.function_name, "correctness check failed; patch left in place");
                }
            }
        }

        let after_ms = self.measure().await;

        let diff_path = if changed {
            let diff = unified_diff(&original, &synthesis.text, &self.source.file_name());
            Some(self.artifacts.write_diff(stage, &diff).await?)
        } else {
            None
        };

        let report = RunReport {
            stage,
            generated_at: Utc::now(),
            source: self.source.path().to_path_buf(),
            hotspot: Some(hotspot.clone()),
            before_ms,
            after_ms,
            threshold_ms,
            changed,
            correctness,
            reverted,
            diff_name: diff_path.as_deref().and_then(artifact_name),
            log_name: log_path.as_deref().and_then(artifact_name),
        };
        let report_path = self.artifacts.write_report(stage, &report.render()).await?;

        if !stage.is_test() && changed {
            self.notify(&report, &report_path, diff_path.as_deref()).await;
        }

        let result = RunResult {
            stage,
            changed,
            before_ms,
            after_ms,
            correctness,
            hotspot: Some(hotspot),
            diff_path,
            report_path: Some(report_path),
            log_path,
            reverted,
        };
        info!(
            %stage,
            changed,
            before_ms,
            after_ms,
            improved = result.improved(),
            "auto-resolution run finished"
        );
        Ok(result)
    }

    async fn report_without_hotspot(&self, stage: Stage, before_ms: f64) -> Result<RunResult> {
        info!("no self-recursive function found; reporting only");
        let report = RunReport {
            stage,
            generated_at: Utc::now(),
            source: self.source.path().to_path_buf(),
            hotspot: None::<Hotspot>,
            before_ms,
            after_ms: before_ms,
            threshold_ms: self.settings.pipeline.threshold_ms,
            changed: false,
            correctness: None,
            reverted: false,
            diff_name: None,
            log_name: None,
        };
        let report_path = self.artifacts.write_report(stage, &report.render()).await?;
        Ok(RunResult {
            report_path: Some(report_path),
            ..RunResult::unchanged(stage, before_ms)
        })
    }

    async fn measure(&self) -> f64 {
        let sentinel = self.settings.probe.sentinel_ms;
        match self.probe.measure().await {
            Ok(elapsed) if elapsed.is_finite() => {
                debug!(elapsed_ms = elapsed, "probe measurement");
                elapsed
            }
            Ok(elapsed) => {
                warn!(elapsed_ms = elapsed, sentinel_ms = sentinel, "probe returned a non-finite value");
                sentinel
            }
            Err(e) => {
                warn!(error = %e, sentinel_ms = sentinel, "probe failed; using sentinel");
                sentinel
            }
        }
    }

    async fn settle(&self) {
        let delay = self.settings.pipeline.settle_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "waiting for the service to pick up the change");
            tokio::time::sleep(delay).await;
        }
    }

    async fn check_correctness(&self) -> CorrectnessOutcome {
        match self.runner.run(&self.settings.target.test_target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "correctness runner failed");
                CorrectnessOutcome::failed(e.to_string())
            }
        }
    }

    async fn notify(&self, report: &RunReport, report_path: &Path, diff_path: Option<&Path>) {
        let config = &self.settings.notify;
        if !config.enabled {
            debug!("notifications disabled");
            return;
        }

        let mut attachments: Vec<PathBuf> = vec![report_path.to_path_buf()];
        attachments.extend(diff_path.map(Path::to_path_buf));
        let notification = Notification {
            recipient: config.recipient.clone(),
            subject: report.headline(),
            body: report.render(),
            attachments,
        };

        match tokio::time::timeout(config.timeout(), self.notifier.notify(&notification)).await {
            Ok(Ok(())) => info!(recipient = %config.recipient, "prod report sent"),
            Ok(Err(e)) => warn!(error = %e, "notification failed"),
            Err(_) => warn!(timeout_secs = config.timeout_secs, "notification timed out"),
        }
    }
}

fn artifact_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}
