// ABOUTME: Markdown report describing one auto-resolution run
use chrono::{DateTime, Utc};
use remedy_core::{Hotspot, HotspotKind, Stage};
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stage: Stage,
    pub generated_at: DateTime<Utc>,
    pub source: PathBuf,
    pub hotspot: Option<Hotspot>,
    pub before_ms: f64,
    pub after_ms: f64,
    pub threshold_ms: f64,
    pub changed: bool,
    pub correctness: Option<bool>,
    pub reverted: bool,
    pub diff_name: Option<String>,
    pub log_name: Option<String>,
}

impl RunReport {
    pub fn improved(&self) -> bool {
        self.after_ms < self.before_ms
    }

    /// One-line verdict, also used as the notification subject.
    pub fn headline(&self) -> String {
        let subject = match &self.hotspot {
            Some(hotspot) => format!("{}()", hotspot.function_name),
            None => "no recursive hotspot".to_string(),
        };
        let verdict = if self.improved() {
            "improved"
        } else {
            "no improvement"
        };
        format!(
            "[remedy] {} stage: {} {} ({:.1} ms -> {:.1} ms)",
            self.stage, subject, verdict, self.before_ms, self.after_ms
        )
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "# CPU Auto-Resolution Report: {}",
            self.stage.as_str().to_uppercase()
        );
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "- Generated: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(out, "- Source: `{}`", self.source.display());
        let _ = writeln!(out);

        let _ = writeln!(out, "## Hotspot");
        let _ = writeln!(out);
        match &self.hotspot {
            Some(hotspot) => {
                let _ = writeln!(
                    out,
                    "- `{}()` at line {}: {}",
                    hotspot.function_name,
                    hotspot.line,
                    describe_kind(hotspot)
                );
            }
            None => {
                let _ = writeln!(out, "- No self-recursive top-level function found");
            }
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "## Measurements");
        let _ = writeln!(out);
        let _ = writeln!(out, "- Before fix: {:.1} ms", self.before_ms);
        let _ = writeln!(out, "- After fix: {:.1} ms", self.after_ms);
        if self.stage.is_test() {
            let _ = writeln!(out, "- Threshold: {:.1} ms", self.threshold_ms);
        } else {
            let _ = writeln!(
                out,
                "- Threshold: {:.1} ms (not applied in the prod stage)",
                self.threshold_ms
            );
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "## Action");
        let _ = writeln!(out);
        let _ = writeln!(out, "- {}", self.action());
        if let Some(diff) = &self.diff_name {
            let _ = writeln!(out, "- Diff: `{}`", diff);
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "## Correctness");
        let _ = writeln!(out);
        match self.correctness {
            Some(true) => {
                let _ = writeln!(out, "- Tests passed");
            }
            Some(false) if self.reverted => {
                let _ = writeln!(out, "- Tests failed; original source restored");
            }
            Some(false) => {
                let _ = writeln!(out, "- Tests failed; patch left in place");
            }
            None => {
                let _ = writeln!(out, "- Not run for this stage");
            }
        }
        if let Some(log) = &self.log_name {
            let _ = writeln!(out, "- Log: `{}`", log);
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "## Result");
        let _ = writeln!(out);
        if self.improved() {
            let _ = writeln!(out, "✅ Improvement detected");
        } else {
            let _ = writeln!(out, "❌ No improvement");
        }
        out
    }

    fn action(&self) -> String {
        match (&self.hotspot, self.changed) {
            (None, _) => "No change applied".to_string(),
            (Some(hotspot), false) => format!(
                "No change applied: `{}()` is already in its rewritten form",
                hotspot.function_name
            ),
            (Some(hotspot), true) => match hotspot.kind {
                HotspotKind::DoublingRecursion => {
                    format!("Rewrote `{}()` as an iterative loop", hotspot.function_name)
                }
                HotspotKind::GenericRecursion => format!(
                    "Memoized `{}()` with `@lru_cache(maxsize=None)`",
                    hotspot.function_name
                ),
            },
        }
    }
}

fn describe_kind(hotspot: &Hotspot) -> String {
    match (&hotspot.kind, &hotspot.parameter_name) {
        (HotspotKind::DoublingRecursion, Some(param)) => format!(
            "doubling recursion on `{}` (calls itself with `{p} - 1` and `{p} - 2`)",
            param,
            p = param
        ),
        _ => "generic self-recursion".to_string(),
    }
}
