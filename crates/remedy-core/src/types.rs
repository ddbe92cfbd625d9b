use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Half-open byte range `[start_byte, end_byte)` into a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
}

impl Span {
    pub fn new(start_byte: usize, end_byte: usize) -> Self {
        Self {
            start_byte,
            end_byte,
        }
    }

    pub fn len(&self) -> usize {
        self.end_byte.saturating_sub(self.start_byte)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, byte: usize) -> bool {
        byte >= self.start_byte && byte < self.end_byte
    }

    /// Text covered by the span, or `None` when it does not fall on char
    /// boundaries of `text`.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start_byte..self.end_byte)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotspotKind {
    /// Calls itself with `p - 1` and `p - 2` on a shared parameter `p`.
    DoublingRecursion,
    /// Any other self-recursive function.
    GenericRecursion,
}

impl HotspotKind {
    pub fn score(&self) -> u32 {
        match self {
            HotspotKind::DoublingRecursion => 2,
            HotspotKind::GenericRecursion => 1,
        }
    }
}

impl fmt::Display for HotspotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HotspotKind::DoublingRecursion => "doubling_recursion",
            HotspotKind::GenericRecursion => "generic_recursion",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for HotspotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "doubling_recursion" => Ok(HotspotKind::DoublingRecursion),
            "generic_recursion" => Ok(HotspotKind::GenericRecursion),
            other => Err(format!("unknown hotspot kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotspot {
    pub kind: HotspotKind,
    pub function_name: String,
    /// Shared parameter of the `p - 1` / `p - 2` calls; doubling recursion only.
    pub parameter_name: Option<String>,
    pub span: Span,
    pub score: u32,
    /// 1-based line the span starts on.
    pub line: u32,
}

impl Hotspot {
    pub fn new(
        kind: HotspotKind,
        function_name: impl Into<String>,
        parameter_name: Option<String>,
        span: Span,
        line: u32,
    ) -> Self {
        Self {
            kind,
            function_name: function_name.into(),
            parameter_name,
            span,
            score: kind.score(),
            line,
        }
    }
}

/// An import line inserted outside the hotspot span, always at or before
/// the span start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEdit {
    pub offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub span: Span,
    pub original: String,
    pub replacement: String,
    pub import: Option<ImportEdit>,
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Test,
    Prod,
}

impl Stage {
    pub fn is_test(&self) -> bool {
        matches!(self, Stage::Test)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Test => "test",
            Stage::Prod => "prod",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "test" => Ok(Stage::Test),
            "prod" | "production" => Ok(Stage::Prod),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectnessOutcome {
    pub success: bool,
    /// Combined stdout and stderr of the runner, or the failure text.
    pub output: String,
}

impl CorrectnessOutcome {
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub stage: Stage,
    pub changed: bool,
    pub before_ms: f64,
    pub after_ms: f64,
    pub correctness: Option<bool>,
    pub hotspot: Option<Hotspot>,
    pub diff_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    #[serde(default)]
    pub reverted: bool,
}

impl RunResult {
    /// Result for a run that stopped before touching the source.
    pub fn unchanged(stage: Stage, measured_ms: f64) -> Self {
        Self {
            stage,
            changed: false,
            before_ms: measured_ms,
            after_ms: measured_ms,
            correctness: None,
            hotspot: None,
            diff_path: None,
            report_path: None,
            log_path: None,
            reverted: false,
        }
    }

    pub fn improved(&self) -> bool {
        self.after_ms < self.before_ms
    }
}
