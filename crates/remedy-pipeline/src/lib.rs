pub mod artifacts;
pub mod lock;
pub mod notify;
pub mod pipeline;
pub mod probe;
pub mod report;
pub mod runner;
pub mod source;

pub use artifacts::{timestamp, unified_diff, ArtifactKind, ArtifactStore};
pub use notify::{LogNotifier, Notification, Notifier, WebhookNotifier};
pub use pipeline::VerificationPipeline;
pub use probe::{HttpTimingProbe, TimingProbe};
pub use report::RunReport;
pub use runner::{CommandRunner, CorrectnessRunner};
pub use source::SourceFile;
