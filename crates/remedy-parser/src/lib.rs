pub mod applier;
pub mod ast_utils;
pub mod detector;
pub mod language;
pub mod parser;
pub mod recurrence;
pub mod synthesizer;

pub use applier::*;
pub use detector::{top_level_functions, HotspotDetector, TopLevelFunction};
pub use language::*;
pub use parser::*;
pub use recurrence::*;
pub use synthesizer::*;
