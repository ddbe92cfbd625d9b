// ABOUTME: Declares the Python grammar used by the hotspot detector.
// ABOUTME: Maps file extensions to the Tree-sitter grammar and builds configured parsers.
use std::path::Path;
use tree_sitter::Parser;

pub struct LanguageConfig {
    pub language: tree_sitter::Language,
    pub file_extensions: Vec<&'static str>,
}

pub struct PythonGrammar {
    config: LanguageConfig,
}

impl PythonGrammar {
    pub fn new() -> Self {
        Self {
            config: LanguageConfig {
                language: tree_sitter_python::LANGUAGE.into(),
                file_extensions: vec!["py", "pyi"],
            },
        }
    }

    pub fn handles(&self, file_path: &Path) -> bool {
        file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.config.file_extensions.contains(&ext))
            .unwrap_or(false)
    }

    pub fn config(&self) -> &LanguageConfig {
        &self.config
    }

    pub fn create_parser(&self) -> Option<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.config.language).ok()?;
        Some(parser)
    }
}

impl Default for PythonGrammar {
    fn default() -> Self {
        Self::new()
    }
}
