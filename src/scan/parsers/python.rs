//! Python parser.
//!
//! Top-level `def` (with preceding decorators), `class` with its base
//! list, and both import forms. Indented definitions are methods and are
//! left alone.

use regex::Regex;

use crate::error::GraphResult;
use crate::scan::discover::DiscoveredFile;

use super::{file_artifact, ArtifactKind, Language, LanguageParser, RawArtifact, RefKind};

pub struct PythonParser {
    def_re: Regex,
    class_re: Regex,
    import_re: Regex,
    from_import_re: Regex,
    decorator_re: Regex,
}

impl PythonParser {
    pub fn new() -> Self {
        Self {
            def_re: Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").expect("static pattern"),
            class_re: Regex::new(r"^class\s+([A-Za-z_]\w*)\s*(?:\(([^)]*)\))?\s*:")
                .expect("static pattern"),
            import_re: Regex::new(r"^import\s+([\w.]+)").expect("static pattern"),
            from_import_re: Regex::new(r"^from\s+([\w.]+)\s+import\b").expect("static pattern"),
            decorator_re: Regex::new(r"^@([\w.]+)").expect("static pattern"),
        }
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for PythonParser {
    fn languages(&self) -> &[Language] {
        &[Language::Python]
    }

    fn parse(&self, file: &DiscoveredFile) -> GraphResult<Vec<RawArtifact>> {
        let mut artifacts = Vec::new();
        let mut file_art = file_artifact(file);

        // Decorators accumulate until the def/class they annotate.
        let mut pending_decorators: Vec<String> = Vec::new();

        for (line_no, line) in file.content.lines().enumerate() {
            let line_no = line_no + 1;

            if let Some(capture) = self.decorator_re.captures(line) {
                pending_decorators.push(capture[1].to_string());
                continue;
            }

            if let Some(capture) = self.import_re.captures(line) {
                file_art = file_art.with_ref(RefKind::Imports, &capture[1]);
            } else if let Some(capture) = self.from_import_re.captures(line) {
                file_art = file_art.with_ref(RefKind::Imports, &capture[1]);
            } else if let Some(capture) = self.def_re.captures(line) {
                let mut artifact =
                    RawArtifact::new(ArtifactKind::Function, &capture[1], file).at_line(line_no);
                if !pending_decorators.is_empty() {
                    artifact = artifact.with_meta(
                        "decorators",
                        serde_json::json!(pending_decorators.clone()),
                    );
                }
                artifacts.push(artifact);
            } else if let Some(capture) = self.class_re.captures(line) {
                let mut artifact =
                    RawArtifact::new(ArtifactKind::Class, &capture[1], file).at_line(line_no);
                if let Some(bases) = capture.get(2) {
                    for base in bases.as_str().split(',') {
                        let base = base.trim();
                        if !base.is_empty() && base != "object" {
                            artifact = artifact.with_ref(RefKind::Extends, base);
                        }
                    }
                }
                artifacts.push(artifact);
            }

            pending_decorators.clear();
        }

        artifacts.insert(0, file_art);
        Ok(artifacts)
    }
}
