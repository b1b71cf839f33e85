//! Typed-JS family parser (TypeScript, JavaScript, JSX/TSX).
//!
//! Regex-based and forgiving: exported functions, arrow consts, classes
//! (with extends/implements), interfaces (with extends), type aliases,
//! and imports from literal module specifiers.

use regex::Regex;

use crate::error::{GraphError, GraphResult};
use crate::scan::discover::DiscoveredFile;

use super::{
    file_artifact, ArtifactKind, Language, LanguageParser, RawArtifact, RefKind,
};

pub struct TypeScriptParser {
    function_re: Regex,
    arrow_re: Regex,
    class_re: Regex,
    interface_re: Regex,
    type_re: Regex,
    import_re: Regex,
}

impl TypeScriptParser {
    pub fn new() -> Self {
        // Patterns are anchored to line starts; minified or exotic code
        // simply yields fewer artifacts.
        Self {
            function_re: Regex::new(
                r"(?m)^export\s+(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)",
            )
            .expect("static pattern"),
            arrow_re: Regex::new(
                r"(?m)^export\s+const\s+([A-Za-z_$][\w$]*)\s*(?::[^=\n]+)?=\s*(?:async\s+)?(?:\([^)\n]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=\n]+)?=>",
            )
            .expect("static pattern"),
            class_re: Regex::new(
                r"(?m)^export\s+(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)(?:\s+extends\s+([A-Za-z_$][\w$.]*))?(?:\s+implements\s+([A-Za-z_$][\w$.,\s]*?))?\s*\{",
            )
            .expect("static pattern"),
            interface_re: Regex::new(
                r"(?m)^export\s+interface\s+([A-Za-z_$][\w$]*)(?:\s+extends\s+([A-Za-z_$][\w$.,\s]*?))?\s*\{",
            )
            .expect("static pattern"),
            type_re: Regex::new(r"(?m)^export\s+type\s+([A-Za-z_$][\w$]*)")
                .expect("static pattern"),
            import_re: Regex::new(r#"(?m)^import\s+(?:type\s+)?(?:[^'"\n]+\s+from\s+)?['"]([^'"]+)['"]"#)
                .expect("static pattern"),
        }
    }

    fn line_of(content: &str, offset: usize) -> usize {
        content[..offset].matches('\n').count() + 1
    }
}

impl Default for TypeScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for TypeScriptParser {
    fn languages(&self) -> &[Language] {
        &[Language::TypeScript]
    }

    fn parse(&self, file: &DiscoveredFile) -> GraphResult<Vec<RawArtifact>> {
        if file.content.is_empty() {
            return Err(GraphError::Parse {
                path: file.relative_path.clone(),
                reason: "empty source".to_string(),
            });
        }
        let content = &file.content;
        let mut artifacts = Vec::new();

        let mut file_art = file_artifact(file);
        for capture in self.import_re.captures_iter(content) {
            file_art = file_art.with_ref(RefKind::Imports, &capture[1]);
        }
        artifacts.push(file_art);

        for capture in self.function_re.captures_iter(content) {
            let m = capture.get(0).expect("whole match");
            artifacts.push(
                RawArtifact::new(ArtifactKind::Function, &capture[1], file)
                    .at_line(Self::line_of(content, m.start()))
                    .with_meta("exported", serde_json::json!(true)),
            );
        }
        for capture in self.arrow_re.captures_iter(content) {
            let m = capture.get(0).expect("whole match");
            artifacts.push(
                RawArtifact::new(ArtifactKind::Function, &capture[1], file)
                    .at_line(Self::line_of(content, m.start()))
                    .with_meta("exported", serde_json::json!(true))
                    .with_meta("arrow", serde_json::json!(true)),
            );
        }
        for capture in self.class_re.captures_iter(content) {
            let m = capture.get(0).expect("whole match");
            let mut artifact = RawArtifact::new(ArtifactKind::Class, &capture[1], file)
                .at_line(Self::line_of(content, m.start()));
            if let Some(base) = capture.get(2) {
                artifact = artifact.with_ref(RefKind::Extends, base.as_str());
            }
            if let Some(implemented) = capture.get(3) {
                for name in implemented.as_str().split(',') {
                    let name = name.trim();
                    if !name.is_empty() {
                        artifact = artifact.with_ref(RefKind::Implements, name);
                    }
                }
            }
            artifacts.push(artifact);
        }
        for capture in self.interface_re.captures_iter(content) {
            let m = capture.get(0).expect("whole match");
            let mut artifact = RawArtifact::new(ArtifactKind::Interface, &capture[1], file)
                .at_line(Self::line_of(content, m.start()));
            if let Some(extended) = capture.get(2) {
                for name in extended.as_str().split(',') {
                    let name = name.trim();
                    if !name.is_empty() {
                        artifact = artifact.with_ref(RefKind::Extends, name);
                    }
                }
            }
            artifacts.push(artifact);
        }
        for capture in self.type_re.captures_iter(content) {
            let m = capture.get(0).expect("whole match");
            artifacts.push(
                RawArtifact::new(ArtifactKind::Type, &capture[1], file)
                    .at_line(Self::line_of(content, m.start())),
            );
        }

        Ok(artifacts)
    }
}
