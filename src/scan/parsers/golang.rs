//! Go parser.
//!
//! `func` declarations (capturing the receiver), struct and interface
//! types, single and block imports. `go.mod` yields a module artifact plus
//! one dependency artifact per require entry.

use regex::Regex;

use crate::error::GraphResult;
use crate::scan::discover::DiscoveredFile;

use super::{file_artifact, ArtifactKind, Language, LanguageParser, RawArtifact, RefKind};

pub struct GoParser {
    func_re: Regex,
    struct_re: Regex,
    interface_re: Regex,
    import_single_re: Regex,
    import_block_re: Regex,
    quoted_re: Regex,
    module_re: Regex,
    require_single_re: Regex,
    require_block_re: Regex,
}

impl GoParser {
    pub fn new() -> Self {
        Self {
            func_re: Regex::new(r"(?m)^func\s+(?:\(([^)]+)\)\s+)?([A-Za-z_]\w*)\s*\(")
                .expect("static pattern"),
            struct_re: Regex::new(r"(?m)^type\s+([A-Za-z_]\w*)\s+struct\b")
                .expect("static pattern"),
            interface_re: Regex::new(r"(?m)^type\s+([A-Za-z_]\w*)\s+interface\b")
                .expect("static pattern"),
            import_single_re: Regex::new(r#"(?m)^import\s+(?:\w+\s+)?"([^"]+)""#)
                .expect("static pattern"),
            import_block_re: Regex::new(r"(?s)import\s*\(([^)]*)\)").expect("static pattern"),
            quoted_re: Regex::new(r#""([^"]+)""#).expect("static pattern"),
            module_re: Regex::new(r"(?m)^module\s+(\S+)").expect("static pattern"),
            require_single_re: Regex::new(r"(?m)^require\s+([^\s(]+)\s+(\S+)")
                .expect("static pattern"),
            require_block_re: Regex::new(r"(?s)require\s*\(([^)]*)\)").expect("static pattern"),
        }
    }

    fn parse_gomod(&self, file: &DiscoveredFile) -> Vec<RawArtifact> {
        let content = &file.content;
        let mut artifacts = vec![file_artifact(file)];

        let module_name = self
            .module_re
            .captures(content)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "unnamed".to_string());

        let mut requires: Vec<(String, String)> = self
            .require_single_re
            .captures_iter(content)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();
        for block in self.require_block_re.captures_iter(content) {
            for line in block[1].lines() {
                let mut parts = line.split_whitespace();
                if let (Some(path), Some(version)) = (parts.next(), parts.next()) {
                    requires.push((path.to_string(), version.to_string()));
                }
            }
        }

        let mut module = RawArtifact::new(ArtifactKind::Module, &module_name, file);
        for (path, _) in &requires {
            module = module.with_ref(RefKind::DependsOn, path);
        }
        artifacts.push(module);

        for (path, version) in requires {
            artifacts.push(
                RawArtifact::new(ArtifactKind::Dependency, &path, file)
                    .with_meta("version", serde_json::json!(version)),
            );
        }
        artifacts
    }

    fn line_of(content: &str, offset: usize) -> usize {
        content[..offset].matches('\n').count() + 1
    }
}

impl Default for GoParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for GoParser {
    fn languages(&self) -> &[Language] {
        &[Language::Go]
    }

    fn parse(&self, file: &DiscoveredFile) -> GraphResult<Vec<RawArtifact>> {
        if file.relative_path.ends_with("go.mod") {
            return Ok(self.parse_gomod(file));
        }
        let content = &file.content;
        let mut artifacts = Vec::new();

        let mut file_art = file_artifact(file);
        for capture in self.import_single_re.captures_iter(content) {
            file_art = file_art.with_ref(RefKind::Imports, &capture[1]);
        }
        for block in self.import_block_re.captures_iter(content) {
            for quoted in self.quoted_re.captures_iter(&block[1]) {
                file_art = file_art.with_ref(RefKind::Imports, &quoted[1]);
            }
        }
        artifacts.push(file_art);

        for capture in self.func_re.captures_iter(content) {
            let m = capture.get(0).expect("whole match");
            let mut artifact = RawArtifact::new(ArtifactKind::Function, &capture[2], file)
                .at_line(Self::line_of(content, m.start()));
            if let Some(receiver) = capture.get(1) {
                artifact =
                    artifact.with_meta("receiver", serde_json::json!(receiver.as_str().trim()));
            }
            artifacts.push(artifact);
        }
        for capture in self.struct_re.captures_iter(content) {
            let m = capture.get(0).expect("whole match");
            artifacts.push(
                RawArtifact::new(ArtifactKind::Class, &capture[1], file)
                    .at_line(Self::line_of(content, m.start()))
                    .with_meta("go_kind", serde_json::json!("struct")),
            );
        }
        for capture in self.interface_re.captures_iter(content) {
            let m = capture.get(0).expect("whole match");
            artifacts.push(
                RawArtifact::new(ArtifactKind::Interface, &capture[1], file)
                    .at_line(Self::line_of(content, m.start())),
            );
        }
        Ok(artifacts)
    }
}
