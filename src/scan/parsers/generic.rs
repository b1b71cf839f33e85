//! Generic parser: manifests, dotenv, Dockerfile, JSON, and the bare
//! `file` fallback.
//!
//! Recognized basenames get structured treatment; any other JSON file
//! yields its top-level keys as config entries; everything else is just a
//! file artifact.

use serde_json::Value as JsonValue;

use crate::error::GraphResult;
use crate::scan::discover::DiscoveredFile;

use super::{file_artifact, ArtifactKind, Language, LanguageParser, RawArtifact, RefKind};

pub struct GenericParser;

impl GenericParser {
    fn parse_package_json(&self, file: &DiscoveredFile) -> GraphResult<Vec<RawArtifact>> {
        let value: JsonValue = serde_json::from_str(&file.content)?;
        let mut artifacts = vec![file_artifact(file)];

        let module_name = value
            .get("name")
            .and_then(JsonValue::as_str)
            .unwrap_or("unnamed")
            .to_string();
        let mut module = RawArtifact::new(ArtifactKind::Module, &module_name, file);
        if let Some(version) = value.get("version").and_then(JsonValue::as_str) {
            module = module.with_meta("version", serde_json::json!(version));
        }

        let mut dependencies = Vec::new();
        for section in ["dependencies", "devDependencies"] {
            let Some(deps) = value.get(section).and_then(JsonValue::as_object) else {
                continue;
            };
            for (name, version) in deps {
                module = module.with_ref(RefKind::DependsOn, name);
                dependencies.push(
                    RawArtifact::new(ArtifactKind::Dependency, name, file)
                        .with_meta("version", version.clone())
                        .with_meta("dev", serde_json::json!(section == "devDependencies")),
                );
            }
        }
        artifacts.push(module);
        artifacts.extend(dependencies);
        Ok(artifacts)
    }

    fn parse_tsconfig(&self, file: &DiscoveredFile) -> GraphResult<Vec<RawArtifact>> {
        let value: JsonValue = serde_json::from_str(&file.content)?;
        let mut artifacts = vec![file_artifact(file)];
        if let Some(options) = value.get("compilerOptions").and_then(JsonValue::as_object) {
            for (key, option_value) in options {
                artifacts.push(
                    RawArtifact::new(ArtifactKind::ConfigKey, key, file)
                        .with_meta("value", option_value.clone()),
                );
            }
        }
        Ok(artifacts)
    }

    fn parse_dotenv(&self, file: &DiscoveredFile) -> Vec<RawArtifact> {
        let mut artifacts = vec![file_artifact(file)];
        for (line_no, line) in file.content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, _)) = line.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    artifacts.push(
                        RawArtifact::new(ArtifactKind::EnvVar, key, file).at_line(line_no + 1),
                    );
                }
            }
        }
        artifacts
    }

    fn parse_dockerfile(&self, file: &DiscoveredFile) -> Vec<RawArtifact> {
        let mut file_art = file_artifact(file);
        let mut artifacts = Vec::new();
        for (line_no, line) in file.content.lines().enumerate() {
            let trimmed = line.trim();
            if let Some(image) = trimmed.strip_prefix("FROM ") {
                let image = image.split_whitespace().next().unwrap_or_default();
                if !image.is_empty() {
                    file_art = file_art.with_ref(RefKind::DependsOn, image);
                }
            } else if let Some(rest) = trimmed.strip_prefix("ENV ") {
                let key = rest.split(['=', ' ']).next().unwrap_or_default();
                if !key.is_empty() {
                    artifacts.push(
                        RawArtifact::new(ArtifactKind::EnvVar, key, file).at_line(line_no + 1),
                    );
                }
            }
        }
        artifacts.insert(0, file_art);
        artifacts
    }

    fn parse_json_fallback(&self, file: &DiscoveredFile) -> GraphResult<Vec<RawArtifact>> {
        let value: JsonValue = serde_json::from_str(&file.content)?;
        let mut artifacts = vec![file_artifact(file)];
        if let Some(obj) = value.as_object() {
            for key in obj.keys() {
                artifacts.push(RawArtifact::new(ArtifactKind::ConfigKey, key, file));
            }
        }
        Ok(artifacts)
    }
}

impl LanguageParser for GenericParser {
    fn languages(&self) -> &[Language] {
        &[Language::Generic]
    }

    fn parse(&self, file: &DiscoveredFile) -> GraphResult<Vec<RawArtifact>> {
        let basename = file
            .relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&file.relative_path);
        match basename {
            "package.json" => self.parse_package_json(file),
            "tsconfig.json" => self.parse_tsconfig(file),
            ".env" => Ok(self.parse_dotenv(file)),
            "Dockerfile" => Ok(self.parse_dockerfile(file)),
            _ if basename.ends_with(".json") => self.parse_json_fallback(file),
            _ => Ok(vec![file_artifact(file)]),
        }
    }
}
