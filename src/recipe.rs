//! Patch recipes
//!
//! A recipe is a small TOML document naming the target file, the two anchors
//! and the replacement block:
//!
//! ```toml
//! name = "claude-schema"
//! target = "server/_core/claude.ts"
//! start_anchor = "Please provide your analysis in the following JSON format:\n"
//! end_anchor = "\n\nRemember:"
//! require_interior = '"paydexBannerPrompt":'
//!
//! [replacement]
//! file = "claude_schema.json"
//! format = "json"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::anchor::{AnchorPatch, AnchorPattern};
use crate::error::PatchError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchRecipe {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub target: Option<PathBuf>,

    #[serde(default)]
    pub start_anchor: Option<String>,

    #[serde(default)]
    pub end_anchor: Option<String>,

    /// Text used to locate the diagnostic snippet on a miss
    #[serde(default)]
    pub marker: Option<String>,

    /// Literal the matched interior must contain before it is replaced
    #[serde(default)]
    pub require_interior: Option<String>,

    #[serde(default)]
    pub replacement: Replacement,

    /// Directory the recipe was loaded from; relative replacement files resolve here
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Replacement {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub format: ReplacementFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementFormat {
    /// Inserted exactly as written
    #[default]
    Verbatim,
    /// Parsed as JSON and re-rendered with two-space indentation
    Json,
}

/// Values given on the command line; each one overrides the recipe.
#[derive(Debug, Clone, Default)]
pub struct RecipeOverrides {
    pub target: Option<PathBuf>,
    pub start_anchor: Option<String>,
    pub end_anchor: Option<String>,
    pub replacement_file: Option<PathBuf>,
    pub json: bool,
    pub marker: Option<String>,
    pub require_interior: Option<String>,
}

/// A recipe with every field resolved and the replacement loaded.
#[derive(Debug, Clone)]
pub struct ResolvedRecipe {
    pub name: String,
    pub target: PathBuf,
    pub patch: AnchorPatch,
}

impl PatchRecipe {
    /// Load a recipe from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| PatchError::file_access(path, "reading recipe", e))?;
        let mut recipe: PatchRecipe = toml::from_str(&text)
            .with_context(|| format!("Failed to parse recipe: {}", path.display()))?;

        if recipe.name.is_none() {
            recipe.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned());
        }
        recipe.base_dir = path.parent().map(Path::to_path_buf);
        Ok(recipe)
    }

    /// Fold command-line overrides into the recipe
    pub fn merge(mut self, overrides: RecipeOverrides) -> Self {
        if overrides.target.is_some() {
            self.target = overrides.target;
        }
        if overrides.start_anchor.is_some() {
            self.start_anchor = overrides.start_anchor;
        }
        if overrides.end_anchor.is_some() {
            self.end_anchor = overrides.end_anchor;
        }
        if let Some(file) = overrides.replacement_file {
            // A file on the command line wins over inline text in the recipe.
            self.replacement.text = None;
            self.replacement.file = Some(file);
            // Command-line paths are relative to the working directory.
            self.base_dir = None;
        }
        if overrides.json {
            self.replacement.format = ReplacementFormat::Json;
        }
        if overrides.marker.is_some() {
            self.marker = overrides.marker;
        }
        if overrides.require_interior.is_some() {
            self.require_interior = overrides.require_interior;
        }
        self
    }

    /// Check required fields, load the replacement and build the patch.
    pub fn resolve(self, snippet_chars: usize) -> Result<ResolvedRecipe> {
        let target = self
            .target
            .clone()
            .ok_or_else(|| PatchError::InvalidRecipe("no target file (use --target)".to_string()))?;
        let start = self
            .start_anchor
            .as_deref()
            .ok_or_else(|| PatchError::InvalidRecipe("no start anchor (use --start)".to_string()))?;
        let end = self
            .end_anchor
            .as_deref()
            .ok_or_else(|| PatchError::InvalidRecipe("no end anchor (use --end)".to_string()))?;

        let replacement = self.load_replacement()?;
        let pattern = AnchorPattern::new(start, end)?;
        let mut patch = AnchorPatch::new(pattern, replacement)?
            .with_required_interior(self.require_interior.clone())
            .with_snippet_chars(snippet_chars);
        if let Some(marker) = &self.marker {
            patch = patch.with_marker(marker.as_str());
        }

        let name = self.name.unwrap_or_else(|| {
            target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "patch".to_string())
        });

        tracing::debug!(recipe = %name, target = %target.display(), "resolved recipe");

        Ok(ResolvedRecipe {
            name,
            target,
            patch,
        })
    }

    fn load_replacement(&self) -> Result<String> {
        let (raw, origin) = match (&self.replacement.text, &self.replacement.file) {
            (Some(_), Some(_)) => {
                return Err(PatchError::InvalidRecipe(
                    "replacement has both `text` and `file`".to_string(),
                )
                .into());
            }
            (None, None) => {
                return Err(PatchError::InvalidRecipe(
                    "no replacement block (set [replacement] text/file or use --replacement)"
                        .to_string(),
                )
                .into());
            }
            (Some(text), None) => (text.clone(), PathBuf::from("<inline replacement>")),
            (None, Some(file)) => {
                let path = match &self.base_dir {
                    Some(dir) if file.is_relative() => dir.join(file),
                    _ => file.clone(),
                };
                let text = fs::read_to_string(&path)
                    .map_err(|e| PatchError::file_access(&path, "reading replacement", e))?;
                (text, path)
            }
        };

        match self.replacement.format {
            ReplacementFormat::Verbatim => Ok(raw),
            ReplacementFormat::Json => Ok(render_json(&raw, &origin)?),
        }
    }
}

/// Parse `raw` as JSON and pretty-print it, keeping key order.
pub fn render_json(raw: &str, origin: &Path) -> Result<String, PatchError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|source| PatchError::InvalidReplacement {
            path: origin.to_path_buf(),
            source,
        })?;
    // Serializing a Value cannot fail.
    Ok(serde_json::to_string_pretty(&value).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::PatchOutcome;
    use tempfile::TempDir;

    const RECIPE: &str = r#"
name = "schema"
target = "claude.ts"
start_anchor = "Please provide your analysis in the following JSON format:\n"
end_anchor = "\n\nRemember:"
require_interior = '"paydexBannerPrompt":'

[replacement]
text = "{\n  \"logoPrompt\": \"x\"\n}"
"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_and_resolve_inline() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "schema.toml", RECIPE);

        let resolved = PatchRecipe::load(&path).unwrap().resolve(500).unwrap();
        assert_eq!(resolved.name, "schema");
        assert_eq!(resolved.target, PathBuf::from("claude.ts"));
        assert_eq!(resolved.patch.replacement(), "{\n  \"logoPrompt\": \"x\"\n}");
        assert_eq!(resolved.patch.pattern().end(), "\n\nRemember:");
    }

    #[test]
    fn test_name_defaults_to_file_stem() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "fix_schema.toml", &RECIPE.replace("name = \"schema\"", ""));
        let recipe = PatchRecipe::load(&path).unwrap();
        assert_eq!(recipe.name.as_deref(), Some("fix_schema"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "bad.toml", "targt = \"x\"\n");
        assert!(PatchRecipe::load(&path).is_err());
    }

    #[test]
    fn test_replacement_file_relative_to_recipe() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "schema.json", "{\"b\": 1, \"a\": [1, 2]}");
        let recipe = r#"
target = "t.ts"
start_anchor = "S"
end_anchor = "E"
[replacement]
file = "schema.json"
format = "json"
"#;
        let path = write(dir.path(), "r.toml", recipe);
        let resolved = PatchRecipe::load(&path).unwrap().resolve(500).unwrap();
        assert_eq!(
            resolved.patch.replacement(),
            "{\n  \"b\": 1,\n  \"a\": [\n    1,\n    2\n  ]\n}"
        );
    }

    #[test]
    fn test_invalid_json_replacement() {
        let recipe = PatchRecipe {
            target: Some("t".into()),
            start_anchor: Some("S".into()),
            end_anchor: Some("E".into()),
            replacement: Replacement {
                text: Some("{ not json".into()),
                file: None,
                format: ReplacementFormat::Json,
            },
            ..Default::default()
        };
        let err = recipe.resolve(500).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PatchError>(),
            Some(PatchError::InvalidReplacement { .. })
        ));
    }

    #[test]
    fn test_both_replacement_sources_rejected() {
        let recipe = PatchRecipe {
            target: Some("t".into()),
            start_anchor: Some("S".into()),
            end_anchor: Some("E".into()),
            replacement: Replacement {
                text: Some("x".into()),
                file: Some("y".into()),
                format: ReplacementFormat::Verbatim,
            },
            ..Default::default()
        };
        assert!(recipe.resolve(500).is_err());
    }

    #[test]
    fn test_missing_target() {
        let recipe = PatchRecipe {
            start_anchor: Some("S".into()),
            end_anchor: Some("E".into()),
            ..Default::default()
        };
        let err = recipe.resolve(500).unwrap_err();
        assert!(err.to_string().contains("--target"));
    }

    #[test]
    fn test_overrides_win() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "schema.toml", RECIPE);
        let replacement = write(dir.path(), "block.txt", "NEW");

        let recipe = PatchRecipe::load(&path).unwrap().merge(RecipeOverrides {
            target: Some("other.ts".into()),
            replacement_file: Some(replacement),
            require_interior: Some("\"logoPrompt\":".into()),
            ..Default::default()
        });
        assert_eq!(recipe.require_interior.as_deref(), Some("\"logoPrompt\":"));
        let resolved = recipe.resolve(500).unwrap();
        assert_eq!(resolved.target, PathBuf::from("other.ts"));
        assert_eq!(resolved.patch.replacement(), "NEW");
    }

    #[test]
    fn test_resolved_patch_applies() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "schema.toml", RECIPE);
        let resolved = PatchRecipe::load(&path).unwrap().resolve(500).unwrap();

        let original = "Please provide your analysis in the following JSON format:\n{\n\"paydexBannerPrompt\": \"old\"\n}\n\nRemember: ok";
        let PatchOutcome::Patched { content, .. } = resolved.patch.apply(original) else {
            panic!("expected patch to apply");
        };
        assert!(content.contains("\"logoPrompt\""));
        assert!(content.ends_with("\n\nRemember: ok"));
    }
}
