//! Per-language defaults: source filename and default `std` tag.
//!
//! Loaded once from a bundled TOML table via `include_str!`, the same way the
//! teacher's `languages.rs` loads its compile/run command table — narrowed
//! here to the two fields the pipeline's compile stage actually needs, since
//! the compile and run commands themselves live inside the judge image.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct RawLanguageConfig {
    source_file: String,
    #[serde(default)]
    default_std: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub source_file: String,
    pub default_std: Option<String>,
}

static LANGUAGES: OnceLock<HashMap<String, LanguageConfig>> = OnceLock::new();

/// Parse and install the bundled language table. Safe to call once at startup.
pub fn init_languages() -> Result<()> {
    let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
    let table = parse_languages(content)?;
    LANGUAGES
        .set(table)
        .map_err(|_| anyhow::anyhow!("languages already initialized"))?;
    Ok(())
}

fn parse_languages(content: &str) -> Result<HashMap<String, LanguageConfig>> {
    let raw: HashMap<String, RawLanguageConfig> =
        toml::from_str(content).context("failed to parse languages.toml")?;

    let mut table = HashMap::new();
    for (name, cfg) in raw {
        let config = LanguageConfig {
            source_file: cfg.source_file.clone(),
            default_std: cfg.default_std.clone(),
        };
        table.insert(name.to_lowercase(), config.clone());
        for alias in &cfg.aliases {
            table.insert(alias.to_lowercase(), config.clone());
        }
    }
    Ok(table)
}

/// Look up a language's config; unknown languages fall back to the `cpp`
/// entry's source filename per §4.4 step 3 ("If language is unknown, default
/// to `main.cpp`").
pub fn get_language_config(language: &str) -> LanguageConfig {
    LANGUAGES
        .get()
        .and_then(|t| t.get(&language.to_lowercase()).cloned())
        .unwrap_or_else(|| LanguageConfig {
            source_file: "main.cpp".to_string(),
            default_std: Some("c++20".to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[c]
source_file = "main.c"
default_std = "c17"

[cpp]
source_file = "main.cpp"
default_std = "c++20"
aliases = ["c++"]
"#;

    #[test]
    fn parses_source_file_and_default_std() {
        let table = parse_languages(SAMPLE).unwrap();
        assert_eq!(table["c"].source_file, "main.c");
        assert_eq!(table["c"].default_std.as_deref(), Some("c17"));
    }

    #[test]
    fn aliases_resolve_to_same_config() {
        let table = parse_languages(SAMPLE).unwrap();
        assert_eq!(table["c++"].source_file, table["cpp"].source_file);
    }

    #[test]
    fn unknown_language_reported_by_caller_falls_back_to_cpp() {
        // get_language_config() itself requires LANGUAGES to be initialized
        // process-wide; exercise the fallback construction directly instead.
        let fallback = LanguageConfig {
            source_file: "main.cpp".to_string(),
            default_std: Some("c++20".to_string()),
        };
        assert_eq!(fallback.source_file, "main.cpp");
    }
}
