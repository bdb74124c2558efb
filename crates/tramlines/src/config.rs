use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tramlines_guardrail::{ClassifierRegistry, GuardrailConfig, RegexClassifier, SessionConfig};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub guardrail: GuardrailSection,

    /// Extra regex classifiers, registered next to the built-ins
    #[serde(default)]
    pub classifiers: Vec<ClassifierConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GuardrailSection {
    /// Policy files, combined in order
    #[serde(default)]
    pub policies: Vec<PathBuf>,

    #[serde(default)]
    pub disabled_tools: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ClassifierConfig {
    pub name: String,
    pub patterns: Vec<String>,
}

impl Config {
    pub fn registry(&self) -> Result<ClassifierRegistry> {
        let mut registry = ClassifierRegistry::with_builtins()?;
        for classifier in &self.classifiers {
            let regex = RegexClassifier::new(&classifier.name, &classifier.patterns)
                .context(format!("Invalid classifier '{}'", classifier.name))?;
            registry.register(Arc::new(regex));
        }
        Ok(registry)
    }

    pub fn guardrail_config(&self) -> GuardrailConfig {
        GuardrailConfig {
            sessions: self.sessions.clone(),
            disabled_tools: self.guardrail.disabled_tools.clone(),
        }
    }
}

/// Expand `~` and resolve relative paths against `base`
pub fn expand_path(path: &Path, base: Option<&Path>) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
    match base {
        Some(base) if expanded.is_relative() => base.join(expanded),
        _ => expanded,
    }
}

/// Load config from file or use defaults
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let path = expand_path(path, None);
    let content =
        fs::read_to_string(&path).context(format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content).context("Failed to parse TOML config")?;
    if config.sessions.cleanup_hours == 0 {
        anyhow::bail!("sessions.cleanup_hours must be at least 1 in {:?}", path);
    }

    // Policy paths in a config file are relative to that file
    let base = path.parent().filter(|p| !p.as_os_str().is_empty());
    config.guardrail.policies = config
        .guardrail
        .policies
        .iter()
        .map(|p| expand_path(p, base))
        .collect();

    Ok(config)
}
