// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! YAML provider registry.
//!
//! ```yaml
//! providers:
//!   deepseek:
//!     PYOPENCODE_BASE_URL: https://api.deepseek.com/v1
//!     PYOPENCODE_MODEL: deepseek-chat
//!     PYOPENCODE_API_KEY: ${DEEPSEEK_API_KEY}
//! ```
//!
//! The key field may contain `${VAR}` placeholders resolved from the
//! environment; an unresolved placeholder is a fatal config error.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    /// Optional `PYOPENCODE_REASONING`: "auto" | "always" | "never".
    pub reasoning: Option<String>,
}

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    items: BTreeMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn add(&mut self, cfg: ProviderConfig) {
        self.items.insert(cfg.name.trim().to_lowercase(), cfg);
    }

    pub fn get(&self, name: &str) -> anyhow::Result<&ProviderConfig> {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            bail!("missing --provider");
        }
        match self.items.get(&key) {
            Some(cfg) => Ok(cfg),
            None => {
                let known = if self.items.is_empty() {
                    "(none)".to_string()
                } else {
                    self.names().join(", ")
                };
                bail!("unknown provider '{name}'. Known providers: {known}")
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }
}

#[derive(Debug, Deserialize)]
struct ProvidersFile {
    providers: BTreeMap<String, ProviderEntry>,
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    #[serde(rename = "PYOPENCODE_BASE_URL")]
    base_url: Option<String>,
    #[serde(rename = "PYOPENCODE_MODEL")]
    model: Option<String>,
    #[serde(rename = "PYOPENCODE_API_KEY")]
    api_key: Option<String>,
    #[serde(rename = "PYOPENCODE_REASONING")]
    reasoning: Option<String>,
}

/// Replace every `${VAR}` in `s` with the environment value.
///
/// An unset or empty variable is an error naming the placeholder.
fn expand_env_placeholders(s: &str) -> anyhow::Result<String> {
    let re = Regex::new(r"\$\{(\w+)\}").expect("static regex");
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in re.captures_iter(s) {
        let m = caps.get(0).expect("whole match");
        let var = &caps[1];
        let val = std::env::var(var).unwrap_or_default();
        if val.is_empty() {
            bail!("API key placeholder '${{{var}}}' not found in environment or is empty");
        }
        out.push_str(&s[last..m.start()]);
        out.push_str(&val);
        last = m.end();
    }
    out.push_str(&s[last..]);
    Ok(out)
}

/// Load and validate the provider registry from a YAML file.
pub fn load_provider_registry(path: &Path) -> anyhow::Result<ProviderRegistry> {
    if !path.exists() {
        bail!("config YAML not found: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file: ProvidersFile = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    if file.providers.is_empty() {
        bail!("{}: 'providers:' mapping is empty", path.display());
    }

    let mut reg = ProviderRegistry::default();
    for (name, entry) in file.providers {
        let require = |field: &str, v: &Option<String>| -> anyhow::Result<String> {
            match v.as_deref().map(str::trim) {
                Some(s) if !s.is_empty() => Ok(s.to_string()),
                _ => bail!(
                    "{}: providers.{name} missing required field {field}",
                    path.display()
                ),
            }
        };
        let base_url = require("PYOPENCODE_BASE_URL", &entry.base_url)?;
        let model = require("PYOPENCODE_MODEL", &entry.model)?;
        let api_key = require("PYOPENCODE_API_KEY", &entry.api_key)?;
        let api_key = expand_env_placeholders(&api_key)
            .with_context(|| format!("{}: providers.{name}.PYOPENCODE_API_KEY", path.display()))?;

        if let Some(r) = entry.reasoning.as_deref() {
            if !matches!(r.trim(), "auto" | "always" | "never") {
                bail!(
                    "{}: providers.{name}.PYOPENCODE_REASONING must be auto|always|never, got '{r}'",
                    path.display()
                );
            }
        }

        reg.add(ProviderConfig {
            name,
            base_url,
            model,
            api_key,
            reasoning: entry.reasoning.map(|s| s.trim().to_string()),
        });
    }
    Ok(reg)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
