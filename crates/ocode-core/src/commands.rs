// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Reusable prompt templates: markdown files with an optional front-matter
//! block, discovered from global and project command directories and the
//! behavior config's inline commands.
//!
//! ```markdown
//! ---
//! description: Review a pull request
//! agent: explore
//! max_steps: 12
//! ---
//! Review the changes in {{branch}} and summarize risks.
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::bail;
use ocode_config::{global_config_dir, CommandSpec};

/// Parse a minimal `--- key: value ---` front-matter header.
///
/// Returns the metadata map and the body. Input without a front-matter
/// block comes back with an empty map and the whole text as body.
pub fn parse_front_matter(text: &str) -> (BTreeMap<String, String>, String) {
    let mut lines = text.lines();
    if lines.next().map(str::trim) != Some("---") {
        return (BTreeMap::new(), text.to_string());
    }
    let mut meta = BTreeMap::new();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut in_body = false;
    for line in lines {
        if in_body {
            body_lines.push(line);
            continue;
        }
        if line.trim() == "---" {
            in_body = true;
            continue;
        }
        if let Some((k, v)) = line.split_once(':') {
            meta.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    if !in_body {
        // Unterminated front matter: treat the whole input as body.
        return (BTreeMap::new(), text.to_string());
    }
    (meta, body_lines.join("\n"))
}

fn load_command_file(path: &Path) -> Option<CommandSpec> {
    let text = std::fs::read_to_string(path).ok()?;
    let (meta, body) = parse_front_matter(&text);
    Some(CommandSpec {
        description: meta.get("description").cloned().unwrap_or_default(),
        agent: meta.get("agent").filter(|s| !s.is_empty()).cloned(),
        prompt: body.trim().to_string(),
        model: meta.get("model").filter(|s| !s.is_empty()).cloned(),
        max_steps: meta.get("max_steps").and_then(|s| s.parse().ok()),
        source_path: Some(path.to_path_buf()),
    })
}

fn command_dirs(cwd: &Path) -> Vec<PathBuf> {
    vec![cwd.join(".ocode").join("commands"), cwd.join("commands")]
}

fn global_command_dirs() -> Vec<PathBuf> {
    match global_config_dir() {
        Some(d) => vec![d.join("commands")],
        None => vec![],
    }
}

fn scan_dir(dir: &Path, out: &mut BTreeMap<String, CommandSpec>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("md") | Some("txt")
            )
        })
        .collect();
    paths.sort();
    for p in paths {
        let Some(stem) = p.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(spec) = load_command_file(&p) {
            out.insert(stem.to_string(), spec);
        }
    }
}

/// Discover available commands. Merge order: global dirs < project dirs <
/// inline (behavior config); later sources override earlier ones by name.
pub fn discover_commands(
    cwd: &Path,
    inline: &BTreeMap<String, CommandSpec>,
) -> BTreeMap<String, CommandSpec> {
    let mut out = BTreeMap::new();
    for d in global_command_dirs() {
        scan_dir(&d, &mut out);
    }
    for d in command_dirs(cwd) {
        scan_dir(&d, &mut out);
    }
    for (name, spec) in inline {
        out.insert(name.clone(), spec.clone());
    }
    out
}

pub fn load_command(
    cwd: &Path,
    name: &str,
    inline: &BTreeMap<String, CommandSpec>,
) -> anyhow::Result<CommandSpec> {
    let cmds = discover_commands(cwd, inline);
    match cmds.get(name) {
        Some(spec) => Ok(spec.clone()),
        None => {
            let available = cmds.keys().cloned().collect::<Vec<_>>().join(", ");
            bail!("Unknown command: {name}. Available: {available}")
        }
    }
}

/// Substitute `{{key}}` placeholders; unresolved placeholders are left
/// intact.
pub fn render_command_prompt(spec: &CommandSpec, args: &BTreeMap<String, String>) -> String {
    let mut text = spec.prompt.clone();
    for (k, v) in args {
        text = text.replace(&format!("{{{{{k}}}}}"), v);
    }
    text
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
