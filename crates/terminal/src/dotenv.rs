//! `.env` and `.envrc` parsing for per-directory session environments.
//!
//! Only the static subset is understood: `KEY=value` lines in `.env` and
//! `export KEY=value` lines in `.envrc`. Nothing is executed.

use indexmap::IndexMap;
use std::path::Path;

pub const ENV_FILE: &str = ".env";
pub const ENVRC_FILE: &str = ".envrc";

/// Variables read from one file plus anything that could not be honored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvParseResult {
    pub env_vars: IndexMap<String, String>,
    pub source: &'static str,
    pub errors: Vec<String>,
}

impl EnvParseResult {
    fn empty(source: &'static str) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }
}

/// Summary of the env files present in a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFilesInfo {
    pub has_env: bool,
    pub has_envrc: bool,
    pub env_vars: IndexMap<String, String>,
    pub envrc_vars: IndexMap<String, String>,
}

fn unquote(value: &str) -> &str {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, unquote(value.trim())))
}

/// Parse `.env` content. Later assignments override earlier ones.
pub fn parse_env_file(content: &str) -> IndexMap<String, String> {
    let mut vars = IndexMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = split_assignment(line) {
            let value = value.replace("\\n", "\n").replace("\\t", "\t");
            vars.insert(key.to_string(), value);
        }
    }
    vars
}

/// Parse `.envrc` content, keeping only `export KEY=value` lines.
pub fn parse_envrc(content: &str) -> (IndexMap<String, String>, Vec<String>) {
    let mut vars = IndexMap::new();
    let mut errors = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("export ") {
            if let Some((key, value)) = split_assignment(rest) {
                vars.insert(key.to_string(), value.to_string());
            }
        } else if line.contains("source_env") || line.contains("use ") {
            errors.push(format!(
                "Unsupported direnv directive: {}",
                util::truncate_for_log(line, 120)
            ));
        }
    }
    (vars, errors)
}

fn read_file(dir: &Path, name: &'static str) -> Option<Result<String, String>> {
    let path = dir.join(name);
    if !path.exists() {
        return None;
    }
    Some(std::fs::read_to_string(&path).map_err(|e| format!("Failed to read {}: {}", name, e)))
}

/// Read `.env` from `dir`. A missing file yields an empty result.
pub fn read_env_file(dir: &Path) -> EnvParseResult {
    match read_file(dir, ENV_FILE) {
        None => EnvParseResult::empty(ENV_FILE),
        Some(Ok(content)) => EnvParseResult {
            env_vars: parse_env_file(&content),
            source: ENV_FILE,
            errors: Vec::new(),
        },
        Some(Err(e)) => EnvParseResult {
            errors: vec![e],
            ..EnvParseResult::empty(ENV_FILE)
        },
    }
}

/// Read `.envrc` from `dir`. A missing file yields an empty result.
pub fn read_envrc_file(dir: &Path) -> EnvParseResult {
    match read_file(dir, ENVRC_FILE) {
        None => EnvParseResult::empty(ENVRC_FILE),
        Some(Ok(content)) => {
            let (env_vars, errors) = parse_envrc(&content);
            EnvParseResult {
                env_vars,
                source: ENVRC_FILE,
                errors,
            }
        }
        Some(Err(e)) => EnvParseResult {
            errors: vec![e],
            ..EnvParseResult::empty(ENVRC_FILE)
        },
    }
}

pub fn has_env_file(dir: &Path) -> bool {
    dir.join(ENV_FILE).exists()
}

pub fn has_envrc_file(dir: &Path) -> bool {
    dir.join(ENVRC_FILE).exists()
}

pub fn env_files_info(dir: &Path) -> EnvFilesInfo {
    EnvFilesInfo {
        has_env: has_env_file(dir),
        has_envrc: has_envrc_file(dir),
        env_vars: read_env_file(dir).env_vars,
        envrc_vars: read_envrc_file(dir).env_vars,
    }
}

/// `.envrc` values overlaid with `.env` values, as merged into a session.
pub fn directory_env(dir: &Path) -> IndexMap<String, String> {
    let mut merged = IndexMap::new();
    for result in [read_envrc_file(dir), read_env_file(dir)] {
        for error in &result.errors {
            tracing::warn!(dir = %dir.display(), "{}", error);
        }
        merged.extend(result.env_vars);
    }
    merged
}
