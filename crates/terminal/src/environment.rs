//! Shell detection and session environment resolution.

use crate::dotenv;
use indexmap::IndexMap;
use settings::Config;
use std::path::Path;

#[cfg(windows)]
const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_SEPARATOR: char = ':';

/// Program and arguments used to start a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Pick the shell for new sessions: config override, then `$SHELL`,
/// then a platform default.
pub fn detect_shell(config: &Config) -> ShellCommand {
    detect_shell_from(config, std::env::var("SHELL").ok())
}

pub(crate) fn detect_shell_from(config: &Config, env_shell: Option<String>) -> ShellCommand {
    let program = config
        .shell
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| env_shell.filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(platform_default_shell);

    let args = match &config.shell_args {
        Some(args) => args.clone(),
        None => default_shell_args(&program),
    };

    ShellCommand { program, args }
}

#[cfg(target_os = "macos")]
fn platform_default_shell() -> String {
    "/bin/zsh".to_string()
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_default_shell() -> String {
    if Path::new("/bin/bash").exists() {
        "/bin/bash".to_string()
    } else {
        "/bin/sh".to_string()
    }
}

#[cfg(windows)]
fn platform_default_shell() -> String {
    "powershell.exe".to_string()
}

#[cfg(unix)]
fn default_shell_args(_program: &str) -> Vec<String> {
    // Login shell so profile files set up PATH
    vec!["-l".to_string()]
}

#[cfg(windows)]
fn default_shell_args(program: &str) -> Vec<String> {
    if program.to_ascii_lowercase().contains("powershell") {
        vec!["-NoLogo".to_string()]
    } else {
        Vec::new()
    }
}

/// Install prefixes that GUI-launched processes commonly miss.
pub fn platform_path_prefixes() -> Vec<String> {
    #[cfg(target_os = "macos")]
    {
        vec![
            "/opt/homebrew/bin".to_string(),
            "/opt/homebrew/sbin".to_string(),
            "/usr/local/bin".to_string(),
            "/usr/local/sbin".to_string(),
        ]
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec![
            "~/.local/bin".to_string(),
            "/usr/local/bin".to_string(),
            "/home/linuxbrew/.linuxbrew/bin".to_string(),
        ]
    }
    #[cfg(windows)]
    {
        Vec::new()
    }
}

fn expand_tilde(entry: &str) -> String {
    if let Some(rest) = entry.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    entry.to_string()
}

/// Prepend `prefixes` to `current`, skipping entries already present.
pub fn augment_path(current: &str, prefixes: &[String]) -> String {
    let existing: Vec<&str> = current.split(PATH_SEPARATOR).filter(|p| !p.is_empty()).collect();
    let mut added: Vec<String> = Vec::new();
    for prefix in prefixes {
        let expanded = expand_tilde(prefix);
        if expanded.is_empty()
            || existing.contains(&expanded.as_str())
            || added.contains(&expanded)
        {
            continue;
        }
        added.push(expanded);
    }

    if added.is_empty() {
        return current.to_string();
    }
    let mut parts = added;
    parts.extend(existing.into_iter().map(str::to_string));
    parts.join(&PATH_SEPARATOR.to_string())
}

/// Build the full environment for a session.
///
/// Precedence, lowest first: `base`, terminal capabilities, UTF-8 locale,
/// PATH augmentation, config `extra-env`, directory env files (when
/// enabled), then `extra_env` from the create request.
pub fn resolve_environment(
    base: impl IntoIterator<Item = (String, String)>,
    config: &Config,
    cwd: &Path,
    extra_env: &IndexMap<String, String>,
) -> IndexMap<String, String> {
    let mut env: IndexMap<String, String> = base.into_iter().collect();

    env.insert("TERM".into(), "xterm-256color".into());
    env.insert("COLORTERM".into(), "truecolor".into());

    env.insert("LANG".into(), "en_US.UTF-8".into());
    env.insert("LC_ALL".into(), "en_US.UTF-8".into());
    env.insert("PYTHONIOENCODING".into(), "utf-8".into());
    env.insert("PYTHONUTF8".into(), "1".into());

    let mut prefixes = config.extra_path.clone();
    prefixes.extend(platform_path_prefixes());
    let current = env.get("PATH").cloned().unwrap_or_default();
    env.insert("PATH".into(), augment_path(&current, &prefixes));

    env.extend(config.extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));

    if config.load_dotenv {
        env.extend(dotenv::directory_env(cwd));
    }

    env.extend(extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}
