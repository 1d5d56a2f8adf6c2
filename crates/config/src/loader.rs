use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::CaptionsConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "captions.toml",
    "captions.yaml",
    "captions.yml",
    "captions.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<CaptionsConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    let mut config = parse_config(&raw, path)?;
    fill_from_env(&mut config);
    config.validate()?;
    Ok(config)
}

/// Load `explicit` when given, otherwise discover a config file.
///
/// An explicit path that cannot be loaded is an error; a discovered file
/// that cannot be loaded falls back to defaults.
pub fn load_or_discover(explicit: Option<&Path>) -> anyhow::Result<CaptionsConfig> {
    match explicit {
        Some(path) => load_config(path),
        None => Ok(discover_and_load()),
    }
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./captions.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/captions/captions.{toml,yaml,yml,json}` (user-global)
///
/// Returns `CaptionsConfig::default()` if no usable config file is found.
pub fn discover_and_load() -> CaptionsConfig {
    let mut search = vec![PathBuf::from(".")];
    search.extend(config_dir());

    if let Some(path) = find_config_file(&search) {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }

    let mut config = CaptionsConfig::default();
    fill_from_env(&mut config);
    config
}

/// Find the first config file in `dirs`, trying every standard name per dir.
pub fn find_config_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// Returns the user-global config directory, `~/.config/captions/`.
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("captions"))
}

fn fill_from_env(config: &mut CaptionsConfig) {
    let speech = &mut config.recognition.speech;
    if speech.api_key.is_none() {
        speech.api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(Secret::new);
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<CaptionsConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
