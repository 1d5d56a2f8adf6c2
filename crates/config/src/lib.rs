//! Configuration loading for the captions gateway.
//!
//! Config files are discovered as `captions.{toml,yaml,yml,json}` in the
//! working directory or `~/.config/captions/`. `${ENV_VAR}` placeholders are
//! substituted before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config, load_or_discover},
    schema::{
        CaptionsConfig, GestureConfig, RecognitionConfig, ServerConfig, SessionConfig,
        SpeechConfig, SpeechProvider,
    },
};
