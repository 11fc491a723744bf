use std::path::{Path, PathBuf};
use std::{env, fs, io};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::tokenize::DEFAULT_DELIMITERS;

const CONFIG_ENV: &str = "JSH_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	pub prompt: String,
	pub delimiters: String,
	/// Hand the terminal to foreground jobs when this shell owns it.
	pub job_control: bool,
}

impl Default for Config {
	fn default() -> Config {
		Config {
			prompt: "jsh> ".to_owned(),
			delimiters: DEFAULT_DELIMITERS.to_owned(),
			job_control: true,
		}
	}
}

impl Config {
	pub fn from_toml(text: &str) -> Result<Config, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	/// Reads `path`; a missing file means defaults.
	pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
		match fs::read_to_string(path) {
			Ok(text) => Config::from_toml(&text),
			Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
			Err(e) => Err(e.into()),
		}
	}

	/// `$JSH_CONFIG`, else `~/.config/jsh/config.toml`.
	pub fn default_path() -> Option<PathBuf> {
		if let Some(path) = env::var_os(CONFIG_ENV) {
			return Some(PathBuf::from(path));
		}
		env::var_os("HOME").map(|home| Path::new(&home).join(".config/jsh/config.toml"))
	}

	/// Loads the user's config, falling back to defaults on any error.
	pub fn load() -> Config {
		let path = match Config::default_path() {
			Some(path) => path,
			None => return Config::default(),
		};
		match Config::from_file(&path) {
			Ok(config) => {
				debug!(path = %path.display(), "loaded config");
				config
			},
			Err(e) => {
				warn!(path = %path.display(), error = %e, "ignoring config");
				Config::default()
			},
		}
	}
}
