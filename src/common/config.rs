use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Represents the contents of `md2wechat.toml`.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub theme: Theme,
    pub render: Render,
    pub publish: Publish,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Theme {
    pub name: String,
    pub code: String,
    pub dir: PathBuf,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            name: DEFAULT_THEME.to_owned(),
            code: DEFAULT_CODE_THEME.to_owned(),
            dir: PathBuf::from(DEFAULT_THEME_DIR),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Render {
    pub mac_style: bool,
    pub heading_span: bool,
    pub default_language: String,
}

impl Default for Render {
    fn default() -> Self {
        Render {
            mac_style: true,
            heading_span: true,
            default_language: DEFAULT_LANGUAGE.to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Publish {
    pub default_author: String,
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self> {
        let toml_raw = std::fs::read_to_string(path)
            .wrap_err("Could not read in configuration file.")
            .suggestion("The configuration file was found, but couldn't be read - try checking your file permissions.")?;

        toml::from_str(&toml_raw)
            .wrap_err_with(|| format!("Could not parse configuration file {}.", path.display()))
    }

    /// Loads the nearest `md2wechat.toml` above the working directory, or the defaults if
    /// there is none, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match try_locate_config(&env::current_dir()?) {
            Some(path) => {
                debug!("Using configuration at {}.", path.display());
                let mut config = Self::from_path(&path)?;
                // Relative theme directories resolve against the file that named them.
                if let Some(parent) = path.parent() {
                    config.theme.dir = parent.join(&config.theme.dir);
                }
                config
            }
            None => {
                debug!("No {CONFIG_FILENAME} found, using defaults.");
                Self::default()
            }
        };

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Applies `THEME`, `CODE_THEME` and `WECHAT_DEFAULT_AUTHOR` overrides.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |key| var(key).filter(|value: &String| !value.is_empty());

        if let Some(name) = var("THEME") {
            self.theme.name = name;
        }
        if let Some(code) = var("CODE_THEME") {
            self.theme.code = code;
        }
        if let Some(author) = var("WECHAT_DEFAULT_AUTHOR") {
            self.publish.default_author = author;
        }
    }
}

fn try_locate_config(start: &Path) -> Option<PathBuf> {
    let mut path: PathBuf = start.into();
    let target = Path::new(CONFIG_FILENAME);

    loop {
        path.push(target);

        if path.is_file() {
            break Some(path);
        }

        if !(path.pop() && path.pop()) {
            break None;
        }
    }
}
