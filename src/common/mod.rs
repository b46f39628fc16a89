//! Types, functions, constants and other items that are globally relevant throughout the md2wechat codebase.

mod args;
mod config;
mod output;

pub use args::*;
pub use config::*;
pub use output::*;

pub const CONFIG_FILENAME: &str = "md2wechat.toml";

/// The `id` of the `<section>` every rendered document is wrapped in.
/// Theme selectors are anchored to it.
pub const ROOT_ID: &str = "nice";

/// Language assumed for fenced code blocks that do not declare one.
pub const DEFAULT_LANGUAGE: &str = "bash";

pub const DEFAULT_THEME: &str = "default";
pub const DEFAULT_CODE_THEME: &str = "atom-one-dark";
pub const DEFAULT_THEME_DIR: &str = "themes";

/// Stylesheet every theme builds on, relative to the theme directory.
pub const BASE_STYLESHEET: &str = "basic.css";
pub const MARKDOWN_THEME_DIR: &str = "markdown";
pub const CODE_THEME_DIR: &str = "code";

/// Title used when neither the frontmatter nor the body yields one.
pub const FALLBACK_TITLE: &str = "Untitled";
pub const DIGEST_LENGTH: usize = 120;
