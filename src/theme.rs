//! Theme stylesheet loading.
//!
//! A theme is three stylesheets concatenated in order: the shared `basic.css`, the document
//! theme from `markdown/<name>.css` and the code theme from `code/<code>.css`.

use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeSelection {
    pub dir: PathBuf,
    pub name: String,
    pub code: String,
}

impl Default for ThemeSelection {
    fn default() -> Self {
        Self::from(&Theme::default())
    }
}

impl From<&Theme> for ThemeSelection {
    fn from(theme: &Theme) -> Self {
        Self {
            dir: theme.dir.clone(),
            name: theme.name.clone(),
            code: theme.code.clone(),
        }
    }
}

impl ThemeSelection {
    /// The stylesheet paths, in cascade order.
    pub fn paths(&self) -> [PathBuf; 3] {
        [
            self.dir.join(BASE_STYLESHEET),
            self.dir.join(MARKDOWN_THEME_DIR).join(format!("{}.css", self.name)),
            self.dir.join(CODE_THEME_DIR).join(format!("{}.css", self.code)),
        ]
    }

    /// Reads and concatenates the theme's stylesheets.
    ///
    /// A missing or unreadable stylesheet is logged and contributes nothing. Output styled by
    /// the remaining sheets (or by none at all) beats no output.
    pub fn load(&self) -> String {
        let css = self.paths().iter().map(|path| read(path)).join("\n");
        debug!(
            "Loaded theme \"{}\" with code theme \"{}\" ({} bytes of CSS).",
            self.name,
            self.code,
            css.len()
        );
        css
    }
}

fn read(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(css) => css,
        Err(err) => {
            warn!("Could not load stylesheet {} ({err}), continuing without it.", path.display());
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_layout() {
        let selection = ThemeSelection {
            dir: PathBuf::from("t"),
            name: "orange".to_owned(),
            code: "github".to_owned(),
        };

        assert_eq!(
            selection.paths(),
            [
                PathBuf::from("t/basic.css"),
                PathBuf::from("t/markdown/orange.css"),
                PathBuf::from("t/code/github.css"),
            ]
        );
    }

    #[test]
    fn missing_files_yield_empty_css() {
        let selection = ThemeSelection {
            dir: PathBuf::from("/nonexistent/md2wechat/themes"),
            ..ThemeSelection::default()
        };

        assert_eq!(selection.load(), "\n\n");
    }

    #[test]
    fn bundled_theme_loads() {
        let selection = ThemeSelection {
            dir: Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_THEME_DIR),
            ..ThemeSelection::default()
        };

        let css = selection.load();
        assert!(css.contains("#nice"));
        assert!(css.contains(".hljs"));
    }
}
