//! Article metadata: frontmatter, title and digest.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::prelude::*;

static FRONTMATTER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A---\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n|\z)").unwrap());

static TITLE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t]*$").unwrap());

static HEADING_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#+[ \t]+.*$").unwrap());
static FENCE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static CODE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]+`").unwrap());
static LINK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static SPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// The YAML block at the very start of a document, delimited by `---` lines.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
}

impl Frontmatter {
    /// Splits `markdown` into its frontmatter, if any, and the body after it.
    ///
    /// A block that is not valid YAML is still stripped from the body, but contributes no fields.
    pub fn split(markdown: &str) -> (Option<Self>, &str) {
        let Some(captures) = FRONTMATTER_REGEX.captures(markdown) else {
            return (None, markdown);
        };

        let (Some(all), Some(block)) = (captures.get(0), captures.get(1)) else {
            return (None, markdown);
        };

        let frontmatter = match Self::parse(block.as_str()) {
            Ok(frontmatter) => frontmatter,
            Err(err) => {
                warn!("Ignoring malformed frontmatter: {err:#}");
                Self::default()
            }
        };

        (Some(frontmatter), &markdown[all.end()..])
    }

    fn parse(block: &str) -> Result<Self> {
        if block.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(block).wrap_err("Frontmatter is not a valid YAML mapping.")
    }

    pub fn title(&self) -> Option<&str> {
        non_empty(&self.title)
    }

    /// `summary`, falling back to `description`.
    pub fn digest(&self) -> Option<&str> {
        non_empty(&self.summary).or_else(|| non_empty(&self.description))
    }

    pub fn author(&self) -> Option<&str> {
        non_empty(&self.author)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub digest: String,
    pub author: Option<String>,
}

impl Metadata {
    /// Frontmatter fields win; the body supplies whatever they leave out.
    pub fn extract(markdown: &str) -> Self {
        let (frontmatter, body) = Frontmatter::split(markdown);
        let frontmatter = frontmatter.unwrap_or_default();

        let title = frontmatter
            .title()
            .map(str::to_owned)
            .unwrap_or_else(|| extract_title(body));

        let digest = frontmatter
            .digest()
            .map(str::to_owned)
            .unwrap_or_else(|| extract_summary(body, DIGEST_LENGTH));

        let author = frontmatter.author().map(str::to_owned);

        trace!("Extracted metadata: title {title:?}, author {author:?}.");

        Self {
            title,
            digest,
            author,
        }
    }
}

/// The first level-1 heading, else the first non-empty line, else [`FALLBACK_TITLE`].
pub fn extract_title(markdown: &str) -> String {
    if let Some(heading) = TITLE_REGEX.captures(markdown).and_then(|c| c.get(1)) {
        return heading.as_str().to_owned();
    }

    markdown
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(FALLBACK_TITLE)
        .to_owned()
}

/// Plain prose from the body, cut to `max` characters with a trailing ellipsis.
pub fn extract_summary(markdown: &str, max: usize) -> String {
    let content = HEADING_REGEX.replace_all(markdown, "");
    let content = FENCE_REGEX.replace_all(&content, "");
    let content = CODE_REGEX.replace_all(&content, "");
    let content = LINK_REGEX.replace_all(&content, "$1");
    let content = SPACE_REGEX.replace_all(&content, " ");
    let content = content.trim();

    if content.chars().count() <= max {
        return content.to_owned();
    }

    let mut truncated: String = content.chars().take(max.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}
