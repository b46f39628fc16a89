use std::cell::RefCell;

use inkjet::{formatter, Highlighter, Language};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::prelude::*;

/// A syntax highlighter for fenced code.
pub trait Highlight {
    fn supports(&self, lang: &str) -> bool;

    /// Highlights `code` into HTML, with tokens marked up as `<span class="...">`.
    fn highlight(&self, code: &str, lang: &str) -> Result<String>;
}

/// Tree-sitter highlighting via [`inkjet`], with classes renamed to the `hljs-*` vocabulary
/// the code themes are written against.
pub struct Inkjet {
    highlighter: RefCell<Highlighter>,
}

impl Inkjet {
    pub fn new() -> Self {
        Self {
            highlighter: RefCell::new(Highlighter::new()),
        }
    }
}

impl Default for Inkjet {
    fn default() -> Self {
        Self::new()
    }
}

impl Highlight for Inkjet {
    fn supports(&self, lang: &str) -> bool {
        Language::from_token(lang).is_some()
    }

    fn highlight(&self, code: &str, lang: &str) -> Result<String> {
        let Some(language) = Language::from_token(lang) else {
            bail!("No grammar is bundled for language token \"{lang}\".")
        };

        let html = self
            .highlighter
            .borrow_mut()
            .highlight_to_string(language, &formatter::Html, code)
            .wrap_err("An error occurred in the syntax highlighting engine.")?;

        Ok(rename_classes(&html))
    }
}

static CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<span class="([^"]*)">"#).unwrap());

fn rename_classes(html: &str) -> String {
    CLASS
        .replace_all(html, |capture: &regex::Captures| {
            format!(r#"<span class="{}">"#, hljs_class(&capture[1]))
        })
        .into_owned()
}

/// Maps a tree-sitter capture name (`keyword.control`, `hl-function-builtin`, ...) onto one `hljs-*` class.
fn hljs_class(capture: &str) -> String {
    let scope = capture
        .split(|c: char| c.is_whitespace() || c == '.' || c == '-' || c == '_')
        .find(|segment| !segment.is_empty() && *segment != "hl")
        .unwrap_or("text");

    let name = match scope {
        "keyword" | "include" | "conditional" | "repeat" | "exception" => "keyword",
        "string" | "character" => "string",
        "comment" => "comment",
        "function" | "method" | "constructor" | "namespace" | "module" => "title",
        "type" => "type",
        "number" | "float" => "number",
        "constant" | "boolean" => "literal",
        "attribute" => "attr",
        "property" | "field" => "property",
        "variable" | "parameter" => "variable",
        "tag" => "tag",
        "label" => "symbol",
        "escape" => "char",
        "embedded" => "subst",
        "operator" => "operator",
        "punctuation" => "punctuation",
        other => other,
    };

    format!("hljs-{name}")
}

/// Presentation knobs for fenced code.
#[derive(Debug, Clone)]
pub struct CodeStyle {
    /// Adds the three-dot window header and language label.
    pub mac_style: bool,
    /// Used when a fence declares no language.
    pub default_language: String,
}

impl Default for CodeStyle {
    fn default() -> Self {
        Self {
            mac_style: true,
            default_language: DEFAULT_LANGUAGE.to_owned(),
        }
    }
}

fn mac_header(lang: &str) -> String {
    format!(
        "<span class=\"mac-header\">\n  <span class=\"mac-dots\">\n    <span class=\"mac-dot red\"></span>\n    <span class=\"mac-dot yellow\"></span>\n    <span class=\"mac-dot green\"></span>\n  </span>\n  <span class=\"mac-lang\">{}</span>\n</span>",
        html_escape::encode_text(lang)
    )
}

/// Renders one fenced code block to its final `<pre>` markup.
///
/// Highlighted output has its newlines turned into `<br/>` and every whitespace character
/// into `&nbsp;`, since the WeChat editor collapses both. Never fails: an unknown language
/// or a highlighter error yields the escaped, unhighlighted code.
pub fn fence(highlighter: &dyn Highlight, code: &str, lang: &str, style: &CodeStyle) -> String {
    let lang = match lang {
        "" => style.default_language.as_str(),
        lang => lang,
    };
    let class = match style.mac_style {
        true => "custom mac-style",
        false => "custom",
    };

    if highlighter.supports(lang) {
        match highlighter.highlight(code, lang) {
            Ok(html) => {
                let body = html.replace('\n', "<br/>");
                let body = body
                    .chars()
                    .fold(String::with_capacity(body.len()), |mut buffer, c| {
                        match c.is_whitespace() {
                            true => buffer.push_str("&nbsp;"),
                            false => buffer.push(c),
                        }
                        buffer
                    })
                    .replace("span&nbsp;", "span ");

                return match style.mac_style {
                    true => format!(
                        r#"<pre class="{class}">{}<code class="hljs"><span class="mac-body">{body}</span></code></pre>"#,
                        mac_header(lang)
                    ),
                    false => format!(r#"<pre class="{class}"><code class="hljs">{body}</code></pre>"#),
                };
            }
            Err(err) => error!("Highlight error for language \"{lang}\": {err:#}"),
        }
    } else {
        debug!("No highlighting available for language \"{lang}\", emitting plain code.");
    }

    format!(
        r#"<pre class="{class}"><code class="hljs">{}</code></pre>"#,
        html_escape::encode_double_quoted_attribute(code)
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Wraps every word in a keyword span and supports only `rust`.
    pub struct FakeHighlighter;

    impl Highlight for FakeHighlighter {
        fn supports(&self, lang: &str) -> bool {
            lang == "rust" || lang == "bash" || lang == "broken"
        }

        fn highlight(&self, code: &str, lang: &str) -> Result<String> {
            if lang == "broken" {
                bail!("grammar exploded")
            }

            Ok(code
                .split(' ')
                .map(|word| match word {
                    "fn" | "let" => format!(r#"<span class="hljs-keyword">{word}</span>"#),
                    word => word.to_owned(),
                })
                .collect::<Vec<_>>()
                .join(" "))
        }
    }

    #[test]
    fn whitespace_recipe() {
        let html = fence(&FakeHighlighter, "fn main() {\n    let x;\n}", "rust", &CodeStyle {
            mac_style: false,
            ..CodeStyle::default()
        });

        assert_eq!(
            html,
            concat!(
                r#"<pre class="custom"><code class="hljs">"#,
                r#"<span class="hljs-keyword">fn</span>&nbsp;main()&nbsp;{<br/>"#,
                r#"&nbsp;&nbsp;&nbsp;&nbsp;<span class="hljs-keyword">let</span>&nbsp;x;<br/>}"#,
                "</code></pre>"
            )
        );
    }

    #[test]
    fn mac_style_wraps_body() {
        let html = fence(&FakeHighlighter, "let", "rust", &CodeStyle::default());

        assert!(html.starts_with(r#"<pre class="custom mac-style"><span class="mac-header">"#));
        assert!(html.contains(r#"<span class="mac-lang">rust</span>"#));
        assert!(html.ends_with(
            r#"<code class="hljs"><span class="mac-body"><span class="hljs-keyword">let</span></span></code></pre>"#
        ));
    }

    #[test]
    fn missing_language_defaults_to_bash() {
        let html = fence(&FakeHighlighter, "ls", "", &CodeStyle::default());
        assert!(html.contains(r#"<span class="mac-lang">bash</span>"#));
    }

    #[test]
    fn unknown_language_is_escaped_plain_code() {
        let html = fence(&FakeHighlighter, "a < b && c", "foo", &CodeStyle::default());

        assert_eq!(
            html,
            r#"<pre class="custom mac-style"><code class="hljs">a &lt; b &amp;&amp; c</code></pre>"#
        );
    }

    #[test]
    fn highlighter_errors_fall_back() {
        let html = fence(&FakeHighlighter, "x", "broken", &CodeStyle::default());
        assert_eq!(html, r#"<pre class="custom mac-style"><code class="hljs">x</code></pre>"#);
    }

    #[test]
    fn class_renaming() {
        assert_eq!(hljs_class("keyword.control"), "hljs-keyword");
        assert_eq!(hljs_class("hl-function-builtin"), "hljs-title");
        assert_eq!(hljs_class("string"), "hljs-string");
        assert_eq!(hljs_class("markup"), "hljs-markup");
        assert_eq!(
            rename_classes(r#"<span class="comment">// hi</span>"#),
            r#"<span class="hljs-comment">// hi</span>"#
        );
    }
}
