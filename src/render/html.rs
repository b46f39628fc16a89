//! Token stream serialization.
//!
//! Output matches what markdown-it produces for the same stream: block tokens are followed
//! by a newline unless their content is inline, hidden paragraphs vanish without a trace,
//! and every attribute value and text run is escaped.

use std::borrow::Cow;

use ahash::AHashMap;

use crate::parse::{Kind, Nesting, Token};

/// A rendering override for one token kind. Receives the whole stream and the token's index.
pub type Rule<'r> = Box<dyn Fn(&[Token], usize) -> String + 'r>;

pub fn escape(text: &str) -> Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(text)
}

#[derive(Default)]
pub struct Renderer<'r> {
    rules: AHashMap<Kind, Rule<'r>>,
}

impl<'r> Renderer<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `rule` for `kind`, replacing the default rendering and any earlier override.
    pub fn rule(&mut self, kind: Kind, rule: impl Fn(&[Token], usize) -> String + 'r) -> &mut Self {
        self.rules.insert(kind, Box::new(rule));
        self
    }

    pub fn render(&self, tokens: &[Token]) -> String {
        let mut buffer = String::new();

        for (idx, token) in tokens.iter().enumerate() {
            match token.kind {
                Kind::Inline => buffer.push_str(&self.render_inline(&token.children)),
                _ => buffer.push_str(&self.render_one(tokens, idx)),
            }
        }

        buffer
    }

    pub fn render_inline(&self, tokens: &[Token]) -> String {
        (0..tokens.len()).map(|idx| self.render_one(tokens, idx)).collect()
    }

    fn render_one(&self, tokens: &[Token], idx: usize) -> String {
        match self.rules.get(&tokens[idx].kind) {
            Some(rule) => rule(tokens, idx),
            None => default_rule(tokens, idx),
        }
    }
}

fn default_rule(tokens: &[Token], idx: usize) -> String {
    let token = &tokens[idx];

    match token.kind {
        Kind::Text => escape(&token.content).into_owned(),
        Kind::Softbreak => "\n".to_owned(),
        Kind::Hardbreak => "<br>\n".to_owned(),
        Kind::HtmlBlock | Kind::HtmlInline | Kind::Toc => token.content.clone(),
        Kind::CodeInline => format!(
            "<code{}>{}</code>",
            render_attrs(token),
            escape(&token.content)
        ),
        Kind::CodeBlock => format!(
            "<pre{}><code>{}</code></pre>\n",
            render_attrs(token),
            escape(&token.content)
        ),
        Kind::Fence => {
            let lang = token.info.split_whitespace().next().unwrap_or_default();
            let class = match lang {
                "" => String::new(),
                lang => format!(r#" class="language-{}""#, escape(lang)),
            };
            format!("<pre><code{class}>{}</code></pre>\n", escape(&token.content))
        }
        Kind::MathInline => escape(&token.content).into_owned(),
        Kind::MathBlock => format!("{}\n", escape(&token.content)),
        _ => render_token(tokens, idx),
    }
}

fn render_attrs(token: &Token) -> String {
    token
        .attrs
        .iter()
        .map(|(name, value)| format!(r#" {}="{}""#, escape(name), escape(value)))
        .collect()
}

/// Generic tag serialization.
pub fn render_token(tokens: &[Token], idx: usize) -> String {
    let token = &tokens[idx];

    if token.hidden {
        return String::new();
    }

    let mut buffer = String::new();
    let nesting = token.nesting();

    // Tight list paragraphs leave no newline behind; make up for it before the next block.
    if token.block && nesting != Nesting::Close && idx > 0 && tokens[idx - 1].hidden {
        buffer.push('\n');
    }

    buffer.push_str(match nesting {
        Nesting::Close => "</",
        _ => "<",
    });
    buffer.push_str(token.tag);
    buffer.push_str(&render_attrs(token));

    let mut need_lf = false;
    if token.block {
        need_lf = true;

        if nesting == Nesting::Open {
            if let Some(next) = tokens.get(idx + 1) {
                if next.kind == Kind::Inline || next.hidden {
                    need_lf = false;
                } else if next.nesting() == Nesting::Close && next.tag == token.tag {
                    need_lf = false;
                }
            }
        }
    }

    buffer.push_str(match need_lf {
        true => ">\n",
        false => ">",
    });

    buffer
}
