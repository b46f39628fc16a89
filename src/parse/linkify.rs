//! Bare URL recognition in text runs.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Kind, Token};

static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>\x{E000}\x{E001}]*[^\s<>\x{E000}\x{E001}.,:;!?'\x22)\]]")
        .unwrap()
});

/// Links every bare URL found in text outside of existing links.
pub fn apply(tokens: &mut [Token]) {
    for token in tokens.iter_mut().filter(|t| t.kind == Kind::Inline) {
        token.children = linkify(std::mem::take(&mut token.children));
    }
}

fn linkify(children: Vec<Token>) -> Vec<Token> {
    let mut output = Vec::with_capacity(children.len());
    let mut depth = 0usize;

    for child in children {
        match child.kind {
            Kind::LinkOpen => depth += 1,
            Kind::LinkClose => depth = depth.saturating_sub(1),
            Kind::Text if depth == 0 && URL.is_match(&child.content) => {
                split(&child.content, &mut output);
                continue;
            }
            _ => (),
        }
        output.push(child);
    }

    output
}

fn split(text: &str, output: &mut Vec<Token>) {
    let mut last = 0;

    for found in URL.find_iter(text) {
        if found.start() > last {
            output.push(Token::with_content(Kind::Text, &text[last..found.start()]));
        }

        let url = found.as_str();
        let href = match url.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("www.") => format!("http://{url}"),
            _ => url.to_owned(),
        };

        let mut open = Token::new(Kind::LinkOpen);
        open.set_attr("href", href);
        open.markup = "linkify".to_owned();
        output.push(open);
        output.push(Token::with_content(Kind::Text, url));
        let mut close = Token::new(Kind::LinkClose);
        close.markup = "linkify".to_owned();
        output.push(close);

        last = found.end();
    }

    if last < text.len() {
        output.push(Token::with_content(Kind::Text, &text[last..]));
    }
}
