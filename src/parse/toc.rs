//! The `[toc]` marker.
//!
//! Only the marker is recognized here; the heading list is built once the transform passes
//! have run (see [`crate::render::passes::toc`]).

use super::{Kind, Token};

const MARKER: &str = "[toc]";

fn starts_with_marker(text: &str) -> bool {
    text.get(..MARKER.len()).is_some_and(|head| head.eq_ignore_ascii_case(MARKER))
}

/// Replaces each marker that opens a line, along with the rest of that line, with a `Toc` token.
pub fn mark(tokens: &mut [Token]) {
    for token in tokens.iter_mut().filter(|t| t.kind == Kind::Inline) {
        if token.children.iter().any(|c| c.kind == Kind::Text && c.content.to_ascii_lowercase().contains(MARKER)) {
            token.children = replace(std::mem::take(&mut token.children));
        }
    }
}

fn replace(children: Vec<Token>) -> Vec<Token> {
    let mut output = Vec::with_capacity(children.len());
    let mut line_start = true;
    let mut skipping = false;

    for child in children {
        let is_break = matches!(child.kind, Kind::Softbreak | Kind::Hardbreak);

        if skipping && !is_break {
            continue;
        }
        skipping = false;

        if line_start && child.kind == Kind::Text && starts_with_marker(&child.content) {
            let mut toc = Token::new(Kind::Toc);
            toc.markup = MARKER.to_owned();
            output.push(toc);
            skipping = true;
            line_start = false;
            continue;
        }

        line_start = is_break;
        output.push(child);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, ParseOptions};

    #[test]
    fn marker_alone() {
        let tokens = parse("[TOC]\n\n## A\n", &ParseOptions::default()).tokens;
        let children = &tokens[1].children;

        assert_eq!(children.len(), 1);
        assert_eq!(children[0].kind, Kind::Toc);
    }

    #[test]
    fn rest_of_the_line_is_dropped() {
        let tokens = parse("[toc] trailing *text*\nnext line", &ParseOptions::default()).tokens;
        let kinds: Vec<Kind> = tokens[1].children.iter().map(|t| t.kind).collect();

        assert_eq!(kinds, vec![Kind::Toc, Kind::Softbreak, Kind::Text]);
    }

    #[test]
    fn marker_must_open_the_line() {
        let tokens = parse("see [toc]", &ParseOptions::default()).tokens;
        assert!(tokens[1].children.iter().all(|t| t.kind != Kind::Toc));
    }
}
