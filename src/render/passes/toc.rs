//! Fills `[toc]` placeholders with a nested list of the document's `h2` and `h3` headings.

use crate::parse::{Kind, Token};
use crate::render::html::escape;

const LEVELS: [&str; 2] = ["h2", "h3"];

pub fn apply(mut tokens: Vec<Token>) -> Vec<Token> {
    let has_marker = tokens
        .iter()
        .any(|t| t.kind == Kind::Inline && t.children.iter().any(|c| c.kind == Kind::Toc));

    if !has_marker {
        return tokens;
    }

    let headings: Vec<(usize, String)> = tokens
        .windows(2)
        .filter(|pair| pair[0].kind == Kind::HeadingOpen && pair[1].kind == Kind::Inline)
        .filter_map(|pair| {
            let level = LEVELS.iter().position(|tag| *tag == pair[0].tag)?;
            Some((level, pair[1].plain_text()))
        })
        .collect();

    let html = format!(r#"<div class="table-of-contents">{}</div>"#, list(&headings));

    for token in tokens.iter_mut().filter(|t| t.kind == Kind::Inline) {
        for child in token.children.iter_mut().filter(|c| c.kind == Kind::Toc) {
            child.content.clone_from(&html);
        }
    }

    tokens
}

fn list(headings: &[(usize, String)]) -> String {
    let Some((base, _)) = headings.first() else {
        return String::new();
    };

    let mut html = String::from("<ul>");
    let mut current = *base;

    for (i, (level, text)) in headings.iter().enumerate() {
        let level = (*level).max(*base);

        if i > 0 {
            if level > current {
                html.push_str(&"<ul>".repeat(level - current));
            } else {
                html.push_str("</li>");
                html.push_str(&"</ul></li>".repeat(current - level));
            }
        }

        html.push_str(&format!(r#"<li><a href="">{}</a>"#, escape(text)));
        current = level;
    }

    html.push_str("</li>");
    html.push_str(&"</ul></li>".repeat(current - base));
    html.push_str("</ul>");
    html
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::parse::{parse, ParseOptions};

    #[test]
    fn nested_list() {
        let markdown = indoc! {"
            [toc]

            # Title
            ## A
            ### B
            ### C
            ## D
            #### Ignored
        "};
        let tokens = apply(parse(markdown, &ParseOptions::default()).tokens);

        assert_eq!(
            tokens[1].children[0].content,
            concat!(
                r#"<div class="table-of-contents"><ul>"#,
                r#"<li><a href="">A</a><ul><li><a href="">B</a></li><li><a href="">C</a></li></ul></li>"#,
                r#"<li><a href="">D</a></li>"#,
                "</ul></div>"
            )
        );
    }

    #[test]
    fn headings_are_read_after_numbering() {
        let parsed = parse("[toc]\n\n## A & B\n", &ParseOptions::default());
        let tokens = crate::render::passes::heading::apply(parsed.tokens, true);
        let tokens = apply(tokens);

        assert_eq!(
            tokens[1].children[0].content,
            r#"<div class="table-of-contents"><ul><li><a href="">A &amp; B</a></li></ul></div>"#
        );
    }

    #[test]
    fn no_headings() {
        let tokens = apply(parse("[toc]", &ParseOptions::default()).tokens);
        assert_eq!(tokens[1].children[0].content, r#"<div class="table-of-contents"></div>"#);
    }
}
