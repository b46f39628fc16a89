//! Heading numbering.
//!
//! `h2`s are numbered `1.`, `2.`, ...; `h3`s continue their section as `1.1`, `1.2`, ... and
//! restart at every `h2`. Other levels get an empty prefix so themes can still style it.

use crate::parse::{Kind, Token};

pub fn apply(mut tokens: Vec<Token>, heading_span: bool) -> Vec<Token> {
    let mut h2 = 0;
    let mut h3 = 0;
    let mut section = 0;

    let mut i = 0;
    while i + 1 < tokens.len() {
        if tokens[i].kind != Kind::HeadingOpen || tokens[i + 1].kind != Kind::Inline {
            i += 1;
            continue;
        }

        if tokens[i + 1].content.is_empty() {
            i += 1;
            continue;
        }

        let prefix = match tokens[i].tag {
            "h2" => {
                h2 += 1;
                section = h2;
                h3 = 0;
                format!(r#"<span class="prefix">{h2}. </span>"#)
            }
            "h3" => {
                h3 += 1;
                format!(r#"<span class="prefix"><span class="prefix-square"></span>{section}.{h3} </span>"#)
            }
            _ => r#"<span class="prefix"></span>"#.to_owned(),
        };

        let children = &mut tokens[i + 1].children;
        match heading_span {
            true => {
                children.insert(0, Token::html_inline(format!(r#"{prefix}<span class="content">"#)));
                children.push(Token::html_inline(r#"</span><span class="suffix"></span>"#));
            }
            false => children.insert(0, Token::html_inline(prefix)),
        }

        // Past the inline and heading_close tokens.
        i += 3;
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, ParseOptions};

    fn prefixes(markdown: &str) -> Vec<String> {
        let tokens = apply(parse(markdown, &ParseOptions::default()).tokens, true);

        tokens
            .iter()
            .filter(|t| t.kind == Kind::Inline)
            .map(|t| t.children[0].content.clone())
            .collect()
    }

    #[test]
    fn numbering() {
        assert_eq!(
            prefixes("## A\n### B\n## C\n### D"),
            vec![
                r#"<span class="prefix">1. </span><span class="content">"#,
                r#"<span class="prefix"><span class="prefix-square"></span>1.1 </span><span class="content">"#,
                r#"<span class="prefix">2. </span><span class="content">"#,
                r#"<span class="prefix"><span class="prefix-square"></span>2.1 </span><span class="content">"#,
            ]
        );
    }

    #[test]
    fn other_levels_get_empty_prefix() {
        assert_eq!(
            prefixes("# Title\n#### Deep"),
            vec![
                r#"<span class="prefix"></span><span class="content">"#,
                r#"<span class="prefix"></span><span class="content">"#,
            ]
        );
    }

    #[test]
    fn content_is_wrapped() {
        let tokens = apply(parse("## Hi *there*", &ParseOptions::default()).tokens, true);
        let children = &tokens[1].children;

        assert_eq!(children.len(), 6);
        assert_eq!(children[5].content, r#"</span><span class="suffix"></span>"#);
    }

    #[test]
    fn prefix_only_without_span() {
        let tokens = apply(parse("## Hi", &ParseOptions::default()).tokens, false);
        let children = &tokens[1].children;

        assert_eq!(children.len(), 2);
        assert_eq!(children[0].content, r#"<span class="prefix">1. </span>"#);
    }

    #[test]
    fn empty_headings_are_skipped() {
        let tokens = apply(parse("##\n## A", &ParseOptions::default()).tokens, true);

        assert!(tokens[1].children.is_empty());
        assert_eq!(tokens[4].children[0].content, r#"<span class="prefix">1. </span><span class="content">"#);
    }
}
