//! Turns formula sentinels into formula tokens.
//!
//! Inline sentinels become `MathInline` tokens in place. A block sentinel sits on its own line
//! inside a paragraph, so that paragraph is split around it and the formula is lifted out as a
//! `MathBlock`. Sentinels anywhere a formula cannot be rendered get their source text back.

use crate::parse::{Formulas, Kind, Segment, Token};

pub fn apply(tokens: Vec<Token>, formulas: &Formulas) -> Vec<Token> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stream = tokens.into_iter();

    while let Some(token) = stream.next() {
        if token.kind != Kind::ParagraphOpen {
            output.push(materialize(token, formulas));
            continue;
        }

        match (stream.next(), stream.next()) {
            (Some(inline), Some(close)) if inline.kind == Kind::Inline => {
                paragraph(token, inline, close, formulas, &mut output);
            }
            (inline, close) => {
                output.push(token);
                output.extend(inline.into_iter().chain(close).map(|t| materialize(t, formulas)));
            }
        }
    }

    output
}

fn is_display(token: &Token) -> bool {
    token.kind == Kind::MathInline && token.markup == "$$"
}

fn paragraph(open: Token, mut inline: Token, close: Token, formulas: &Formulas, output: &mut Vec<Token>) {
    inline = materialize(inline, formulas);

    if !inline.children.iter().any(is_display) {
        output.extend([open, inline, close]);
        return;
    }

    let mut run = Vec::new();
    for child in std::mem::take(&mut inline.children) {
        if !is_display(&child) {
            run.push(child);
            continue;
        }

        flush(&open, &close, &mut run, output);

        let mut block = Token::with_content(Kind::MathBlock, child.content);
        block.markup = "$$".to_owned();
        block.map = open.map;
        output.push(block);
    }
    flush(&open, &close, &mut run, output);
}

/// Emits the pending inline run as a paragraph of its own, minus the line breaks around it.
fn flush(open: &Token, close: &Token, run: &mut Vec<Token>, output: &mut Vec<Token>) {
    let is_break = |t: &Token| matches!(t.kind, Kind::Softbreak | Kind::Hardbreak);

    while run.last().is_some_and(is_break) {
        run.pop();
    }
    let start = run.iter().take_while(|t| is_break(t)).count();
    run.drain(..start);

    if run.is_empty() {
        return;
    }

    let mut inline = Token::new(Kind::Inline);
    inline.children = std::mem::take(run);
    inline.content = inline.plain_text();

    output.extend([open.clone(), inline, close.clone()]);
}

fn materialize(mut token: Token, formulas: &Formulas) -> Token {
    for (_, value) in &mut token.attrs {
        *value = formulas.restore(value).into_owned();
    }

    match token.kind {
        Kind::Inline | Kind::Image => {
            token.content = formulas.restore(&token.content).into_owned();
            token.children = children(std::mem::take(&mut token.children), formulas);
        }
        Kind::CodeInline | Kind::CodeBlock | Kind::Fence | Kind::HtmlBlock | Kind::HtmlInline => {
            token.content = formulas.restore(&token.content).into_owned();
        }
        _ => (),
    }

    token
}

fn children(tokens: Vec<Token>, formulas: &Formulas) -> Vec<Token> {
    let mut output = Vec::with_capacity(tokens.len());

    for token in tokens {
        if token.kind != Kind::Text {
            output.push(materialize(token, formulas));
            continue;
        }

        for segment in formulas.segments(&token.content) {
            match segment {
                Segment::Text(text) => output.push(Token::with_content(Kind::Text, text)),
                Segment::Formula(index) => {
                    let Some(formula) = formulas.get(index) else {
                        continue;
                    };

                    let mut math = Token::with_content(Kind::MathInline, formula.source.clone());
                    math.markup = match formula.display {
                        true => "$$",
                        false => "$",
                    }
                    .to_owned();
                    output.push(math);
                }
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, ParseOptions};

    fn run(markdown: &str) -> Vec<Token> {
        let parsed = parse(markdown, &ParseOptions::default());
        apply(parsed.tokens, &parsed.formulas)
    }

    fn kinds(tokens: &[Token]) -> Vec<Kind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn inline_formula_becomes_token() {
        let tokens = run("Energy $E=mc^2$ here");
        let children = &tokens[1].children;

        assert_eq!(kinds(children), vec![Kind::Text, Kind::MathInline, Kind::Text]);
        assert_eq!(children[1].content, "E=mc^2");
        assert_eq!(children[1].markup, "$");
        assert_eq!(tokens[1].content, "Energy $E=mc^2$ here");
    }

    #[test]
    fn block_formula_splits_paragraph() {
        let tokens = run("Before\n$$\nx^2\n$$\nAfter\n");

        assert_eq!(
            kinds(&tokens),
            vec![
                Kind::ParagraphOpen,
                Kind::Inline,
                Kind::ParagraphClose,
                Kind::MathBlock,
                Kind::ParagraphOpen,
                Kind::Inline,
                Kind::ParagraphClose,
            ]
        );
        assert_eq!(tokens[1].content, "Before");
        assert_eq!(tokens[3].content, "x^2\n");
        assert_eq!(tokens[5].content, "After");
    }

    #[test]
    fn lone_block_formula_replaces_paragraph() {
        let tokens = run("$$\\sum_{i=1}^{n} x_i$$");

        assert_eq!(kinds(&tokens), vec![Kind::MathBlock]);
        assert_eq!(tokens[0].content, "\\sum_{i=1}^{n} x_i\n");
    }

    #[test]
    fn sentinels_in_urls_are_restored() {
        let tokens = run("[link](https://x.com/$a$)");
        let link = &tokens[1].children[0];

        assert_eq!(link.attr("href"), Some("https://x.com/$a$"));
    }

    #[test]
    fn sentinels_in_html_are_restored() {
        let tokens = run("a <span title=\"$x$\">b</span>");
        let html = tokens[1].children.iter().find(|t| t.kind == Kind::HtmlInline).unwrap();

        assert_eq!(html.content, "<span title=\"$x$\">");
    }

    #[test]
    fn block_formula_in_tight_list_keeps_hidden_paragraphs() {
        let tokens = run("- item\n  $$\n  x\n  $$\n");

        let block = tokens.iter().position(|t| t.kind == Kind::MathBlock).unwrap();
        assert!(tokens[block - 1].hidden);
        assert_eq!(tokens[block - 1].kind, Kind::ParagraphClose);
    }
}
