//! Definition lists.
//!
//! ```markdown
//! Term
//! : Definition
//! ~ Another definition
//! ```
//!
//! A definition may also open the paragraph right after its term, which makes the list loose.

use super::{Kind, Token};

fn is_marker(line: &[Token]) -> bool {
    match line.first() {
        Some(first) if first.kind == Kind::Text => {
            let bytes = first.content.as_bytes();
            matches!(bytes.first(), Some(b':' | b'~')) && matches!(bytes.get(1), Some(b' ' | b'\t'))
        }
        _ => false,
    }
}

fn strip_marker(mut line: Vec<Token>) -> Vec<Token> {
    if let Some(first) = line.first_mut() {
        first.content = first.content[1..].trim_start().to_owned();
        if first.content.is_empty() {
            line.remove(0);
        }
    }
    line
}

/// Splits inline children on soft breaks.
fn split_lines(children: Vec<Token>) -> Vec<Vec<Token>> {
    let mut lines = vec![Vec::new()];

    for child in children {
        match child.kind {
            Kind::Softbreak => lines.push(Vec::new()),
            _ => {
                if let Some(line) = lines.last_mut() {
                    line.push(child);
                }
            }
        }
    }

    lines
}

fn join_lines(lines: Vec<Vec<Token>>) -> Vec<Token> {
    let mut children = Vec::new();

    for (i, line) in lines.into_iter().enumerate() {
        if i > 0 {
            children.push(Token::new(Kind::Softbreak));
        }
        children.extend(line);
    }

    children
}

fn inline(children: Vec<Token>) -> Token {
    let mut token = Token::new(Kind::Inline);
    token.children = children;
    token.content = token.plain_text();
    token
}

/// Groups lines into definitions: each marker line starts a new one, other lines continue it.
fn definitions(lines: Vec<Vec<Token>>) -> Vec<Vec<Vec<Token>>> {
    let mut groups: Vec<Vec<Vec<Token>>> = Vec::new();

    for line in lines {
        match (is_marker(&line), groups.last_mut()) {
            (false, Some(group)) => group.push(line),
            _ => groups.push(vec![strip_marker(line)]),
        }
    }

    groups
}

fn is_paragraph(tokens: &[Token], at: usize) -> bool {
    matches!(
        (tokens.get(at), tokens.get(at + 1), tokens.get(at + 2)),
        (Some(open), Some(inline), Some(close))
            if open.kind == Kind::ParagraphOpen
            && !open.hidden
            && inline.kind == Kind::Inline
            && close.kind == Kind::ParagraphClose
    )
}

fn push_term(output: &mut Vec<Token>, term: Vec<Token>) {
    output.push(Token::new(Kind::DtOpen));
    output.push(inline(term));
    output.push(Token::new(Kind::DtClose));
}

/// The replacement for the definition list starting at `at`, and how many tokens it consumes.
fn rewrite(tokens: &[Token], at: usize) -> Option<(usize, Vec<Token>)> {
    if !is_paragraph(tokens, at) {
        return None;
    }

    let mut open = Token::new(Kind::DlOpen);
    open.map = tokens[at].map;
    let mut output = vec![open];

    let mut lines = split_lines(tokens[at + 1].children.clone());
    let first_marker = lines.iter().position(|line| is_marker(line));

    // Tight: the term and its definitions share one paragraph.
    if let Some(split) = first_marker.filter(|split| *split > 0) {
        let rest = lines.split_off(split);

        push_term(&mut output, join_lines(lines));
        for definition in definitions(rest) {
            output.push(Token::new(Kind::DdOpen));
            output.push(inline(join_lines(definition)));
            output.push(Token::new(Kind::DdClose));
        }
        output.push(Token::new(Kind::DlClose));

        return Some((3, output));
    }

    // Loose: the definitions open the next paragraph.
    if first_marker.is_some() || !is_paragraph(tokens, at + 3) {
        return None;
    }

    let next = split_lines(tokens[at + 4].children.clone());
    if !next.first().is_some_and(|line| is_marker(line)) {
        return None;
    }

    push_term(&mut output, tokens[at + 1].children.clone());
    for definition in definitions(next) {
        output.push(Token::new(Kind::DdOpen));
        output.push(Token::new(Kind::ParagraphOpen));
        output.push(inline(join_lines(definition)));
        output.push(Token::new(Kind::ParagraphClose));
        output.push(Token::new(Kind::DdClose));
    }
    output.push(Token::new(Kind::DlClose));

    Some((6, output))
}

pub fn apply(mut tokens: Vec<Token>) -> Vec<Token> {
    let mut i = 0;

    while i < tokens.len() {
        match rewrite(&tokens, i) {
            Some((consumed, replacement)) => {
                let len = replacement.len();
                tokens.splice(i..i + consumed, replacement);
                i += len;
            }
            None => i += 1,
        }
    }

    // Back-to-back lists are one list.
    let mut i = 1;
    while i < tokens.len() {
        if tokens[i - 1].kind == Kind::DlClose && tokens[i].kind == Kind::DlOpen {
            tokens.drain(i - 1..=i);
        } else {
            i += 1;
        }
    }

    tokens
}
