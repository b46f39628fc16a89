//! Wraps every table in a horizontally scrollable container.

use crate::parse::{Kind, Token};

pub fn apply(tokens: Vec<Token>) -> Vec<Token> {
    let mut output = Vec::with_capacity(tokens.len());

    for token in tokens {
        match token.kind {
            Kind::TableOpen => {
                output.push(Token::html_inline(r#"<section class="table-container">"#));
                output.push(token);
            }
            Kind::TableClose => {
                output.push(token);
                output.push(Token::html_inline("</section>"));
            }
            _ => output.push(token),
        }
    }

    output
}
