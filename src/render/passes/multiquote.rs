//! Tags each outermost blockquote with the deepest nesting reached inside it.

use crate::parse::{Kind, Token};

pub fn apply(mut tokens: Vec<Token>) -> Vec<Token> {
    let mut depth = 0;
    let mut peak = 0;
    let mut outer = 0;

    for i in 0..tokens.len() {
        match tokens[i].kind {
            Kind::BlockquoteOpen => {
                if depth == 0 {
                    outer = i;
                    peak = 0;
                }
                depth += 1;
                peak = peak.max(depth);
            }
            Kind::BlockquoteClose if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    tokens[outer].set_attr("class", format!("multiquote-{peak}"));
                }
            }
            _ => (),
        }
    }

    tokens
}
