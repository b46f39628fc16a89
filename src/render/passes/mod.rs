//! Structural rewrites over the token stream.
//!
//! Each pass takes the stream by value and hands back the rewritten one. They run in a fixed
//! order, once per conversion, and keep all of their state on the stack.

pub mod figure;
pub mod heading;
pub mod list_item;
pub mod math;
pub mod multiquote;
pub mod table;
pub mod toc;

use crate::parse::{Formulas, Token};

#[derive(Debug, Clone, Copy)]
pub struct PassOptions {
    /// Wraps heading content in `content`/`suffix` spans.
    pub heading_span: bool,
    /// Turns lone images into `<figure>`s captioned with their alt text.
    pub figures: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            heading_span: true,
            figures: true,
        }
    }
}

/// Runs every token-stream pass in order.
/// List items are restructured at render time instead; see [`list_item::install`].
pub fn run(tokens: Vec<Token>, formulas: &Formulas, options: &PassOptions) -> Vec<Token> {
    let tokens = math::apply(tokens, formulas);
    let tokens = multiquote::apply(tokens);
    let tokens = heading::apply(tokens, options.heading_span);
    let tokens = table::apply(tokens);

    let tokens = match options.figures {
        true => figure::apply(tokens),
        false => tokens,
    };

    toc::apply(tokens)
}
