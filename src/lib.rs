//! Markdown to WeChat-ready HTML.
//!
//! The conversion is a strict sequential pipeline:
//! 1. Tokenization ([`parse`]), which runs `pulldown-cmark` and adapts its events into a flat token stream.
//! 2. Transform passes ([`render::passes`]), applied in a fixed order over the owned stream.
//! 3. Serialization ([`render::Renderer`]), with code highlighting and formula rendering plugged in.
//! 4. Style inlining ([`inline`]), which folds the theme stylesheets into `style` attributes.
//!
//! Every call builds its own pass chain; nothing mutable is shared between conversions.

#![warn(clippy::perf, clippy::style)]

pub mod common;
pub mod convert;
pub mod inline;
pub mod meta;
pub mod parse;
pub mod publish;
pub mod render;
pub mod theme;

pub mod prelude {
    pub use color_eyre::eyre::{bail, ensure, eyre, ContextCompat, Report, Result, WrapErr};
    pub use color_eyre::Section;
    pub use tracing::{debug, error, info, trace, warn};

    pub use crate::common::*;
}

pub use convert::{convert, Converter};
pub use render::{FormulaRenderer, Highlight, Inkjet, Katex};
