use crate::prelude::*;

/// Renders TeX formula source to HTML.
pub trait FormulaRenderer {
    fn render(&self, source: &str, display: bool) -> Result<String>;
}

/// KaTeX, run through the [`katex`] crate's embedded JavaScript engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct Katex;

impl FormulaRenderer for Katex {
    fn render(&self, source: &str, display: bool) -> Result<String> {
        let opts = katex::Opts::builder()
            .display_mode(display)
            .build()
            .wrap_err("Failed to build KaTeX options.")?;

        katex::render_with_opts(source, &opts)
            .wrap_err_with(|| format!("KaTeX could not render formula \"{source}\"."))
    }
}

/// Renders a formula, falling back to its escaped source if the renderer rejects it.
pub fn formula(renderer: &dyn FormulaRenderer, source: &str, display: bool) -> String {
    match renderer.render(source, display) {
        Ok(html) => html,
        Err(err) => {
            warn!("{err:#}");
            html_escape::encode_double_quoted_attribute(source).into_owned()
        }
    }
}
