//! The end-to-end conversion: frontmatter stripping, tokenization, the transform passes,
//! serialization, the root wrapper and style inlining.

use std::path::{Path, PathBuf};

use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::inline::{inline, InlineOptions};
use crate::meta::Frontmatter;
use crate::parse::{parse, ParseOptions};
use crate::prelude::*;
use crate::render::{render, FormulaRenderer, Highlight, Inkjet, Katex, RenderOptions};

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub parse: ParseOptions,
    pub render: RenderOptions,
    pub inline: InlineOptions,
}

impl Options {
    pub fn from_config(config: &Config) -> Self {
        let mut options = Self::default();

        options.render.code.mac_style = config.render.mac_style;
        options.render.code.default_language = config.render.default_language.clone();
        options.render.passes.heading_span = config.render.heading_span;

        options
    }
}

/// Wraps rendered HTML in the root section the theme selectors are anchored to.
pub fn wrap(html: &str) -> String {
    format!(r#"<section id="{ROOT_ID}">{html}</section>"#)
}

/// Converts Markdown with fixed collaborators and a preloaded stylesheet.
///
/// Holds no state between calls besides the highlighter's grammar cache.
pub struct Converter<H = Inkjet, F = Katex> {
    highlighter: H,
    typesetter: F,
    css: String,
    options: Options,
}

impl Converter {
    pub fn new(css: String, options: Options) -> Self {
        Self::with(Inkjet::new(), Katex, css, options)
    }
}

impl<H: Highlight, F: FormulaRenderer> Converter<H, F> {
    pub fn with(highlighter: H, typesetter: F, css: String, options: Options) -> Self {
        Self {
            highlighter,
            typesetter,
            css,
            options,
        }
    }

    /// The rendered document body, before wrapping and inlining.
    pub fn render(&self, markdown: &str) -> String {
        let (_, body) = Frontmatter::split(markdown);
        let parsed = parse(body, &self.options.parse);
        trace!("Parsed {} top-level tokens.", parsed.tokens.len());

        render(parsed, &self.highlighter, &self.typesetter, &self.options.render)
    }

    pub fn convert(&self, markdown: &str) -> Result<String> {
        let html = wrap(&self.render(markdown));

        inline(&html, &self.css, &self.options.inline).wrap_err("Failed to inline theme styles.")
    }

    pub fn convert_file(&self, input: &Path, output: &Path) -> Result<()> {
        let markdown = std::fs::read_to_string(input)
            .wrap_err_with(|| format!("Could not read {}.", input.display()))?;

        let html = self
            .convert(&markdown)
            .wrap_err_with(|| format!("Could not convert {}.", input.display()))?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(output, html)
            .wrap_err_with(|| format!("Could not write {}.", output.display()))?;

        info!("Converted {} to {}.", input.display(), output.display());
        Ok(())
    }
}

/// Converts a Markdown string with the production collaborators.
pub fn convert(markdown: &str, css: &str, options: &Options) -> Result<String> {
    Converter::new(css.to_owned(), options.clone()).convert(markdown)
}

/// Where the HTML for `input` goes: `output` itself for a file, `output/<stem>.html` when
/// `output` is a directory, or beside the input.
pub fn output_path(input: &Path, output: Option<&Path>) -> PathBuf {
    let name = input.with_extension("html");
    let name = name.file_name().map(PathBuf::from).unwrap_or_default();

    match output {
        Some(dir) if dir.is_dir() => dir.join(name),
        Some(file) => file.to_path_buf(),
        None => input.with_extension("html"),
    }
}

/// Every `*.md` file beneath `dir`, sorted for stable output.
pub fn markdown_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry while walking {}: {err}", dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("md")))
        .collect();

    files.sort_unstable();
    files
}

/// Converts every Markdown file beneath `dir` in parallel, mirroring the directory layout
/// under `output` when given. Each worker gets its own [`Converter`].
pub fn convert_dir(dir: &Path, output: Option<&Path>, css: &str, options: &Options) -> Result<usize> {
    let files = markdown_files(dir);
    info!("Found {} Markdown file(s) under {}.", files.len(), dir.display());

    let bar = batch_bar(files.len());

    let results: Vec<Result<()>> = files
        .par_iter()
        .progress_with(bar)
        .map_init(
            || Converter::new(css.to_owned(), options.clone()),
            |converter, input| {
                let target = match output {
                    Some(root) => {
                        let relative = input.strip_prefix(dir).unwrap_or(input);
                        root.join(relative).with_extension("html")
                    }
                    None => input.with_extension("html"),
                };
                converter.convert_file(input, &target)
            },
        )
        .collect();

    let mut converted = 0;
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(()) => converted += 1,
            Err(err) => failures.push(err),
        }
    }

    match failures.len() {
        0 => Ok(converted),
        count => {
            for err in &failures[1..] {
                error!("{err:?}");
            }
            let first = failures.swap_remove(0);
            Err(first.wrap_err(format!("{count} of {} file(s) failed to convert.", files.len())))
        }
    }
}
