//! Folds stylesheet rules into `style` attributes.
//!
//! Matching is delegated to `lol_html`: every usable selector gets a handler that records a
//! match for the current element, registered in cascade order (specificity, then source
//! order). A final catch-all handler runs after them on each element and resolves the
//! recorded matches, plus any existing `style` attribute, into the inline declarations.

pub mod css;

use std::borrow::Cow;
use std::cell::RefCell;

use lol_html::html_content::{ContentType, Element};
use lol_html::{element, text, ElementContentHandlers, HtmlRewriter, Selector, Settings};

use self::css::{Declaration, Item, Pseudo, Specificity, Stylesheet};
use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct InlineOptions {
    /// Synthesize `::before`/`::after` rules as leading and trailing `<span>`s.
    pub inline_pseudo_elements: bool,
    /// Keep the `!important` marker in the written declarations.
    pub preserve_important: bool,
    pub remove_style_tags: bool,
    pub preserve_fonts: bool,
    pub preserve_media_queries: bool,
}

impl Default for InlineOptions {
    fn default() -> Self {
        Self {
            inline_pseudo_elements: true,
            preserve_important: true,
            remove_style_tags: true,
            preserve_fonts: false,
            preserve_media_queries: false,
        }
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// One selector of one rule, ready to be matched.
struct Entry<'c> {
    selector: Selector,
    pseudo: Option<Pseudo>,
    specificity: Specificity,
    order: usize,
    declarations: &'c [Declaration<'c>],
}

/// Declarations resolved for one element, in first-seen property order.
#[derive(Debug, Default)]
struct Cascade {
    declarations: Vec<(String, String, bool)>,
}

impl Cascade {
    /// Declarations must arrive in ascending precedence; a normal declaration never
    /// overrides an important one.
    fn apply(&mut self, declaration: &Declaration) {
        let property = declaration.property.to_ascii_lowercase();
        let value = declaration.value.to_owned();

        match self.declarations.iter_mut().find(|(p, ..)| *p == property) {
            Some((_, _, true)) if !declaration.important => (),
            Some(existing) => *existing = (property, value, declaration.important),
            None => self.declarations.push((property, value, declaration.important)),
        }
    }

    fn take(&mut self, property: &str) -> Option<String> {
        let at = self.declarations.iter().position(|(p, ..)| p == property)?;
        Some(self.declarations.remove(at).1)
    }

    fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    fn to_style(&self, preserve_important: bool) -> String {
        self.declarations
            .iter()
            .map(|(property, value, important)| {
                let marker = match *important && preserve_important {
                    true => " !important",
                    false => "",
                };
                format!("{property}: {}{marker};", value.replace('"', "'"))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Inlines `css`, plus the contents of any `<style>` elements in `html`, into `html`.
pub fn inline(html: &str, css: &str, options: &InlineOptions) -> Result<String> {
    let mut source = css.to_owned();
    source.push('\n');
    source.push_str(&embedded_styles(html)?);

    let source = css::strip_comments(&source);
    let sheet = Stylesheet::parse(&source);

    let mut preserved = Vec::new();
    let mut entries = Vec::new();

    for item in &sheet.items {
        match item {
            Item::Rule(rule) => {
                for selector in &rule.selectors {
                    if let Some(entry) = prepare(selector, &rule.declarations, entries.len(), options) {
                        entries.push(entry);
                    }
                }
            }
            Item::AtRule(at) if at.is("media") && options.preserve_media_queries => {
                preserved.push(at.to_css())
            }
            Item::AtRule(at) if at.is("font-face") && options.preserve_fonts => {
                preserved.push(at.to_css())
            }
            Item::AtRule(at) => debug!("Dropping @{} rule.", at.name),
        }
    }

    entries.sort_by_key(|entry| (entry.specificity, entry.order));
    debug!("Inlining {} selector(s).", entries.len());

    let mut output = rewrite(html, &entries, options)?;

    if !preserved.is_empty() {
        output.insert_str(0, &format!("<style>{}</style>", preserved.join("\n")));
    }

    Ok(output)
}

fn prepare<'c>(
    selector: &str,
    declarations: &'c [Declaration<'c>],
    order: usize,
    options: &InlineOptions,
) -> Option<Entry<'c>> {
    let Some((base, pseudo)) = css::split_pseudo(selector) else {
        debug!("Skipping selector \"{selector}\": pseudo-element cannot be inlined.");
        return None;
    };

    if pseudo.is_some() && !options.inline_pseudo_elements {
        return None;
    }

    let base = match base {
        "" => "*",
        base => base,
    };

    match base.parse::<Selector>() {
        Ok(parsed) => Some(Entry {
            selector: parsed,
            pseudo,
            specificity: css::specificity(selector),
            order,
            declarations,
        }),
        Err(err) => {
            debug!("Skipping selector \"{selector}\": {err}.");
            None
        }
    }
}

fn embedded_styles(html: &str) -> Result<String> {
    let mut css = String::new();
    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![text!("style", |chunk| {
                    css.push_str(chunk.as_str());
                    Ok(())
                })],
                ..Settings::default()
            },
            |_: &[u8]| (),
        );
        rewriter.write(html.as_bytes())?;
        rewriter.end()?;
    }
    Ok(css)
}

fn rewrite(html: &str, entries: &[Entry], options: &InlineOptions) -> Result<String> {
    let matched: RefCell<Vec<usize>> = RefCell::new(Vec::new());

    let mut handlers: Vec<(Cow<Selector>, ElementContentHandlers)> = entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let matched = &matched;
            (
                Cow::Borrowed(&entry.selector),
                ElementContentHandlers::default().element(move |_| {
                    matched.borrow_mut().push(idx);
                    Ok(())
                }),
            )
        })
        .collect();

    if options.remove_style_tags {
        handlers.push(element!("style", |el| {
            el.remove();
            Ok(())
        }));
    }

    handlers.push(element!("*", |el| {
        let hits = std::mem::take(&mut *matched.borrow_mut());
        if hits.is_empty() {
            return Ok(());
        }
        resolve(el, &hits, entries, options)?;
        Ok(())
    }));

    let mut output = vec![];
    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );
        rewriter.write(html.as_bytes())?;
        rewriter.end()?;
    }

    Ok(String::from_utf8(output)?)
}

fn resolve(el: &mut Element, hits: &[usize], entries: &[Entry], options: &InlineOptions) -> Result<()> {
    let mut own = Cascade::default();
    let mut before = Cascade::default();
    let mut after = Cascade::default();

    for &idx in hits {
        let entry = &entries[idx];
        let target = match entry.pseudo {
            None => &mut own,
            Some(Pseudo::Before) => &mut before,
            Some(Pseudo::After) => &mut after,
        };
        entry.declarations.iter().for_each(|d| target.apply(d));
    }

    if let Some(style) = el.get_attribute("style") {
        Declaration::parse_many(&style).iter().for_each(|d| own.apply(d));
    }

    if !own.is_empty() {
        el.set_attribute("style", &own.to_style(options.preserve_important))?;
    }

    if VOID_ELEMENTS.contains(&el.tag_name().as_str()) {
        return Ok(());
    }

    if let Some(span) = pseudo_span(before, options) {
        el.prepend(&span, ContentType::Html);
    }
    if let Some(span) = pseudo_span(after, options) {
        el.append(&span, ContentType::Html);
    }

    Ok(())
}

/// Builds the `<span>` standing in for a pseudo-element. Without a `content` declaration
/// the pseudo-element would not render, so neither does the span.
fn pseudo_span(mut cascade: Cascade, options: &InlineOptions) -> Option<String> {
    let content = cascade.take("content")?;
    if matches!(content.as_str(), "none" | "normal") {
        return None;
    }

    let text = html_escape::encode_text(&unquote(&content)).into_owned();
    let style = cascade.to_style(options.preserve_important);

    Some(match style.is_empty() {
        true => format!("<span>{text}</span>"),
        false => format!(
            r#"<span style="{}">{text}</span>"#,
            html_escape::encode_double_quoted_attribute(&style)
        ),
    })
}

/// Strips the quotes off a CSS string and resolves its escapes.
fn unquote(value: &str) -> String {
    let value = value.trim();
    let inner = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    let mut output = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }

        let mut hex = String::new();
        while hex.len() < 6 && chars.peek().is_some_and(char::is_ascii_hexdigit) {
            hex.extend(chars.next());
        }

        if hex.is_empty() {
            output.extend(chars.next());
            continue;
        }

        // A single whitespace character terminates a hex escape.
        if chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let decoded = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
        output.push(decoded.unwrap_or(char::REPLACEMENT_CHARACTER));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inlined(html: &str, css: &str) -> String {
        inline(html, css, &InlineOptions::default()).unwrap()
    }

    #[test]
    fn anchored_rules() {
        assert_eq!(
            inlined(r#"<section id="nice"><p>a</p></section>"#, "#nice p { color: red; }"),
            r#"<section id="nice"><p style="color: red;">a</p></section>"#
        );
    }

    #[test]
    fn specificity_then_order() {
        assert_eq!(
            inlined(r#"<section id="nice"><p>a</p></section>"#, "#nice p { color: red } p { color: blue }"),
            r#"<section id="nice"><p style="color: red;">a</p></section>"#
        );
        assert_eq!(
            inlined("<p>a</p>", "p { color: blue } p { color: green }"),
            r#"<p style="color: green;">a</p>"#
        );
    }

    #[test]
    fn important_wins_and_is_kept() {
        assert_eq!(
            inlined(
                r#"<section id="nice"><p>a</p></section>"#,
                "p { color: red !important } #nice p { color: blue }"
            ),
            r#"<section id="nice"><p style="color: red !important;">a</p></section>"#
        );
    }

    #[test]
    fn inline_style_beats_rules() {
        assert_eq!(
            inlined(r#"<p style="color: green">a</p>"#, "p { color: red; margin: 0 }"),
            r#"<p style="color: green; margin: 0;">a</p>"#
        );
    }

    #[test]
    fn style_tags_apply_and_vanish() {
        assert_eq!(
            inlined("<style>p { color: red }</style><p>a</p>", ""),
            r#"<p style="color: red;">a</p>"#
        );
    }

    #[test]
    fn media_queries_dropped_unless_preserved() {
        let css = "@media (max-width: 1px) { p { color: red } }";
        assert_eq!(inlined("<p>a</p>", css), "<p>a</p>");

        let options = InlineOptions {
            preserve_media_queries: true,
            ..InlineOptions::default()
        };
        assert_eq!(
            inline("<p>a</p>", css, &options).unwrap(),
            "<style>@media (max-width: 1px) {p { color: red }}</style><p>a</p>"
        );
    }

    #[test]
    fn font_faces_dropped() {
        assert_eq!(inlined("<p>a</p>", "@font-face { font-family: X; }"), "<p>a</p>");
    }

    #[test]
    fn pseudo_elements_become_spans() {
        assert_eq!(
            inlined(
                r#"<section id="nice"><h2>T</h2></section>"#,
                r##"#nice h2::before { content: "#"; color: red } #nice h2:after { content: "" }"##
            ),
            r##"<section id="nice"><h2><span style="color: red;">#</span>T<span></span></h2></section>"##
        );
    }

    #[test]
    fn pseudo_elements_can_be_disabled() {
        let options = InlineOptions {
            inline_pseudo_elements: false,
            ..InlineOptions::default()
        };
        assert_eq!(
            inline("<h2>T</h2>", r##"h2::before { content: "#" }"##, &options).unwrap(),
            "<h2>T</h2>"
        );
    }

    #[test]
    fn double_quotes_become_single() {
        assert_eq!(
            inlined("<p>a</p>", r#"p { font-family: "Helvetica Neue", sans-serif }"#),
            r#"<p style="font-family: 'Helvetica Neue', sans-serif;">a</p>"#
        );
    }

    #[test]
    fn inexpressible_selectors_are_skipped() {
        assert_eq!(
            inlined("<p>a</p><p>b</p>", "p + p { color: red } p:hover { color: blue }"),
            "<p>a</p><p>b</p>"
        );
    }

    #[test]
    fn css_escapes_in_content() {
        assert_eq!(unquote(r#""\201C""#), "\u{201C}");
        assert_eq!(unquote(r"'a\'b'"), "a'b");
    }
}
