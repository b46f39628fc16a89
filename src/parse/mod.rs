//! Markdown tokenization.
//!
//! `pulldown-cmark` does the block and inline parsing; this module adapts its event stream
//! into the flat, well-nested [`Token`] stream the transform passes operate on.

mod deflist;
mod linkify;
pub mod math;
mod toc;
pub mod token;

use std::ops::Range;

use pulldown_cmark::{Alignment, CodeBlockKind, Event, HeadingLevel, LinkType, Options, Parser, Tag};

pub use math::{Formula, Formulas, Segment};
pub use token::{Kind, Nesting, Token};

use crate::prelude::*;

/// Parse-time extensions, on by default.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Smart quotes, dashes and ellipses.
    pub typographer: bool,
    /// Turns bare `http(s)://` and `www.` URLs into links.
    pub linkify: bool,
    /// Recognizes the `[toc]` marker.
    pub toc: bool,
    /// `Term` / `: definition` lists.
    pub deflist: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            typographer: true,
            linkify: true,
            toc: true,
            deflist: true,
        }
    }
}

/// A tokenized document.
#[derive(Debug)]
pub struct Parsed {
    pub tokens: Vec<Token>,
    /// Formulas referenced by the sentinels left in the token text.
    pub formulas: Formulas,
}

/// Tokenizes a Markdown document. Frontmatter must already be stripped.
pub fn parse(markdown: &str, options: &ParseOptions) -> Parsed {
    let (source, formulas) = math::extract(markdown);
    trace!("Recognized {} formula(s) ahead of parsing.", formulas.len());

    let mut flags = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    if options.typographer {
        flags |= Options::ENABLE_SMART_PUNCTUATION;
    }

    let mut builder = Builder::new(&source, &formulas);
    for (event, range) in Parser::new_ext(&source, flags).into_offset_iter() {
        builder.event(event, range);
    }
    let mut tokens = builder.finish();

    if options.deflist {
        tokens = deflist::apply(tokens);
    }
    if options.linkify {
        linkify::apply(&mut tokens);
    }
    if options.toc {
        toc::mark(&mut tokens);
    }

    Parsed { tokens, formulas }
}

/// Maps byte offsets onto zero-based line numbers.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self { starts }
    }

    fn line(&self, offset: usize) -> usize {
        self.starts.partition_point(|start| *start <= offset).saturating_sub(1)
    }
}

/// An inline run being collected for a paragraph, heading or table cell.
struct Frame {
    children: Vec<Token>,
    /// Opened implicitly by inline content directly inside a tight list item.
    implicit: bool,
    /// Closing token pushed after the `Inline` token.
    close: Token,
    span: Option<Range<usize>>,
}

struct Table {
    alignments: Vec<Alignment>,
    cell: usize,
    in_head: bool,
    body_open: bool,
}

struct Builder<'s> {
    source: &'s str,
    formulas: &'s Formulas,
    lines: LineIndex,
    tokens: Vec<Token>,
    frame: Option<Frame>,
    /// Images currently collecting their alt text.
    images: Vec<Token>,
    /// Fenced or indented code whose text is being collected.
    code: Option<Token>,
    table: Option<Table>,
}

impl<'s> Builder<'s> {
    fn new(source: &'s str, formulas: &'s Formulas) -> Self {
        Self {
            source,
            formulas,
            lines: LineIndex::new(source),
            tokens: Vec::new(),
            frame: None,
            images: Vec::new(),
            code: None,
            table: None,
        }
    }

    fn map(&self, range: &Range<usize>) -> Option<(usize, usize)> {
        let start = self.lines.line(range.start);
        let end = self.lines.line(range.end.saturating_sub(1).max(range.start)) + 1;

        Some((
            self.formulas.original_line(start),
            self.formulas.original_line(end - 1) + 1,
        ))
    }

    fn event(&mut self, event: Event<'_>, range: Range<usize>) {
        if self.code.is_some() {
            match event {
                Event::Text(text) => {
                    if let Some(code) = &mut self.code {
                        code.content.push_str(&text);
                    }
                }
                Event::End(Tag::CodeBlock(_)) => self.tokens.extend(self.code.take()),
                _ => (),
            }
            return;
        }

        match event {
            Event::Start(tag) => self.start(tag, range),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.push_text(&text, range),
            Event::Code(code) => {
                let mut token = Token::with_content(Kind::CodeInline, code.as_ref());
                token.markup = "`".to_owned();
                self.push_inline(token, range);
            }
            Event::Html(html) => self.html(&html, range),
            Event::SoftBreak => self.push_inline(Token::new(Kind::Softbreak), range),
            Event::HardBreak => self.push_inline(Token::new(Kind::Hardbreak), range),
            Event::Rule => {
                self.close_implicit();
                let mut token = Token::new(Kind::Hr);
                token.markup = "---".to_owned();
                token.map = self.map(&range);
                self.tokens.push(token);
            }
            Event::TaskListMarker(checked) => {
                let html = match checked {
                    true => r#"<input checked="" disabled="" type="checkbox">"#,
                    false => r#"<input disabled="" type="checkbox">"#,
                };
                self.push_inline(Token::html_inline(html), range);
            }
            Event::FootnoteReference(label) => {
                self.push_text(&format!("[^{label}]"), range);
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>, range: Range<usize>) {
        if !matches!(
            tag,
            Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link(..) | Tag::Image(..)
        ) {
            self.close_implicit();
        }

        match tag {
            Tag::Paragraph => {
                self.open_block(Kind::ParagraphOpen, &range);
                self.open_frame(Token::new(Kind::ParagraphClose), false);
            }
            Tag::Heading(level, _, _) => {
                let tag = heading_tag(level);
                let markup = "#".repeat(tag[1..].parse().unwrap_or(1));

                let open = self.open_block(Kind::HeadingOpen, &range);
                open.tag = tag;
                open.markup = markup.clone();

                let mut close = Token::new(Kind::HeadingClose);
                close.tag = tag;
                close.markup = markup;
                self.open_frame(close, false);
            }
            Tag::BlockQuote => {
                self.open_block(Kind::BlockquoteOpen, &range).markup = ">".to_owned();
            }
            Tag::CodeBlock(kind) => {
                let mut token = match kind {
                    CodeBlockKind::Fenced(info) => {
                        let mut token = Token::new(Kind::Fence);
                        token.info = self.formulas.restore(info.trim()).into_owned();
                        token.markup = "```".to_owned();
                        token
                    }
                    CodeBlockKind::Indented => Token::new(Kind::CodeBlock),
                };
                token.map = self.map(&range);
                self.code = Some(token);
            }
            Tag::List(Some(start)) => {
                let open = self.open_block(Kind::OrderedListOpen, &range);
                if start != 1 {
                    open.set_attr("start", start.to_string());
                }
            }
            Tag::List(None) => {
                self.open_block(Kind::BulletListOpen, &range);
            }
            Tag::Item => {
                self.open_block(Kind::ListItemOpen, &range);
            }
            Tag::FootnoteDefinition(_) => (),
            Tag::Table(alignments) => {
                self.open_block(Kind::TableOpen, &range);
                self.table = Some(Table {
                    alignments,
                    cell: 0,
                    in_head: false,
                    body_open: false,
                });
            }
            Tag::TableHead => {
                self.open_block(Kind::TheadOpen, &range);
                self.open_block(Kind::TrOpen, &range);
                if let Some(table) = &mut self.table {
                    table.in_head = true;
                    table.cell = 0;
                }
            }
            Tag::TableRow => {
                let body_open = self.table.as_ref().is_some_and(|t| t.body_open);
                if !body_open {
                    self.open_block(Kind::TbodyOpen, &range);
                }
                self.open_block(Kind::TrOpen, &range);
                if let Some(table) = &mut self.table {
                    table.body_open = true;
                    table.cell = 0;
                }
            }
            Tag::TableCell => {
                let (head, alignment) = match &self.table {
                    Some(table) => (
                        table.in_head,
                        table.alignments.get(table.cell).copied().unwrap_or(Alignment::None),
                    ),
                    None => (false, Alignment::None),
                };
                let (open, close) = match head {
                    true => (Kind::ThOpen, Kind::ThClose),
                    false => (Kind::TdOpen, Kind::TdClose),
                };

                let token = self.open_block(open, &range);
                if let Some(align) = alignment_name(alignment) {
                    token.set_attr("style", format!("text-align:{align}"));
                }
                self.open_frame(Token::new(close), false);
            }
            Tag::Emphasis => self.push_inline(marked(Kind::EmOpen, "*"), range),
            Tag::Strong => self.push_inline(marked(Kind::StrongOpen, "**"), range),
            Tag::Strikethrough => self.push_inline(marked(Kind::StrikeOpen, "~~"), range),
            Tag::Link(link_type, dest, title) => {
                let mut token = Token::new(Kind::LinkOpen);
                let href = self.formulas.restore(&dest).into_owned();
                let href = match link_type {
                    LinkType::Email => format!("mailto:{href}"),
                    _ => href,
                };
                token.set_attr("href", href);
                if !title.is_empty() {
                    token.set_attr("title", self.formulas.restore(&title).into_owned());
                }
                if matches!(link_type, LinkType::Autolink | LinkType::Email) {
                    token.markup = "autolink".to_owned();
                }
                self.push_inline(token, range);
            }
            Tag::Image(_, dest, title) => {
                let mut token = Token::new(Kind::Image);
                token.set_attr("src", self.formulas.restore(&dest).into_owned());
                token.set_attr("alt", "");
                if !title.is_empty() {
                    token.set_attr("title", self.formulas.restore(&title).into_owned());
                }
                self.touch(&range);
                self.images.push(token);
            }
        }
    }

    fn end(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph | Tag::Heading(..) | Tag::TableCell => {
                self.close_frame();
                if let Some(table) = &mut self.table {
                    if matches!(tag, Tag::TableCell) {
                        table.cell += 1;
                    }
                }
            }
            Tag::BlockQuote => self.close_block(marked(Kind::BlockquoteClose, ">")),
            Tag::List(Some(_)) => self.close_block(Token::new(Kind::OrderedListClose)),
            Tag::List(None) => self.close_block(Token::new(Kind::BulletListClose)),
            Tag::Item => self.close_block(Token::new(Kind::ListItemClose)),
            Tag::TableHead => {
                self.close_block(Token::new(Kind::TrClose));
                self.close_block(Token::new(Kind::TheadClose));
                if let Some(table) = &mut self.table {
                    table.in_head = false;
                }
            }
            Tag::TableRow => self.close_block(Token::new(Kind::TrClose)),
            Tag::Table(_) => {
                if self.table.take().is_some_and(|t| t.body_open) {
                    self.close_block(Token::new(Kind::TbodyClose));
                }
                self.close_block(Token::new(Kind::TableClose));
            }
            Tag::Emphasis => self.push_closing(marked(Kind::EmClose, "*")),
            Tag::Strong => self.push_closing(marked(Kind::StrongClose, "**")),
            Tag::Strikethrough => self.push_closing(marked(Kind::StrikeClose, "~~")),
            Tag::Link(..) => self.push_closing(Token::new(Kind::LinkClose)),
            Tag::Image(..) => {
                let Some(mut image) = self.images.pop() else {
                    return;
                };
                let alt = image.plain_text();
                image.set_attr("alt", alt);
                self.push_closing(image);
            }
            Tag::CodeBlock(_) | Tag::FootnoteDefinition(_) => (),
        }
    }

    fn open_block(&mut self, kind: Kind, range: &Range<usize>) -> &mut Token {
        let mut token = Token::new(kind);
        token.map = self.map(range);
        self.tokens.push(token);
        let last = self.tokens.len() - 1;
        &mut self.tokens[last]
    }

    fn close_block(&mut self, token: Token) {
        self.close_implicit();
        self.tokens.push(token);
    }

    fn open_frame(&mut self, close: Token, implicit: bool) {
        self.frame = Some(Frame {
            children: Vec::new(),
            implicit,
            close,
            span: None,
        });
    }

    fn close_frame(&mut self) {
        let Some(frame) = self.frame.take() else {
            return;
        };

        let mut inline = Token::new(Kind::Inline);
        if let Some(span) = frame.span {
            inline.content = self.source[span].trim().to_owned();
        }
        inline.children = frame.children;

        self.tokens.push(inline);
        self.tokens.push(frame.close);
    }

    /// Ends the hidden paragraph of a tight list item, if one is open.
    fn close_implicit(&mut self) {
        if self.frame.as_ref().is_some_and(|f| f.implicit) {
            self.close_frame();
        }
    }

    fn touch(&mut self, range: &Range<usize>) {
        if self.frame.is_none() {
            let mut open = Token::new(Kind::ParagraphOpen);
            open.hidden = true;
            self.tokens.push(open);

            let mut close = Token::new(Kind::ParagraphClose);
            close.hidden = true;
            self.open_frame(close, true);
        }

        if let Some(frame) = &mut self.frame {
            frame.span = Some(match frame.span.take() {
                Some(span) => span.start.min(range.start)..span.end.max(range.end),
                None => range.clone(),
            });
        }
    }

    fn push_inline(&mut self, token: Token, range: Range<usize>) {
        self.touch(&range);
        self.push_closing(token);
    }

    /// Appends to the innermost open image, or the current frame.
    fn push_closing(&mut self, token: Token) {
        let sink = match self.images.last_mut() {
            Some(image) => &mut image.children,
            None => match &mut self.frame {
                Some(frame) => &mut frame.children,
                None => return,
            },
        };

        match (sink.last_mut(), token.kind) {
            (Some(last), Kind::Text) if last.kind == Kind::Text => last.content.push_str(&token.content),
            _ => sink.push(token),
        }
    }

    fn push_text(&mut self, text: &str, range: Range<usize>) {
        self.push_inline(Token::with_content(Kind::Text, text), range);
    }

    fn html(&mut self, html: &str, range: Range<usize>) {
        let rest = &self.source[range.end..];
        let block = html.ends_with('\n') || rest.is_empty() || rest.starts_with(['\n', '\r']);

        if self.frame.is_some() || !self.images.is_empty() || !block {
            let html = self.formulas.restore(html).into_owned();
            self.push_inline(Token::html_inline(html), range);
            return;
        }

        // Block HTML arrives one line at a time.
        let html = self.formulas.restore(html);
        match self.tokens.last_mut() {
            Some(last) if last.kind == Kind::HtmlBlock => last.content.push_str(&html),
            _ => {
                let mut token = Token::with_content(Kind::HtmlBlock, html.into_owned());
                token.map = self.map(&range);
                self.tokens.push(token);
            }
        }
    }

    fn finish(mut self) -> Vec<Token> {
        self.close_frame();
        if let Some(code) = self.code.take() {
            self.tokens.push(code);
        }
        self.tokens
    }
}

fn marked(kind: Kind, markup: &str) -> Token {
    let mut token = Token::new(kind);
    token.markup = markup.to_owned();
    token
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

fn alignment_name(alignment: Alignment) -> Option<&'static str> {
    match alignment {
        Alignment::None => None,
        Alignment::Left => Some("left"),
        Alignment::Center => Some("center"),
        Alignment::Right => Some("right"),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<Kind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    fn tokenize(markdown: &str) -> Vec<Token> {
        parse(markdown, &ParseOptions::default()).tokens
    }

    #[test]
    fn heading_is_a_triple() {
        let tokens = tokenize("## Hello *there*");

        assert_eq!(
            kinds(&tokens),
            vec![Kind::HeadingOpen, Kind::Inline, Kind::HeadingClose]
        );
        assert_eq!(tokens[0].tag, "h2");
        assert_eq!(tokens[2].tag, "h2");
        assert_eq!(tokens[1].content, "Hello *there*");
        assert_eq!(tokens[1].plain_text(), "Hello there");
    }

    #[test]
    fn tight_list_items_get_hidden_paragraphs() {
        let tokens = tokenize("- a\n- b\n");

        assert_eq!(
            kinds(&tokens),
            vec![
                Kind::BulletListOpen,
                Kind::ListItemOpen,
                Kind::ParagraphOpen,
                Kind::Inline,
                Kind::ParagraphClose,
                Kind::ListItemClose,
                Kind::ListItemOpen,
                Kind::ParagraphOpen,
                Kind::Inline,
                Kind::ParagraphClose,
                Kind::ListItemClose,
                Kind::BulletListClose,
            ]
        );
        assert!(tokens[2].hidden);
        assert!(tokens[4].hidden);
    }

    #[test]
    fn loose_list_items_keep_paragraphs() {
        let tokens = tokenize("1. a\n\n2. b\n");

        assert_eq!(tokens[0].kind, Kind::OrderedListOpen);
        assert!(tokens.iter().filter(|t| t.kind == Kind::ParagraphOpen).all(|t| !t.hidden));
    }

    #[test]
    fn ordered_list_start() {
        let tokens = tokenize("3. three\n4. four\n");
        assert_eq!(tokens[0].attr("start"), Some("3"));
    }

    #[test]
    fn nested_list_closes_hidden_paragraph() {
        let tokens = tokenize("- a\n  - b\n");

        assert_eq!(
            kinds(&tokens[..6]),
            vec![
                Kind::BulletListOpen,
                Kind::ListItemOpen,
                Kind::ParagraphOpen,
                Kind::Inline,
                Kind::ParagraphClose,
                Kind::BulletListOpen,
            ]
        );
    }

    #[test]
    fn table_structure() {
        let tokens = tokenize(indoc! {"
            | A | B |
            |:--|--:|
            | 1 | 2 |
        "});

        assert_eq!(
            kinds(&tokens),
            vec![
                Kind::TableOpen,
                Kind::TheadOpen,
                Kind::TrOpen,
                Kind::ThOpen,
                Kind::Inline,
                Kind::ThClose,
                Kind::ThOpen,
                Kind::Inline,
                Kind::ThClose,
                Kind::TrClose,
                Kind::TheadClose,
                Kind::TbodyOpen,
                Kind::TrOpen,
                Kind::TdOpen,
                Kind::Inline,
                Kind::TdClose,
                Kind::TdOpen,
                Kind::Inline,
                Kind::TdClose,
                Kind::TrClose,
                Kind::TbodyClose,
                Kind::TableClose,
            ]
        );
        assert_eq!(tokens[3].attr("style"), Some("text-align:left"));
        assert_eq!(tokens[16].attr("style"), Some("text-align:right"));
    }

    #[test]
    fn fence_keeps_info_and_content() {
        let tokens = tokenize("```rust\nfn main() {}\n```\n");

        assert_eq!(kinds(&tokens), vec![Kind::Fence]);
        assert_eq!(tokens[0].info, "rust");
        assert_eq!(tokens[0].content, "fn main() {}\n");
    }

    #[test]
    fn block_html_passes_through() {
        let tokens = tokenize("<div>\nhi\n</div>\n");

        assert_eq!(kinds(&tokens), vec![Kind::HtmlBlock]);
        assert_eq!(tokens[0].content, "<div>\nhi\n</div>\n");
    }

    #[test]
    fn inline_html_stays_inline() {
        let tokens = tokenize("a <b>bold</b> c");
        let children = &tokens[1].children;

        assert!(children.iter().any(|t| t.kind == Kind::HtmlInline && t.content == "<b>"));
    }

    #[test]
    fn image_alt_is_collected() {
        let tokens = tokenize("![An *alt*](a.png \"T\")");
        let image = &tokens[1].children[0];

        assert_eq!(image.kind, Kind::Image);
        assert_eq!(image.attr("src"), Some("a.png"));
        assert_eq!(image.attr("alt"), Some("An alt"));
        assert_eq!(image.attr("title"), Some("T"));
    }

    #[test]
    fn email_autolink_gets_mailto() {
        let tokens = tokenize("<me@example.com>");
        let link = &tokens[1].children[0];

        assert_eq!(link.attr("href"), Some("mailto:me@example.com"));
    }

    #[test]
    fn formula_in_code_span_is_untouched() {
        let tokens = tokenize("`$x$` and $y$");
        let children = &tokens[1].children;

        assert_eq!(children[0].kind, Kind::CodeInline);
        assert_eq!(children[0].content, "$x$");
    }

    #[test]
    fn maps_account_for_folded_formulas() {
        let tokens = tokenize("$$\na\nb\n$$\n\nText\n");
        let paragraph = tokens.iter().filter(|t| t.kind == Kind::ParagraphOpen).last().unwrap();

        assert_eq!(paragraph.map, Some((5, 6)));
    }
}
