/// The role a [`Token`] plays in the stream.
///
/// Container roles come in `*Open`/`*Close` pairs; everything else is a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    ParagraphOpen,
    ParagraphClose,
    HeadingOpen,
    HeadingClose,
    BlockquoteOpen,
    BlockquoteClose,
    BulletListOpen,
    BulletListClose,
    OrderedListOpen,
    OrderedListClose,
    ListItemOpen,
    ListItemClose,
    TableOpen,
    TableClose,
    TheadOpen,
    TheadClose,
    TbodyOpen,
    TbodyClose,
    TrOpen,
    TrClose,
    ThOpen,
    ThClose,
    TdOpen,
    TdClose,
    DlOpen,
    DlClose,
    DtOpen,
    DtClose,
    DdOpen,
    DdClose,
    FigureOpen,
    FigureClose,
    FigcaptionOpen,
    FigcaptionClose,
    Fence,
    CodeBlock,
    HtmlBlock,
    Hr,
    MathBlock,
    Inline,
    // Inline-only roles, found in `Inline` children.
    Text,
    Softbreak,
    Hardbreak,
    CodeInline,
    EmOpen,
    EmClose,
    StrongOpen,
    StrongClose,
    StrikeOpen,
    StrikeClose,
    LinkOpen,
    LinkClose,
    Image,
    HtmlInline,
    MathInline,
    /// Table of contents placeholder, filled once all headings are known.
    Toc,
}

/// Whether a token opens, closes or stands alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    Open,
    Close,
    Leaf,
}

impl Kind {
    pub fn nesting(self) -> Nesting {
        use Kind::*;

        match self {
            ParagraphOpen | HeadingOpen | BlockquoteOpen | BulletListOpen | OrderedListOpen
            | ListItemOpen | TableOpen | TheadOpen | TbodyOpen | TrOpen | ThOpen | TdOpen
            | DlOpen | DtOpen | DdOpen | FigureOpen | FigcaptionOpen | EmOpen | StrongOpen
            | StrikeOpen | LinkOpen => Nesting::Open,
            ParagraphClose | HeadingClose | BlockquoteClose | BulletListClose
            | OrderedListClose | ListItemClose | TableClose | TheadClose | TbodyClose
            | TrClose | ThClose | TdClose | DlClose | DtClose | DdClose | FigureClose
            | FigcaptionClose | EmClose | StrongClose | StrikeClose | LinkClose => Nesting::Close,
            _ => Nesting::Leaf,
        }
    }

    /// The HTML element a container role (or a leaf that maps onto one element) renders as.
    pub fn tag(self) -> &'static str {
        use Kind::*;

        match self {
            ParagraphOpen | ParagraphClose => "p",
            BlockquoteOpen | BlockquoteClose => "blockquote",
            BulletListOpen | BulletListClose => "ul",
            OrderedListOpen | OrderedListClose => "ol",
            ListItemOpen | ListItemClose => "li",
            TableOpen | TableClose => "table",
            TheadOpen | TheadClose => "thead",
            TbodyOpen | TbodyClose => "tbody",
            TrOpen | TrClose => "tr",
            ThOpen | ThClose => "th",
            TdOpen | TdClose => "td",
            DlOpen | DlClose => "dl",
            DtOpen | DtClose => "dt",
            DdOpen | DdClose => "dd",
            FigureOpen | FigureClose => "figure",
            FigcaptionOpen | FigcaptionClose => "figcaption",
            EmOpen | EmClose => "em",
            StrongOpen | StrongClose => "strong",
            StrikeOpen | StrikeClose => "s",
            LinkOpen | LinkClose => "a",
            Fence | CodeBlock => "code",
            CodeInline => "code",
            Hr => "hr",
            Image => "img",
            Softbreak | Hardbreak => "br",
            MathBlock | MathInline => "math",
            // Headings carry their level in `Token::tag`.
            HeadingOpen | HeadingClose | HtmlBlock | HtmlInline | Toc | Inline | Text => "",
        }
    }

    /// Block-level roles. Inline children never are.
    pub fn is_block(self) -> bool {
        use Kind::*;

        !matches!(
            self,
            Text | Softbreak
                | Hardbreak
                | CodeInline
                | EmOpen
                | EmClose
                | StrongOpen
                | StrongClose
                | StrikeOpen
                | StrikeClose
                | LinkOpen
                | LinkClose
                | Image
                | HtmlInline
                | MathInline
                | Toc
        )
    }
}

/// The atomic unit of the intermediate representation.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: Kind,
    /// Target element name; headings use `h1`..`h6`, raw HTML uses the empty string.
    pub tag: &'static str,
    /// Raw or rendered text for leaves; the plain text of an `Inline` token.
    pub content: String,
    /// Only populated on `Inline` tokens.
    pub children: Vec<Token>,
    /// Insertion order is preserved on render.
    pub attrs: Vec<(String, String)>,
    pub block: bool,
    /// Tight-list paragraphs are parsed but not rendered.
    pub hidden: bool,
    /// The literal source delimiter, e.g. `$`, `$$`, `>`.
    pub markup: String,
    /// Fence info string (language token).
    pub info: String,
    /// Source line range `[start, end)` for block tokens.
    pub map: Option<(usize, usize)>,
}

impl Token {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            tag: kind.tag(),
            content: String::new(),
            children: Vec::new(),
            attrs: Vec::new(),
            block: kind.is_block(),
            hidden: false,
            markup: String::new(),
            info: String::new(),
            map: None,
        }
    }

    pub fn with_content(kind: Kind, content: impl Into<String>) -> Self {
        let mut token = Self::new(kind);
        token.content = content.into();
        token
    }

    /// An inline raw HTML fragment, inserted verbatim on render.
    pub fn html_inline(content: impl Into<String>) -> Self {
        Self::with_content(Kind::HtmlInline, content)
    }

    pub fn nesting(&self) -> Nesting {
        self.kind.nesting()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute, replacing its value in place if it already exists.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();

        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_owned(), value)),
        }
    }

    /// Plain text of this token's children, as used for image alt text and TOC entries.
    pub fn plain_text(&self) -> String {
        let mut buffer = String::new();
        collect_text(&self.children, &mut buffer);
        buffer
    }
}

fn collect_text(tokens: &[Token], buffer: &mut String) {
    for token in tokens {
        match token.kind {
            Kind::Text | Kind::CodeInline | Kind::MathInline => buffer.push_str(&token.content),
            Kind::Softbreak | Kind::Hardbreak => buffer.push('\n'),
            Kind::Image => collect_text(&token.children, buffer),
            _ => (),
        }
    }
}

/// Debug dump of a stream, one token per line, children indented.
pub fn dump(tokens: &[Token]) -> String {
    let mut buffer = String::new();
    dump_into(tokens, 0, &mut buffer);
    buffer
}

fn dump_into(tokens: &[Token], depth: usize, buffer: &mut String) {
    for token in tokens {
        buffer.push_str(&format!(
            "{:indent$}{:?} {:?} {:?}\n",
            "",
            token.kind,
            token.tag,
            token.content,
            indent = depth * 2
        ));
        dump_into(&token.children, depth + 1, buffer);
    }
}
