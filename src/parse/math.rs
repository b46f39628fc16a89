//! Formula recognition over raw Markdown source.
//!
//! `pulldown-cmark` has no notion of TeX delimiters, and would happily mangle a formula's
//! underscores and backslashes into emphasis and escapes. So formulas are recognized here,
//! before block parsing, and each one is swapped for a short sentinel made of private-use
//! codepoints. The sentinels pass through the parser as plain text and are turned into
//! formula tokens by the math pass ([`crate::render::passes::math`]).

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// Opens a sentinel. Followed by the decimal formula index and [`SENTINEL_CLOSE`].
pub const SENTINEL_OPEN: char = '\u{E000}';
pub const SENTINEL_CLOSE: char = '\u{E001}';

static SENTINEL: Lazy<Regex> = Lazy::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").unwrap());

/// A recognized formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    /// TeX source, without delimiters.
    pub source: String,
    /// `true` for `$$` blocks.
    pub display: bool,
    /// The exact source text the sentinel replaced, delimiters included.
    pub raw: String,
}

/// The formulas pulled out of a document, indexed by sentinel number.
#[derive(Debug, Default, Clone)]
pub struct Formulas {
    entries: Vec<Formula>,
    /// `(line in the rewritten source, lines folded away after it)`
    folded: Vec<(usize, usize)>,
}

/// A run of text, split around sentinels.
#[derive(Debug, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Formula(usize),
}

impl Formulas {
    pub fn get(&self, index: usize) -> Option<&Formula> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Splits text around the sentinels it contains.
    /// Sentinels with an unknown index are left as text.
    pub fn segments<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        let mut segments = Vec::new();
        let mut last = 0;

        for capture in SENTINEL.captures_iter(text) {
            let whole = capture.get(0).expect("Capture group 0 should always exist.");
            let Some(index) = capture[1].parse::<usize>().ok().filter(|i| *i < self.len()) else {
                continue;
            };

            if whole.start() > last {
                segments.push(Segment::Text(&text[last..whole.start()]));
            }
            segments.push(Segment::Formula(index));
            last = whole.end();
        }

        if last < text.len() {
            segments.push(Segment::Text(&text[last..]));
        }

        segments
    }

    /// Puts the original source text back in place of every sentinel.
    /// Used wherever a formula ended up somewhere it cannot be rendered (code, URLs, raw HTML).
    pub fn restore<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !text.contains(SENTINEL_OPEN) {
            return Cow::Borrowed(text);
        }

        SENTINEL.replace_all(text, |capture: &regex::Captures| {
            capture[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| self.get(i))
                .map(|f| f.raw.clone())
                .unwrap_or_else(|| capture[0].to_owned())
        })
    }

    /// Maps a line number in the rewritten source back onto the original document.
    pub fn original_line(&self, line: usize) -> usize {
        line + self
            .folded
            .iter()
            .filter(|(at, _)| *at < line)
            .map(|(_, count)| count)
            .sum::<usize>()
    }

    fn push(&mut self, formula: Formula) -> String {
        let index = self.entries.len();
        self.entries.push(formula);
        format!("{SENTINEL_OPEN}{index}{SENTINEL_CLOSE}")
    }
}

/// Where a line's content starts once container markers are peeled off.
#[derive(Debug, Clone, Copy)]
struct Prefix {
    /// Number of `>` markers.
    depth: usize,
    /// Byte offset just past the blockquote markers.
    quoted: usize,
    /// Byte offset of the first content character.
    content: usize,
    /// Whether a list marker was stepped over.
    listed: bool,
}

fn prefix(line: &str) -> Prefix {
    let bytes = line.as_bytes();
    let mut pos = 0;
    let mut depth = 0;

    loop {
        let mark = pos + bytes[pos..].iter().take_while(|b| **b == b' ').count();
        if bytes.get(mark) != Some(&b'>') || mark - pos > 3 {
            break;
        }
        depth += 1;
        pos = mark + 1;
        if bytes.get(pos) == Some(&b' ') {
            pos += 1;
        }
    }

    let quoted = pos;
    pos += leading_whitespace(&line[pos..]);

    // One list marker, bullet or ordinal, immediately followed by whitespace.
    let rest = &bytes[pos..];
    let marker = match rest.first() {
        Some(b'-' | b'*' | b'+') => 1,
        Some(b) if b.is_ascii_digit() => {
            let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
            match rest.get(digits) {
                Some(b'.' | b')') if digits <= 9 => digits + 1,
                _ => 0,
            }
        }
        _ => 0,
    };

    let listed = marker > 0 && matches!(rest.get(marker), Some(b' ' | b'\t'));
    if listed {
        pos += marker;
        pos += leading_whitespace(&line[pos..]);
    }

    Prefix {
        depth,
        quoted,
        content: pos,
        listed,
    }
}

fn leading_whitespace(text: &str) -> usize {
    text.bytes().take_while(|b| *b == b' ' || *b == b'\t').count()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Opening fence character and run length, if the content opens or closes a code fence.
fn fence(content: &str) -> Option<(u8, usize)> {
    let bytes = content.as_bytes();
    let first = *bytes.first()?;

    if first != b'`' && first != b'~' {
        return None;
    }

    let run = bytes.iter().take_while(|b| **b == first).count();
    (run >= 3).then_some((first, run))
}

/// Splits on every `|` not escaped by a backslash.
fn split_cells(row: &str) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut start = 0;
    let mut slashes = 0;

    for (i, b) in row.bytes().enumerate() {
        match b {
            b'\\' => slashes += 1,
            b'|' if slashes % 2 == 0 => {
                cells.push(&row[start..i]);
                start = i + 1;
                slashes = 0;
            }
            _ => slashes = 0,
        }
    }

    cells.push(&row[start..]);
    cells
}

/// The cells of a table row, outer pipes dropped.
fn row_cells(row: &str) -> Vec<&str> {
    let row = row.trim();
    let row = row.strip_prefix('|').unwrap_or(row);
    let row = match row.strip_suffix('|') {
        Some(inner) if !inner.ends_with('\\') => inner,
        _ => row,
    };

    split_cells(row)
}

fn is_delimiter_row(row: &str) -> bool {
    row.contains('|')
        && row_cells(row).iter().all(|cell| {
            let cell = cell.trim();
            let cell = cell.strip_prefix(':').unwrap_or(cell);
            let cell = cell.strip_suffix(':').unwrap_or(cell);
            !cell.is_empty() && cell.bytes().all(|b| b == b'-')
        })
}

/// Whether `line` is the header row of a table, judging by the delimiter row after it.
fn starts_table(line: &str, next: Option<&str>) -> bool {
    let Some(next) = next else {
        return false;
    };

    let (here, there) = (prefix(line), prefix(next));
    let header = &line[here.quoted..];
    let delimiter = &next[there.quoted..];

    here.depth == there.depth
        && header.contains('|')
        && is_delimiter_row(delimiter)
        && row_cells(header).len() == row_cells(delimiter).len()
}

/// Inline-scans each cell of a table row on its own.
fn table_row(line: &str, at: Prefix, formulas: &mut Formulas) -> String {
    let mut row = line[..at.quoted].to_owned();
    let cells: Vec<String> = split_cells(&line[at.quoted..])
        .into_iter()
        .map(|cell| inline_formulas(cell, formulas))
        .collect();

    row.push_str(&cells.join("|"));
    row
}

fn is_atx_heading(content: &str) -> bool {
    let hashes = content.bytes().take_while(|b| *b == b'#').count();
    (1..=6).contains(&hashes)
        && matches!(content.as_bytes().get(hashes), None | Some(b' ' | b'\t' | b'\n' | b'\r'))
}

/// Recognizes every formula in `source`, returning the rewritten source and the formula table.
pub fn extract(source: &str) -> (String, Formulas) {
    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    let mut formulas = Formulas::default();
    let mut output = String::with_capacity(source.len());
    let mut chunk = String::new();
    let mut open_fence: Option<(u8, usize)> = None;
    // Blockquote depth of the current table, if inside one.
    let mut table: Option<usize> = None;
    // Blockquote depth the current paragraph chunk started at.
    let mut chunk_depth = 0;
    // Content offset of the innermost open list item.
    let mut list_indent = 0;
    let mut out_line = 0;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let at = prefix(line);
        let content = &line[at.content..];

        if let Some((mark, run)) = open_fence {
            if let Some((close, len)) = fence(content) {
                if close == mark && len >= run && is_blank(&content[len..]) {
                    open_fence = None;
                }
            }
            output.push_str(line);
            out_line += 1;
            i += 1;
            continue;
        }

        let shift = leading_whitespace(&line[at.quoted..]);
        if at.listed {
            list_indent = at.content - at.quoted;
        } else if !is_blank(line) && shift < list_indent && i > 0 && is_blank(lines[i - 1]) {
            list_indent = 0;
        }

        if let Some(depth) = table {
            if is_blank(line) || at.depth != depth || fence(content).is_some() || is_atx_heading(content) {
                table = None;
            } else {
                output.push_str(&table_row(line, at, &mut formulas));
                out_line += 1;
                i += 1;
                continue;
            }
        }

        if starts_table(line, lines.get(i + 1).copied()) {
            flush(&mut chunk, &mut output, &mut formulas);
            table = Some(at.depth);
            output.push_str(&table_row(line, at, &mut formulas));
            out_line += 1;
            i += 1;
            continue;
        }

        if let Some(opened) = fence(content) {
            flush(&mut chunk, &mut output, &mut formulas);
            open_fence = Some(opened);
            output.push_str(line);
            out_line += 1;
            i += 1;
            continue;
        }

        if content.starts_with("$$") {
            let indent = match at.listed {
                true => at.content - at.quoted,
                false => list_indent.min(shift),
            };

            if let Some((formula, end)) = block_formula(&lines, i, at, indent) {
                flush(&mut chunk, &mut output, &mut formulas);

                let sentinel = formulas.push(formula);
                output.push_str(&line[..at.content]);
                output.push_str(&sentinel);
                output.push('\n');

                formulas.folded.push((out_line, end - i));
                out_line += 1;
                i = end + 1;
                continue;
            }
        }

        if is_blank(line) || is_atx_heading(content) {
            flush(&mut chunk, &mut output, &mut formulas);
            chunk.push_str(line);
            flush(&mut chunk, &mut output, &mut formulas);
        } else {
            // A list item or a deeper quote opens a new inline context. A shallower quote
            // depth is a lazy continuation of the open paragraph.
            if at.listed || at.depth > chunk_depth {
                flush(&mut chunk, &mut output, &mut formulas);
            }
            if chunk.is_empty() {
                chunk_depth = at.depth;
            }
            chunk.push_str(line);
        }

        out_line += 1;
        i += 1;
    }

    flush(&mut chunk, &mut output, &mut formulas);
    (output, formulas)
}

/// Scans for the closing `$$` of a block opened on `lines[start]`, inside a container whose
/// content starts `indent` columns past the quote markers.
/// Returns the formula and the index of its closing line.
fn block_formula(lines: &[&str], start: usize, at: Prefix, indent: usize) -> Option<(Formula, usize)> {
    let opening = lines[start];
    let first = opening[at.content + 2..].trim_end_matches(['\n', '\r']);

    // Four columns past the container is an indented code block.
    if !at.listed && at.content - at.quoted >= indent + 4 {
        return None;
    }

    let trimmed = first.trim();
    if trimmed.len() >= 2 && trimmed.ends_with("$$") {
        let body = &trimmed[..trimmed.len() - 2];
        let source = if body.trim().is_empty() { String::new() } else { format!("{body}\n") };

        let formula = Formula {
            source,
            display: true,
            raw: opening[at.content..].trim_end_matches(['\n', '\r']).to_owned(),
        };
        return Some((formula, start));
    }

    let mut interior = String::new();

    for (next, line) in lines.iter().enumerate().skip(start + 1) {
        let here = prefix(line);
        let inner = &line[here.quoted..];
        let shift = leading_whitespace(inner);

        if !is_blank(inner) && (here.depth != at.depth || shift < indent) {
            // The enclosing block ended first.
            return None;
        }

        let text = &inner[shift.min(indent)..];

        if text.trim().ends_with("$$") {
            let last = &text[..text.rfind("$$").unwrap_or(0)];

            let mut source = String::new();
            if !first.trim().is_empty() {
                source.push_str(first);
                source.push('\n');
            }
            source.push_str(&interior);
            if !last.trim().is_empty() {
                source.push_str(last);
            }

            let raw = lines[start..=next]
                .concat()
                .get(at.content..)
                .unwrap_or_default()
                .trim_end_matches(['\n', '\r'])
                .to_owned();

            return Some((Formula { source, display: true, raw }, next));
        }

        interior.push_str(text);
        if !text.ends_with('\n') {
            interior.push('\n');
        }
    }

    None
}

/// Inline-scans the accumulated paragraph text and appends the result.
fn flush(chunk: &mut String, output: &mut String, formulas: &mut Formulas) {
    if chunk.is_empty() {
        return;
    }

    output.push_str(&inline_formulas(chunk, formulas));
    chunk.clear();
}

/// Whether the `$` at `pos` can open and/or close an inline formula.
fn delimiter(bytes: &[u8], pos: usize) -> (bool, bool) {
    let prev = pos.checked_sub(1).and_then(|p| bytes.get(p)).copied();
    let next = bytes.get(pos + 1).copied();

    let can_open = !matches!(next, Some(b' ' | b'\t'));
    let can_close =
        !matches!(prev, Some(b' ' | b'\t')) && !matches!(next, Some(b) if b.is_ascii_digit());

    (can_open, can_close)
}

/// Finds the first `$` at or after `from` that is preceded by an even number of backslashes.
fn closing(bytes: &[u8], from: usize) -> Option<usize> {
    let mut search = from;

    while let Some(offset) = bytes[search..].iter().position(|b| *b == b'$') {
        let found = search + offset;
        let slashes = bytes[..found].iter().rev().take_while(|b| **b == b'\\').count();

        if slashes % 2 == 0 {
            return Some(found);
        }
        search = found + 1;
    }

    None
}

fn inline_formulas(text: &str, formulas: &mut Formulas) -> String {
    let bytes = text.as_bytes();
    let mut output = String::with_capacity(text.len());
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            // Escapes belong to the Markdown parser; `\$` is a literal dollar.
            b'\\' if bytes.get(pos + 1).is_some_and(u8::is_ascii_punctuation) => {
                output.push_str(&text[pos..pos + 2]);
                pos += 2;
            }
            b'`' => {
                let run = bytes[pos..].iter().take_while(|b| **b == b'`').count();
                let end = code_span_end(bytes, pos + run, run).unwrap_or(pos + run);
                output.push_str(&text[pos..end]);
                pos = end;
            }
            b'$' => {
                let (can_open, _) = delimiter(bytes, pos);
                let start = pos + 1;

                if !can_open {
                    output.push('$');
                    pos = start;
                    continue;
                }

                let Some(end) = closing(bytes, start) else {
                    output.push('$');
                    pos = start;
                    continue;
                };

                if end == start {
                    output.push_str("$$");
                    pos = start + 1;
                    continue;
                }

                let (_, can_close) = delimiter(bytes, end);
                if !can_close {
                    output.push('$');
                    pos = start;
                    continue;
                }

                let sentinel = formulas.push(Formula {
                    source: text[start..end].to_owned(),
                    display: false,
                    raw: text[pos..=end].to_owned(),
                });
                output.push_str(&sentinel);
                pos = end + 1;
            }
            _ => {
                let run = bytes[pos..]
                    .iter()
                    .position(|b| matches!(b, b'\\' | b'`' | b'$'))
                    .map_or(bytes.len(), |offset| pos + offset);
                // Stepping over at least one byte keeps a lone trailing backslash from looping.
                let run = run.max(pos + 1);
                output.push_str(&text[pos..run]);
                pos = run;
            }
        }
    }

    output
}

/// End offset of a code span whose opening backtick run ends at `from`.
fn code_span_end(bytes: &[u8], from: usize, run: usize) -> Option<usize> {
    let mut pos = from;

    while pos < bytes.len() {
        if bytes[pos] == b'`' {
            let len = bytes[pos..].iter().take_while(|b| **b == b'`').count();
            if len == run {
                return Some(pos + len);
            }
            pos += len;
        } else {
            pos += 1;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn sources(formulas: &Formulas) -> Vec<(&str, bool)> {
        formulas.entries.iter().map(|f| (f.source.as_str(), f.display)).collect()
    }

    #[test]
    fn inline_formula() {
        let (output, formulas) = extract("Energy $E=mc^2$ here.");

        assert_eq!(sources(&formulas), vec![("E=mc^2", false)]);
        assert_eq!(output, "Energy \u{E000}0\u{E001} here.");
        assert_eq!(formulas.restore(&output), "Energy $E=mc^2$ here.");
    }

    #[test]
    fn space_after_opener_is_literal() {
        let (output, formulas) = extract("$ x$");

        assert!(formulas.is_empty());
        assert_eq!(output, "$ x$");
    }

    #[test]
    fn space_before_closer_is_literal() {
        let (output, formulas) = extract("$x $ and more");

        assert!(formulas.is_empty());
        assert_eq!(output, "$x $ and more");
    }

    #[test]
    fn digit_after_closer_is_literal() {
        let (_, formulas) = extract("costs $5 or $6 total");
        assert!(formulas.is_empty());

        let (_, formulas) = extract("between $a$1");
        assert!(formulas.is_empty());
    }

    #[test]
    fn empty_pair_is_literal() {
        let (output, formulas) = extract("a $$ b");

        assert!(formulas.is_empty());
        assert_eq!(output, "a $$ b");
    }

    #[test]
    fn escaped_closer_is_skipped() {
        let (_, formulas) = extract(r"$a\$b$");
        assert_eq!(sources(&formulas), vec![(r"a\$b", false)]);

        let (_, formulas) = extract(r"$a\\$ b");
        assert_eq!(sources(&formulas), vec![(r"a\\", false)]);
    }

    #[test]
    fn escaped_opener_is_left_to_the_parser() {
        let (output, formulas) = extract(r"\$x$");

        assert!(formulas.is_empty());
        assert_eq!(output, r"\$x$");
    }

    #[test]
    fn code_is_skipped() {
        let source = indoc! {"
            Inline `$x$` code.

            ```
            $y$
            $$
            ```
        "};
        let (output, formulas) = extract(source);

        assert!(formulas.is_empty());
        assert_eq!(output, source);
    }

    #[test]
    fn formulas_do_not_cross_paragraphs() {
        let (_, formulas) = extract("a $b\n\nc$ d");
        assert!(formulas.is_empty());
    }

    #[test]
    fn single_line_block() {
        let (output, formulas) = extract("$$x^2$$\n");

        assert_eq!(sources(&formulas), vec![("x^2\n", true)]);
        assert_eq!(output, "\u{E000}0\u{E001}\n");
    }

    #[test]
    fn multi_line_block() {
        let source = indoc! {"
            Before
            $$
            a + b
            = c
            $$
            After
        "};
        let (output, formulas) = extract(source);

        assert_eq!(sources(&formulas), vec![("a + b\n= c\n", true)]);
        assert_eq!(output, "Before\n\u{E000}0\u{E001}\nAfter\n");
        assert_eq!(formulas.original_line(2), 5);
        assert_eq!(formulas.original_line(1), 1);
    }

    #[test]
    fn block_with_partial_lines() {
        let (_, formulas) = extract("$$a\nb\nc$$\n");
        assert_eq!(sources(&formulas), vec![("a\nb\nc", true)]);
    }

    #[test]
    fn block_takes_last_closer_on_the_line() {
        let (_, formulas) = extract("$$\nx $$ y $$\n");
        assert_eq!(sources(&formulas), vec![("x $$ y ", true)]);
    }

    #[test]
    fn unclosed_block_is_not_math() {
        let (output, formulas) = extract("$$\nx\n");

        assert!(formulas.is_empty());
        assert_eq!(output, "$$\nx\n");
    }

    #[test]
    fn block_inside_quote() {
        let source = "> $$\n> x\n> $$\n";
        let (output, formulas) = extract(source);

        assert_eq!(sources(&formulas), vec![("x\n", true)]);
        assert_eq!(output, "> \u{E000}0\u{E001}\n");
    }

    #[test]
    fn block_ends_with_its_quote() {
        let (_, formulas) = extract("> $$\n> x\ny $$\n");
        assert!(formulas.is_empty());
    }

    #[test]
    fn block_inside_list_item() {
        let (output, formulas) = extract("- $$\n  x\n  $$\n");

        assert_eq!(sources(&formulas), vec![("x\n", true)]);
        assert_eq!(output, "- \u{E000}0\u{E001}\n");
    }

    #[test]
    fn formulas_stay_inside_list_items() {
        let (output, formulas) = extract("- $a\n- b$\n");
        assert!(formulas.is_empty());
        assert_eq!(output, "- $a\n- b$\n");

        let (_, formulas) = extract("1. $a$\n2. $b$\n");
        assert_eq!(sources(&formulas), vec![("a", false), ("b", false)]);
    }

    #[test]
    fn quote_interrupts_paragraph() {
        let (_, formulas) = extract("text $a\n> b$\n");
        assert!(formulas.is_empty());

        let (_, formulas) = extract("> a $x\nb$ lazy\n");
        assert_eq!(sources(&formulas), vec![("x\nb", false)]);
    }

    #[test]
    fn table_cells_are_scanned_separately() {
        let source = "| h |\n|---|\n| $a |\n| b$ |\n";
        let (output, formulas) = extract(source);

        assert!(formulas.is_empty());
        assert_eq!(output, source);

        let (output, formulas) = extract("| $x$ | y |\n|:--|--:|\n| $a$ | b \\| $c |\n");
        assert_eq!(sources(&formulas), vec![("x", false), ("a", false)]);
        assert_eq!(output, "| \u{E000}0\u{E001} | y |\n|:--|--:|\n| \u{E000}1\u{E001} | b \\| $c |\n");
    }

    #[test]
    fn table_ends_at_blank_line() {
        let (_, formulas) = extract("| h |\n|---|\n\n$a\nb$\n");
        assert_eq!(sources(&formulas), vec![("a\nb", false)]);
    }

    #[test]
    fn block_opener_may_be_indented() {
        let (output, formulas) = extract("  $$\nx\n$$\n");

        assert_eq!(sources(&formulas), vec![("x\n", true)]);
        assert_eq!(output, "  \u{E000}0\u{E001}\n");
    }

    #[test]
    fn block_in_list_continuation() {
        let (_, formulas) = extract("- a\n\n  $$\n  x\n  $$\n");
        assert_eq!(sources(&formulas), vec![("x\n", true)]);

        let (_, formulas) = extract("- a\n\n  $$\nx\n  $$\n");
        assert!(formulas.is_empty());
    }

    #[test]
    fn indented_code_is_not_a_block() {
        let (_, formulas) = extract("    $$\n    x\n    $$\n");
        assert!(formulas.is_empty());
    }

    #[test]
    fn segments_split_around_sentinels() {
        let (output, formulas) = extract("a $x$ b $y$");
        let segments = formulas.segments(&output);

        assert_eq!(
            segments,
            vec![
                Segment::Text("a "),
                Segment::Formula(0),
                Segment::Text(" b "),
                Segment::Formula(1),
            ]
        );
    }
}
