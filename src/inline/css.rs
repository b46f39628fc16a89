//! A small `nom` parser for the subset of CSS the themes use: style rules, at-rules with or
//! without blocks, and declarations.

use std::borrow::Cow;

use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_till, take_till1, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{map, opt, rest};
use nom::error::ErrorKind;
use nom::sequence::{preceded, terminated, tuple};
use nom::IResult;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::prelude::*;

type Input<'i> = &'i str;
type ParseResult<'i, T> = IResult<Input<'i>, T, (Input<'i>, ErrorKind)>;

/// Wraps the given parser, consuming all whitespace before and after it.
fn trim<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> ParseResult<'a, O>
where
    F: FnMut(&'a str) -> ParseResult<'a, O>,
{
    nom::sequence::delimited(multispace0, inner, multispace0)
}

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

pub fn strip_comments(css: &str) -> Cow<'_, str> {
    COMMENT.replace_all(css, "")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration<'i> {
    pub property: &'i str,
    pub value: &'i str,
    pub important: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule<'i> {
    pub selectors: Vec<&'i str>,
    pub declarations: Vec<Declaration<'i>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtRule<'i> {
    /// As written; compare with [`AtRule::is`].
    pub name: &'i str,
    pub prelude: &'i str,
    pub body: Option<&'i str>,
}

impl AtRule<'_> {
    /// The rule as written, minus comments and surrounding whitespace.
    pub fn to_css(&self) -> String {
        match self.body {
            Some(body) => format!("@{} {} {{{}}}", self.name, self.prelude, body.trim()),
            None => format!("@{} {};", self.name, self.prelude),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item<'i> {
    Rule(Rule<'i>),
    AtRule(AtRule<'i>),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stylesheet<'i> {
    pub items: Vec<Item<'i>>,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// Splits on `separator` wherever it is not nested in parentheses, brackets or quotes.
pub fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;
    let mut last = 0;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }

        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => (),
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, c) if c == separator && depth == 0 => {
                parts.push(&input[last..i]);
                last = i + c.len_utf8();
            }
            _ => (),
        }
    }

    parts.push(&input[last..]);
    parts
}

/// Takes a `{ ... }` block with balanced braces, yielding its inner text.
fn block(input: Input<'_>) -> ParseResult<'_, &str> {
    let (input, _) = char('{')(input)?;

    let mut depth = 1;
    let mut quote = None;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }

        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => (),
            (None, '"' | '\'') => quote = Some(c),
            (None, '{') => depth += 1,
            (None, '}') => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[i + 1..], &input[..i]));
                }
            }
            _ => (),
        }
    }

    Err(nom::Err::Error((input, ErrorKind::TakeUntil)))
}

impl<'i> Declaration<'i> {
    /// Parses `property: value`, with an optional trailing `!important`.
    pub fn parse(input: Input<'i>) -> ParseResult<'i, Self> {
        tuple((trim(take_while1(is_ident_char)), char(':'), rest))(input).map(
            |(i, (property, _, value))| {
                let value = value.trim();
                let (value, important) = match value.rfind('!') {
                    Some(at) if value[at + 1..].trim().eq_ignore_ascii_case("important") => {
                        (value[..at].trim_end(), true)
                    }
                    _ => (value, false),
                };

                (
                    i,
                    Self {
                        property,
                        value,
                        important,
                    },
                )
            },
        )
    }

    /// Parses a semicolon-separated declaration list, skipping anything malformed.
    pub fn parse_many(input: Input<'i>) -> Vec<Self> {
        split_top_level(input, ';')
            .into_iter()
            .filter(|piece| !piece.trim().is_empty())
            .filter_map(|piece| match Self::parse(piece) {
                Ok((_, declaration)) if !declaration.value.is_empty() => Some(declaration),
                _ => {
                    trace!("Skipping malformed declaration {piece:?}.");
                    None
                }
            })
            .collect()
    }
}

impl<'i> Rule<'i> {
    pub fn parse(input: Input<'i>) -> ParseResult<'i, Self> {
        tuple((take_till1(|c| c == '{' || c == '}' || c == ';'), block))(input).map(
            |(i, (selectors, body))| {
                let selectors = split_top_level(selectors, ',')
                    .into_iter()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();

                (
                    i,
                    Self {
                        selectors,
                        declarations: Declaration::parse_many(body),
                    },
                )
            },
        )
    }
}

impl<'i> AtRule<'i> {
    pub fn parse(input: Input<'i>) -> ParseResult<'i, Self> {
        tuple((
            preceded(char('@'), take_while1(is_ident_char)),
            take_till(|c| c == '{' || c == ';'),
            alt((map(char(';'), |_| None), map(block, Some))),
        ))(input)
        .map(|(i, (name, prelude, body))| {
            (
                i,
                Self {
                    name,
                    prelude: prelude.trim(),
                    body,
                },
            )
        })
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl<'i> Item<'i> {
    pub fn parse(input: Input<'i>) -> ParseResult<'i, Self> {
        alt((map(AtRule::parse, Self::AtRule), map(Rule::parse, Self::Rule)))(input)
    }
}

impl<'i> Stylesheet<'i> {
    /// Parses a whole stylesheet. Comments must already be stripped.
    ///
    /// Unparseable text is skipped up to the end of the next block, so one bad rule never
    /// costs the rest of the sheet.
    pub fn parse(mut input: Input<'i>) -> Self {
        let mut items = Vec::new();

        loop {
            input = input.trim_start();
            if input.is_empty() {
                break;
            }

            match Item::parse(input) {
                Ok((remaining, item)) => {
                    items.push(item);
                    input = remaining;
                }
                Err(_) => {
                    let skip = input.find('}').map_or(input.len(), |at| at + 1);
                    debug!("Skipping unparseable CSS {:?}.", &input[..skip]);
                    input = &input[skip..];
                }
            }
        }

        Self { items }
    }
}

/// Selector specificity as `(ids, classes, types)`.
pub type Specificity = (u32, u32, u32);

/// Pseudo-elements that become real `<span>`s when inlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pseudo {
    Before,
    After,
}

fn pseudo(input: Input<'_>) -> ParseResult<'_, Pseudo> {
    preceded(
        tuple((char(':'), opt(char(':')))),
        terminated(
            alt((
                map(tag_no_case("before"), |_| Pseudo::Before),
                map(tag_no_case("after"), |_| Pseudo::After),
            )),
            nom::combinator::eof,
        ),
    )(input)
}

/// Splits a trailing `::before`/`::after` (or legacy single-colon form) off a selector.
/// Any other pseudo-element yields `None`: it cannot be inlined at all.
pub fn split_pseudo(selector: &str) -> Option<(&str, Option<Pseudo>)> {
    for (at, _) in selector.match_indices(':') {
        if at > 0 && selector.as_bytes()[at - 1] == b':' {
            continue;
        }
        if let Ok((_, kind)) = pseudo(&selector[at..]) {
            return Some((selector[..at].trim_end(), Some(kind)));
        }
    }

    let lowered = selector.to_ascii_lowercase();
    let other = ["::", ":first-line", ":first-letter"].iter().any(|p| lowered.contains(p));

    match other {
        true => None,
        false => Some((selector, None)),
    }
}

pub fn specificity(selector: &str) -> Specificity {
    let chars: Vec<char> = selector.chars().collect();
    let (mut ids, mut classes, mut types) = (0, 0, 0);
    let mut i = 0;
    // Whether the next identifier starts a compound selector, and so names an element type.
    let mut compound_start = true;

    let ident_end = |from: usize| {
        (from..chars.len())
            .find(|j| !(chars[*j].is_alphanumeric() || chars[*j] == '-' || chars[*j] == '_'))
            .unwrap_or(chars.len())
    };

    while i < chars.len() {
        match chars[i] {
            '#' => {
                ids += 1;
                i = ident_end(i + 1);
            }
            '.' => {
                classes += 1;
                i = ident_end(i + 1);
            }
            '[' => {
                classes += 1;
                i = (i..chars.len()).find(|j| chars[*j] == ']').map_or(chars.len(), |j| j + 1);
            }
            ':' => {
                let element = chars.get(i + 1) == Some(&':');
                let start = if element { i + 2 } else { i + 1 };
                let end = ident_end(start);
                let name: String = chars[start..end].iter().collect::<String>().to_ascii_lowercase();

                let mut next = end;
                let mut argument = String::new();
                if chars.get(end) == Some(&'(') {
                    let mut depth = 0;
                    for j in end..chars.len() {
                        match chars[j] {
                            '(' => depth += 1,
                            ')' => {
                                depth -= 1;
                                if depth == 0 {
                                    next = j + 1;
                                    break;
                                }
                            }
                            _ => (),
                        }
                    }
                    argument = chars[end + 1..next.saturating_sub(1).max(end + 1)].iter().collect();
                }

                match name.as_str() {
                    _ if element => types += 1,
                    "before" | "after" | "first-line" | "first-letter" => types += 1,
                    "where" => (),
                    "not" | "is" | "matches" => {
                        let inner = split_top_level(&argument, ',')
                            .into_iter()
                            .map(specificity)
                            .max()
                            .unwrap_or_default();
                        ids += inner.0;
                        classes += inner.1;
                        types += inner.2;
                    }
                    _ => classes += 1,
                }

                i = next;
            }
            c if c.is_alphabetic() && compound_start => {
                types += 1;
                i = ident_end(i);
            }
            _ => i += 1,
        }

        compound_start = matches!(chars.get(i), None | Some(' ' | '>' | '+' | '~' | '\t' | '\n'))
            || (i > 0 && matches!(chars[i - 1], ' ' | '>' | '+' | '~' | '\t' | '\n'));
    }

    (ids, classes, types)
}
