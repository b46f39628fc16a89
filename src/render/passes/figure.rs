//! Implicit figures: a paragraph holding nothing but an image, linked or not, becomes a
//! `<figure>` whose caption is the image's alt text.

use crate::parse::{Kind, Token};

fn is_lone_image(children: &[Token]) -> bool {
    let kinds: Vec<Kind> = children.iter().map(|t| t.kind).collect();

    matches!(
        kinds.as_slice(),
        [Kind::Image] | [Kind::LinkOpen, Kind::Image, Kind::LinkClose]
    )
}

fn caption_tag(kind: Kind) -> Token {
    let mut token = Token::new(kind);
    token.block = false;
    token
}

pub fn apply(mut tokens: Vec<Token>) -> Vec<Token> {
    for i in 1..tokens.len().saturating_sub(1) {
        let is_figure = tokens[i].kind == Kind::Inline
            && tokens[i - 1].kind == Kind::ParagraphOpen
            && !tokens[i - 1].hidden
            && tokens[i + 1].kind == Kind::ParagraphClose
            && is_lone_image(&tokens[i].children);

        if !is_figure {
            continue;
        }

        for (at, kind) in [(i - 1, Kind::FigureOpen), (i + 1, Kind::FigureClose)] {
            let map = tokens[at].map;
            tokens[at] = Token::new(kind);
            tokens[at].map = map;
        }

        let children = &mut tokens[i].children;
        let Some(image) = children.iter_mut().find(|t| t.kind == Kind::Image) else {
            continue;
        };

        if image.children.is_empty() {
            continue;
        }

        let caption = std::mem::take(&mut image.children);
        image.set_attr("alt", "");

        children.push(caption_tag(Kind::FigcaptionOpen));
        children.extend(caption);
        children.push(caption_tag(Kind::FigcaptionClose));
    }

    tokens
}
