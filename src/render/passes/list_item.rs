//! Gives every list item an inner `<section>`.
//!
//! This one is a rendering override rather than a stream rewrite, so it applies to items at
//! every depth and in every kind of list.

use crate::parse::Kind;
use crate::render::Renderer;

pub fn install(renderer: &mut Renderer<'_>) {
    renderer
        .rule(Kind::ListItemOpen, |_, _| "<li><section>".to_owned())
        .rule(Kind::ListItemClose, |_, _| "</section></li>".to_owned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, ParseOptions};

    fn render(markdown: &str) -> String {
        let tokens = parse(markdown, &ParseOptions::default()).tokens;
        let mut renderer = Renderer::new();
        install(&mut renderer);
        renderer.render(&tokens)
    }

    #[test]
    fn nested_items_are_wrapped() {
        let html = render("- a\n  - b\n1. c\n");

        assert_eq!(html.matches("<li><section>").count(), 3);
        assert_eq!(html.matches("</section></li>").count(), 3);
        assert!(html.starts_with("<ul>\n<li><section>a\n<ul>\n<li><section>b</section></li>"));
    }

    #[test]
    fn task_items_are_wrapped() {
        let html = render("- [x] done\n- [ ] todo\n");
        assert_eq!(html.matches("<li><section><input").count(), 2);
    }
}
