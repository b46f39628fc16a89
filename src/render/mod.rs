pub mod formula;
pub mod highlight;
pub mod html;
pub mod passes;

pub use formula::{FormulaRenderer, Katex};
pub use highlight::{CodeStyle, Highlight, Inkjet};
pub use html::Renderer;
pub use passes::PassOptions;

use crate::parse::{Kind, Parsed};
use crate::prelude::*;

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub code: CodeStyle,
    pub passes: PassOptions,
}

/// Runs the transform passes over a parsed document and serializes the result.
pub fn render(
    parsed: Parsed,
    highlighter: &dyn Highlight,
    typesetter: &dyn FormulaRenderer,
    options: &RenderOptions,
) -> String {
    let tokens = passes::run(parsed.tokens, &parsed.formulas, &options.passes);
    debug!("Transform passes done, rendering {} top-level tokens.", tokens.len());

    let mut renderer = Renderer::new();
    install(&mut renderer, highlighter, typesetter, &options.code);
    renderer.render(&tokens)
}

/// Installs the code, list item and formula overrides.
pub fn install<'r>(
    renderer: &mut Renderer<'r>,
    highlighter: &'r dyn Highlight,
    typesetter: &'r dyn FormulaRenderer,
    code: &'r CodeStyle,
) {
    renderer
        .rule(Kind::Fence, move |tokens, idx| {
            let token = &tokens[idx];
            let lang = token.info.split_whitespace().next().unwrap_or_default();
            highlight::fence(highlighter, &token.content, lang, code) + "\n"
        })
        .rule(Kind::MathInline, move |tokens, idx| {
            let token = &tokens[idx];
            formula::formula(typesetter, &token.content, token.markup == "$$")
        })
        .rule(Kind::MathBlock, move |tokens, idx| {
            formula::formula(typesetter, &tokens[idx].content, true) + "\n"
        });

    passes::list_item::install(renderer);
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::parse::{parse, ParseOptions};
    use formula::tests::FakeKatex;
    use highlight::tests::FakeHighlighter;

    fn html(markdown: &str) -> String {
        let parsed = parse(markdown, &ParseOptions::default());
        render(parsed, &FakeHighlighter, &FakeKatex, &RenderOptions::default())
    }

    #[test]
    fn inline_math_has_no_dollars() {
        let output = html("$x^2$");

        assert_eq!(output, "<p><span class=\"katex\">x^2</span></p>\n");
        assert!(!output.contains('$'));
    }

    #[test]
    fn literal_dollar_survives() {
        assert_eq!(html("$ x$"), "<p>$ x$</p>\n");
    }

    #[test]
    fn block_math_renders_display() {
        assert_eq!(
            html("$$\nx\n$$\n"),
            "<span class=\"katex-display\">x\n</span>\n"
        );
    }

    #[test]
    fn dollars_do_not_merge_blocks() {
        assert_eq!(html("- $a\n- b$\n").matches("<li>").count(), 2);
        assert!(html("text $a\n> b$\n").contains("<blockquote"));
        assert_eq!(html("| h |\n|---|\n| $a |\n| b$ |\n").matches("<td>").count(), 2);
    }

    #[test]
    fn indented_block_math_opener() {
        assert_eq!(html("  $$\nx\n$$\n"), "<span class=\"katex-display\">x\n</span>\n");
    }

    #[test]
    fn broken_formula_falls_back_to_source() {
        assert_eq!(html(r"$\fail$"), "<p>\\fail</p>\n");
    }

    #[test]
    fn unknown_language_is_plain_code() {
        assert_eq!(
            html("```foo\n<b>\n```\n"),
            "<pre class=\"custom mac-style\"><code class=\"hljs\">&lt;b&gt;\n</code></pre>\n"
        );
    }

    #[test]
    fn full_document() {
        let output = html(indoc! {"
            ## Intro

            > quote

            | a |
            |---|
            | 1 |

            - item
        "});

        assert_eq!(
            output,
            indoc! {r#"
                <h2><span class="prefix">1. </span><span class="content">Intro</span><span class="suffix"></span></h2>
                <blockquote class="multiquote-1">
                <p>quote</p>
                </blockquote>
                <section class="table-container"><table>
                <thead>
                <tr>
                <th>a</th>
                </tr>
                </thead>
                <tbody>
                <tr>
                <td>1</td>
                </tr>
                </tbody>
                </table>
                </section><ul>
                <li><section>item</section></li></ul>
            "#}
        );
    }
}
