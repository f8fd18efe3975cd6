//! Turns untrusted bot reply text into a sanitized [`DisplayTree`].
//!
//! Replies are CommonMark with pipe tables and strikethrough, parsed by `pulldown-cmark`.
//! Raw markup tags are honoured only when they are on the [`RawMarkupAllowList`]; everything
//! else is kept as literal text. Rendering is pure and never fails.

mod allowlist;
mod markdown;
mod text;
mod tree;

pub use allowlist::{DEFAULT_ALLOWED_TAGS, RawMarkupAllowList, is_safe_href};
pub use tree::{
    Alignment, Block, DisplayTree, Inline, LinkPolicy, ListItem, ListNumbering,
};

/// Renders reply text with the default allow-list.
pub fn render(raw: &str) -> DisplayTree {
    Renderer::default().render(raw)
}

#[derive(Debug, Clone, Default)]
pub struct Renderer {
    allowlist: RawMarkupAllowList,
}

impl Renderer {
    pub fn new(allowlist: RawMarkupAllowList) -> Self {
        Self { allowlist }
    }

    pub fn allowlist(&self) -> &RawMarkupAllowList {
        &self.allowlist
    }

    pub fn render(&self, raw: &str) -> DisplayTree {
        let tree = DisplayTree::new(markdown::build_blocks(raw, &self.allowlist));
        tracing::trace!(
            input_bytes = raw.len(),
            blocks = tree.blocks.len(),
            "rendered reply"
        );
        tree
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn text(value: &str) -> Inline {
        Inline::text(value)
    }

    fn paragraph(inlines: Vec<Inline>) -> Block {
        Block::Paragraph { inlines }
    }

    #[test]
    fn empty_reply_renders_empty_tree() {
        assert!(render("").is_empty());
        assert!(render("  \n\n\t\n").is_empty());
    }

    #[test]
    fn bold_text_becomes_strong_node() {
        let tree = render("**bold**");
        assert_eq!(
            tree.blocks,
            vec![paragraph(vec![Inline::Strong {
                children: vec![text("bold")]
            }])]
        );
    }

    #[test]
    fn script_only_reply_is_visible_literal_text() {
        let tree = render("<script>alert('x')</script>");
        assert_eq!(
            tree.blocks,
            vec![paragraph(vec![text("<script>alert('x')</script>")])]
        );
        assert_eq!(tree.to_plain_text(), "<script>alert('x')</script>");
    }

    #[test]
    fn headings_rules_and_paragraph_breaks() {
        let tree = render("# Title\n\nfirst line\nsecond line\n\n---\nafter");
        assert_eq!(
            tree.blocks,
            vec![
                Block::Heading {
                    level: 1,
                    inlines: vec![text("Title")]
                },
                paragraph(vec![
                    text("first line"),
                    Inline::SoftBreak,
                    text("second line")
                ]),
                Block::Rule,
                paragraph(vec![text("after")]),
            ]
        );
    }

    #[test]
    fn ordered_list_keeps_start_and_nests_bullets() {
        let tree = render("3. three\n4. four\n   - nested\n   - more\n5. five");
        let Block::List { numbering, items } = &tree.blocks[0] else {
            panic!("expected list, got {:?}", tree.blocks);
        };
        assert_eq!(*numbering, ListNumbering::Decimal { start: 3 });
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].blocks.len(), 2);
        assert!(matches!(
            &items[1].blocks[1],
            Block::List {
                numbering: ListNumbering::Bullet,
                items
            } if items.len() == 2
        ));

        assert_eq!(
            tree.to_plain_text(),
            "3. three\n4. four\n\n   - nested\n   - more\n5. five"
        );
    }

    #[test]
    fn loose_list_items_continue_across_blank_lines() {
        let tree = render("- a\n\n- b\n\nplain");
        assert_eq!(tree.blocks.len(), 2);
        let Block::List { items, .. } = &tree.blocks[0] else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(tree.blocks[1], paragraph(vec![text("plain")]));
    }

    #[test]
    fn paragraph_is_not_interrupted_by_non_initial_number() {
        let tree = render("The year was\n1999. It was late.");
        assert_eq!(tree.blocks.len(), 1);

        let tree = render("Steps:\n1. open");
        assert_eq!(tree.blocks.len(), 2);
    }

    #[test]
    fn fenced_code_is_kept_verbatim() {
        let tree = render("```rust\nlet x = **y**;\n<b>raw</b>\n```\ntail");
        assert_eq!(
            tree.blocks,
            vec![
                Block::CodeBlock {
                    language: Some("rust".to_string()),
                    code: "let x = **y**;\n<b>raw</b>".to_string(),
                },
                paragraph(vec![text("tail")]),
            ]
        );
    }

    #[test]
    fn unterminated_fence_runs_to_end() {
        let tree = render("~~~\ncode\nmore");
        assert_eq!(
            tree.blocks,
            vec![Block::CodeBlock {
                language: None,
                code: "code\nmore".to_string()
            }]
        );
    }

    #[test]
    fn quotes_nest_blocks() {
        let tree = render("> quoted *text*\n> - item");
        let Block::Quote { blocks } = &tree.blocks[0] else {
            panic!("expected quote");
        };
        assert_eq!(blocks.len(), 2);
        assert_eq!(tree.to_plain_text(), "> quoted text\n>\n> - item");
    }

    #[test]
    fn pipe_tables_pad_short_rows() {
        let tree = render("| Name | Value |\n|:-----|------:|\n| GDP | 3% |\n| CPI |");
        let Block::Table {
            alignments,
            header,
            rows,
        } = &tree.blocks[0]
        else {
            panic!("expected table, got {:?}", tree.blocks);
        };
        assert_eq!(alignments, &vec![Alignment::Left, Alignment::Right]);
        assert_eq!(header.len(), 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], Vec::<Inline>::new());
        assert_eq!(
            tree.to_plain_text(),
            "Name | Value\n---\nGDP | 3%\nCPI | "
        );
    }

    #[test]
    fn links_carry_isolation_policy_and_project_to_plain_text() {
        let tree = render("Read [the report](https://example.com/r) or <https://example.com>.");
        let Block::Paragraph { inlines } = &tree.blocks[0] else {
            panic!("expected paragraph");
        };
        assert!(inlines.iter().all(|inline| match inline {
            Inline::Link { policy, .. } => *policy == LinkPolicy::ISOLATED,
            _ => true,
        }));
        assert_eq!(
            tree.to_plain_text(),
            "Read the report (https://example.com/r) or https://example.com."
        );
    }

    #[test]
    fn deeply_nested_lists_terminate() {
        let nested = "- ".repeat(500) + "bottom";
        let tree = render(&nested);
        assert_eq!(tree.blocks.len(), 1);
        assert!(tree.to_plain_text().contains("bottom"));

        let quoted = ">".repeat(500) + " deep";
        let tree = render(&quoted);
        assert!(tree.to_plain_text().contains("deep"));
    }

    #[test]
    fn empty_allowlist_escapes_every_tag() {
        let renderer = Renderer::new(RawMarkupAllowList::empty());
        let tree = renderer.render("<b>bold</b>");
        assert_eq!(tree.blocks, vec![paragraph(vec![text("<b>bold</b>")])]);
    }

    #[test]
    fn line_endings_and_nul_are_normalized() {
        assert_eq!(
            render("a\r\nb").blocks,
            vec![paragraph(vec![text("a"), Inline::SoftBreak, text("b")])]
        );
        assert_eq!(render("a\0b").to_plain_text(), "a\u{fffd}b");
    }

    #[test]
    fn large_adversarial_replies_render_quickly() {
        let nested_tags = "<b>".repeat(22_000);
        let stars = "*a".repeat(33_000);
        let brackets = "[x".repeat(33_000);
        let quotes = "> ".repeat(33_000) + "end";
        assert!(nested_tags.len() >= 64 * 1024);

        let started = Instant::now();
        let tree = render(&nested_tags);
        assert_eq!(tree.to_plain_text(), nested_tags);
        for reply in [&stars, &brackets, &quotes] {
            assert!(!render(reply).is_empty());
        }
        assert!(
            started.elapsed() < Duration::from_secs(10),
            "rendering took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn tree_serializes_with_tagged_nodes() {
        let tree = render("*hi*");
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["blocks"][0]["type"], "paragraph");
        assert_eq!(json["blocks"][0]["inlines"][0]["type"], "emphasis");

        let back: DisplayTree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }
}
