use super::tree::{Block, DisplayTree, Inline, ListNumbering};

impl DisplayTree {
    /// Projects the tree onto plain text for terminal output.
    ///
    /// Blocks are separated by a blank line, list items carry their bullet or decimal
    /// number, and hyperlinks are written as `label (href)`.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        write_blocks(&self.blocks, &mut out);
        out
    }
}

fn write_blocks(blocks: &[Block], out: &mut String) {
    let mut first = true;
    for block in blocks {
        let rendered = block_text(block);
        if rendered.is_empty() {
            continue;
        }
        if !first {
            out.push_str("\n\n");
        }
        first = false;
        out.push_str(&rendered);
    }
}

fn block_text(block: &Block) -> String {
    match block {
        Block::Paragraph { inlines } => inline_text(inlines),
        Block::Heading { inlines, .. } => inline_text(inlines),
        Block::CodeBlock { code, .. } => prefix_lines(code, "    ", "    "),
        Block::Quote { blocks } => {
            let mut inner = String::new();
            write_blocks(blocks, &mut inner);
            prefix_lines(&inner, "> ", "> ")
        }
        Block::List { numbering, items } => {
            let mut lines = Vec::new();
            for (position, item) in items.iter().enumerate() {
                let marker = match numbering {
                    ListNumbering::Bullet => "- ".to_string(),
                    ListNumbering::Decimal { start } => {
                        format!("{}. ", start.saturating_add(position as u64))
                    }
                };
                let mut inner = String::new();
                write_blocks(&item.blocks, &mut inner);
                let continuation = " ".repeat(marker.len());
                lines.push(prefix_lines(&inner, &marker, &continuation));
            }
            lines.join("\n")
        }
        Block::Table { header, rows, .. } => {
            let row_text = |cells: &[Vec<Inline>]| {
                cells
                    .iter()
                    .map(|cell| inline_text(cell))
                    .collect::<Vec<_>>()
                    .join(" | ")
            };
            let mut lines = vec![row_text(header), "---".to_string()];
            lines.extend(rows.iter().map(|row| row_text(row)));
            lines.join("\n")
        }
        Block::Rule => "----".to_string(),
    }
}

fn prefix_lines(text: &str, first: &str, rest: &str) -> String {
    if text.is_empty() {
        return first.trim_end().to_string();
    }
    text.split('\n')
        .enumerate()
        .map(|(index, line)| {
            let prefix = if index == 0 { first } else { rest };
            if line.is_empty() {
                prefix.trim_end().to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn inline_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        push_inline(inline, &mut out);
    }
    out
}

fn push_inline(inline: &Inline, out: &mut String) {
    match inline {
        Inline::Text { text } => out.push_str(text),
        Inline::Code { code } => out.push_str(code),
        Inline::Emphasis { children }
        | Inline::Strong { children }
        | Inline::Strikethrough { children }
        | Inline::Markup { children, .. } => {
            for child in children {
                push_inline(child, out);
            }
        }
        Inline::Link { href, children, .. } => {
            let label = inline_text(children);
            if label == *href || label.is_empty() {
                out.push_str(href);
            } else {
                out.push_str(&label);
                out.push_str(" (");
                out.push_str(href);
                out.push(')');
            }
        }
        Inline::LineBreak => out.push('\n'),
        Inline::SoftBreak => out.push(' '),
    }
}
