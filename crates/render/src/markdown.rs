use pulldown_cmark::{Alignment as MarkdownAlignment, CodeBlockKind, Event, Options, Parser, Tag};

use super::allowlist::{RawMarkupAllowList, is_safe_href};
use super::tree::{Alignment, Block, Inline, LinkPolicy, ListItem, ListNumbering};

/// Quotes and lists nested deeper than this flow into their nearest ancestor.
pub(crate) const MAX_BLOCK_DEPTH: usize = 24;
/// Spans nested deeper than this keep their content but lose the span.
pub(crate) const MAX_INLINE_DEPTH: usize = 16;

pub(crate) fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options
}

/// Folds the markdown event stream of one reply into display blocks.
pub(crate) fn build_blocks(raw: &str, allowlist: &RawMarkupAllowList) -> Vec<Block> {
    let mut builder = TreeBuilder::new(allowlist);
    for event in Parser::new_ext(raw, parser_options()) {
        builder.event(event);
    }
    builder.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerKind {
    Root,
    Quote,
    Item,
}

#[derive(Debug)]
enum InlineKind {
    Paragraph,
    Heading(u8),
    HtmlBlock,
    Cell,
    Emphasis,
    Strong,
    Strikethrough,
    Link(String),
    /// Link or image whose destination failed the scheme check; only the label survives.
    Unlinked,
    /// Allow-listed raw tag still waiting for its closing tag.
    Markup { tag: String, raw: String },
}

impl InlineKind {
    fn is_span(&self) -> bool {
        !matches!(
            self,
            Self::Paragraph | Self::Heading(_) | Self::HtmlBlock | Self::Cell
        )
    }
}

#[derive(Debug)]
enum Frame {
    Container {
        kind: ContainerKind,
        blocks: Vec<Block>,
        /// Inline content not wrapped in a paragraph, as in tight list items.
        loose: Vec<Inline>,
    },
    List {
        start: Option<u64>,
        items: Vec<ListItem>,
    },
    Inlines {
        kind: InlineKind,
        inlines: Vec<Inline>,
    },
    Code {
        language: Option<String>,
        code: String,
    },
    Table {
        alignments: Vec<Alignment>,
        header: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
    },
    Row {
        head: bool,
        cells: Vec<Vec<Inline>>,
    },
}

impl Frame {
    fn container(kind: ContainerKind) -> Self {
        Self::Container {
            kind,
            blocks: Vec::new(),
            loose: Vec::new(),
        }
    }

    fn inlines(kind: InlineKind) -> Self {
        Self::Inlines {
            kind,
            inlines: Vec::new(),
        }
    }
}

/// Whether a markdown start event opened a frame or was flattened away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opened {
    Frame,
    Skipped,
}

struct TreeBuilder<'a> {
    allowlist: &'a RawMarkupAllowList,
    frames: Vec<Frame>,
    opened: Vec<Opened>,
    block_depth: usize,
    span_depth: usize,
}

impl<'a> TreeBuilder<'a> {
    fn new(allowlist: &'a RawMarkupAllowList) -> Self {
        Self {
            allowlist,
            frames: vec![Frame::container(ContainerKind::Root)],
            opened: Vec::new(),
            block_depth: 0,
            span_depth: 0,
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => self.push_inline(Inline::Code {
                code: code.into_string(),
            }),
            Event::Html(html) | Event::InlineHtml(html) => self.raw_html(&html),
            Event::SoftBreak => self.push_inline(Inline::SoftBreak),
            Event::HardBreak => self.push_inline(Inline::LineBreak),
            Event::Rule => self.push_block(Block::Rule),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let frame = match tag {
            Tag::Paragraph => Some(Frame::inlines(InlineKind::Paragraph)),
            Tag::Heading { level, .. } => Some(Frame::inlines(InlineKind::Heading(level as u8))),
            Tag::BlockQuote(_) => {
                (self.block_depth < MAX_BLOCK_DEPTH).then(|| Frame::container(ContainerKind::Quote))
            }
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().map(str::to_string)
                    }
                    CodeBlockKind::Indented => None,
                };
                Some(Frame::Code {
                    language,
                    code: String::new(),
                })
            }
            Tag::HtmlBlock => Some(Frame::inlines(InlineKind::HtmlBlock)),
            Tag::List(start) => (self.block_depth < MAX_BLOCK_DEPTH).then(|| Frame::List {
                start,
                items: Vec::new(),
            }),
            Tag::Item => matches!(self.frames.last(), Some(Frame::List { .. }))
                .then(|| Frame::container(ContainerKind::Item)),
            Tag::Table(alignments) => Some(Frame::Table {
                alignments: alignments.iter().map(|alignment| convert(*alignment)).collect(),
                header: Vec::new(),
                rows: Vec::new(),
            }),
            Tag::TableHead => Some(Frame::Row {
                head: true,
                cells: Vec::new(),
            }),
            Tag::TableRow => Some(Frame::Row {
                head: false,
                cells: Vec::new(),
            }),
            Tag::TableCell => Some(Frame::inlines(InlineKind::Cell)),
            Tag::Emphasis => self.span(InlineKind::Emphasis),
            Tag::Strong => self.span(InlineKind::Strong),
            Tag::Strikethrough => self.span(InlineKind::Strikethrough),
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                let kind = if is_safe_href(&dest_url) {
                    InlineKind::Link(dest_url.into_string())
                } else {
                    InlineKind::Unlinked
                };
                self.span(kind)
            }
            _ => None,
        };

        match frame {
            Some(frame) => {
                self.push_frame(frame);
                self.opened.push(Opened::Frame);
            }
            None => self.opened.push(Opened::Skipped),
        }
    }

    fn span(&self, kind: InlineKind) -> Option<Frame> {
        (self.span_depth < MAX_INLINE_DEPTH).then(|| Frame::inlines(kind))
    }

    fn end(&mut self) {
        if self.opened.pop() != Some(Opened::Frame) {
            return;
        }
        self.unwind_markup();
        if self.frames.len() <= 1 {
            return;
        }
        if let Some(frame) = self.pop_frame() {
            self.close(frame);
        }
    }

    fn finish(mut self) -> Vec<Block> {
        while self.frames.len() > 1 {
            self.unwind_markup();
            if self.frames.len() <= 1 {
                break;
            }
            if let Some(frame) = self.pop_frame() {
                self.close(frame);
            }
        }

        match self.frames.pop() {
            Some(Frame::Container { blocks, loose, .. }) => with_loose(blocks, loose),
            _ => Vec::new(),
        }
    }

    fn push_frame(&mut self, frame: Frame) {
        match &frame {
            Frame::Container { .. } | Frame::List { .. } => self.block_depth += 1,
            Frame::Inlines { kind, .. } if kind.is_span() => self.span_depth += 1,
            _ => {}
        }
        self.frames.push(frame);
    }

    fn pop_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        match &frame {
            Frame::Container { .. } | Frame::List { .. } => {
                self.block_depth = self.block_depth.saturating_sub(1);
            }
            Frame::Inlines { kind, .. } if kind.is_span() => {
                self.span_depth = self.span_depth.saturating_sub(1);
            }
            _ => {}
        }
        Some(frame)
    }

    /// Turns raw tags that never saw their closing tag back into literal text.
    fn unwind_markup(&mut self) {
        while matches!(
            self.frames.last(),
            Some(Frame::Inlines {
                kind: InlineKind::Markup { .. },
                ..
            })
        ) {
            let Some(Frame::Inlines {
                kind: InlineKind::Markup { raw, .. },
                inlines,
            }) = self.pop_frame()
            else {
                break;
            };
            self.push_text(&raw);
            for inline in inlines {
                self.push_inline(inline);
            }
        }
    }

    fn close(&mut self, frame: Frame) {
        match frame {
            Frame::Container { kind, blocks, loose } => {
                let blocks = with_loose(blocks, loose);
                match kind {
                    ContainerKind::Quote => self.push_block(Block::Quote { blocks }),
                    ContainerKind::Item => {
                        if let Some(Frame::List { items, .. }) = self.frames.last_mut() {
                            items.push(ListItem { blocks });
                        }
                    }
                    ContainerKind::Root => {}
                }
            }
            Frame::List { start, items } => {
                let numbering = match start {
                    Some(start) => ListNumbering::Decimal { start },
                    None => ListNumbering::Bullet,
                };
                self.push_block(Block::List { numbering, items });
            }
            Frame::Inlines { kind, mut inlines } => match kind {
                InlineKind::Paragraph => {
                    if !inlines.is_empty() {
                        self.push_block(Block::Paragraph { inlines });
                    }
                }
                InlineKind::Heading(level) => self.push_block(Block::Heading { level, inlines }),
                InlineKind::HtmlBlock => {
                    trim_trailing_whitespace(&mut inlines);
                    if !inlines.is_empty() {
                        self.push_block(Block::Paragraph { inlines });
                    }
                }
                InlineKind::Cell => {
                    if let Some(Frame::Row { cells, .. }) = self.frames.last_mut() {
                        cells.push(inlines);
                    }
                }
                InlineKind::Emphasis => self.push_inline(Inline::Emphasis { children: inlines }),
                InlineKind::Strong => self.push_inline(Inline::Strong { children: inlines }),
                InlineKind::Strikethrough => {
                    self.push_inline(Inline::Strikethrough { children: inlines })
                }
                InlineKind::Link(href) => self.push_inline(Inline::Link {
                    href,
                    children: inlines,
                    policy: LinkPolicy::ISOLATED,
                }),
                InlineKind::Unlinked => {
                    for inline in inlines {
                        self.push_inline(inline);
                    }
                }
                InlineKind::Markup { tag, .. } => self.push_inline(Inline::Markup {
                    tag,
                    children: inlines,
                }),
            },
            Frame::Code { language, mut code } => {
                if code.ends_with('\n') {
                    code.pop();
                }
                self.push_block(Block::CodeBlock { language, code });
            }
            Frame::Table {
                alignments,
                header,
                rows,
            } => self.push_block(Block::Table {
                alignments,
                header,
                rows,
            }),
            Frame::Row { head, mut cells } => {
                if let Some(Frame::Table {
                    alignments,
                    header,
                    rows,
                }) = self.frames.last_mut()
                {
                    cells.resize_with(alignments.len(), Vec::new);
                    if head {
                        *header = cells;
                    } else {
                        rows.push(cells);
                    }
                }
            }
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(Frame::Code { code, .. }) = self.frames.last_mut() {
            code.push_str(text);
            return;
        }
        self.push_text(text);
    }

    fn push_text(&mut self, text: &str) {
        if !text.is_empty() {
            self.push_inline(Inline::text(text));
        }
    }

    fn push_inline(&mut self, inline: Inline) {
        let target = match self.frames.last_mut() {
            Some(Frame::Inlines { inlines, .. }) => inlines,
            Some(Frame::Container { loose, .. }) => loose,
            _ => return,
        };
        push_merged(target, inline);
    }

    fn push_block(&mut self, block: Block) {
        if let Some(Frame::Container { blocks, loose, .. }) = self.frames.last_mut() {
            if !loose.is_empty() {
                blocks.push(Block::Paragraph {
                    inlines: std::mem::take(loose),
                });
            }
            blocks.push(block);
        }
    }

    /// Splits raw markup into tags and text; only allow-listed tags become markup nodes.
    fn raw_html(&mut self, html: &str) {
        let mut rest = html;
        while let Some(open) = rest.find('<') {
            self.push_text(&rest[..open]);
            let candidate = &rest[open..];
            match candidate.find('>') {
                Some(close) => {
                    self.raw_tag(&candidate[..=close]);
                    rest = &candidate[close + 1..];
                }
                None => {
                    self.push_text(candidate);
                    rest = "";
                }
            }
        }
        self.push_text(rest);
    }

    fn raw_tag(&mut self, raw: &str) {
        let Some(tag) = RawTag::parse(raw).filter(|tag| self.allowlist.allows(&tag.name)) else {
            self.push_text(raw);
            return;
        };

        if RawMarkupAllowList::is_void(&tag.name) {
            self.push_inline(Inline::LineBreak);
            return;
        }

        if tag.closing {
            let closes_top = matches!(
                self.frames.last(),
                Some(Frame::Inlines { kind: InlineKind::Markup { tag: open, .. }, .. })
                    if *open == tag.name
            );
            if !closes_top {
                self.push_text(raw);
            } else if let Some(frame) = self.pop_frame() {
                self.close(frame);
            }
            return;
        }

        if tag.self_closing || self.span_depth >= MAX_INLINE_DEPTH {
            self.push_text(raw);
            return;
        }

        self.push_frame(Frame::inlines(InlineKind::Markup {
            tag: tag.name,
            raw: raw.to_string(),
        }));
    }
}

struct RawTag {
    name: String,
    closing: bool,
    self_closing: bool,
}

impl RawTag {
    /// Parses one `<...>` chunk. Comments, doctypes and malformed tags yield `None`.
    fn parse(raw: &str) -> Option<Self> {
        let inner = raw.strip_prefix('<')?.strip_suffix('>')?;
        let (closing, inner) = match inner.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, inner),
        };

        let first = inner.chars().next()?;
        if !first.is_ascii_alphabetic() {
            return None;
        }
        let name_len = inner
            .bytes()
            .take_while(|byte| byte.is_ascii_alphanumeric())
            .count();
        let after = &inner[name_len..];
        if !after.is_empty() && !after.starts_with(|ch: char| ch.is_whitespace() || ch == '/') {
            return None;
        }
        if after.contains('<') || (closing && !after.trim().is_empty()) {
            return None;
        }

        Some(Self {
            name: inner[..name_len].to_ascii_lowercase(),
            closing,
            self_closing: after.trim_end().ends_with('/'),
        })
    }
}

fn convert(alignment: MarkdownAlignment) -> Alignment {
    match alignment {
        MarkdownAlignment::None => Alignment::None,
        MarkdownAlignment::Left => Alignment::Left,
        MarkdownAlignment::Center => Alignment::Center,
        MarkdownAlignment::Right => Alignment::Right,
    }
}

fn with_loose(mut blocks: Vec<Block>, loose: Vec<Inline>) -> Vec<Block> {
    if !loose.is_empty() {
        blocks.push(Block::Paragraph { inlines: loose });
    }
    blocks
}

fn push_merged(target: &mut Vec<Inline>, inline: Inline) {
    if let Inline::Text { text } = &inline
        && let Some(Inline::Text { text: last }) = target.last_mut()
    {
        last.push_str(text);
        return;
    }
    target.push(inline);
}

fn trim_trailing_whitespace(inlines: &mut Vec<Inline>) {
    loop {
        match inlines.last_mut() {
            Some(Inline::Text { text }) => {
                let trimmed = text.trim_end().len();
                text.truncate(trimmed);
                if !text.is_empty() {
                    return;
                }
            }
            Some(Inline::SoftBreak | Inline::LineBreak) => {}
            _ => return,
        }
        inlines.pop();
    }
}
