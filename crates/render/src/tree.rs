use serde::{Deserialize, Serialize};

/// Sanitized, structured form of one bot reply.
///
/// Nothing in the tree is executable: raw markup survives only as [`Inline::Markup`]
/// nodes for allow-listed presentational tags, with every attribute dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayTree {
    pub blocks: Vec<Block>,
}

impl DisplayTree {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Block-level grouping. Consumers separate consecutive blocks vertically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph {
        inlines: Vec<Inline>,
    },
    Heading {
        level: u8,
        inlines: Vec<Inline>,
    },
    List {
        numbering: ListNumbering,
        items: Vec<ListItem>,
    },
    CodeBlock {
        language: Option<String>,
        code: String,
    },
    Quote {
        blocks: Vec<Block>,
    },
    Table {
        alignments: Vec<Alignment>,
        header: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
    },
    Rule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum ListNumbering {
    Bullet,
    /// Decimal numbering counting up from `start`.
    Decimal { start: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListItem {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    None,
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inline {
    Text {
        text: String,
    },
    Emphasis {
        children: Vec<Inline>,
    },
    Strong {
        children: Vec<Inline>,
    },
    Strikethrough {
        children: Vec<Inline>,
    },
    Code {
        code: String,
    },
    Link {
        href: String,
        children: Vec<Inline>,
        policy: LinkPolicy,
    },
    /// Allow-listed raw markup tag, lowercased, attributes removed.
    Markup {
        tag: String,
        children: Vec<Inline>,
    },
    LineBreak,
    SoftBreak,
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Navigation rules attached to every hyperlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPolicy {
    /// Open in a separate browsing context rather than replacing the transcript.
    pub new_context: bool,
    /// The opened context gets no handle back to the opener.
    pub no_opener: bool,
    /// No referrer information is sent on navigation.
    pub no_referrer: bool,
}

impl LinkPolicy {
    pub const ISOLATED: Self = Self {
        new_context: true,
        no_opener: true,
        no_referrer: true,
    };

    /// `rel` attribute value for HTML consumers.
    pub fn rel(&self) -> &'static str {
        match (self.no_opener, self.no_referrer) {
            (true, true) => "noopener noreferrer",
            (true, false) => "noopener",
            (false, true) => "noreferrer",
            (false, false) => "",
        }
    }
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self::ISOLATED
    }
}
