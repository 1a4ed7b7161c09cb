//! Block data model.
//!
//! A document is an ordered tree of blocks. Metadata is plain data; rich
//! text lives in `content` as a sequence of styled runs. Type-specific
//! attributes (`props`) are carried opaquely so unknown block types
//! round-trip without loss.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smartstring::alias::String as SmartString;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Globally unique block identifier.
///
/// Ids are opaque strings: the editor may assign its own, or
/// [`BlockId::random`] mints a time-ordered UUIDv7. Immutable once created.
/// The empty string is reserved as the root sentinel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(SmartString);

impl BlockId {
    pub fn new(id: impl Into<SmartString>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh time-ordered id.
    pub fn random() -> Self {
        Self(Uuid::now_v7().simple().to_string().into())
    }

    /// Sentinel parent of top-level blocks. Serialized as the empty string.
    pub fn root() -> Self {
        Self(SmartString::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

impl From<String> for BlockId {
    fn from(id: String) -> Self {
        Self(id.into())
    }
}

// =============================================================================
// Block type
// =============================================================================

/// Block discriminator.
///
/// Open enumeration: the editor can introduce new types at any time, so
/// unknown discriminators round-trip verbatim through `Other` instead of
/// failing to parse. Serialized as a plain string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BlockType {
    #[default]
    Paragraph,
    Heading,
    BulletListItem,
    NumberedListItem,
    Quote,
    Code,
    Date,
    Other(SmartString),
}

impl BlockType {
    pub fn as_str(&self) -> &str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading => "heading",
            BlockType::BulletListItem => "bulletListItem",
            BlockType::NumberedListItem => "numberedListItem",
            BlockType::Quote => "quote",
            BlockType::Code => "code",
            BlockType::Date => "date",
            BlockType::Other(s) => s,
        }
    }
}

impl From<&str> for BlockType {
    fn from(s: &str) -> Self {
        match s {
            "paragraph" => BlockType::Paragraph,
            "heading" => BlockType::Heading,
            "bulletListItem" => BlockType::BulletListItem,
            "numberedListItem" => BlockType::NumberedListItem,
            "quote" => BlockType::Quote,
            "code" => BlockType::Code,
            "date" => BlockType::Date,
            other => BlockType::Other(other.into()),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BlockType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BlockType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(BlockType::from(s.as_str()))
    }
}

// =============================================================================
// Inline content
// =============================================================================

fn is_false(v: &bool) -> bool {
    !*v
}

/// Style flags on an inline run.
///
/// Flags are independent, not mutually exclusive. Unset flags are omitted
/// on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleSet {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strikethrough: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl StyleSet {
    pub fn is_plain(&self) -> bool {
        *self == StyleSet::default()
    }
}

/// One contiguous run of equally-styled text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineRun {
    pub text: String,
    #[serde(default, skip_serializing_if = "StyleSet::is_plain")]
    pub styles: StyleSet,
}

impl InlineRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            styles: StyleSet::default(),
        }
    }
}

// =============================================================================
// Block
// =============================================================================

/// One node of the document tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,

    #[serde(rename = "type")]
    pub kind: BlockType,

    /// Type-specific attributes, passed through opaquely.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,

    /// Ordered inline text runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<InlineRun>,

    /// Containing block, or the root sentinel for top-level blocks.
    #[serde(default)]
    pub parent_id: BlockId,

    /// Sibling order key. Strictly increasing by position within one
    /// parent; gaps are expected and exploited for cheap insertion.
    pub order: f64,

    /// Hierarchical level for heading-like types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

impl Block {
    /// New top-level block with empty content. The order key is assigned by
    /// the store on insert.
    pub fn new(id: impl Into<BlockId>, kind: BlockType) -> Self {
        Self {
            id: id.into(),
            kind,
            props: Map::new(),
            content: Vec::new(),
            parent_id: BlockId::root(),
            order: 0.0,
            depth: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<BlockId>) -> Self {
        self.parent_id = parent.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content = vec![InlineRun::plain(text)];
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    /// Concatenated plain text of all runs.
    pub fn text(&self) -> String {
        self.content.iter().map(|r| r.text.as_str()).collect()
    }
}

// =============================================================================
// Partial patch
// =============================================================================

/// Nested-option codec: absent = untouched, `null` = cleared, value = set.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Option<u32>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.as_ref().unwrap_or(&None).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<u32>>, D::Error> {
        Option::<u32>::deserialize(deserializer).map(Some)
    }
}

/// Partial attribute set merged into an existing block by an update.
///
/// Absent fields are untouched. `props` and `content` are each a single
/// attribute and are replaced as a unit when present. `depth` distinguishes
/// absent (untouched) from `null` (cleared).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialPatch {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<BlockType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<InlineRun>>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub depth: Option<Option<u32>>,
}

impl PartialPatch {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.props.is_none() && self.content.is_none() && self.depth.is_none()
    }

    /// Merge into `block`, field by field.
    pub fn apply_to(&self, block: &mut Block) {
        if let Some(kind) = &self.kind {
            block.kind = kind.clone();
        }
        if let Some(props) = &self.props {
            block.props = props.clone();
        }
        if let Some(content) = &self.content {
            block.content = content.clone();
        }
        if let Some(depth) = &self.depth {
            block.depth = *depth;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_root_sentinel() {
        assert!(BlockId::root().is_root());
        assert!(!BlockId::from("a").is_root());
        assert_eq!(BlockId::root().as_str(), "");
    }

    #[test]
    fn block_id_random_is_unique() {
        let a = BlockId::random();
        let b = BlockId::random();
        assert_ne!(a, b);
        assert!(!a.is_root());
    }

    #[test]
    fn block_type_known_round_trip() {
        for name in [
            "paragraph",
            "heading",
            "bulletListItem",
            "numberedListItem",
            "quote",
            "code",
            "date",
        ] {
            let kind = BlockType::from(name);
            assert!(!matches!(kind, BlockType::Other(_)), "{name} should be known");
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn block_type_unknown_round_trips_verbatim() {
        let json = "\"callout\"";
        let kind: BlockType = serde_json::from_str(json).unwrap();
        assert_eq!(kind, BlockType::Other("callout".into()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), json);
    }

    #[test]
    fn style_flags_are_independent() {
        let styles = StyleSet {
            bold: true,
            italic: true,
            ..StyleSet::default()
        };
        let json = serde_json::to_value(&styles).unwrap();
        assert_eq!(json, serde_json::json!({"bold": true, "italic": true}));

        let back: StyleSet = serde_json::from_value(json).unwrap();
        assert!(back.bold && back.italic && !back.code);
    }

    #[test]
    fn block_wire_shape() {
        let json = serde_json::json!({
            "id": "b1",
            "type": "heading",
            "props": {"level": 2},
            "content": [{"text": "Title", "styles": {"bold": true}}],
            "parent_id": "",
            "order": 10.0,
            "depth": 2
        });
        let block: Block = serde_json::from_value(json).unwrap();
        assert_eq!(block.kind, BlockType::Heading);
        assert!(block.parent_id.is_root());
        assert_eq!(block.depth, Some(2));
        assert_eq!(block.text(), "Title");
        assert!(block.content[0].styles.bold);
    }

    #[test]
    fn partial_patch_depth_three_states() {
        let untouched: PartialPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(untouched.depth, None);

        let cleared: PartialPatch = serde_json::from_str(r#"{"depth": null}"#).unwrap();
        assert_eq!(cleared.depth, Some(None));

        let set: PartialPatch = serde_json::from_str(r#"{"depth": 3}"#).unwrap();
        assert_eq!(set.depth, Some(Some(3)));

        // And back out again.
        assert_eq!(serde_json::to_string(&untouched).unwrap(), "{}");
        assert_eq!(serde_json::to_string(&cleared).unwrap(), r#"{"depth":null}"#);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"{"depth":3}"#);
    }

    #[test]
    fn partial_patch_merges_field_by_field() {
        let mut block = Block::new("b1", BlockType::Heading)
            .with_text("old")
            .with_depth(1)
            .with_prop("level", serde_json::json!(1));

        let patch = PartialPatch {
            kind: Some(BlockType::Paragraph),
            depth: Some(None),
            ..PartialPatch::default()
        };
        patch.apply_to(&mut block);

        assert_eq!(block.kind, BlockType::Paragraph);
        assert_eq!(block.depth, None);
        // Untouched fields survive.
        assert_eq!(block.text(), "old");
        assert_eq!(block.props["level"], serde_json::json!(1));
    }

    #[test]
    fn partial_patch_replaces_props_wholesale() {
        let mut block = Block::new("b1", BlockType::Paragraph)
            .with_prop("a", serde_json::json!(1))
            .with_prop("b", serde_json::json!(2));

        let mut props = Map::new();
        props.insert("a".into(), serde_json::json!(9));
        let patch = PartialPatch {
            props: Some(props),
            ..PartialPatch::default()
        };
        patch.apply_to(&mut block);

        assert_eq!(block.props["a"], serde_json::json!(9));
        assert!(!block.props.contains_key("b"));
    }
}
