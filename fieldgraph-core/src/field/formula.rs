//! Dynamic tags in formula expressions.
//!
//! Formula text embeds placeholders of the form `{kind:identifier}`, e.g.
//! `{field:01HXA...} + {fn:SUM}`. Only tags whose kind is [`FIELD_TAG_KIND`]
//! name another field.

use std::sync::OnceLock;

use regex::Regex;

use crate::ids::FieldId;

/// Tag kind that refers to another field.
pub const FIELD_TAG_KIND: &str = "field";

fn dynamic_tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*):([^{}:\s]+)\}").expect("dynamic tag regex is valid")
    })
}

/// One `{kind:identifier}` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicTag<'a> {
    pub kind: &'a str,
    pub identifier: &'a str,
}

impl DynamicTag<'_> {
    /// Whether the tag refers to a field.
    pub fn is_field(&self) -> bool {
        self.kind == FIELD_TAG_KIND
    }
}

/// Iterator over the dynamic tags of an expression.
pub struct DynamicTags<'a> {
    captures: regex::CaptureMatches<'static, 'a>,
}

impl<'a> DynamicTags<'a> {
    /// Scan `expression` for tags.
    pub fn new(expression: &'a str) -> Self {
        Self {
            captures: dynamic_tag_regex().captures_iter(expression),
        }
    }
}

impl<'a> Iterator for DynamicTags<'a> {
    type Item = DynamicTag<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let caps = self.captures.next()?;
        let kind = caps.get(1)?.as_str();
        let identifier = caps.get(2)?.as_str();
        Some(DynamicTag { kind, identifier })
    }
}

/// Field ids referenced by a formula expression, in order of appearance.
pub fn field_references(expression: &str) -> impl Iterator<Item = FieldId> + '_ {
    DynamicTags::new(expression)
        .filter(|tag| tag.is_field())
        .map(|tag| FieldId::new(tag.identifier))
}
