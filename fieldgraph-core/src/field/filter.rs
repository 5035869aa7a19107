//! Lookup filter condition trees.
//!
//! A condition is either a leaf comparing one field against a value, or an
//! `and`/`or` combinator over child conditions. The resolver never evaluates
//! these; it only needs the field ids they mention.

use serde::{Deserialize, Serialize};

use crate::ids::FieldId;

/// A node of a filter condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterCondition {
    /// All children must match.
    And { and: Vec<FilterCondition> },
    /// Any child must match.
    Or { or: Vec<FilterCondition> },
    /// A single comparison.
    Leaf(FilterLeaf),
}

/// A single comparison against a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterLeaf {
    pub field_id: FieldId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ConditionData>,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_type: Option<CompareType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<FieldId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<TargetField>,
}

/// Dynamic comparison target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetField {
    pub field_id: FieldId,
}

/// How the right-hand side of a comparison is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareType {
    /// A literal value.
    Static,
    /// Another field's value on the same record.
    Dynamic,
    #[serde(other)]
    Other,
}

impl FilterLeaf {
    /// The field compared against when the comparison is dynamic.
    pub fn dynamic_target(&self) -> Option<&FieldId> {
        let data = self.data.as_ref()?;
        if data.compare_type != Some(CompareType::Dynamic) {
            return None;
        }
        data.field_id
            .as_ref()
            .or_else(|| data.target_field.as_ref().map(|target| &target.field_id))
    }
}

impl FilterCondition {
    /// Build a static leaf.
    pub fn leaf(field_id: impl Into<FieldId>) -> Self {
        FilterCondition::Leaf(FilterLeaf {
            field_id: field_id.into(),
            data: None,
        })
    }

    /// Build a leaf comparing `field_id` against the value of `target`.
    pub fn dynamic(field_id: impl Into<FieldId>, target: impl Into<FieldId>) -> Self {
        FilterCondition::Leaf(FilterLeaf {
            field_id: field_id.into(),
            data: Some(ConditionData {
                compare_type: Some(CompareType::Dynamic),
                field_id: Some(target.into()),
                target_field: None,
            }),
        })
    }

    /// Every field id mentioned anywhere in the tree, in document order.
    ///
    /// Duplicates are kept; callers insert into sets.
    pub fn field_ids(&self) -> Vec<&FieldId> {
        let mut ids = Vec::new();
        let mut stack = vec![self];

        while let Some(condition) = stack.pop() {
            match condition {
                FilterCondition::And { and: children } | FilterCondition::Or { or: children } => {
                    stack.extend(children.iter().rev());
                }
                FilterCondition::Leaf(leaf) => {
                    ids.push(&leaf.field_id);
                    if let Some(target) = leaf.dynamic_target() {
                        ids.push(target);
                    }
                }
            }
        }

        ids
    }
}
