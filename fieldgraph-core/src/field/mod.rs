//! Field Model
//!
//! A field is a typed column definition on a board. Most types are plain
//! data columns; a handful derive their value from other fields and carry
//! the parameters needed to find out which ones.
//!
//! # Representation
//!
//! The data type and its parameters travel together as one closed enum,
//! [`FieldKind`]. Each variant carries only the parameters that matter for
//! dependency tracking, so adding a new field type forces every `match` over
//! the kinds to take a position on it.
//!
//! On the wire the kind is flattened into the field record:
//!
//! ```json
//! {
//!   "id": "fld_a",
//!   "boardId": "brd_1",
//!   "name": "Total",
//!   "dataType": "formula",
//!   "params": { "expression": "{field:fld_b} * 2" }
//! }
//! ```

mod filter;
mod formula;

pub use filter::{CompareType, ConditionData, FilterCondition, FilterLeaf, TargetField};
pub use formula::{field_references, DynamicTag, DynamicTags, FIELD_TAG_KIND};

use std::fmt;

use serde::de::{self, DeserializeOwned};
use serde::{ser, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::ids::{BaseId, BoardId, FieldId};

/// A field record as seen by the dependency resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Unique identifier of the field.
    pub id: FieldId,

    /// Board the field belongs to.
    pub board_id: BoardId,

    /// Display name, used in diagnostics only.
    #[serde(default)]
    pub name: String,

    /// Whether this is the board's primary field.
    #[serde(default)]
    pub is_primary: bool,

    /// Data type and type-specific parameters.
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl Field {
    /// Create a non-primary field.
    pub fn new(id: impl Into<FieldId>, board_id: impl Into<BoardId>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            board_id: board_id.into(),
            name: String::new(),
            is_primary: false,
            kind,
        }
    }

    /// Set the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Mark the field as its board's primary field.
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// The field's data type tag.
    pub fn data_type(&self) -> FieldType {
        self.kind.data_type()
    }
}

/// A board (table) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    /// Unique identifier of the board.
    pub id: BoardId,

    /// Base that owns the board.
    pub base_id: BaseId,

    /// Display name.
    #[serde(default)]
    pub name: String,
}

impl Board {
    /// Create a board in the given base.
    pub fn new(id: impl Into<BoardId>, base_id: impl Into<BaseId>) -> Self {
        Self {
            id: id.into(),
            base_id: base_id.into(),
            name: String::new(),
        }
    }
}

/// A board together with all of its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardFields {
    pub board: Board,
    pub fields: Vec<Field>,
}

/// A field hydrated with the board it lives on.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWithBoard {
    pub field: Field,
    pub board: Board,
}

/// Data type together with its dependency-relevant parameters.
///
/// Leaf kinds accept and drop whatever `params` the record carries
/// (precision, options, formats); only derived kinds read theirs.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Checkbox,
    Paragraph,
    Attachment,
    Dropdown(DropdownParams),
    Number,
    Date,
    Phone,
    Website,
    Email,
    Currency,
    People,
    Rating,
    Progress,
    Reference(ReferenceParams),
    Formula(FormulaParams),
    Lookup(LookupParams),
    LastModifiedBy(TargetFieldParams),
    LastModifiedTime(TargetFieldParams),
    CreatedBy,
    CreatedTime,
    AutoNumber,
}

impl FieldKind {
    /// The plain data type tag.
    pub fn data_type(&self) -> FieldType {
        match self {
            FieldKind::Text => FieldType::Text,
            FieldKind::Checkbox => FieldType::Checkbox,
            FieldKind::Paragraph => FieldType::Paragraph,
            FieldKind::Attachment => FieldType::Attachment,
            FieldKind::Dropdown(_) => FieldType::Dropdown,
            FieldKind::Number => FieldType::Number,
            FieldKind::Date => FieldType::Date,
            FieldKind::Phone => FieldType::Phone,
            FieldKind::Website => FieldType::Website,
            FieldKind::Email => FieldType::Email,
            FieldKind::Currency => FieldType::Currency,
            FieldKind::People => FieldType::People,
            FieldKind::Rating => FieldType::Rating,
            FieldKind::Progress => FieldType::Progress,
            FieldKind::Reference(_) => FieldType::Reference,
            FieldKind::Formula(_) => FieldType::Formula,
            FieldKind::Lookup(_) => FieldType::Lookup,
            FieldKind::LastModifiedBy(_) => FieldType::LastModifiedBy,
            FieldKind::LastModifiedTime(_) => FieldType::LastModifiedTime,
            FieldKind::CreatedBy => FieldType::CreatedBy,
            FieldKind::CreatedTime => FieldType::CreatedTime,
            FieldKind::AutoNumber => FieldType::AutoNumber,
        }
    }

    /// Whether this kind carries parameters that can name upstream fields.
    ///
    /// Kinds without them are leaves: they never depend on anything.
    pub fn has_dependency_params(&self) -> bool {
        matches!(
            self,
            FieldKind::Dropdown(_)
                | FieldKind::Reference(_)
                | FieldKind::Formula(_)
                | FieldKind::Lookup(_)
                | FieldKind::LastModifiedBy(_)
                | FieldKind::LastModifiedTime(_)
        )
    }
}

/// Closed enumeration of field data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Checkbox,
    Paragraph,
    Attachment,
    Dropdown,
    Number,
    Date,
    Phone,
    Website,
    Email,
    Currency,
    People,
    Rating,
    Progress,
    Reference,
    Formula,
    Lookup,
    LastModifiedBy,
    LastModifiedTime,
    CreatedBy,
    CreatedTime,
    AutoNumber,
}

impl FieldType {
    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Checkbox => "checkbox",
            FieldType::Paragraph => "paragraph",
            FieldType::Attachment => "attachment",
            FieldType::Dropdown => "dropdown",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Phone => "phone",
            FieldType::Website => "website",
            FieldType::Email => "email",
            FieldType::Currency => "currency",
            FieldType::People => "people",
            FieldType::Rating => "rating",
            FieldType::Progress => "progress",
            FieldType::Reference => "reference",
            FieldType::Formula => "formula",
            FieldType::Lookup => "lookup",
            FieldType::LastModifiedBy => "last_modified_by",
            FieldType::LastModifiedTime => "last_modified_time",
            FieldType::CreatedBy => "created_by",
            FieldType::CreatedTime => "created_time",
            FieldType::AutoNumber => "auto_number",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of a [`FieldKind`]: the type tag and the raw `params` object.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KindRecord {
    data_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

fn required<T: DeserializeOwned>(params: Option<Value>) -> Result<T, serde_json::Error> {
    serde_json::from_value(params.unwrap_or(Value::Null))
}

fn or_default<T: DeserializeOwned + Default>(params: Option<Value>) -> Result<T, serde_json::Error> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(params) => serde_json::from_value(params),
    }
}

impl KindRecord {
    fn into_kind(self) -> Result<FieldKind, serde_json::Error> {
        let params = self.params;
        Ok(match self.data_type {
            FieldType::Text => FieldKind::Text,
            FieldType::Checkbox => FieldKind::Checkbox,
            FieldType::Paragraph => FieldKind::Paragraph,
            FieldType::Attachment => FieldKind::Attachment,
            FieldType::Dropdown => FieldKind::Dropdown(or_default(params)?),
            FieldType::Number => FieldKind::Number,
            FieldType::Date => FieldKind::Date,
            FieldType::Phone => FieldKind::Phone,
            FieldType::Website => FieldKind::Website,
            FieldType::Email => FieldKind::Email,
            FieldType::Currency => FieldKind::Currency,
            FieldType::People => FieldKind::People,
            FieldType::Rating => FieldKind::Rating,
            FieldType::Progress => FieldKind::Progress,
            FieldType::Reference => FieldKind::Reference(required(params)?),
            FieldType::Formula => FieldKind::Formula(required(params)?),
            FieldType::Lookup => FieldKind::Lookup(or_default(params)?),
            FieldType::LastModifiedBy => FieldKind::LastModifiedBy(or_default(params)?),
            FieldType::LastModifiedTime => FieldKind::LastModifiedTime(or_default(params)?),
            FieldType::CreatedBy => FieldKind::CreatedBy,
            FieldType::CreatedTime => FieldKind::CreatedTime,
            FieldType::AutoNumber => FieldKind::AutoNumber,
        })
    }

    fn from_kind(kind: &FieldKind) -> Result<Self, serde_json::Error> {
        let params = match kind {
            FieldKind::Dropdown(params) => Some(serde_json::to_value(params)?),
            FieldKind::Reference(params) => Some(serde_json::to_value(params)?),
            FieldKind::Formula(params) => Some(serde_json::to_value(params)?),
            FieldKind::Lookup(params) => Some(serde_json::to_value(params)?),
            FieldKind::LastModifiedBy(params) | FieldKind::LastModifiedTime(params) => {
                Some(serde_json::to_value(params)?)
            }
            _ => None,
        };
        Ok(Self {
            data_type: kind.data_type(),
            params,
        })
    }
}

impl Serialize for FieldKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        KindRecord::from_kind(self)
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        KindRecord::deserialize(deserializer)?
            .into_kind()
            .map_err(de::Error::custom)
    }
}

/// Dropdown parameters. Options may be sourced from another field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropdownParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<DropdownReference>,
}

/// The field a dropdown takes its options from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropdownReference {
    pub field_id: FieldId,
}

/// Reference (link) parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceParams {
    /// Board the reference points at. Its primary field is the upstream.
    pub board_id: BoardId,
}

/// Formula parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaParams {
    /// Expression text with embedded `{kind:identifier}` tags.
    #[serde(alias = "value")]
    pub expression: String,
}

/// Lookup parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupParams {
    /// Field whose values are pulled through the reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_field_id: Option<FieldId>,

    /// Optional filter applied to the looked-up records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<LookupFilter>,
}

/// Filter attached to a lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupFilter {
    pub conditions: FilterCondition,
}

/// Parameters of last-modified-by / last-modified-time fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetFieldParams {
    /// Field whose edits are tracked. `None` tracks the whole record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field_id: Option<FieldId>,
}
