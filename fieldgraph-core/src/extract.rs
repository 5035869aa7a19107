//! Dependency Extraction
//!
//! Maps a field definition to the upstream fields it reads from, and
//! attaches the resulting edges to a [`DependentsGraph`].
//!
//! # Per-kind rules
//!
//! | kind                                   | upstream                                        |
//! |----------------------------------------|-------------------------------------------------|
//! | lookup                                 | source field, plus every field in the filter    |
//! | dropdown                               | the referenced field, when options are sourced  |
//! | reference                              | primary field of the target board               |
//! | formula                                | every `{field:<id>}` tag in the expression      |
//! | last-modified-by / last-modified-time  | the target field, when set                      |
//! | anything else                          | nothing                                         |
//!
//! All rules except `reference` are pure. A reference needs the target
//! board's primary field, which is taken from the caller's known primaries
//! when possible and otherwise fetched from the [`FieldSource`]. Those
//! lookups are the only I/O here and run concurrently across a batch.

use std::collections::HashMap;

use futures_util::future::try_join_all;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::{ResolverError, ResolverResult};
use crate::field::{field_references, Field, FieldKind};
use crate::graph::DependentsGraph;
use crate::ids::{BoardId, FieldId};
use crate::store::FieldSource;

/// Upstream ids of one field. Most fields have very few.
pub type UpstreamIds = SmallVec<[FieldId; 4]>;

/// What a field kind depends on, before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upstream<'f> {
    /// The upstream ids are known from the definition alone.
    Fields(UpstreamIds),
    /// The upstream is the primary field of this board.
    PrimaryOf(&'f BoardId),
}

/// Upstream dependencies readable straight from a field's parameters.
pub fn direct_upstream(kind: &FieldKind) -> Upstream<'_> {
    let mut ids = UpstreamIds::new();

    match kind {
        FieldKind::Lookup(params) => {
            ids.extend(params.source_field_id.iter().cloned());
            if let Some(filter) = &params.filter {
                ids.extend(filter.conditions.field_ids().into_iter().cloned());
            }
        }
        FieldKind::Dropdown(params) => {
            ids.extend(params.reference.iter().map(|reference| reference.field_id.clone()));
        }
        FieldKind::Reference(params) => return Upstream::PrimaryOf(&params.board_id),
        FieldKind::Formula(params) => ids.extend(field_references(&params.expression)),
        FieldKind::LastModifiedBy(params) | FieldKind::LastModifiedTime(params) => {
            ids.extend(params.target_field_id.iter().cloned());
        }
        FieldKind::Text
        | FieldKind::Checkbox
        | FieldKind::Paragraph
        | FieldKind::Attachment
        | FieldKind::Number
        | FieldKind::Date
        | FieldKind::Phone
        | FieldKind::Website
        | FieldKind::Email
        | FieldKind::Currency
        | FieldKind::People
        | FieldKind::Rating
        | FieldKind::Progress
        | FieldKind::CreatedBy
        | FieldKind::CreatedTime
        | FieldKind::AutoNumber => {}
    }

    Upstream::Fields(ids)
}

/// Primary fields already known to the caller, keyed by board.
#[derive(Debug, Clone, Default)]
pub struct KnownPrimaries {
    by_board: HashMap<BoardId, FieldId>,
}

impl KnownPrimaries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `field` as its board's primary field.
    pub fn insert(&mut self, field: &Field) {
        self.by_board.insert(field.board_id.clone(), field.id.clone());
    }

    /// Collect every primary field among `fields`.
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = &'a Field>) -> Self {
        let mut known = Self::new();
        for field in fields.into_iter().filter(|field| field.is_primary) {
            known.insert(field);
        }
        known
    }

    pub fn get(&self, board_id: &BoardId) -> Option<&FieldId> {
        self.by_board.get(board_id)
    }
}

/// Resolve all upstream ids of `field`, fetching a primary field if needed.
pub async fn resolve_upstream(
    field: &Field,
    source: &dyn FieldSource,
    known: &KnownPrimaries,
) -> ResolverResult<UpstreamIds> {
    match direct_upstream(&field.kind) {
        Upstream::Fields(ids) => Ok(ids),
        Upstream::PrimaryOf(board_id) => {
            if let Some(primary) = known.get(board_id) {
                return Ok(SmallVec::from_elem(primary.clone(), 1));
            }
            match source.primary_field(board_id).await? {
                Some(primary) => Ok(SmallVec::from_elem(primary.id, 1)),
                None => Err(ResolverError::Invariant(format!(
                    "primary field not found in board {board_id} (referenced by field {})",
                    field.id
                ))),
            }
        }
    }
}

/// Resolve the upstream ids of every field that carries dependency
/// parameters. Reference lookups run concurrently.
pub async fn resolve_all<'f>(
    fields: impl IntoIterator<Item = &'f Field>,
    source: &dyn FieldSource,
    known: &KnownPrimaries,
) -> ResolverResult<Vec<(&'f FieldId, UpstreamIds)>> {
    let pending = fields
        .into_iter()
        .filter(|field| field.kind.has_dependency_params())
        .map(|field| async move {
            let upstream = resolve_upstream(field, source, known).await?;
            Ok::<_, ResolverError>((&field.id, upstream))
        });

    try_join_all(pending).await
}

/// Register `dependent` as a dependent of each upstream id that is a node.
///
/// Returns the number of edges that attached.
pub fn attach(graph: &mut DependentsGraph, dependent: &FieldId, upstream: &[FieldId]) -> usize {
    let mut attached = 0;
    for upstream_id in upstream {
        if graph.add_edge(upstream_id, dependent) {
            attached += 1;
        } else {
            trace!(%dependent, upstream = %upstream_id, "upstream is not a node, edge skipped");
        }
    }
    attached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{
        DropdownParams, DropdownReference, FilterCondition, FormulaParams, LookupFilter, LookupParams,
        ReferenceParams, TargetFieldParams,
    };
    use crate::store::memory::MemoryFieldSource;
    use crate::field::Board;

    fn id(raw: &str) -> FieldId {
        FieldId::from(raw)
    }

    fn fields(upstream: Upstream<'_>) -> Vec<FieldId> {
        match upstream {
            Upstream::Fields(ids) => ids.into_vec(),
            Upstream::PrimaryOf(board) => panic!("unexpected reference to {board}"),
        }
    }

    #[test]
    fn lookup_collects_source_and_filter_fields() {
        let kind = FieldKind::Lookup(LookupParams {
            source_field_id: Some(id("S")),
            filter: Some(LookupFilter {
                conditions: FilterCondition::And {
                    and: vec![FilterCondition::leaf("F"), FilterCondition::dynamic("D", "T")],
                },
            }),
        });
        assert_eq!(fields(direct_upstream(&kind)), vec![id("S"), id("F"), id("D"), id("T")]);
    }

    #[test]
    fn dropdown_depends_only_when_sourced() {
        let plain = FieldKind::Dropdown(DropdownParams::default());
        assert!(fields(direct_upstream(&plain)).is_empty());

        let sourced = FieldKind::Dropdown(DropdownParams {
            reference: Some(DropdownReference { field_id: id("src") }),
        });
        assert_eq!(fields(direct_upstream(&sourced)), vec![id("src")]);
    }

    #[test]
    fn formula_uses_field_tags() {
        let kind = FieldKind::Formula(FormulaParams {
            expression: "{field:B} + {fn:NOW} + {field:C}".to_string(),
        });
        assert_eq!(fields(direct_upstream(&kind)), vec![id("B"), id("C")]);
    }

    #[test]
    fn last_modified_tracks_optional_target() {
        let with_target = FieldKind::LastModifiedTime(TargetFieldParams {
            target_field_id: Some(id("x")),
        });
        assert_eq!(fields(direct_upstream(&with_target)), vec![id("x")]);

        let without = FieldKind::LastModifiedBy(TargetFieldParams::default());
        assert!(fields(direct_upstream(&without)).is_empty());
    }

    #[test]
    fn plain_kinds_have_no_upstream() {
        for kind in [FieldKind::Text, FieldKind::Number, FieldKind::AutoNumber, FieldKind::CreatedBy] {
            assert!(fields(direct_upstream(&kind)).is_empty());
        }
    }

    #[test]
    fn reference_defers_to_the_target_primary() {
        let kind = FieldKind::Reference(ReferenceParams { board_id: BoardId::from("other") });
        assert_eq!(direct_upstream(&kind), Upstream::PrimaryOf(&BoardId::from("other")));
    }

    #[tokio::test]
    async fn reference_uses_known_primary_without_lookup() {
        let source = MemoryFieldSource::new();
        let primary = Field::new("p", "other", FieldKind::Text).primary();
        let mut known = KnownPrimaries::new();
        known.insert(&primary);

        let reference = Field::new(
            "r",
            "here",
            FieldKind::Reference(ReferenceParams { board_id: BoardId::from("other") }),
        );
        let upstream = resolve_upstream(&reference, &source, &known).await.unwrap();

        assert_eq!(upstream.as_slice(), &[id("p")]);
        assert_eq!(source.primary_lookups(), 0);
    }

    #[tokio::test]
    async fn reference_falls_back_to_the_source() {
        let source = MemoryFieldSource::new();
        source.add_board(Board::new("other", "base"));
        source.upsert_field(Field::new("p", "other", FieldKind::Text).primary());

        let reference = Field::new(
            "r",
            "here",
            FieldKind::Reference(ReferenceParams { board_id: BoardId::from("other") }),
        );
        let upstream = resolve_upstream(&reference, &source, &KnownPrimaries::new()).await.unwrap();

        assert_eq!(upstream.as_slice(), &[id("p")]);
        assert_eq!(source.primary_lookups(), 1);
    }

    #[tokio::test]
    async fn missing_primary_is_an_invariant_violation() {
        let source = MemoryFieldSource::new();
        let reference = Field::new(
            "r",
            "here",
            FieldKind::Reference(ReferenceParams { board_id: BoardId::from("empty") }),
        );

        let err = resolve_upstream(&reference, &source, &KnownPrimaries::new()).await.unwrap_err();
        assert!(matches!(err, ResolverError::Invariant(_)));
        assert!(!err.is_user_error());
    }

    #[tokio::test]
    async fn resolve_all_skips_leaf_kinds() {
        let source = MemoryFieldSource::new();
        let batch = vec![
            Field::new("t", "b", FieldKind::Text),
            Field::new("f", "b", FieldKind::Formula(FormulaParams { expression: "{field:t}".into() })),
        ];

        let resolved = resolve_all(&batch, &source, &KnownPrimaries::new()).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0, &id("f"));
        assert_eq!(resolved[0].1.as_slice(), &[id("t")]);
    }

    #[test]
    fn attach_ignores_unknown_upstreams() {
        let mut graph = DependentsGraph::new();
        graph.insert_node(id("a"));
        graph.insert_node(id("f"));

        assert_eq!(attach(&mut graph, &id("f"), &[id("a"), id("ghost")]), 1);
        assert!(graph.has_edge(&id("a"), &id("f")));
        assert_eq!(graph.node_count(), 2);
    }
}
