//! Descendant queries.

use indexmap::IndexSet;

use super::{DependentSet, DependentsGraph};
use crate::ids::FieldId;

type DependentsIter<'g> = std::iter::Flatten<std::option::IntoIter<&'g DependentSet>>;

impl DependentsGraph {
    fn dependents_iter(&self, field_id: &FieldId) -> DependentsIter<'_> {
        self.dependents(field_id).into_iter().flatten()
    }

    /// Immediate dependents of `field_id`; empty for unknown ids.
    pub fn direct_descendants(&self, field_id: &FieldId) -> IndexSet<FieldId> {
        self.dependents_iter(field_id).cloned().collect()
    }

    /// Every field reachable from `field_id` through dependent edges, in
    /// depth-first discovery order.
    ///
    /// The start field is only included when it lies on a cycle through
    /// itself. Malformed (cyclic) graphs terminate because each field is
    /// expanded once.
    pub fn all_descendants(&self, field_id: &FieldId) -> IndexSet<FieldId> {
        let mut found = IndexSet::new();
        let mut stack = vec![self.dependents_iter(field_id)];

        while let Some(dependents) = stack.last_mut() {
            match dependents.next() {
                Some(dependent) => {
                    if found.insert(dependent.clone()) {
                        stack.push(self.dependents_iter(dependent));
                    }
                }
                None => {
                    stack.pop();
                }
            }
        }

        found
    }

    /// `changed` plus everything downstream of it.
    pub fn affected_by<'a, I>(&self, changed: I) -> IndexSet<FieldId>
    where
        I: IntoIterator<Item = &'a FieldId>,
    {
        let mut affected = IndexSet::new();
        for field_id in changed {
            affected.insert(field_id.clone());
            affected.extend(self.all_descendants(field_id));
        }
        affected
    }
}
