use std::collections::BTreeSet;

use uuid::Uuid;

/// One write against the variant table.
#[derive(Debug, Clone, PartialEq)]
pub enum VariantWrite<T> {
    Update { id: Uuid, variant: T },
    Insert { variant: T },
}

/// The deletes and writes that turn the persisted variant set into the submitted one.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSyncPlan<T> {
    /// Ascending.
    pub delete: Vec<Uuid>,
    /// Submission order.
    pub writes: Vec<VariantWrite<T>>,
}

impl<T> VariantSyncPlan<T> {
    pub fn update_count(&self) -> usize {
        self.writes
            .iter()
            .filter(|w| matches!(w, VariantWrite::Update { .. }))
            .count()
    }

    pub fn insert_count(&self) -> usize {
        self.writes.len() - self.update_count()
    }
}

/// Diff submitted rows against the ids currently stored for a product.
///
/// Existing ids missing from the submission are deleted. A submitted row whose
/// id is stored is updated; every other row, including one carrying an id that
/// is not stored for this product, is inserted.
pub fn plan_variant_sync<T>(
    existing: &BTreeSet<Uuid>,
    submitted: Vec<(Option<Uuid>, T)>,
) -> VariantSyncPlan<T> {
    let kept: BTreeSet<Uuid> = submitted.iter().filter_map(|(id, _)| *id).collect();
    let delete = existing.difference(&kept).copied().collect();

    let writes = submitted
        .into_iter()
        .map(|(id, variant)| match id {
            Some(id) if existing.contains(&id) => VariantWrite::Update { id, variant },
            _ => VariantWrite::Insert { variant },
        })
        .collect();

    VariantSyncPlan { delete, writes }
}
