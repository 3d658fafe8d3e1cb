use super::idempotency::IdempotencyChecker;
use crate::types::MutationRecord;

/// What to do with an incoming mutation row given the stored one
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No row yet
    Insert(MutationRecord),
    /// A higher-precedence source takes ownership of the row
    Replace(MutationRecord),
    /// The owner stays; previously empty attributes are filled in
    Fill(MutationRecord),
    Unchanged,
}

impl Resolution {
    pub fn record(&self) -> Option<&MutationRecord> {
        match self {
            Resolution::Insert(r) | Resolution::Replace(r) | Resolution::Fill(r) => Some(r),
            Resolution::Unchanged => None,
        }
    }
}

fn coalesce<T: Clone>(preferred: &Option<T>, fallback: &Option<T>) -> Option<T> {
    preferred.clone().or_else(|| fallback.clone())
}

/// `primary` wins wherever it has a value; `secondary` fills the rest
fn merge(primary: &MutationRecord, secondary: &MutationRecord) -> MutationRecord {
    MutationRecord {
        protein_change: primary.protein_change.clone(),
        residue_number: primary.residue_number.or(secondary.residue_number),
        genomic_coordinate: coalesce(&primary.genomic_coordinate, &secondary.genomic_coordinate),
        coding: primary.coding,
        cds: coalesce(&primary.cds, &secondary.cds),
        mutation_class: coalesce(&primary.mutation_class, &secondary.mutation_class),
        consequence: coalesce(&primary.consequence, &secondary.consequence),
        gene: primary.gene.clone(),
        organism: primary.organism.clone(),
        domain: if primary.domain.is_known() {
            primary.domain
        } else {
            secondary.domain
        },
        annotation_source: primary.annotation_source,
    }
}

/// Reconcile an incoming mutation against the stored row.
///
/// A source that outranks the row's owner replaces it, but only when it supplies a `cds` or
/// `domain` the row is missing; values the newcomer leaves empty are kept. Anything else can only
/// fill gaps.
pub fn reconcile(existing: Option<&MutationRecord>, incoming: &MutationRecord) -> Resolution {
    let existing = match existing {
        Some(existing) => existing,
        None => return Resolution::Insert(incoming.clone()),
    };

    let outranks =
        incoming.annotation_source.precedence() > existing.annotation_source.precedence();
    if outranks && IdempotencyChecker::supplies_missing_definition(existing, incoming) {
        return Resolution::Replace(merge(incoming, existing));
    }

    let filled = merge(existing, incoming);
    if IdempotencyChecker::mutation_has_changes(existing, &filled) {
        Resolution::Fill(filled)
    } else {
        Resolution::Unchanged
    }
}
