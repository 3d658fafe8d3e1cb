use crate::types::MutationRecord;

/// Handles idempotency checks for catalog operations
pub struct IdempotencyChecker;

impl IdempotencyChecker {
    /// Check if a mutation has changes compared to stored version
    pub fn mutation_has_changes(existing: &MutationRecord, updated: &MutationRecord) -> bool {
        existing.residue_number != updated.residue_number
            || existing.genomic_coordinate != updated.genomic_coordinate
            || existing.coding != updated.coding
            || existing.cds != updated.cds
            || existing.mutation_class != updated.mutation_class
            || existing.consequence != updated.consequence
            || existing.gene != updated.gene
            || existing.organism != updated.organism
            || existing.domain != updated.domain
            || existing.annotation_source != updated.annotation_source
    }

    /// Whether `incoming` supplies a defining attribute the stored row lacks
    pub fn supplies_missing_definition(existing: &MutationRecord, incoming: &MutationRecord) -> bool {
        (existing.cds.is_none() && incoming.cds.is_some())
            || (!existing.domain.is_known() && incoming.domain.is_known())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::extract::ExtractContext;
    use crate::types::SourceDatabase;

    #[test]
    fn test_mutation_has_changes() {
        let ctx = ExtractContext::default();
        let stored = ctx.mutation("A366T", SourceDatabase::Gdc);
        let mut updated = stored.clone();

        // No changes
        assert!(!IdempotencyChecker::mutation_has_changes(&stored, &updated));

        updated.cds = Some("1096G>A".to_string());
        assert!(IdempotencyChecker::mutation_has_changes(&stored, &updated));
        assert!(IdempotencyChecker::supplies_missing_definition(&stored, &updated));

        // Reset and change owner only
        updated = stored.clone();
        updated.annotation_source = SourceDatabase::Cosmic;
        assert!(IdempotencyChecker::mutation_has_changes(&stored, &updated));
        assert!(!IdempotencyChecker::supplies_missing_definition(&stored, &updated));
    }
}
