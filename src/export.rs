//! Submission lists for the prediction web services whose reports feed the VEP and FATHMM imports.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{MutationClass, MutationRecord};

static CDS_SUBSTITUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([ACGTacgt])>([ACGTacgt])$").expect("valid cds substitution regex"));

static GENOMIC_POSITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+):(\d+)$").expect("valid genomic position regex"));

fn is_substitution(record: &MutationRecord) -> bool {
    matches!(record.mutation_class, Some(MutationClass::Substitution))
}

/// One HGVS genomic line (`chr10:g.92648423G>A`) per substitution that has both a genomic
/// coordinate and a nucleotide change. Anything else cannot be submitted and is left out.
pub fn vep_input(mutations: &[MutationRecord]) -> Vec<String> {
    let mut lines: Vec<String> = mutations
        .iter()
        .filter(|m| is_substitution(m))
        .filter_map(|m| {
            let position = GENOMIC_POSITION.captures(m.genomic_coordinate.as_deref()?)?;
            let change = CDS_SUBSTITUTION.captures(m.cds.as_deref()?)?;
            Some(format!(
                "chr{}:g.{}{}>{}",
                &position[1],
                &position[2],
                change[1].to_ascii_uppercase(),
                change[2].to_ascii_uppercase()
            ))
        })
        .collect();
    lines.sort();
    lines.dedup();
    lines
}

/// `<accession> <id>,<id>,...` for the FATHMM cancer batch form
pub fn fathmm_input(accession: &str, mutations: &[MutationRecord]) -> String {
    let ids: Vec<&str> = mutations
        .iter()
        .filter(|m| is_substitution(m))
        .map(|m| m.protein_change.as_str())
        .collect();
    format!("{} {}", accession, ids.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::extract::ExtractContext;
    use crate::types::SourceDatabase;

    fn substitution(id: &str, genomic: Option<&str>, cds: Option<&str>) -> MutationRecord {
        let mut record = ExtractContext::default().mutation(id, SourceDatabase::Cosmic);
        record.mutation_class = Some(MutationClass::Substitution);
        record.genomic_coordinate = genomic.map(str::to_string);
        record.cds = cds.map(str::to_string);
        record
    }

    #[test]
    fn test_vep_lines_need_coordinate_and_nucleotide_change() {
        let mut deletion = substitution("K200del", Some("10:92650000"), Some("598_600del"));
        deletion.mutation_class = Some(MutationClass::Deletion);

        let lines = vep_input(&[
            substitution("A366T", Some("10:92648423"), Some("1096g>a")),
            substitution("S950P", None, Some("2848T>C")),
            deletion,
        ]);
        assert_eq!(lines, vec!["chr10:g.92648423G>A".to_string()]);
    }

    #[test]
    fn test_fathmm_line_lists_substitutions() {
        let mut silent = substitution("E101E", None, None);
        silent.mutation_class = Some(MutationClass::Other("silent".to_string()));
        let line = fathmm_input(
            "P52732",
            &[substitution("A366T", None, None), silent, substitution("S950P", None, None)],
        );
        assert_eq!(line, "P52732 A366T,S950P");
    }
}
