use crate::types::SourceKind;

/// Defaults used when the configuration leaves something out
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_GENE: &str = "KIF11";
pub const DEFAULT_ORGANISM: &str = "Homo sapiens";
pub const DEFAULT_CHROMOSOME: &str = "10";
pub const DEFAULT_UNIPROT: &str = "P52732";
pub const DEFAULT_ENVIRONMENT: &str = "home";
pub const DEFAULT_DATA_ROOT: &str = "data";

/// Environment variables read during configuration resolution
pub const CONFIG_PATH_VAR: &str = "KINESIN_CONFIG";
pub const DB_ENV_VAR: &str = "KINESIN_DB_ENV";

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "importer.log";
pub const METRICS_SNAPSHOT_FILE: &str = "metrics.prom";

// User-friendly source names accepted on the command line, besides the canonical ones
const GDC_OCCURRENCES_ALIAS: &str = "gdc-occurrences";
const FATHMM_ALIAS: &str = "fathmm-cancer";
const GDC_MUTATIONS_ALIAS: &str = "gdc-mutations";

/// Convert a source name as typed by a user to its kind
pub fn source_name_to_kind(name: &str) -> Option<SourceKind> {
    let name = name.trim().to_ascii_lowercase();
    match name.as_str() {
        GDC_OCCURRENCES_ALIAS => Some(SourceKind::GdcOccurrences),
        FATHMM_ALIAS => Some(SourceKind::FathmmCancer),
        GDC_MUTATIONS_ALIAS => Some(SourceKind::GdcMutations),
        other => SourceKind::from_name(other),
    }
}

/// Get all supported canonical source names, in write order
pub fn get_supported_sources() -> Vec<&'static str> {
    SourceKind::ALL.iter().map(|kind| kind.name()).collect()
}

/// Split a comma-separated source list into kinds and the names that were not recognized
pub fn parse_source_list(list: &str) -> (Vec<SourceKind>, Vec<String>) {
    let mut kinds = Vec::new();
    let mut unknown = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        match source_name_to_kind(name) {
            Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
            Some(_) => {}
            None => unknown.push(name.to_string()),
        }
    }
    (kinds, unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_and_canonical_names() {
        assert_eq!(source_name_to_kind("COSMIC"), Some(SourceKind::Cosmic));
        assert_eq!(source_name_to_kind("gdc-occurrences"), Some(SourceKind::GdcOccurrences));
        assert_eq!(source_name_to_kind("fathmm"), Some(SourceKind::FathmmCancer));
        assert_eq!(source_name_to_kind("dbsnp"), None);
    }

    #[test]
    fn test_parse_source_list() {
        let (kinds, unknown) = parse_source_list("vep, clinvar,vep,,dbsnp");
        assert_eq!(kinds, vec![SourceKind::Vep, SourceKind::Clinvar]);
        assert_eq!(unknown, vec!["dbsnp".to_string()]);
    }

    #[test]
    fn test_supported_sources_in_write_order() {
        assert_eq!(get_supported_sources()[0], "gdc");
        assert_eq!(get_supported_sources().len(), 6);
    }
}
