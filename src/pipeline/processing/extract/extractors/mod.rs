pub mod clinvar;
pub mod cosmic;
pub mod fathmm;
pub mod gdc;
pub mod gdc_occurrence;
pub mod vep;

pub use clinvar::ClinvarExtractor;
pub use cosmic::CosmicExtractor;
pub use fathmm::FathmmCancerExtractor;
pub use gdc::GdcExtractor;
pub use gdc_occurrence::GdcOccurrenceExtractor;
pub use vep::VepExtractor;
