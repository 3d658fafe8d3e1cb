use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    CONFIG_PATH_VAR, DB_ENV_VAR, DEFAULT_CHROMOSOME, DEFAULT_CONFIG_PATH, DEFAULT_DATA_ROOT,
    DEFAULT_ENVIRONMENT, DEFAULT_GENE, DEFAULT_ORGANISM, DEFAULT_UNIPROT,
};
use crate::error::{ImportError, Result};
use crate::pipeline::processing::domain::{DomainMap, DomainPreset};
use crate::pipeline::processing::extract::ExtractContext;
use crate::types::SourceKind;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gene: GeneConfig,
    #[serde(default)]
    pub domains: DomainConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub inputs: InputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneConfig {
    pub symbol: String,
    pub organism: String,
    pub chromosome: String,
    /// Protein accession submitted to FATHMM
    pub uniprot: String,
}

impl Default for GeneConfig {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_GENE.to_string(),
            organism: DEFAULT_ORGANISM.to_string(),
            chromosome: DEFAULT_CHROMOSOME.to_string(),
            uniprot: DEFAULT_UNIPROT.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DomainConfig {
    #[serde(default)]
    pub preset: DomainPreset,
    #[serde(default)]
    pub include_idr: bool,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// Environment used when neither the CLI nor `KINESIN_DB_ENV` names one
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Root for the import log and metrics snapshot
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    pub environments: HashMap<String, EnvironmentConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InputConfig {
    pub gdc: Option<PathBuf>,
    pub gdc_occurrences: Option<PathBuf>,
    pub cosmic: Option<PathBuf>,
    pub clinvar: Option<PathBuf>,
    pub vep: Option<PathBuf>,
    pub fathmm: Option<PathBuf>,
}

impl InputConfig {
    pub fn path_for(&self, kind: SourceKind) -> Option<&Path> {
        let path = match kind {
            SourceKind::GdcMutations => &self.gdc,
            SourceKind::GdcOccurrences => &self.gdc_occurrences,
            SourceKind::Cosmic => &self.cosmic,
            SourceKind::Clinvar => &self.clinvar,
            SourceKind::Vep => &self.vep,
            SourceKind::FathmmCancer => &self.fathmm,
        };
        path.as_deref()
    }
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn default_data_root() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_ROOT)
}

/// The database chosen for this run
#[derive(Debug, Clone)]
pub struct ResolvedEnvironment {
    pub name: String,
    pub config: EnvironmentConfig,
}

impl Config {
    /// Load from `KINESIN_CONFIG`, falling back to `config.toml`
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            ImportError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        Self::parse(&config_content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.gene.symbol.trim().is_empty() {
            return Err(ImportError::Config("gene.symbol must not be empty".to_string()));
        }
        Ok(config)
    }

    /// Pick the database environment: explicit choice, then `KINESIN_DB_ENV`, then the configured default
    pub fn resolve_environment(&self, requested: Option<&str>) -> Result<ResolvedEnvironment> {
        let from_env = std::env::var(DB_ENV_VAR).ok().filter(|v| !v.trim().is_empty());
        self.select_environment(requested, from_env.as_deref())
    }

    fn select_environment(&self, requested: Option<&str>, from_env: Option<&str>) -> Result<ResolvedEnvironment> {
        let name = requested
            .or(from_env)
            .unwrap_or(self.database.environment.as_str())
            .trim();
        match self.database.environments.get(name) {
            Some(config) => Ok(ResolvedEnvironment {
                name: name.to_string(),
                config: config.clone(),
            }),
            None => {
                let mut known: Vec<&str> = self.database.environments.keys().map(String::as_str).collect();
                known.sort();
                Err(ImportError::Config(format!(
                    "Unknown database environment '{}' (configured: {})",
                    name,
                    known.join(", ")
                )))
            }
        }
    }

    pub fn extract_context(&self) -> ExtractContext {
        ExtractContext {
            gene: self.gene.symbol.clone(),
            organism: self.gene.organism.clone(),
            chromosome: self.gene.chromosome.clone(),
            domains: DomainMap::new(self.domains.preset, self.domains.include_idr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::domain::Domain;

    const SAMPLE: &str = r#"
        [domains]
        preset = "pfam"

        [database]
        environment = "home"

        [database.environments.home]
        path = "data/kinesin_home.db"

        [database.environments.kenobi]
        path = "/srv/kinesin/kinesin.db"
        description = "shared lab server"

        [inputs]
        vep = "input/vep.txt"
    "#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.gene.symbol, "KIF11");
        assert_eq!(config.gene.uniprot, "P52732");
        assert!(!config.domains.include_idr);
        assert_eq!(config.database.data_root, PathBuf::from("data"));
        assert_eq!(config.inputs.path_for(SourceKind::Vep), Some(Path::new("input/vep.txt")));
        assert_eq!(config.inputs.path_for(SourceKind::Cosmic), None);
    }

    #[test]
    fn test_environment_resolution_order() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.select_environment(None, None).unwrap().name, "home");
        assert_eq!(config.select_environment(None, Some("kenobi")).unwrap().name, "kenobi");
        assert_eq!(
            config.select_environment(Some("home"), Some("kenobi")).unwrap().name,
            "home"
        );
        let err = config.select_environment(Some("cloud"), None).unwrap_err();
        assert!(err.to_string().contains("home, kenobi"));
    }

    #[test]
    fn test_extract_context_uses_domain_settings() {
        let config = Config::parse(SAMPLE).unwrap();
        let ctx = config.extract_context();
        // A366T sits past the Pfam motor boundary
        assert_eq!(ctx.domains.classify("A366T"), Domain::CoiledCoil);
    }

    #[test]
    fn test_missing_database_section_is_an_error() {
        assert!(matches!(Config::parse("[gene]\nsymbol = \"KIF11\""), Err(ImportError::Toml(_))));
    }
}
