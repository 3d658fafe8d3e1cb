use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Consequence, MutationClass};

static DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\s-\s(.+)$").expect("valid description regex"));

fn clean(raw: &str) -> String {
    raw.trim().to_lowercase().replace(['_', '-'], " ")
}

impl MutationClass {
    /// Map an upstream class label onto the shared vocabulary.
    ///
    /// GDC reports `Single base substitution`, COSMIC reports `Substitution`.
    pub fn normalize(raw: &str) -> Self {
        let cleaned = clean(raw);
        let stripped = cleaned
            .strip_prefix("single base ")
            .or_else(|| cleaned.strip_prefix("small "))
            .unwrap_or(&cleaned)
            .trim();
        match stripped {
            "substitution" | "snv" | "missense" => MutationClass::Substitution,
            "insertion" => MutationClass::Insertion,
            "deletion" => MutationClass::Deletion,
            "complex" | "indel" | "insertion deletion" | "deletion insertion" => MutationClass::Complex,
            "nonsense" => MutationClass::Nonsense,
            other => MutationClass::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MutationClass::Substitution => "substitution",
            MutationClass::Insertion => "insertion",
            MutationClass::Deletion => "deletion",
            MutationClass::Complex => "complex",
            MutationClass::Nonsense => "nonsense",
            MutationClass::Other(other) => other,
        }
    }
}

impl From<String> for MutationClass {
    fn from(value: String) -> Self {
        MutationClass::normalize(&value)
    }
}

impl From<MutationClass> for String {
    fn from(value: MutationClass) -> Self {
        value.as_str().to_string()
    }
}

impl Consequence {
    pub fn normalize(raw: &str) -> Self {
        let cleaned = clean(raw);
        let stripped = cleaned.strip_suffix(" variant").unwrap_or(&cleaned).trim();
        match stripped {
            "missense" => Consequence::Missense,
            "synonymous" | "coding silent" | "silent" => Consequence::Synonymous,
            "stop gained" | "nonsense" => Consequence::Nonsense,
            "frameshift" => Consequence::Frameshift,
            "inframe insertion" | "inframe deletion" | "inframe" | "in frame" => Consequence::InFrame,
            "start lost" => Consequence::StartLost,
            "stop lost" => Consequence::StopLost,
            other => Consequence::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Consequence::Missense => "missense",
            Consequence::Synonymous => "synonymous",
            Consequence::Nonsense => "nonsense",
            Consequence::Frameshift => "frameshift",
            Consequence::InFrame => "inframe",
            Consequence::StartLost => "start lost",
            Consequence::StopLost => "stop lost",
            Consequence::Other(other) => other,
        }
    }
}

impl From<String> for Consequence {
    fn from(value: String) -> Self {
        Consequence::normalize(&value)
    }
}

impl From<Consequence> for String {
    fn from(value: Consequence) -> Self {
        value.as_str().to_string()
    }
}

/// Split a COSMIC `Mutation Description` such as `Substitution - Missense` into class and consequence.
pub fn split_description(description: &str) -> Option<(MutationClass, Consequence)> {
    let caps = DESCRIPTION.captures(description.trim())?;
    Some((
        MutationClass::normalize(&caps[1]),
        Consequence::normalize(&caps[2]),
    ))
}
