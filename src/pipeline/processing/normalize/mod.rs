//! Mutation identifier normalization.
//!
//! Every upstream notation collapses onto one canonical `{old}{position}{new}` identifier using
//! one-letter residue codes, e.g. `p.Met1Thr` → `M1T`, `A/T` at 366 → `A366T`.
//! Each call either produces an identifier from its own input or fails; nothing is carried over
//! between rows.

pub mod amino_acids;
pub mod vocabulary;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ImportError, Result};
use amino_acids::to_one_letter;

static PROTEIN_THREE_LETTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"p\.\(?([A-Za-z]{3})(\d+)([A-Za-z]{3}|=|\*)").expect("valid three-letter regex")
});

static BARE_THREE_LETTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z]{3})(\d+)([A-Za-z]{3}|=|\*)$").expect("valid bare three-letter regex")
});

static PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^()]*\)").expect("valid parenthetical regex"));

static ONE_LETTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z*])(\d+)([A-Za-z0-9*_?=>-]*)$").expect("valid one-letter regex")
});

static RESIDUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z]+(\d+)[^0-9]").expect("valid residue regex"));

static RESIDUE_PAIR_SIDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z*]+$").expect("valid residue pair regex"));

const PLACEHOLDERS: [&str; 6] = ["", "?", "p.?", "none", "na", "-"];

fn is_placeholder(raw: &str) -> bool {
    PLACEHOLDERS.contains(&raw.trim().to_lowercase().as_str())
}

fn assemble(old: char, position: &str, new: &str) -> String {
    let new = match new {
        "=" => old.to_string(),
        "*" => "*".to_string(),
        three => to_one_letter(three).to_string(),
    };
    format!("{}{}{}", old, position, new)
}

/// Parse three-letter notation embedded in free text.
///
/// Accepts `NM_004523.3(KIF11):c.2T>C (p.Met1Thr)` as well as a bare `Met1Thr`. Gene and
/// review-date parentheticals are ignored.
pub fn from_three_letter(text: &str) -> Result<String> {
    if let Some(caps) = PROTEIN_THREE_LETTER.captures_iter(text).last() {
        return Ok(assemble(to_one_letter(&caps[1]), &caps[2], &caps[3]));
    }

    let stripped = PARENTHETICAL.replace_all(text, "");
    match BARE_THREE_LETTER.captures(stripped.trim()) {
        Some(caps) => Ok(assemble(to_one_letter(&caps[1]), &caps[2], &caps[3])),
        None => Err(ImportError::malformed(format!(
            "no three-letter protein change in '{}'",
            text
        ))),
    }
}

/// Build an identifier from a one-letter residue pair (`A/T`) and a protein position.
///
/// A single residue (`A`) means the change is synonymous and yields `A366A`.
pub fn from_amino_acid_pair(amino_acids: &str, position: &str) -> Result<String> {
    let amino_acids = amino_acids.trim();
    if is_placeholder(amino_acids) {
        return Err(ImportError::malformed("amino acid pair is missing"));
    }

    let position = position.trim();
    if position.is_empty() || !position.chars().all(|c| c.is_ascii_digit()) {
        return Err(ImportError::malformed(format!(
            "protein position '{}' is not a single residue",
            position
        )));
    }

    let (old, new) = match amino_acids.split_once('/') {
        Some((old, new)) => (old.trim(), new.trim()),
        None => (amino_acids, amino_acids),
    };
    if !RESIDUE_PAIR_SIDE.is_match(old) || !RESIDUE_PAIR_SIDE.is_match(new) {
        return Err(ImportError::malformed(format!(
            "unrecognised amino acid pair '{}'",
            amino_acids
        )));
    }

    Ok(format!("{}{}{}", old, position, new))
}

/// Accept a direct one-letter notation such as `A366T` or `p.E101*`.
pub fn from_one_letter(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if is_placeholder(trimmed) {
        return Err(ImportError::malformed(format!(
            "placeholder protein change '{}'",
            trimmed
        )));
    }

    let body = trimmed.strip_prefix("p.").unwrap_or(trimmed);
    match ONE_LETTER.captures(body) {
        Some(caps) if &caps[3] == "=" => Ok(format!("{}{}{}", &caps[1], &caps[2], &caps[1])),
        Some(_) => Ok(body.to_string()),
        None => Err(ImportError::malformed(format!(
            "no one-letter protein change in '{}'",
            trimmed
        ))),
    }
}

/// Residue position of a canonical identifier: the first digit run that follows a letter run
/// and precedes a non-digit.
pub fn residue_number(mutation_id: &str) -> Option<u32> {
    RESIDUE
        .captures(mutation_id)
        .and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_letter_from_clinvar_name() {
        let id = from_three_letter("NM_004523.3(KIF11):c.2T>C (p.Met1Thr)").unwrap();
        assert_eq!(id, "M1T");
    }

    #[test]
    fn test_three_letter_unknown_codes_become_stop() {
        assert_eq!(from_three_letter("p.Arg234Ter").unwrap(), "R234*");
        assert_eq!(from_three_letter("p.Xyz10Ala").unwrap(), "*10A");
        assert_eq!(from_three_letter("p.Ala366Foo").unwrap(), "A366*");
    }

    #[test]
    fn test_three_letter_synonymous_and_bare_forms() {
        assert_eq!(from_three_letter("p.Met1=").unwrap(), "M1M");
        assert_eq!(from_three_letter("Ala366Thr").unwrap(), "A366T");
        assert_eq!(from_three_letter("ala366thr (KIF11)").unwrap(), "A366T");
    }

    #[test]
    fn test_three_letter_without_protein_change_is_malformed() {
        let err = from_three_letter("NM_004523.3(KIF11):c.-20G>A").unwrap_err();
        assert!(matches!(err, ImportError::MalformedRecord(_)));
    }

    #[test]
    fn test_amino_acid_pair() {
        assert_eq!(from_amino_acid_pair("A/T", "366").unwrap(), "A366T");
        assert_eq!(from_amino_acid_pair("A", "366").unwrap(), "A366A");
        assert_eq!(from_amino_acid_pair("R/*", "234").unwrap(), "R234*");
        assert!(from_amino_acid_pair("-", "366").is_err());
        assert!(from_amino_acid_pair("A/T", "-").is_err());
        assert!(from_amino_acid_pair("A/T", "366-367").is_err());
    }

    #[test]
    fn test_one_letter_notation() {
        assert_eq!(from_one_letter("A366T").unwrap(), "A366T");
        assert_eq!(from_one_letter("p.E101*").unwrap(), "E101*");
        assert_eq!(from_one_letter("p.M1=").unwrap(), "M1M");
        for placeholder in ["", "?", "p.?", "None", "NA"] {
            assert!(from_one_letter(placeholder).is_err(), "{placeholder:?}");
        }
        assert!(from_one_letter("c.1096G>A").is_err());
    }

    #[test]
    fn test_consecutive_failures_do_not_reuse_previous_match() {
        assert_eq!(from_three_letter("p.Met1Thr").unwrap(), "M1T");
        assert!(from_three_letter("no change here").is_err());
        assert!(from_one_letter("garbage").is_err());
    }

    #[test]
    fn test_residue_number() {
        assert_eq!(residue_number("A366T"), Some(366));
        assert_eq!(residue_number("E101*"), Some(101));
        assert_eq!(residue_number("M1M"), Some(1));
        assert_eq!(residue_number("366"), None);
        assert_eq!(residue_number("A366"), None);
    }
}
