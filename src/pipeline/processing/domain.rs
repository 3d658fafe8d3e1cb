use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use super::normalize::residue_number;

/// Positions outside this window cannot be placed on the protein
pub const PROTEIN_WINDOW: Range<u32> = 1..2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    #[serde(rename = "kinesin motor")]
    KinesinMotor,
    #[serde(rename = "tail-binding")]
    TailBinding,
    #[serde(rename = "idr1")]
    Idr1,
    #[serde(rename = "idr2")]
    Idr2,
    #[serde(rename = "coiled-coil/disorder")]
    CoiledCoil,
    #[serde(rename = "UNK")]
    Unknown,
}

impl Domain {
    pub fn label(&self) -> &'static str {
        match self {
            Domain::KinesinMotor => "kinesin motor",
            Domain::TailBinding => "tail-binding",
            Domain::Idr1 => "idr1",
            Domain::Idr2 => "idr2",
            Domain::CoiledCoil => "coiled-coil/disorder",
            Domain::Unknown => "UNK",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [
            Domain::KinesinMotor,
            Domain::TailBinding,
            Domain::Idr1,
            Domain::Idr2,
            Domain::CoiledCoil,
            Domain::Unknown,
        ]
        .into_iter()
        .find(|domain| domain.label() == label)
    }

    /// True when the classifier could place the mutation somewhere on the protein
    pub fn is_known(&self) -> bool {
        *self != Domain::Unknown
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pfam kinesin motor family (PF00225) on P52732, residues 24..=358
pub const PFAM_MOTOR: Range<u32> = 24..359;

/// Neck linker following the Pfam motor, residues 359..=367. It docks onto the motor head during
/// the power stroke, so structural annotations count it as motor. `A366T` sits inside it.
pub const NECK_LINKER: Range<u32> = PFAM_MOTOR.end..368;

/// Which boundary set the motor domain uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainPreset {
    /// [`PFAM_MOTOR`] only; the neck linker falls to coiled-coil/disorder
    Pfam,
    /// [`PFAM_MOTOR`] extended through [`NECK_LINKER`], ending at residue 367
    #[default]
    Structural,
}

/// Fixed closed-open domain ranges. Ranges never overlap; anything in the protein window that no
/// range covers is coiled-coil/disorder.
#[derive(Debug, Clone)]
pub struct DomainMap {
    ranges: Vec<(Range<u32>, Domain)>,
}

impl DomainMap {
    pub fn new(preset: DomainPreset, include_idr: bool) -> Self {
        let motor = match preset {
            DomainPreset::Pfam => PFAM_MOTOR,
            DomainPreset::Structural => PFAM_MOTOR.start..NECK_LINKER.end,
        };
        let mut ranges = vec![(motor, Domain::KinesinMotor), (916..1053, Domain::TailBinding)];
        if include_idr {
            ranges.push((751..885, Domain::Idr1));
            ranges.push((422..496, Domain::Idr2));
        }
        Self { ranges }
    }

    pub fn classify_position(&self, position: Option<u32>) -> Domain {
        let position = match position {
            Some(p) if PROTEIN_WINDOW.contains(&p) => p,
            _ => return Domain::Unknown,
        };
        self.ranges
            .iter()
            .find(|(range, _)| range.contains(&position))
            .map(|(_, domain)| *domain)
            .unwrap_or(Domain::CoiledCoil)
    }

    /// Classify a canonical identifier such as `A366T`.
    pub fn classify(&self, mutation_id: &str) -> Domain {
        self.classify_position(residue_number(mutation_id))
    }
}

impl Default for DomainMap {
    fn default() -> Self {
        Self::new(DomainPreset::default(), false)
    }
}
