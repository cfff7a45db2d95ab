use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Box colour used for classes outside the known taxonomy.
pub const UNKNOWN_COLOR: [u8; 3] = [0, 255, 0];
pub const UNKNOWN_EMOJI: &str = "🔍";

/// The closed set of species the bundled model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Species {
    Bear,
    Elephant,
    Leopard,
    Tiger,
}

struct SpeciesInfo {
    species: Species,
    class_id: u32,
    name: &'static str,
    emoji: &'static str,
    color: [u8; 3],
}

const TAXONOMY: [SpeciesInfo; 4] = [
    SpeciesInfo {
        species: Species::Bear,
        class_id: 0,
        name: "Bear",
        emoji: "🐻",
        color: [139, 69, 19],
    },
    SpeciesInfo {
        species: Species::Elephant,
        class_id: 1,
        name: "Elephant",
        emoji: "🐘",
        color: [128, 128, 128],
    },
    SpeciesInfo {
        species: Species::Leopard,
        class_id: 2,
        name: "Leopard",
        emoji: "🐆",
        color: [255, 165, 0],
    },
    SpeciesInfo {
        species: Species::Tiger,
        class_id: 3,
        name: "Tiger",
        emoji: "🐅",
        color: [255, 140, 0],
    },
];

impl Species {
    pub const ALL: [Species; 4] = [
        Species::Bear,
        Species::Elephant,
        Species::Leopard,
        Species::Tiger,
    ];

    pub fn from_class_id(class_id: u32) -> Option<Species> {
        TAXONOMY
            .iter()
            .find(|info| info.class_id == class_id)
            .map(|info| info.species)
    }

    pub fn class_id(self) -> u32 {
        self.info().class_id
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn emoji(self) -> &'static str {
        self.info().emoji
    }

    /// RGB box colour.
    pub fn color(self) -> [u8; 3] {
        self.info().color
    }

    fn info(self) -> &'static SpeciesInfo {
        // TAXONOMY is indexed in declaration order.
        &TAXONOMY[self as usize]
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown species '{0}'")]
pub struct UnknownSpecies(pub String);

impl FromStr for Species {
    type Err = UnknownSpecies;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Species::ALL
            .into_iter()
            .find(|sp| sp.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownSpecies(wanted.to_string()))
    }
}

/// Label attached to a detection.
///
/// A retrained model may emit class ids beyond the known taxonomy; those
/// are kept as `Unknown` and rendered with a generic placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassLabel {
    Known(Species),
    Unknown(u32),
}

impl ClassLabel {
    pub fn from_class_id(class_id: u32) -> Self {
        Species::from_class_id(class_id)
            .map(ClassLabel::Known)
            .unwrap_or(ClassLabel::Unknown(class_id))
    }

    pub fn species(self) -> Option<Species> {
        match self {
            ClassLabel::Known(species) => Some(species),
            ClassLabel::Unknown(_) => None,
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ClassLabel::Known(species) => species.emoji(),
            ClassLabel::Unknown(_) => UNKNOWN_EMOJI,
        }
    }

    pub fn color(self) -> [u8; 3] {
        match self {
            ClassLabel::Known(species) => species.color(),
            ClassLabel::Unknown(_) => UNKNOWN_COLOR,
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassLabel::Known(species) => write!(f, "{species}"),
            ClassLabel::Unknown(id) => write!(f, "Class_{id}"),
        }
    }
}
