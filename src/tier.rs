// Rank tiers: a fixed, monotonic band table derived purely from rating.
//
// Bands are 200 points wide from Bronze II through Diamond III, then widen.
// Bronze I is open-ended below so every i32 maps to a tier.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Band {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Master,
    Grandmaster,
    Immortal,
}

impl Band {
    pub fn name(self) -> &'static str {
        match self {
            Band::Bronze => "Bronze",
            Band::Silver => "Silver",
            Band::Gold => "Gold",
            Band::Platinum => "Platinum",
            Band::Diamond => "Diamond",
            Band::Master => "Master",
            Band::Grandmaster => "Grandmaster",
            Band::Immortal => "Immortal",
        }
    }

    /// Parse the band word of a tier name ("Gold II" -> Gold).
    pub fn from_tier_name(name: &str) -> Option<Band> {
        let word = name.split_whitespace().next()?;
        BANDS.iter().copied().find(|b| b.name() == word)
    }
}

const BANDS: [Band; 8] = [
    Band::Bronze,
    Band::Silver,
    Band::Gold,
    Band::Platinum,
    Band::Diamond,
    Band::Master,
    Band::Grandmaster,
    Band::Immortal,
];

/// (lower bound, band, division). Division 0 means the band is undivided.
const TIER_TABLE: [(i32, Band, u8); 22] = [
    (i32::MIN, Band::Bronze, 1),
    (-100, Band::Bronze, 2),
    (100, Band::Bronze, 3),
    (300, Band::Silver, 1),
    (500, Band::Silver, 2),
    (700, Band::Silver, 3),
    (900, Band::Gold, 1),
    (1100, Band::Gold, 2),
    (1300, Band::Gold, 3),
    (1500, Band::Platinum, 1),
    (1700, Band::Platinum, 2),
    (1900, Band::Platinum, 3),
    (2100, Band::Diamond, 1),
    (2300, Band::Diamond, 2),
    (2500, Band::Diamond, 3),
    (2700, Band::Master, 1),
    (2950, Band::Master, 2),
    (3200, Band::Master, 3),
    (3450, Band::Grandmaster, 1),
    (3750, Band::Grandmaster, 2),
    (4050, Band::Grandmaster, 3),
    (4350, Band::Immortal, 0),
];

/// A position in the ordered tier list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tier {
    index: usize,
}

impl Tier {
    pub fn index(self) -> usize {
        self.index
    }

    pub fn band(self) -> Band {
        TIER_TABLE[self.index].1
    }

    pub fn division(self) -> u8 {
        TIER_TABLE[self.index].2
    }

    /// Lowest rating that maps to this tier.
    pub fn floor(self) -> i32 {
        TIER_TABLE[self.index].0
    }

    /// Absolute index difference in the ordered tier list.
    pub fn distance(self, other: Tier) -> usize {
        self.index.abs_diff(other.index)
    }

    pub fn lowest() -> Tier {
        Tier { index: 0 }
    }

    pub fn highest() -> Tier {
        Tier {
            index: TIER_TABLE.len() - 1,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numeral = match self.division() {
            1 => " I",
            2 => " II",
            3 => " III",
            _ => "",
        };
        write!(f, "{}{}", self.band().name(), numeral)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rank tier `{0}`")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        (0..TIER_TABLE.len())
            .map(|index| Tier { index })
            .find(|t| t.to_string() == wanted)
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}

/// Map a rating to its tier. Total over all integers.
pub fn tier_for_rating(rating: i32) -> Tier {
    let index = TIER_TABLE
        .iter()
        .rposition(|(floor, _, _)| rating >= *floor)
        .unwrap_or(0);
    Tier { index }
}

/// Distance between two stored tier names. Unknown names are maximally distant.
pub fn tier_distance(a: &str, b: &str) -> usize {
    match (a.parse::<Tier>(), b.parse::<Tier>()) {
        (Ok(a), Ok(b)) => a.distance(b),
        _ => usize::MAX,
    }
}
