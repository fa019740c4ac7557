/// TDWG World Geographical Scheme for Recording Plant Distributions (WGSRPD) levels
use serde::{Deserialize, Serialize};
use std::fmt;

pub const WGSRPD_BASE: &str = "http://rs.tdwg.org/wgsrpd/";

/// Level of a botanical geographic unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoLevel {
    /// Level 1: botanical continent
    Continent,
    /// Level 2: botanical region
    Region,
    /// Level 3: botanical area
    Area,
}

impl GeoLevel {
    pub const ALL: [GeoLevel; 3] = [GeoLevel::Continent, GeoLevel::Region, GeoLevel::Area];

    pub fn number(&self) -> u8 {
        match self {
            GeoLevel::Continent => 1,
            GeoLevel::Region => 2,
            GeoLevel::Area => 3,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(GeoLevel::Continent),
            2 => Some(GeoLevel::Region),
            3 => Some(GeoLevel::Area),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<GeoLevel> {
        match self {
            GeoLevel::Continent => None,
            GeoLevel::Region => Some(GeoLevel::Continent),
            GeoLevel::Area => Some(GeoLevel::Region),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeoLevel::Continent => "continent",
            GeoLevel::Region => "region",
            GeoLevel::Area => "area",
        }
    }

    /// Node label used in the graph
    pub fn label(&self) -> &'static str {
        match self {
            GeoLevel::Continent => "Continent",
            GeoLevel::Region => "Region",
            GeoLevel::Area => "Area",
        }
    }

    /// WGSRPD namespace for codes at this level
    pub fn namespace(&self) -> String {
        format!("{}level{}/", WGSRPD_BASE, self.number())
    }

    /// Predicate linking a parent unit to a unit at this level
    pub fn child_predicate(&self) -> Option<&'static str> {
        match self {
            GeoLevel::Continent => None,
            GeoLevel::Region => Some("hasRegion"),
            GeoLevel::Area => Some("hasArea"),
        }
    }
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One level of a row's geographic hierarchy as read from the checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoUnit {
    pub level: GeoLevel,
    pub code: String,
    pub name: String,
}

/// Normalise a code: numeric codes exported as floats ("7.0") lose their fraction
pub fn normalize_code(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_suffix(".0") {
        Some(int_part) if !int_part.is_empty() && int_part.chars().all(|c| c.is_ascii_digit()) => {
            int_part.to_string()
        }
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_hierarchy() {
        assert_eq!(GeoLevel::Area.parent(), Some(GeoLevel::Region));
        assert_eq!(GeoLevel::Region.parent(), Some(GeoLevel::Continent));
        assert_eq!(GeoLevel::Continent.parent(), None);
        assert_eq!(GeoLevel::from_number(2), Some(GeoLevel::Region));
        assert_eq!(GeoLevel::from_number(4), None);
    }

    #[test]
    fn test_namespace() {
        assert_eq!(
            GeoLevel::Area.namespace(),
            "http://rs.tdwg.org/wgsrpd/level3/"
        );
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("8.0"), "8");
        assert_eq!(normalize_code(" 84 "), "84");
        assert_eq!(normalize_code("BZN"), "BZN");
        assert_eq!(normalize_code("1.5"), "1.5");
    }
}
