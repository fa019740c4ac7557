/// Taxonomic ranks and nomenclatural status for checklist names
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ranks used by the checklist, from family down to infraspecific levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonRank {
    Family,
    Genus,
    Species,
    Subspecies,
    Variety,
    Subvariety,
    Form,
    Subform,
    Unranked,
}

impl TaxonRank {
    /// Parse a rank as written in the checklist ("Species", "var.", "subsp.", ...)
    pub fn parse(s: &str) -> Self {
        match s.trim().trim_end_matches('.').to_lowercase().as_str() {
            "family" => Self::Family,
            "genus" => Self::Genus,
            "species" => Self::Species,
            "subspecies" | "subsp" | "nothosubsp" => Self::Subspecies,
            "variety" | "var" | "nothovar" | "convariety" | "convar" => Self::Variety,
            "subvariety" | "subvar" => Self::Subvariety,
            "form" | "forma" | "f" | "nothof" => Self::Form,
            "subform" | "subf" => Self::Subform,
            _ => Self::Unranked,
        }
    }

    /// Depth in the hierarchy (lower = higher in hierarchy)
    pub fn depth(&self) -> u32 {
        match self {
            Self::Family => 0,
            Self::Genus => 1,
            Self::Species => 2,
            Self::Subspecies => 3,
            Self::Variety => 4,
            Self::Subvariety => 5,
            Self::Form => 6,
            Self::Subform => 7,
            Self::Unranked => 8,
        }
    }

    pub fn is_infraspecific(&self) -> bool {
        self.depth() > Self::Species.depth()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::Genus => "genus",
            Self::Species => "species",
            Self::Subspecies => "subspecies",
            Self::Variety => "variety",
            Self::Subvariety => "subvariety",
            Self::Form => "form",
            Self::Subform => "subform",
            Self::Unranked => "unranked",
        }
    }

    /// Abbreviation used when composing trinomials
    pub fn connector(&self) -> &'static str {
        match self {
            Self::Subspecies => "subsp.",
            Self::Variety => "var.",
            Self::Subvariety => "subvar.",
            Self::Form => "f.",
            Self::Subform => "subf.",
            _ => "",
        }
    }
}

impl fmt::Display for TaxonRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nomenclatural status and taxonomic opinion of a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonStatus {
    Accepted,
    Synonym,
    Unplaced,
    Illegitimate,
    Invalid,
    Misapplied,
    Orthographic,
    ArtificialHybrid,
    LocalBiotype,
    Unknown,
}

impl TaxonStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "accepted" => Self::Accepted,
            "synonym" | "homotypic_synonym" | "heterotypic_synonym" => Self::Synonym,
            "unplaced" => Self::Unplaced,
            "illegitimate" => Self::Illegitimate,
            "invalid" => Self::Invalid,
            "misapplied" => Self::Misapplied,
            "orthographic" | "orthographic variant" => Self::Orthographic,
            "artificial hybrid" | "artificial_hybrid" => Self::ArtificialHybrid,
            "local biotype" | "local_biotype" => Self::LocalBiotype,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Synonym => "synonym",
            Self::Unplaced => "unplaced",
            Self::Illegitimate => "illegitimate",
            Self::Invalid => "invalid",
            Self::Misapplied => "misapplied",
            Self::Orthographic => "orthographic",
            Self::ArtificialHybrid => "artificial hybrid",
            Self::LocalBiotype => "local biotype",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a name with this status may be upgraded during reconciliation
    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Unknown | Self::Unplaced)
    }

    /// Whether this status settles a provisional one
    pub fn is_definitive(&self) -> bool {
        matches!(self, Self::Accepted | Self::Synonym)
    }
}

impl fmt::Display for TaxonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compose a scientific name from its epithets, skipping absent parts
pub fn compose_name(
    genus: &str,
    species: Option<&str>,
    infra_rank: Option<TaxonRank>,
    infraspecies: Option<&str>,
) -> String {
    let mut name = genus.to_string();
    if let Some(species) = species {
        name.push(' ');
        name.push_str(species);
        if let Some(infra) = infraspecies {
            let connector = infra_rank.map(|r| r.connector()).unwrap_or("");
            if !connector.is_empty() {
                name.push(' ');
                name.push_str(connector);
            }
            name.push(' ');
            name.push_str(infra);
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_parsing() {
        assert_eq!(TaxonRank::parse("Species"), TaxonRank::Species);
        assert_eq!(TaxonRank::parse("var."), TaxonRank::Variety);
        assert_eq!(TaxonRank::parse("subsp."), TaxonRank::Subspecies);
        assert_eq!(TaxonRank::parse("f."), TaxonRank::Form);
        assert_eq!(TaxonRank::parse("Convariety"), TaxonRank::Variety);
        assert_eq!(TaxonRank::parse(""), TaxonRank::Unranked);
        assert!(TaxonRank::Variety.is_infraspecific());
        assert!(!TaxonRank::Genus.is_infraspecific());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(TaxonStatus::parse("Accepted"), TaxonStatus::Accepted);
        assert_eq!(TaxonStatus::parse("Synonym"), TaxonStatus::Synonym);
        assert_eq!(TaxonStatus::parse("Artificial Hybrid"), TaxonStatus::ArtificialHybrid);
        assert_eq!(TaxonStatus::parse("whatever"), TaxonStatus::Unknown);
        assert!(TaxonStatus::Unplaced.is_provisional());
        assert!(TaxonStatus::Synonym.is_definitive());
    }

    #[test]
    fn test_compose_name() {
        assert_eq!(compose_name("Oxalis", None, None, None), "Oxalis");
        assert_eq!(
            compose_name("Oxalis", Some("acetosella"), None, None),
            "Oxalis acetosella"
        );
        assert_eq!(
            compose_name(
                "Picramnia",
                Some("polyantha"),
                Some(TaxonRank::Variety),
                Some("minor")
            ),
            "Picramnia polyantha var. minor"
        );
    }
}
