/// Relational → RDF projection
///
/// Walks the store kind by kind in dependency order using keyset pagination,
/// so memory stays bounded by one page. Every call to `triples()` starts a
/// fresh walk; the same store contents always yield the same triples.
use crate::bio::entity::{Entity, EntityId, EntityKind, TaxonRecord};
use crate::bio::geography::GeoLevel;
use crate::graph::triple::{Term, Triple, RDF_TYPE};
use crate::storage::traits::{PageFilter, RelationalStore};
use crate::Result;
use std::collections::{HashMap, VecDeque};

pub const IPNI_NAMESPACE: &str = "https://www.ipni.org/id#";
pub const POWO_NAMESPACE: &str = "https://powo.science.kew.org/id#";
pub const NCBI_TAXON_NAMESPACE: &str = "http://purl.obolibrary.org/obo/NCBITaxon_";

/// Basic label of taxonomic nodes
pub const LABEL_TAXONOMIC: &str = "DbWCVP";
/// Basic label of geographic nodes
pub const LABEL_GEOGRAPHIC: &str = "DbTdwgLocation";

/// IRI scheme rooted at the configured base URI
#[derive(Debug, Clone)]
pub struct Vocabulary {
    base: String,
}

impl Vocabulary {
    pub fn new(base_uri: &str) -> Self {
        Self {
            base: base_uri.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn entity(&self, kind: EntityKind, id: EntityId) -> String {
        format!("{}/{}/{}", self.base, kind.slug(), id)
    }

    /// Areas are identified by their WGSRPD code
    pub fn area(&self, level: GeoLevel, code: &str) -> String {
        format!("{}{}", level.namespace(), iri_segment(code))
    }

    pub fn predicate(&self, name: &str) -> String {
        format!("{}/relation#{}", self.base, name)
    }

    pub fn class(&self, label: &str) -> String {
        format!("{}/node#{}", self.base, label)
    }
}

/// Percent-encode everything outside the IRI unreserved set
fn iri_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectionOptions {
    pub page_size: usize,
    pub accepted_only: bool,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            page_size: 5000,
            accepted_only: false,
        }
    }
}

pub struct Projector<'a> {
    store: &'a dyn RelationalStore,
    vocab: Vocabulary,
    options: ProjectionOptions,
}

impl<'a> Projector<'a> {
    pub fn new(store: &'a dyn RelationalStore, vocab: Vocabulary, options: ProjectionOptions) -> Self {
        Self {
            store,
            vocab,
            options,
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// A fresh, lazy walk over the whole store
    pub fn triples(&self) -> TripleStream<'_> {
        TripleStream {
            projector: self,
            kind_index: 0,
            after: 0,
            buffer: VecDeque::new(),
            area_iris: HashMap::new(),
            failed: false,
        }
    }
}

pub struct TripleStream<'p> {
    projector: &'p Projector<'p>,
    kind_index: usize,
    after: EntityId,
    buffer: VecDeque<Triple>,
    /// Area IRIs by id; areas are walked before distributions
    area_iris: HashMap<EntityId, String>,
    failed: bool,
}

impl Iterator for TripleStream<'_> {
    type Item = Result<Triple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(triple) = self.buffer.pop_front() {
                return Some(Ok(triple));
            }
            if self.failed || self.kind_index >= EntityKind::ALL.len() {
                return None;
            }
            if let Err(err) = self.fill() {
                self.failed = true;
                return Some(Err(err));
            }
        }
    }
}

impl TripleStream<'_> {
    /// Load the next page of the current kind, moving on when it is exhausted
    fn fill(&mut self) -> Result<()> {
        let kind = EntityKind::ALL[self.kind_index];
        let options = self.projector.options;
        let page = self.projector.store.page(
            kind,
            self.after,
            options.page_size.max(1),
            PageFilter {
                accepted_only: options.accepted_only,
            },
        )?;

        if page.len() < options.page_size.max(1) {
            self.kind_index += 1;
            self.after = 0;
        } else if let Some((last, _)) = page.last() {
            self.after = *last;
        }

        let links = if kind == EntityKind::Taxon {
            self.taxon_links(&page)?
        } else {
            HashMap::new()
        };

        for (id, entity) in &page {
            self.project(*id, entity, &links);
        }
        Ok(())
    }

    /// Taxon ids for the parent/accepted plant_name_ids referenced in a page
    fn taxon_links(&self, page: &[(EntityId, Entity)]) -> Result<HashMap<i64, EntityId>> {
        let mut wanted: Vec<i64> = page
            .iter()
            .filter_map(|(_, entity)| match entity {
                Entity::Taxon(t) => Some([t.parent_plant_name_id, t.accepted_plant_name_id]),
                _ => None,
            })
            .flatten()
            .flatten()
            .collect();
        wanted.sort_unstable();
        wanted.dedup();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }
        self.projector.store.taxa_for_plant_names(&wanted)
    }

    fn project(&mut self, id: EntityId, entity: &Entity, links: &HashMap<i64, EntityId>) {
        let vocab = &self.projector.vocab;
        let kind = entity.kind();
        let subject = match entity {
            Entity::GeographicArea(a) => vocab.area(a.level, &a.code),
            _ => vocab.entity(kind, id),
        };

        let mut out = Emitter {
            vocab,
            subject: &subject,
            buffer: &mut self.buffer,
        };

        match entity {
            Entity::GeographicArea(a) => {
                out.typed(&[a.level.label(), LABEL_GEOGRAPHIC]);
                out.literal("name", Term::string(&a.name));
                out.literal("code", Term::string(&a.code));
                out.literal("level", Term::integer(a.level.number() as i64));
            }
            _ => out.typed(&[kind.label(), LABEL_TAXONOMIC]),
        }

        match entity {
            Entity::Family(f) => out.literal("name", Term::string(&f.name)),
            Entity::Genus(g) => {
                out.literal("name", Term::string(&g.name));
                out.edge("belongsToFamily", vocab.entity(EntityKind::Family, g.family_id));
            }
            Entity::Species(s) => {
                out.literal("name", Term::string(&s.name));
                out.literal("epithet", Term::string(&s.epithet));
                out.edge("belongsToGenus", vocab.entity(EntityKind::Genus, s.genus_id));
            }
            Entity::Infraspecies(i) => {
                out.literal("name", Term::string(&i.name));
                out.literal("rank", Term::string(i.rank.as_str()));
                out.literal("epithet", Term::string(&i.epithet));
                out.edge("belongsToSpecies", vocab.entity(EntityKind::Species, i.species_id));
            }
            Entity::Publication(p) => {
                out.literal("place", Term::string(&p.place));
                out.literal("volumeAndPage", Term::string(&p.volume_and_page));
                out.literal("author", Term::string(&p.author));
                if let Some(year) = p.year {
                    out.literal("year", Term::integer(year as i64));
                }
            }
            Entity::Taxon(t) => project_taxon(&mut out, id, t, links),
            Entity::GeographicArea(a) => {
                if let (Some(parent_id), Some(predicate)) = (a.parent_id, a.level.child_predicate())
                {
                    let parent = self
                        .area_iris
                        .get(&parent_id)
                        .cloned()
                        .unwrap_or_else(|| vocab.entity(EntityKind::GeographicArea, parent_id));
                    out.buffer.push_back(Triple::new(
                        parent,
                        vocab.predicate(predicate),
                        Term::iri(subject.clone()),
                    ));
                }
            }
            Entity::Distribution(d) => {
                let taxon = vocab.entity(EntityKind::Taxon, d.taxon_id);
                let area = self
                    .area_iris
                    .get(&d.area_id)
                    .cloned()
                    .unwrap_or_else(|| vocab.entity(EntityKind::GeographicArea, d.area_id));
                out.edge("distributionOf", taxon.clone());
                out.edge("distributionIn", area.clone());
                out.literal("introduced", Term::boolean(d.introduced));
                out.literal("extinct", Term::boolean(d.extinct));
                out.literal("locationDoubtful", Term::boolean(d.location_doubtful));
                out.buffer.push_back(Triple::new(
                    taxon,
                    vocab.predicate("occursIn"),
                    Term::iri(area),
                ));
            }
        }

        if let Entity::GeographicArea(_) = entity {
            self.area_iris.insert(id, subject);
        }
    }
}

fn project_taxon(out: &mut Emitter<'_>, id: EntityId, t: &TaxonRecord, links: &HashMap<i64, EntityId>) {
    let vocab = out.vocab;
    out.literal("name", Term::string(&t.name));
    out.literal("authorship", Term::string(&t.authorship));
    out.literal("rank", Term::string(t.rank.as_str()));
    out.literal("status", Term::string(t.status.as_str()));
    out.literal("reviewed", Term::boolean(t.reviewed));
    out.literal("homotypicSynonym", Term::boolean(t.homotypic_synonym));
    if let Some(plant_name_id) = t.plant_name_id {
        out.literal("plantNameId", Term::integer(plant_name_id));
    }
    for (predicate, value) in [
        ("lifeform", &t.lifeform),
        ("climate", &t.climate),
        ("geographicNote", &t.geographic_note),
        ("remarks", &t.remarks),
    ] {
        if let Some(value) = value {
            out.literal(predicate, Term::string(value));
        }
    }

    out.edge("belongsToFamily", vocab.entity(EntityKind::Family, t.family_id));
    out.edge("belongsToGenus", vocab.entity(EntityKind::Genus, t.genus_id));
    if let Some(species_id) = t.species_id {
        out.edge("belongsToSpecies", vocab.entity(EntityKind::Species, species_id));
    }
    if let Some(infraspecies_id) = t.infraspecies_id {
        out.edge(
            "belongsToInfraspecies",
            vocab.entity(EntityKind::Infraspecies, infraspecies_id),
        );
    }
    if let Some(publication_id) = t.publication_id {
        out.edge("publishedIn", vocab.entity(EntityKind::Publication, publication_id));
    }
    if let Some(ipni) = &t.ipni_id {
        out.edge("hasIpni", format!("{}{}", IPNI_NAMESPACE, iri_segment(ipni)));
    }
    if let Some(powo) = &t.powo_id {
        out.edge("hasPowo", format!("{}{}", POWO_NAMESPACE, iri_segment(powo)));
    }
    if let Some(tax_id) = t.tax_id {
        out.edge("hasNcbiTaxon", format!("{}{}", NCBI_TAXON_NAMESPACE, tax_id));
    }

    // Self-references (accepted names point at themselves) are not edges
    for (predicate, plant_name_id) in [
        ("hasParent", t.parent_plant_name_id),
        ("hasAccepted", t.accepted_plant_name_id),
    ] {
        if let Some(target) = plant_name_id.and_then(|p| links.get(&p)) {
            if *target != id {
                out.edge(predicate, vocab.entity(EntityKind::Taxon, *target));
            }
        }
    }
}

struct Emitter<'a> {
    vocab: &'a Vocabulary,
    subject: &'a str,
    buffer: &'a mut VecDeque<Triple>,
}

impl Emitter<'_> {
    fn typed(&mut self, labels: &[&str]) {
        for label in labels {
            self.buffer.push_back(Triple::new(
                self.subject,
                RDF_TYPE,
                Term::iri(self.vocab.class(label)),
            ));
        }
    }

    fn literal(&mut self, predicate: &str, value: Term) {
        self.buffer
            .push_back(Triple::new(self.subject, self.vocab.predicate(predicate), value));
    }

    fn edge(&mut self, predicate: &str, target: String) {
        self.buffer.push_back(Triple::new(
            self.subject,
            self.vocab.predicate(predicate),
            Term::iri(target),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::geography::GeoUnit;
    use crate::bio::taxonomy::{TaxonRank, TaxonStatus};
    use crate::core::normalizer::{DistributionFlags, NormalizedRecord};
    use crate::core::resolver::EntityResolver;
    use crate::storage::sqlite::SqliteStore;
    use crate::storage::traits::TaxonomyStore;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    const BASE: &str = "https://biokb.scai.fraunhofer.de/wcvp";

    fn picramnia() -> NormalizedRecord {
        NormalizedRecord {
            row: 1,
            plant_name_id: Some(2549024),
            ipni_id: Some("77107282-1".to_string()),
            powo_id: None,
            rank: TaxonRank::Species,
            status: TaxonStatus::Accepted,
            family: "Picramniaceae".to_string(),
            genus: "Picramnia".to_string(),
            species: Some("polyantha".to_string()),
            infraspecific_rank: None,
            infraspecies: None,
            taxon_name: "Picramnia polyantha".to_string(),
            taxon_authors: "(Benth.) Planch.".to_string(),
            publication: None,
            remarks: None,
            geographic_note: None,
            lifeform: None,
            climate: None,
            accepted_plant_name_id: Some(2549024),
            parent_plant_name_id: None,
            basionym_plant_name_id: None,
            reviewed: true,
            homotypic_synonym: false,
            geography: vec![GeoUnit {
                level: GeoLevel::Continent,
                code: "8".to_string(),
                name: "SOUTHERN AMERICA".to_string(),
            }],
            flags: DistributionFlags::default(),
        }
    }

    fn populated() -> SqliteStore {
        let store = SqliteStore::memory().unwrap();
        let resolver = EntityResolver::open(Arc::new(store.clone()), "Unknown").unwrap();
        resolver.resolve_row(&picramnia()).unwrap();
        store
    }

    fn collect(store: &SqliteStore, page_size: usize) -> Vec<Triple> {
        let projector = Projector::new(
            store,
            Vocabulary::new(BASE),
            ProjectionOptions {
                page_size,
                accepted_only: false,
            },
        );
        projector.triples().map(|t| t.unwrap()).collect()
    }

    #[test]
    fn test_distribution_edges_and_flags() {
        let store = populated();
        let vocab = Vocabulary::new(BASE);
        let triples = collect(&store, 100);

        let continent = "http://rs.tdwg.org/wgsrpd/level1/8";
        assert!(triples.contains(&Triple::new(
            vocab.entity(EntityKind::Taxon, 1),
            vocab.predicate("occursIn"),
            Term::iri(continent),
        )));
        let distribution = vocab.entity(EntityKind::Distribution, 1);
        for flag in ["introduced", "extinct", "locationDoubtful"] {
            assert!(triples.contains(&Triple::new(
                distribution.clone(),
                vocab.predicate(flag),
                Term::boolean(false),
            )));
        }
        assert!(triples.contains(&Triple::new(
            continent,
            RDF_TYPE,
            Term::iri(vocab.class(LABEL_GEOGRAPHIC)),
        )));
        // Accepted name pointing at itself is not an edge
        assert!(!triples.iter().any(|t| t.predicate == vocab.predicate("hasAccepted")));
    }

    #[test]
    fn test_mapped_taxon_links_to_ncbi() {
        let store = populated();
        let vocab = Vocabulary::new(BASE);
        let ncbi = vocab.predicate("hasNcbiTaxon");
        assert!(!collect(&store, 100).iter().any(|t| t.predicate == ncbi));

        store.set_tax_ids(&[(1, 1118385)]).unwrap();
        let triples = collect(&store, 100);
        assert!(triples.contains(&Triple::new(
            vocab.entity(EntityKind::Taxon, 1),
            ncbi,
            Term::iri("http://purl.obolibrary.org/obo/NCBITaxon_1118385"),
        )));
    }

    #[test]
    fn test_page_size_does_not_change_output() {
        let store = populated();
        let small: BTreeSet<Triple> = collect(&store, 1).into_iter().collect();
        let large: BTreeSet<Triple> = collect(&store, 1000).into_iter().collect();
        assert_eq!(small, large);
    }

    #[test]
    fn test_walk_is_restartable() {
        let store = populated();
        let projector = Projector::new(&store, Vocabulary::new(BASE), ProjectionOptions::default());
        let first: Vec<Triple> = projector.triples().map(|t| t.unwrap()).collect();
        let second: Vec<Triple> = projector.triples().map(|t| t.unwrap()).collect();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_iri_segment_encoding() {
        assert_eq!(iri_segment("BZN"), "BZN");
        assert_eq!(iri_segment("SOUTHERN AMERICA"), "SOUTHERN%20AMERICA");
        assert_eq!(iri_segment("77107282-1"), "77107282-1");
    }
}
