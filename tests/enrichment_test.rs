//! Reference tables, NCBI identifiers and the taxonomy tree over the sample store
mod common;

use common::TestStore;
use florakb::bio::entity::EntityKind;
use florakb::enrich::{self, wgsrpd};
use florakb::storage::query::{Page, ReadStore};
use florakb::storage::traits::RelationalStore;
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn test_tree_places_variety_under_its_species() {
    let t = TestStore::new();
    t.import_names();

    let summary = enrich::rebuild_taxon_tree(&t.store).unwrap();
    assert_eq!(summary.nodes, 4);

    let species = t.store.taxon_by_plant_name_id(2401234).unwrap().unwrap();
    let variety = t.store.taxon_by_plant_name_id(2401400).unwrap().unwrap();
    let below = t.store.descendants(species.id, Page::default()).unwrap();
    assert_eq!(below.iter().map(|v| v.id).collect::<Vec<_>>(), vec![variety.id]);
    assert!(t.store.descendants(variety.id, Page::default()).unwrap().is_empty());

    // Rebuilding replaces the stored tree
    let again = enrich::rebuild_taxon_tree(&t.store).unwrap();
    assert_eq!(again, summary);
}

#[test]
fn test_ncbi_mapping_with_inheritance() {
    let t = TestStore::new();
    t.import_names();
    let names = t.path("names.dmp");
    std::fs::write(
        &names,
        "4029\t|\tOxalis acetosella\t|\t\t|\tscientific name\t|\n\
         4029\t|\twood sorrel\t|\t\t|\tcommon name\t|\n\
         13555\t|\tPicramnia polyantha Planch.\t|\t\t|\tauthority\t|\n",
    )
    .unwrap();

    let summary = enrich::map_tax_ids(&t.store, &names).unwrap();
    assert_eq!(summary.by_scientific_name, 1);
    assert_eq!(summary.inherited, 1);

    let tax_id = |plant_name_id| {
        t.store
            .taxon_by_plant_name_id(plant_name_id)
            .unwrap()
            .unwrap()
            .tax_id
    };
    assert_eq!(tax_id(2401234), Some(4029));
    // Synonym of Oxalis acetosella
    assert_eq!(tax_id(2401300), Some(4029));
    assert_eq!(tax_id(2549024), None);

    let rerun = enrich::map_tax_ids(&t.store, &names).unwrap();
    assert_eq!(rerun.updated, 0);
}

#[test]
fn test_reference_import_before_names_adds_no_duplicates() {
    let t = TestStore::new();
    let tables = t.path("wgsrpd");
    std::fs::create_dir_all(&tables).unwrap();
    std::fs::write(tables.join("tblLevel1.txt"), "L1 code*L1 continent\n1*EUROPE\n").unwrap();
    std::fs::write(
        tables.join("tblLevel2.txt"),
        "L2 code*L2 region*L1 code\n10*Northern Europe*1\n",
    )
    .unwrap();
    std::fs::write(
        tables.join("tblLevel3.txt"),
        "L3 code*L3 area*L2 code\nGRB*Great Britain*10\n",
    )
    .unwrap();

    let units = wgsrpd::read_tables(&tables).unwrap();
    let store: Arc<dyn RelationalStore> = Arc::new(t.store.clone());
    let reference = enrich::run_reference_import(store, "Unknown", &units).unwrap();
    assert_eq!(reference.created, 3);

    t.import_names();
    let stats = t.store.statistics().unwrap();
    assert_eq!(stats.entities.get(&EntityKind::GeographicArea), Some(&10));

    let gb = t.store.areas_by_name("Great Britain").unwrap();
    let region = t.store.areas_by_name("Northern Europe").unwrap();
    assert_eq!(gb.len(), 1);
    assert_eq!(gb[0].parent_id, Some(region[0].id));
}
