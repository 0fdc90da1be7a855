use std::path::PathBuf;

use gbschema::{Domain, SchemaError, Settings};

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture(name: &str) -> PathBuf {
    fixtures().join(name)
}

#[test]
fn imports_load_before_the_importing_file() {
    let domain = Domain::from_file(fixture("garage.gbs")).expect("garage load");
    assert_eq!(domain.name(), Some("garage"));
    assert_eq!(domain.imported_files().len(), 3);
    assert_eq!(domain.entity("Car").unwrap().domain(), Some("vehicles"));
    assert_eq!(domain.entity("Wheel").unwrap().domain(), Some("parts"));
    assert_eq!(domain.entity("Mechanic").unwrap().domain(), Some("garage"));
    // user types declared by an import are usable by the importer
    let licence = domain.entity("Mechanic").unwrap().attribute("licence").unwrap();
    assert!(licence.mandatory());
    assert_eq!(licence.notes(), "as issued");
}

#[test]
fn deleted_block_removes_imported_types_and_their_references() {
    let domain = Domain::from_file(fixture("garage.gbs")).unwrap();
    assert!(domain.entity("SportsCar").is_none());
    assert!(domain.relationship("tows").is_none());
    assert_eq!(domain.removed_entities(), ["SportsCar"]);
    assert_eq!(domain.removed_relationships(), ["tows"]);

    // leases lost its only reference but stays in the tree
    let leases = domain.relationship("leases").unwrap();
    assert!(leases.references().is_empty());
    assert!(!domain.index().mentions("SportsCar"));

    // vehicles brings 5, the deletion drops 2, parts and garage add 3
    assert_eq!(domain.reference_count(), 6);
    assert_eq!(domain.top_entity_count(), 4);
    assert_eq!(domain.all_entities().len(), 6);
    let remaining: Vec<&str> = domain
        .entities_not_removed(None)
        .iter()
        .map(|e| e.name())
        .collect();
    assert_eq!(remaining, ["Person", "Vehicle", "Wheel", "Mechanic"]);
}

#[test]
fn cyclic_imports_load_each_file_once() {
    let domain = Domain::from_file(fixture("cycle_a.gbs")).expect("cycle load");
    assert_eq!(domain.name(), Some("alpha"));
    assert_eq!(domain.imported_files().len(), 2);
    assert!(domain.entity("Alpha").is_some());
    assert!(domain.entity("Beta").is_some());
    assert_eq!(domain.reference_count(), 2);
    assert_eq!(domain.relationships_between("Alpha", "Beta").len(), 1);
}

#[test]
fn cyclic_imports_stop_at_the_root_text() {
    let path = fixture("cycle_a.gbs");
    let text = std::fs::read_to_string(&path).expect("read cycle_a");
    let domain = Domain::from_source(&text, &path).expect("cycle load from text");
    assert_eq!(domain.name(), Some("alpha"));
    assert_eq!(domain.imported_files().len(), 2);
    assert_eq!(domain.axioms().len(), 1);
    assert_eq!(domain.union("Letters").unwrap().domain(), "alpha");
    assert_eq!(domain.reference_count(), 2);

    let from_file = Domain::from_file(&path).expect("cycle load from file");
    assert_eq!(domain.summary(), from_file.summary());
}

#[test]
fn missing_import_aborts_the_load() {
    match Domain::from_file(fixture("missing_import.gbs")) {
        Err(SchemaError::ImportResolution { path, .. }) => {
            assert!(path.ends_with("nowhere.gbs"));
        }
        other => panic!("expected an import error, got {other:?}"),
    }
}

#[test]
fn deleted_must_close_the_imports_block() {
    let result = Domain::from_source(
        r#"<domain name="d">
             <imports>
               <deleted><entity name="X"/></deleted>
               <import schema="vehicles"/>
             </imports>
             <entities/>
             <relationships/>
           </domain>"#,
        fixture("inline.gbs"),
    );
    assert!(matches!(result, Err(SchemaError::SchemaStructure(m)) if m.contains("<deleted>")));
}

#[test]
fn deleted_items_take_a_name_only() {
    let result = Domain::from_source(
        r#"<domain name="d">
             <imports>
               <import schema="vehicles"/>
               <deleted><entity name="Car" description="gone"/></deleted>
             </imports>
             <entities/>
             <relationships/>
           </domain>"#,
        fixture("inline.gbs"),
    );
    assert!(matches!(result, Err(SchemaError::InvalidAttribute { .. })));
}

#[test]
fn deleting_an_unknown_name_is_tolerated() {
    let domain = Domain::from_source(
        r#"<domain name="d">
             <imports>
               <import schema="vehicles"/>
               <deleted><relationship name="flies"/></deleted>
             </imports>
             <entities/>
             <relationships/>
           </domain>"#,
        fixture("inline.gbs"),
    )
    .unwrap();
    assert_eq!(domain.removed_relationships(), ["flies"]);
    assert_eq!(domain.reference_count(), 5);
}

#[test]
fn another_domain_may_move_a_type_further_down() {
    let domain = Domain::from_file(fixture("sports.gbs")).expect("sports load");
    assert_eq!(
        domain.class_path("SportsCar"),
        ["Entity", "Vehicle", "Racing", "Car", "SportsCar"]
    );
    let car = domain.entity("Car").unwrap();
    assert_eq!(car.domain(), Some("sports"));
    // a redeclaration without attributes keeps the ones already there
    assert!(car.attribute("body").is_some());
    assert_eq!(domain.entity("Vehicle").unwrap().attributes().len(), 2);
    // inheritance follows the move
    assert!(domain.relationships_with_object("Racing").contains("owns"));
}

#[test]
fn moving_a_type_up_is_an_inconsistency() {
    match Domain::from_file(fixture("bad_move.gbs")) {
        Err(SchemaError::TreeInconsistency { name, found_under, target }) => {
            assert_eq!(name, "SportsCar");
            assert_eq!(found_under, "Car");
            assert_eq!(target, "Entity");
        }
        other => panic!("expected a tree inconsistency, got {other:?}"),
    }
}

#[test]
fn bare_names_resolve_through_settings() {
    let settings = Settings {
        schema_dir: fixtures(),
        ..Settings::default()
    };
    let mut domain = Domain::new();
    domain.load_named("vehicles", &settings).expect("named load");
    assert_eq!(domain.top_entity_count(), 2);

    // text without a folder of its own imports from the schema folder
    let mut inline = Domain::new();
    inline
        .load_source(
            r#"<domain name="d">
                 <imports><import schema="vehicles"/></imports>
                 <entities><entity name="Trailer"/></entities>
                 <relationships/>
               </domain>"#,
            "memory",
            &settings,
        )
        .expect("inline load");
    assert!(inline.entity("Boat").is_some());
    assert_eq!(inline.name(), Some("d"));
}

#[test]
fn later_loads_skip_files_already_imported() {
    let mut domain = Domain::from_file(fixture("vehicles.gbs")).unwrap();
    domain
        .load_file(fixture("garage.gbs"), &Settings::default())
        .expect("garage on top of vehicles");
    assert_eq!(domain.name(), Some("vehicles"));
    assert_eq!(domain.imported_files().len(), 3);
    assert!(domain.entity("SportsCar").is_none());
    assert_eq!(domain.reference_count(), 6);
}
