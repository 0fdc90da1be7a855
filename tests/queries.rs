use std::collections::BTreeSet;
use std::path::PathBuf;

use gbschema::{Domain, SubclassScope};

fn vehicles() -> Domain {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/vehicles.gbs");
    Domain::from_file(path).expect("vehicles load")
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn person_owns_a_car() {
    let domain = Domain::from_source(
        r#"<domain name="garage">
             <entities>
               <entity name="Person"/>
               <entity name="Car" abstract="true"><entity name="SportsCar"/></entity>
             </entities>
             <relationships>
               <relationship name="owns" inverse="ownedBy">
                 <reference subject="Person" object="Car"/>
               </relationship>
             </relationships>
           </domain>"#,
        "garage.gbs",
    )
    .unwrap();
    assert_eq!(domain.relationships_with_subject("Person"), set(&["owns"]));
    assert_eq!(domain.objects_from_subject_relationship("Person", "owns"), set(&["Car"]));
    assert!(domain.entity("Car").unwrap().is_abstract());
}

#[test]
fn subjects_match_through_subclasses() {
    let domain = vehicles();
    // Car is the subject of tows, so Vehicle matches it
    assert_eq!(domain.relationships_with_subject("Vehicle"), set(&["tows"]));
    assert!(domain.relationships_with_subject("Boat").is_empty());
    assert_eq!(domain.objects_from_subject("Vehicle"), set(&["Boat"]));
    assert_eq!(domain.subjects_from_object("Car"), set(&["Person"]));
    assert_eq!(domain.objects_from_subject_relationship("Vehicle", "tows"), set(&["Boat"]));
}

#[test]
fn exact_scope_does_not_expand() {
    let domain = vehicles();
    assert!(domain.relationships_with_subject_scoped("Vehicle", SubclassScope::Exact).is_empty());
    assert_eq!(
        domain.relationships_with_subject_scoped("vehicle", SubclassScope::Full),
        set(&["tows"])
    );
    assert_eq!(
        domain.relationships_with_object_scoped("Car", SubclassScope::Exact),
        set(&["owns"])
    );
    assert_eq!(domain.subclass_names("Car", SubclassScope::Exact), ["Car"]);
    assert_eq!(domain.subclass_names("Car", SubclassScope::Full), ["Car", "SportsCar"]);
    assert!(domain.subclass_names("Plane", SubclassScope::Full).is_empty());
}

#[test]
fn matches_report_top_level_relationships() {
    let domain = vehicles();
    assert_eq!(domain.relationships_with_subject("Person"), set(&["knows", "owns"]));
    assert_eq!(domain.relationships_with_object("SportsCar"), set(&["owns"]));
    assert_eq!(domain.relationships_with_object("Vehicle"), set(&["owns", "tows"]));
    assert_eq!(domain.relationships_between("Person", "SportsCar"), set(&["owns"]));
    assert_eq!(domain.relationships_between("Person", "Person"), set(&["knows"]));
    assert!(domain.relationships_between("Boat", "Person").is_empty());
    // the index answers for the exact pair and the leaf relationship
    assert_eq!(domain.relationships_from_subject_object("Person", "SportsCar"), ["leases"]);
    assert!(domain.relationships_from_subject_object("Person", "Vehicle").is_empty());
}

#[test]
fn unions_match_through_their_members() {
    let domain = vehicles();
    assert_eq!(domain.relationships_with_object("Transport"), set(&["owns", "tows"]));
    assert_eq!(domain.relationships_with_subject("transport"), set(&["tows"]));
    assert_eq!(domain.objects_from_subject_relationship("Person", "owns"), set(&["Boat", "Car"]));
    assert_eq!(domain.subjects_from_object_relationship("Transport", "owns"), set(&["Person"]));
}

#[test]
fn relationship_contents_use_direct_references() {
    let domain = vehicles();
    assert_eq!(domain.subjects_of_relationship("owns"), set(&["Person"]));
    assert_eq!(domain.objects_of_relationship("owns"), set(&["Boat", "Car"]));
    assert_eq!(domain.objects_of_relationship("leases"), set(&["SportsCar"]));
    assert!(domain.objects_of_relationship("flies").is_empty());
    assert_eq!(
        domain.objects_from_relationships(&["owns", "tows", "flies"]),
        ["Boat", "Car"]
    );
    assert_eq!(domain.subjects_from_relationships(&["tows", "knows"]), ["Car", "Person"]);
    assert_eq!(
        domain.objects_from_subject_relationships("Person", &["leases", "knows"]),
        ["Person", "SportsCar"]
    );
}

#[test]
fn relationships_by_participant() {
    let domain = vehicles();
    let names = |nodes: Vec<&gbschema::Node>| nodes.iter().map(|n| n.name().to_string()).collect::<Vec<_>>();
    assert_eq!(names(domain.relationships_for_subject("Car")), ["tows"]);
    assert_eq!(names(domain.relationships_for_object("Boat")), ["owns", "tows"]);
    assert_eq!(names(domain.relationships_involving("SportsCar")), ["leases"]);
    assert!(domain.relationships_for_subject("Vehicle").is_empty());
}

#[test]
fn properties_are_inherited_root_first() {
    let domain = vehicles();
    let names: Vec<&str> = domain
        .properties("SportsCar")
        .iter()
        .map(|a| a.name())
        .collect();
    assert_eq!(
        names,
        ["name", "description", "notes", "plate", "paint", "body", "plate"]
    );
    let mandatory: Vec<&str> = domain
        .mandatory_properties("SportsCar")
        .iter()
        .map(|a| a.name())
        .collect();
    assert_eq!(mandatory, ["name", "plate"]);
    let fresh: Vec<&str> = domain.new_attributes("Car").iter().map(|a| a.name()).collect();
    assert_eq!(fresh, ["body"]);
    assert!(domain.properties("Plane").is_empty());

    let since: Vec<&str> = domain
        .relationship_properties("leases")
        .iter()
        .map(|a| a.name())
        .collect();
    assert_eq!(since, ["since"]);
}

#[test]
fn tree_positions() {
    let domain = vehicles();
    let tree = domain.entity_tree();
    let sports = tree.find("SportsCar").unwrap();
    let vehicle = tree.find("Vehicle").unwrap();
    assert_eq!(tree.top(sports), vehicle);
    assert!(tree.is_top(vehicle));
    assert!(!tree.is_top(sports));
    assert_eq!(domain.class_path("Boat"), ["Entity", "Vehicle", "Boat"]);
    let subs: Vec<&str> = domain.sub_entities().iter().map(|e| e.name()).collect();
    assert_eq!(subs, ["Car", "SportsCar", "Boat"]);
    let tops: Vec<&str> = domain.top_relationships().iter().map(|r| r.name()).collect();
    assert_eq!(tops, ["owns", "tows", "knows"]);
}

#[test]
fn inverses() {
    let domain = vehicles();
    assert_eq!(domain.inverse_of("owns"), Some("ownedBy"));
    assert_eq!(domain.inverse_of("leases"), None);
    assert_eq!(domain.inverse_of("flies"), None);
    let inverses = domain.inverse_relationships();
    assert_eq!(inverses.len(), 3);
    assert_eq!(inverses.get("knows").map(String::as_str), Some("knows"));
}

#[test]
fn unknown_names_answer_empty() {
    let domain = vehicles();
    assert!(domain.entity("Plane").is_none());
    assert!(domain.relationship("flies").is_none());
    assert!(domain.relationships_with_subject("Plane").is_empty());
    assert!(domain.objects_from_subject_relationship("Person", "flies").is_empty());
    assert!(domain.class_path("Plane").is_empty());
    assert!(domain.union("Fleet").is_none());
}

#[test]
fn summary_serializes_to_json() {
    let domain = vehicles();
    let summary = domain.summary();
    assert_eq!(summary.top_entities, ["Person", "Vehicle"]);
    assert_eq!(summary.reference_count, 5);
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["domain"], "vehicles");
    assert_eq!(json["unions"][0], "Transport");
    assert_eq!(json["relationship_count"], 4);

    let body = serde_json::to_value(domain.entity("Car").unwrap().attribute("body").unwrap()).unwrap();
    assert_eq!(body["data_type"], "tree");
    assert_eq!(body["value_tree"]["children"][0]["label"], "Closed");
}
