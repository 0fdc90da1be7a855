//! gbschema – loading and indexing of tag-based domain schemas.
//!
//! A schema describes two parallel type hierarchies:
//! * entity types, each a [`construct::Node`] in the entity [`construct::Tree`],
//!   carrying typed [`construct::Attribute`]s that are inherited downwards;
//! * relationship types, nodes of a second tree that additionally hold
//!   [`construct::Reference`]s (concrete subject/object pairings), an inverse
//!   name and a symmetry flag.
//!
//! Alongside the trees a schema may declare [`construct::Union`]s (named
//! aliases for a set of entity types), [`construct::Axiom`]s (formal rules
//! scoped to a domain) and user types (attribute templates that other
//! attributes clone and override).
//!
//! ## Modules
//! * [`markup`] – pest grammar turning schema text into an element tree.
//! * [`construct`] – the data model and the arena backed trees.
//! * [`index`] – nine lookup maps, the subject and object lists and the triple
//!   set, all kept consistent as references come and go.
//! * [`loader`] – section grammar, tag whitelists, imports, deletions and the
//!   cross-domain move/merge rules.
//! * [`domain`] – the loaded model with its inheritance aware queries.
//! * [`settings`] – schema folder, extension and log filter, read through `config`.
//!
//! ## Schema Files
//! One `<domain name="...">` root holding, in this order, optional
//! `<imports>`, optional `<user-types>`, mandatory `<entities>`, optional
//! `<union_entities>`, mandatory `<relationships>` and optional `<axioms>`.
//! Imports are resolved against the importing file's folder and loaded at
//! most once. A trailing `<deleted>` block inside `<imports>` removes types
//! the imports brought in.
//!
//! ## Quick Start
//! ```
//! use gbschema::Domain;
//! let domain = Domain::from_source(
//!     r#"<domain name="garage">
//!          <entities>
//!            <entity name="Person"/>
//!            <entity name="Car" abstract="true"><entity name="SportsCar"/></entity>
//!          </entities>
//!          <relationships>
//!            <relationship name="owns" inverse="ownedBy">
//!              <reference subject="Person" object="SportsCar"/>
//!            </relationship>
//!          </relationships>
//!        </domain>"#,
//!     "garage.gbs",
//! ).unwrap();
//! assert!(domain.relationships_with_object("Car").contains("owns"));
//! assert_eq!(domain.reference_count(), 1);
//! ```
//!
//! ## Errors
//! Every structural problem aborts the load with a [`SchemaError`]; the
//! model that was being loaded into keeps its previous state. Queries
//! never fail.

pub mod construct;
pub mod domain;
pub mod error;
pub mod index;
pub mod loader;
pub mod markup;
pub mod settings;

pub use construct::{
    Attribute, AttributeOverride, AttributeType, Axiom, Node, NodeId, NodeKind, Reference, Tree,
    Union, ValueTree,
};
pub use domain::{Domain, SubclassScope, Summary};
pub use error::{Result, SchemaError};
pub use settings::Settings;
