//! The loaded model and everything that can be asked of it.
//!
//! A [`Domain`] owns the entity tree, the relationship tree, the reference
//! index, unions, axioms and user types. Loading goes through
//! [`SchemaLoader`]; queries never fail and answer with empty collections or
//! `None` when a name is unknown.
//!
//! Subject and object matching is inheritance aware: a target matches a
//! reference when the reference names the target itself or, under
//! [`SubclassScope::Full`], any entity below it. A target naming a union
//! matches through every member of that union.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::construct::{
    Attribute, Axiom, Node, NodeId, NodeKind, OtherHasher, Reference, Tree, Union, name_key,
    same_name,
};
use crate::error::{Result, SchemaError};
use crate::index::ReferenceIndex;
use crate::loader::SchemaLoader;
use crate::settings::Settings;

/// How far a matching target reaches down the entity tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubclassScope {
    /// The target and all of its descendants.
    #[default]
    Full,
    /// The target name only.
    Exact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub domain: Option<String>,
    pub top_entities: Vec<String>,
    pub top_entity_count: usize,
    pub sub_entity_count: usize,
    pub top_relationships: Vec<String>,
    pub top_relationship_count: usize,
    pub relationship_count: usize,
    pub reference_count: usize,
    pub unions: Vec<String>,
    pub axioms: Vec<String>,
    pub user_types: Vec<String>,
    pub imported_files: Vec<PathBuf>,
    pub removed_entities: Vec<String>,
    pub removed_relationships: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Domain {
    pub(crate) name: Option<String>,
    pub(crate) entities: Tree,
    pub(crate) relationships: Tree,
    pub(crate) index: ReferenceIndex,
    pub(crate) unions: Vec<Union>,
    pub(crate) axioms: Vec<Axiom>,
    pub(crate) user_types: Vec<Attribute>,
    pub(crate) imported_files: Vec<PathBuf>,
    pub(crate) removed_entities: Vec<String>,
    pub(crate) removed_relationships: Vec<String>,
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

// lowercase names a query target stands for
struct Matcher {
    names: HashSet<String, OtherHasher>,
}
impl Matcher {
    fn matches(&self, name: &str) -> bool {
        self.names.contains(&name_key(name))
    }
}

impl Domain {
    pub fn new() -> Self {
        Self {
            name: None,
            entities: Tree::new(NodeKind::Entity),
            relationships: Tree::new(NodeKind::Relationship),
            index: ReferenceIndex::new(),
            unions: Vec::new(),
            axioms: Vec::new(),
            user_types: Vec::new(),
            imported_files: Vec::new(),
            removed_entities: Vec::new(),
            removed_relationships: Vec::new(),
        }
    }

    // ------------- Loading -------------
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut domain = Self::new();
        domain.load_file(path, &Settings::default())?;
        Ok(domain)
    }
    pub fn from_source(text: &str, origin: impl AsRef<Path>) -> Result<Self> {
        let mut domain = Self::new();
        domain.load_source(text, origin, &Settings::default())?;
        Ok(domain)
    }
    /// Loads a file into this model. On failure the model is left untouched.
    pub fn load_file(&mut self, path: impl AsRef<Path>, settings: &Settings) -> Result<()> {
        self.staged(|staged| SchemaLoader::new(staged, settings).load_file(path.as_ref()))
    }
    /// Loads schema text into this model. On failure the model is left untouched.
    pub fn load_source(&mut self, text: &str, origin: impl AsRef<Path>, settings: &Settings) -> Result<()> {
        self.staged(|staged| SchemaLoader::new(staged, settings).load_source(text, origin.as_ref()))
    }
    /// Loads `name.<extension>` from the configured schema folder.
    pub fn load_named(&mut self, name: &str, settings: &Settings) -> Result<()> {
        self.load_file(settings.schema_path(name), settings)
    }
    fn staged<F>(&mut self, load: F) -> Result<()>
    where
        F: FnOnce(&mut Domain) -> Result<()>,
    {
        let mut staged = self.clone();
        load(&mut staged)?;
        *self = staged;
        Ok(())
    }

    pub(crate) fn tree_mut(&mut self, kind: NodeKind) -> &mut Tree {
        match kind {
            NodeKind::Entity => &mut self.entities,
            NodeKind::Relationship => &mut self.relationships,
        }
    }

    // ------------- Entities -------------
    /// Name of the first root document loaded.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    pub fn entity_tree(&self) -> &Tree {
        &self.entities
    }
    pub fn entity(&self, name: &str) -> Option<&Node> {
        self.entities.find(name).and_then(|id| self.entities.get(id))
    }
    /// Searches below `ancestor` only.
    pub fn find_entity_in(&self, ancestor: &str, name: &str) -> Option<&Node> {
        let start = self.entities.find(ancestor)?;
        self.entities
            .find_in(start, name)
            .and_then(|id| self.entities.get(id))
    }
    pub fn all_entities(&self) -> Vec<&Node> {
        self.nodes(&self.entities, self.entities.walk())
    }
    pub fn top_entities(&self) -> Vec<&Node> {
        self.nodes(&self.entities, self.entities.top_nodes().to_vec())
    }
    pub fn sub_entities(&self) -> Vec<&Node> {
        let ids = self
            .entities
            .walk()
            .into_iter()
            .filter(|&id| !self.entities.is_top(id))
            .collect();
        self.nodes(&self.entities, ids)
    }
    /// Top entities except the given names, or except the names deleted
    /// through `<deleted>` when none are given.
    pub fn entities_not_removed(&self, removed: Option<&[String]>) -> Vec<&Node> {
        let removed = removed.unwrap_or(&self.removed_entities);
        self.top_entities()
            .into_iter()
            .filter(|e| !removed.iter().any(|r| same_name(r, e.name())))
            .collect()
    }
    /// Inherited and own attributes of an entity, root first.
    pub fn properties(&self, entity: &str) -> Vec<&Attribute> {
        self.entities
            .find(entity)
            .map(|id| self.entities.all_attributes(id))
            .unwrap_or_default()
    }
    pub fn mandatory_properties(&self, entity: &str) -> Vec<&Attribute> {
        self.properties(entity)
            .into_iter()
            .filter(|a| a.mandatory())
            .collect()
    }
    pub fn new_attributes(&self, entity: &str) -> Vec<&Attribute> {
        self.entities
            .find(entity)
            .map(|id| self.entities.new_attributes(id))
            .unwrap_or_default()
    }
    /// Names from the universal root down to the entity.
    pub fn class_path(&self, entity: &str) -> Vec<String> {
        self.entities
            .find(entity)
            .map(|id| names_of(&self.entities, self.entities.class_path(id)))
            .unwrap_or_default()
    }
    pub fn subclass_names(&self, entity: &str, scope: SubclassScope) -> Vec<String> {
        match (self.entities.find(entity), scope) {
            (None, _) => Vec::new(),
            (Some(id), SubclassScope::Exact) => names_of(&self.entities, vec![id]),
            (Some(id), SubclassScope::Full) => self.entities.subclass_names(id),
        }
    }
    pub fn top_entity_count(&self) -> usize {
        self.entities.top_nodes().len()
    }
    pub fn sub_entity_count(&self) -> usize {
        self.entities.len() - self.top_entity_count()
    }

    // ------------- Relationships -------------
    pub fn relationship_tree(&self) -> &Tree {
        &self.relationships
    }
    pub fn relationship(&self, name: &str) -> Option<&Node> {
        self.relationships
            .find(name)
            .and_then(|id| self.relationships.get(id))
    }
    pub fn all_relationships(&self) -> Vec<&Node> {
        self.nodes(&self.relationships, self.relationships.walk())
    }
    pub fn all_relationship_names(&self) -> Vec<String> {
        let mut names = names_of(&self.relationships, self.relationships.walk());
        names.sort();
        names
    }
    pub fn top_relationships(&self) -> Vec<&Node> {
        self.nodes(&self.relationships, self.relationships.top_nodes().to_vec())
    }
    pub fn top_relationship_count(&self) -> usize {
        self.relationships.top_nodes().len()
    }
    pub fn relationship_properties(&self, relationship: &str) -> Vec<&Attribute> {
        self.relationships
            .find(relationship)
            .map(|id| self.relationships.all_attributes(id))
            .unwrap_or_default()
    }
    pub fn inverse_of(&self, relationship: &str) -> Option<&str> {
        self.relationship(relationship).and_then(Node::inverse)
    }
    /// Every relationship that declares an inverse, mapped to it.
    pub fn inverse_relationships(&self) -> BTreeMap<String, String> {
        self.all_relationships()
            .into_iter()
            .filter_map(|r| Some((r.name().to_string(), r.inverse()?.to_string())))
            .collect()
    }
    /// Relationships whose own references use the entity as subject.
    pub fn relationships_for_subject(&self, entity: &str) -> Vec<&Node> {
        self.all_relationships()
            .into_iter()
            .filter(|r| r.references().iter().any(|x| same_name(x.subject(), entity)))
            .collect()
    }
    pub fn relationships_for_object(&self, entity: &str) -> Vec<&Node> {
        self.all_relationships()
            .into_iter()
            .filter(|r| r.references().iter().any(|x| same_name(x.object(), entity)))
            .collect()
    }
    pub fn relationships_involving(&self, entity: &str) -> Vec<&Node> {
        self.all_relationships()
            .into_iter()
            .filter(|r| {
                r.references()
                    .iter()
                    .any(|x| same_name(x.subject(), entity) || same_name(x.object(), entity))
            })
            .collect()
    }

    // ------------- Inheritance aware queries -------------
    fn matcher(&self, target: &str, scope: SubclassScope) -> Matcher {
        let mut names = HashSet::default();
        self.expand(&mut names, target, scope);
        if let Some(union) = self.union(target) {
            for member in union.values() {
                self.expand(&mut names, member, scope);
            }
        }
        Matcher { names }
    }
    fn expand(&self, names: &mut HashSet<String, OtherHasher>, target: &str, scope: SubclassScope) {
        names.insert(name_key(target));
        if scope == SubclassScope::Exact {
            return;
        }
        if let Some(id) = self.entities.find(target) {
            names.extend(self.entities.subclass_names(id).iter().map(|n| name_key(n)));
        }
    }
    // (relationship node, reference) for every reference in the tree
    fn references(&self) -> impl Iterator<Item = (NodeId, &Reference)> + '_ {
        self.relationships.walk().into_iter().flat_map(move |id| {
            self.relationships
                .get(id)
                .map(Node::references)
                .unwrap_or_default()
                .iter()
                .map(move |r| (id, r))
        })
    }
    fn top_name(&self, id: NodeId) -> String {
        self.relationships
            .name(self.relationships.top(id))
            .unwrap_or_default()
            .to_string()
    }
    fn direct_references(&self, relationship: &str) -> &[Reference] {
        self.relationship(relationship)
            .map(Node::references)
            .unwrap_or_default()
    }

    /// Top-level names of relationships with a reference whose subject matches.
    pub fn relationships_with_subject(&self, subject: &str) -> BTreeSet<String> {
        self.relationships_with_subject_scoped(subject, SubclassScope::Full)
    }
    pub fn relationships_with_subject_scoped(&self, subject: &str, scope: SubclassScope) -> BTreeSet<String> {
        let matcher = self.matcher(subject, scope);
        self.references()
            .filter(|(_, r)| matcher.matches(r.subject()))
            .map(|(id, _)| self.top_name(id))
            .collect()
    }
    /// Top-level names of relationships with a reference whose object matches.
    pub fn relationships_with_object(&self, object: &str) -> BTreeSet<String> {
        self.relationships_with_object_scoped(object, SubclassScope::Full)
    }
    pub fn relationships_with_object_scoped(&self, object: &str, scope: SubclassScope) -> BTreeSet<String> {
        let matcher = self.matcher(object, scope);
        self.references()
            .filter(|(_, r)| matcher.matches(r.object()))
            .map(|(id, _)| self.top_name(id))
            .collect()
    }
    /// Top-level names of relationships linking a matching subject to a matching object.
    pub fn relationships_between(&self, subject: &str, object: &str) -> BTreeSet<String> {
        let subjects = self.matcher(subject, SubclassScope::Full);
        let objects = self.matcher(object, SubclassScope::Full);
        self.references()
            .filter(|(_, r)| subjects.matches(r.subject()) && objects.matches(r.object()))
            .map(|(id, _)| self.top_name(id))
            .collect()
    }
    /// Objects the relationship's own references pair with a matching subject.
    pub fn objects_from_subject_relationship(&self, subject: &str, relationship: &str) -> BTreeSet<String> {
        let matcher = self.matcher(subject, SubclassScope::Full);
        self.direct_references(relationship)
            .iter()
            .filter(|r| matcher.matches(r.subject()))
            .map(|r| r.object().to_string())
            .collect()
    }
    pub fn subjects_from_object_relationship(&self, object: &str, relationship: &str) -> BTreeSet<String> {
        let matcher = self.matcher(object, SubclassScope::Full);
        self.direct_references(relationship)
            .iter()
            .filter(|r| matcher.matches(r.object()))
            .map(|r| r.subject().to_string())
            .collect()
    }
    /// Like [`Self::objects_from_subject_relationship`] over several relationships.
    pub fn objects_from_subject_relationships(&self, subject: &str, relationships: &[&str]) -> Vec<String> {
        let matcher = self.matcher(subject, SubclassScope::Full);
        let objects: BTreeSet<String> = relationships
            .iter()
            .flat_map(|rel| self.direct_references(rel))
            .filter(|r| matcher.matches(r.subject()))
            .map(|r| r.object().to_string())
            .collect();
        objects.into_iter().collect()
    }
    pub fn objects_from_subject(&self, subject: &str) -> BTreeSet<String> {
        let matcher = self.matcher(subject, SubclassScope::Full);
        self.references()
            .filter(|(_, r)| matcher.matches(r.subject()))
            .map(|(_, r)| r.object().to_string())
            .collect()
    }
    pub fn subjects_from_object(&self, object: &str) -> BTreeSet<String> {
        let matcher = self.matcher(object, SubclassScope::Full);
        self.references()
            .filter(|(_, r)| matcher.matches(r.object()))
            .map(|(_, r)| r.subject().to_string())
            .collect()
    }

    // ------------- Relationship contents -------------
    pub fn subjects_of_relationship(&self, relationship: &str) -> BTreeSet<String> {
        self.relationship(relationship)
            .map(Node::subjects)
            .unwrap_or_default()
    }
    pub fn objects_of_relationship(&self, relationship: &str) -> BTreeSet<String> {
        self.relationship(relationship)
            .map(Node::objects)
            .unwrap_or_default()
    }
    pub fn subjects_from_relationships(&self, relationships: &[&str]) -> Vec<String> {
        let subjects: BTreeSet<String> = relationships
            .iter()
            .flat_map(|rel| self.subjects_of_relationship(rel))
            .collect();
        subjects.into_iter().collect()
    }
    pub fn objects_from_relationships(&self, relationships: &[&str]) -> Vec<String> {
        let objects: BTreeSet<String> = relationships
            .iter()
            .flat_map(|rel| self.objects_of_relationship(rel))
            .collect();
        objects.into_iter().collect()
    }

    // ------------- Index -------------
    pub fn index(&self) -> &ReferenceIndex {
        &self.index
    }
    /// Every subject currently referenced, sorted.
    pub fn subjects(&self) -> &[String] {
        self.index.subjects()
    }
    pub fn objects(&self) -> &[String] {
        self.index.objects()
    }
    /// Relationships indexed for this exact subject and object.
    pub fn relationships_from_subject_object(&self, subject: &str, object: &str) -> &[String] {
        self.index
            .subject_object_relationships()
            .lookup(&crate::index::pair_key(subject, object))
    }
    pub fn reference_count(&self) -> usize {
        self.index.reference_count()
    }

    // ------------- Unions, axioms, user types -------------
    pub fn unions(&self) -> &[Union] {
        &self.unions
    }
    pub fn union(&self, name: &str) -> Option<&Union> {
        self.unions.iter().find(|u| same_name(u.name(), name))
    }
    pub fn axioms(&self) -> &[Axiom] {
        &self.axioms
    }
    pub fn axiom(&self, name: &str) -> Option<&Axiom> {
        self.axioms.iter().find(|a| same_name(a.name(), name))
    }
    pub fn user_types(&self) -> &[Attribute] {
        &self.user_types
    }
    pub fn imported_files(&self) -> &[PathBuf] {
        &self.imported_files
    }
    pub fn removed_entities(&self) -> &[String] {
        &self.removed_entities
    }
    pub fn removed_relationships(&self) -> &[String] {
        &self.removed_relationships
    }

    // ------------- Mutation -------------
    /// Adds a top-level entity, replacing a top-level entity of the same name.
    pub fn add_entity(&mut self, entity: Node) -> Result<NodeId> {
        let root = self.entities.root();
        let mut replaced = Vec::new();
        if let Some(existing) = self.entities.find(entity.name()) {
            if !self.entities.is_top(existing) {
                return Err(self.misplaced(NodeKind::Entity, existing));
            }
            replaced = self.entities.remove(existing);
        }
        let kept = name_key(entity.name());
        let id = self.entities.insert(root, entity)?;
        let gone: HashSet<String, OtherHasher> = replaced
            .iter()
            .map(|n| name_key(n.name()))
            .filter(|n| *n != kept)
            .collect();
        self.purge_entities(&gone);
        Ok(id)
    }
    /// Adds a top-level relationship together with its references,
    /// replacing a top-level relationship of the same name.
    pub fn add_relationship(&mut self, relationship: Node) -> Result<NodeId> {
        let root = self.relationships.root();
        if let Some(existing) = self.relationships.find(relationship.name()) {
            if !self.relationships.is_top(existing) {
                return Err(self.misplaced(NodeKind::Relationship, existing));
            }
            self.drop_relationship(existing);
        }
        let name = relationship.name().to_string();
        let references = relationship.references().to_vec();
        let id = self.relationships.insert(root, relationship)?;
        for reference in &references {
            self.index.add(reference.subject(), &name, reference.object());
        }
        Ok(id)
    }
    /// Removes an entity with its subtree and every reference naming any of them.
    pub fn remove_entity(&mut self, name: &str) -> bool {
        let Some(id) = self.entities.find(name) else {
            return false;
        };
        let gone: HashSet<String, OtherHasher> = self
            .entities
            .remove(id)
            .iter()
            .map(|n| name_key(n.name()))
            .collect();
        self.purge_entities(&gone);
        true
    }
    /// Removes a relationship with its subtree and unindexes their references.
    pub fn remove_relationship(&mut self, name: &str) -> bool {
        match self.relationships.find(name) {
            Some(id) => {
                self.drop_relationship(id);
                true
            }
            None => false,
        }
    }
    /// Removes every relationship introduced by the given domain, subtrees
    /// included. Returns how many relationships were removed.
    pub fn remove_relationships_in_domain(&mut self, domain: &str) -> usize {
        let doomed: Vec<String> = self
            .all_relationships()
            .into_iter()
            .filter(|r| r.domain() == Some(domain))
            .map(|r| r.name().to_string())
            .collect();
        let mut removed = 0;
        for name in doomed {
            if let Some(id) = self.relationships.find(&name) {
                removed += self.drop_relationship(id);
            }
        }
        removed
    }
    pub fn add_reference(&mut self, relationship: &str, reference: Reference) -> Result<()> {
        let id = self.relationships.find(relationship).ok_or_else(|| {
            SchemaError::UnresolvedReference(format!("relationship \"{relationship}\" does not exist"))
        })?;
        self.attach_reference(id, reference);
        Ok(())
    }
    pub fn remove_reference(&mut self, relationship: &str, subject: &str, object: &str) -> bool {
        let Some(node) = self
            .relationships
            .find(relationship)
            .and_then(|id| self.relationships.get_mut(id))
        else {
            return false;
        };
        let name = node.name().to_string();
        match node.remove_reference(subject, object) {
            Some(removed) => {
                self.index.remove(removed.subject(), &name, removed.object());
                true
            }
            None => false,
        }
    }

    pub(crate) fn attach_reference(&mut self, relationship: NodeId, reference: Reference) {
        let Some(node) = self.relationships.get_mut(relationship) else {
            return;
        };
        let name = node.name().to_string();
        let (subject, object) = (reference.subject().to_string(), reference.object().to_string());
        if let Some(old) = node.add_reference(reference) {
            self.index.remove(old.subject(), &name, old.object());
        }
        self.index.add(&subject, &name, &object);
    }

    fn drop_relationship(&mut self, id: NodeId) -> usize {
        let removed = self.relationships.remove(id);
        for node in &removed {
            for reference in node.references() {
                self.index
                    .remove(reference.subject(), node.name(), reference.object());
            }
        }
        removed.len()
    }

    // drops references and union members naming any of the (lowercase) names
    fn purge_entities(&mut self, names: &HashSet<String, OtherHasher>) {
        if names.is_empty() {
            return;
        }
        let named = |n: &str| names.contains(&name_key(n));
        for id in self.relationships.walk() {
            let Some(node) = self.relationships.get_mut(id) else {
                continue;
            };
            let relationship = node.name().to_string();
            for reference in node.take_references(|r| named(r.subject()) || named(r.object())) {
                self.index
                    .remove(reference.subject(), &relationship, reference.object());
            }
        }
        for union in &mut self.unions {
            union.retain_values(|v| !named(v.as_str()));
        }
    }

    fn misplaced(&self, kind: NodeKind, id: NodeId) -> SchemaError {
        let tree = match kind {
            NodeKind::Entity => &self.entities,
            NodeKind::Relationship => &self.relationships,
        };
        SchemaError::TreeInconsistency {
            name: tree.name(id).unwrap_or_default().to_string(),
            found_under: tree
                .parent(id)
                .and_then(|p| tree.name(p))
                .unwrap_or_default()
                .to_string(),
            target: kind.root_name().to_string(),
        }
    }

    fn nodes<'t>(&self, tree: &'t Tree, ids: Vec<NodeId>) -> Vec<&'t Node> {
        ids.into_iter().filter_map(|id| tree.get(id)).collect()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            domain: self.name.clone(),
            top_entities: names_of(&self.entities, self.entities.top_nodes().to_vec()),
            top_entity_count: self.top_entity_count(),
            sub_entity_count: self.sub_entity_count(),
            top_relationships: names_of(&self.relationships, self.relationships.top_nodes().to_vec()),
            top_relationship_count: self.top_relationship_count(),
            relationship_count: self.relationships.len(),
            reference_count: self.reference_count(),
            unions: self.unions.iter().map(|u| u.name().to_string()).collect(),
            axioms: self.axioms.iter().map(|a| a.name().to_string()).collect(),
            user_types: self.user_types.iter().map(|t| t.name().to_string()).collect(),
            imported_files: self.imported_files.clone(),
            removed_entities: self.removed_entities.clone(),
            removed_relationships: self.removed_relationships.clone(),
        }
    }
}

fn names_of(tree: &Tree, ids: Vec<NodeId>) -> Vec<String> {
    ids.into_iter()
        .filter_map(|id| tree.name(id))
        .map(str::to_string)
        .collect()
}
