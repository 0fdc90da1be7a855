//! Reference indexes over (subject, relationship, object) triples.
//!
//! Every reference held by a relationship is mirrored here as one triple.
//! Nine [`Lookup`] maps answer "which X go with this Y" questions without
//! walking the relationship tree, the two sorted lists hold every subject
//! and object currently in use, and the triple set backs the reference count.

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::construct::OtherHasher;

// ------------- Lookup -------------
/// A multimap from a key to a sorted, duplicate free list of values.
/// Keys whose value list becomes empty are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup {
    index: HashMap<String, Vec<String>, OtherHasher>,
}
impl Lookup {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, key: &str, value: &str) -> bool {
        let values = self.index.entry(key.to_string()).or_default();
        insert_sorted(values, value)
    }
    pub fn remove(&mut self, key: &str, value: &str) -> bool {
        let Some(values) = self.index.get_mut(key) else {
            return false;
        };
        let removed = remove_sorted(values, value);
        if values.is_empty() {
            self.index.remove(key);
        }
        removed
    }
    /// The values for a key, empty when the key is absent.
    pub fn lookup(&self, key: &str) -> &[String] {
        self.index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }
    pub fn len(&self) -> usize {
        self.index.len()
    }
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.index.keys()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.index.iter()
    }
}

fn insert_sorted(list: &mut Vec<String>, value: &str) -> bool {
    match list.binary_search_by(|v| v.as_str().cmp(value)) {
        Ok(_) => false,
        Err(at) => {
            list.insert(at, value.to_string());
            true
        }
    }
}
fn remove_sorted(list: &mut Vec<String>, value: &str) -> bool {
    match list.binary_search_by(|v| v.as_str().cmp(value)) {
        Ok(at) => {
            list.remove(at);
            true
        }
        Err(_) => false,
    }
}

/// Compound keys join their parts with a dot.
pub fn pair_key(first: &str, second: &str) -> String {
    format!("{first}.{second}")
}
pub fn triple_key(subject: &str, relationship: &str, object: &str) -> String {
    format!("{subject}.{relationship}.{object}")
}

// ------------- ReferenceIndex -------------
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    subjects: Vec<String>,
    objects: Vec<String>,
    subject_relationships: Lookup,
    subject_objects: Lookup,
    relationship_subjects: Lookup,
    relationship_objects: Lookup,
    object_subjects: Lookup,
    object_relationships: Lookup,
    subject_relationship_objects: Lookup,
    subject_object_relationships: Lookup,
    relationship_object_subjects: Lookup,
    triples: BTreeSet<String>,
    references: usize,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes a triple. Returns false when the triple was already present,
    /// in which case nothing changes.
    pub fn add(&mut self, subject: &str, relationship: &str, object: &str) -> bool {
        if !self.triples.insert(triple_key(subject, relationship, object)) {
            return false;
        }
        insert_sorted(&mut self.subjects, subject);
        insert_sorted(&mut self.objects, object);
        self.subject_relationships.insert(subject, relationship);
        self.subject_objects.insert(subject, object);
        self.relationship_subjects.insert(relationship, subject);
        self.relationship_objects.insert(relationship, object);
        self.object_subjects.insert(object, subject);
        self.object_relationships.insert(object, relationship);
        self.subject_relationship_objects
            .insert(&pair_key(subject, relationship), object);
        self.subject_object_relationships
            .insert(&pair_key(subject, object), relationship);
        self.relationship_object_subjects
            .insert(&pair_key(relationship, object), subject);
        self.references += 1;
        trace!(subject, relationship, object, "indexed reference");
        true
    }

    /// Removes a triple. A pair entry is only dropped once no remaining
    /// triple still supports it, and a subject or object leaves its list
    /// once it no longer takes part in any triple.
    pub fn remove(&mut self, subject: &str, relationship: &str, object: &str) -> bool {
        if !self.triples.remove(&triple_key(subject, relationship, object)) {
            return false;
        }
        let subject_relationship = pair_key(subject, relationship);
        self.subject_relationship_objects
            .remove(&subject_relationship, object);
        if !self.subject_relationship_objects.contains_key(&subject_relationship) {
            self.subject_relationships.remove(subject, relationship);
            self.relationship_subjects.remove(relationship, subject);
        }
        let subject_object = pair_key(subject, object);
        self.subject_object_relationships
            .remove(&subject_object, relationship);
        if !self.subject_object_relationships.contains_key(&subject_object) {
            self.subject_objects.remove(subject, object);
            self.object_subjects.remove(object, subject);
        }
        let relationship_object = pair_key(relationship, object);
        self.relationship_object_subjects
            .remove(&relationship_object, subject);
        if !self.relationship_object_subjects.contains_key(&relationship_object) {
            self.relationship_objects.remove(relationship, object);
            self.object_relationships.remove(object, relationship);
        }
        if !self.subject_relationships.contains_key(subject) {
            remove_sorted(&mut self.subjects, subject);
        }
        if !self.object_relationships.contains_key(object) {
            remove_sorted(&mut self.objects, object);
        }
        self.references -= 1;
        trace!(subject, relationship, object, "unindexed reference");
        true
    }

    pub fn contains(&self, subject: &str, relationship: &str, object: &str) -> bool {
        self.triples
            .contains(&triple_key(subject, relationship, object))
    }
    pub fn reference_count(&self) -> usize {
        self.references
    }
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
    pub fn triples(&self) -> &BTreeSet<String> {
        &self.triples
    }
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }
    pub fn objects(&self) -> &[String] {
        &self.objects
    }
    pub fn subject_relationships(&self) -> &Lookup {
        &self.subject_relationships
    }
    pub fn subject_objects(&self) -> &Lookup {
        &self.subject_objects
    }
    pub fn relationship_subjects(&self) -> &Lookup {
        &self.relationship_subjects
    }
    pub fn relationship_objects(&self) -> &Lookup {
        &self.relationship_objects
    }
    pub fn object_subjects(&self) -> &Lookup {
        &self.object_subjects
    }
    pub fn object_relationships(&self) -> &Lookup {
        &self.object_relationships
    }
    pub fn subject_relationship_objects(&self) -> &Lookup {
        &self.subject_relationship_objects
    }
    pub fn subject_object_relationships(&self) -> &Lookup {
        &self.subject_object_relationships
    }
    pub fn relationship_object_subjects(&self) -> &Lookup {
        &self.relationship_object_subjects
    }

    /// All nine maps, labeled.
    pub fn lookups(&self) -> [(&'static str, &Lookup); 9] {
        [
            ("subject->relationships", &self.subject_relationships),
            ("subject->objects", &self.subject_objects),
            ("relationship->subjects", &self.relationship_subjects),
            ("relationship->objects", &self.relationship_objects),
            ("object->subjects", &self.object_subjects),
            ("object->relationships", &self.object_relationships),
            ("subject.relationship->objects", &self.subject_relationship_objects),
            ("subject.object->relationships", &self.subject_object_relationships),
            ("relationship.object->subjects", &self.relationship_object_subjects),
        ]
    }

    /// Whether a name appears anywhere in the index, as a list entry, a key,
    /// a part of a compound key or a value.
    pub fn mentions(&self, name: &str) -> bool {
        let in_key = |key: &String| key == name || key.split('.').any(|part| part == name);
        self.subjects.iter().any(|s| s == name)
            || self.objects.iter().any(|o| o == name)
            || self.triples.iter().any(in_key)
            || self.lookups().iter().any(|(_, lookup)| {
                lookup
                    .iter()
                    .any(|(key, values)| in_key(key) || values.iter().any(|v| v == name))
            })
    }
}
