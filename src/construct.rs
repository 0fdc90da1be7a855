// hashmaps keyed by names use a fast hashing algo
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;
use std::collections::{BTreeSet, HashMap};

// used to print out readable forms of a construct
use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{Result, SchemaError};

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

// Names of types are compared without regard to case everywhere in a model.
pub(crate) fn name_key(name: &str) -> String {
    name.to_lowercase()
}
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a == b || name_key(a) == name_key(b)
}

// ------------- AttributeType -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeType {
    String,
    Select,
    Tree,
    Entity,
    UserTypes,
    // integer, date, boolean and the like are kept as written
    Primitive(String),
}
impl AttributeType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "string" => Self::String,
            "select" => Self::Select,
            "tree" => Self::Tree,
            "entity" => Self::Entity,
            "user-types" => Self::UserTypes,
            other => Self::Primitive(other.to_string()),
        }
    }
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Select => "select",
            Self::Tree => "tree",
            Self::Entity => "entity",
            Self::UserTypes => "user-types",
            Self::Primitive(tag) => tag,
        }
    }
}
impl Default for AttributeType {
    fn default() -> Self {
        Self::String
    }
}
impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
impl Serialize for AttributeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ------------- ValueTree -------------
/// Labeled hierarchy of the values a `tree` attribute may take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueTree {
    label: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<ValueTree>,
}
impl ValueTree {
    pub const ROOT_LABEL: &'static str = "- Select one -";

    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
        }
    }
    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn children(&self) -> &[ValueTree] {
        &self.children
    }
    pub fn push(&mut self, child: ValueTree) {
        self.children.push(child);
    }
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
    /// Depth-first search for a label, including this node.
    pub fn find(&self, label: &str) -> Option<&ValueTree> {
        if self.label == label {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(label))
    }
    /// Labels of all leaves, left to right.
    pub fn leaves(&self) -> Vec<&str> {
        if self.is_leaf() {
            return vec![self.label.as_str()];
        }
        self.children.iter().flat_map(|c| c.leaves()).collect()
    }
}

// ------------- Attribute -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    name: String,
    data_type: AttributeType,
    description: String,
    notes: String,
    mandatory: bool,
    distinguishing: bool,
    display: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_tree: Option<ValueTree>,
}

/// The parts of a user type a referencing `<attribute>` tag may override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeOverride {
    pub name: String,
    pub description: String,
    pub notes: Option<String>,
    pub mandatory: bool,
    pub distinguishing: bool,
    pub display: bool,
}

impl Attribute {
    /// Sentinel appended to every `select` value list.
    pub const OTHER: &'static str = "Other";

    pub fn new(name: impl Into<String>, data_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            data_type,
            description: String::new(),
            notes: String::new(),
            mandatory: false,
            distinguishing: false,
            display: false,
            target: None,
            values: Vec::new(),
            value_tree: None,
        }
    }
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
    pub fn with_mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }
    pub fn with_distinguishing(mut self, distinguishing: bool) -> Self {
        self.distinguishing = distinguishing;
        self
    }
    pub fn with_display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }
    pub fn with_value_tree(mut self, tree: ValueTree) -> Self {
        self.value_tree = Some(tree);
        self
    }
    /// An independent copy of this attribute with the override applied.
    /// Notes are only replaced when the override carries some.
    pub fn overridden(&self, patch: &AttributeOverride) -> Self {
        let mut copy = self.clone();
        copy.name = patch.name.clone();
        copy.description = patch.description.clone();
        if let Some(notes) = &patch.notes {
            copy.notes = notes.clone();
        }
        copy.mandatory = patch.mandatory;
        copy.distinguishing = patch.distinguishing;
        copy.display = patch.display;
        copy
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn data_type(&self) -> &AttributeType {
        &self.data_type
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn notes(&self) -> &str {
        &self.notes
    }
    pub fn mandatory(&self) -> bool {
        self.mandatory
    }
    pub fn distinguishing(&self) -> bool {
        self.distinguishing
    }
    pub fn display(&self) -> bool {
        self.display
    }
    pub fn is_descriptive(&self) -> bool {
        self.mandatory || self.distinguishing
    }
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
    pub fn values(&self) -> &[String] {
        &self.values
    }
    pub fn value_tree(&self) -> Option<&ValueTree> {
        self.value_tree.as_ref()
    }
}
impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}::<{}>", self.name, self.data_type)
    }
}

// ------------- Reference -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    subject: String,
    object: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<Attribute>,
}
impl Reference {
    pub fn new(subject: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            attributes: Vec::new(),
        }
    }
    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Self {
        self.attributes = attributes;
        self
    }
    pub fn subject(&self) -> &str {
        &self.subject
    }
    pub fn object(&self) -> &str {
        &self.object
    }
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
    /// Whether both references pair the same subject with the same object.
    pub fn same_key(&self, subject: &str, object: &str) -> bool {
        same_name(&self.subject, subject) && same_name(&self.object, object)
    }
}
impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Reference [subject={}, object={}]", self.subject, self.object)
    }
}

// ------------- Union -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Union {
    name: String,
    domain: String,
    values: BTreeSet<String>,
}
impl Union {
    pub fn new(name: impl Into<String>, domain: impl Into<String>, values: BTreeSet<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            values,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn domain(&self) -> &str {
        &self.domain
    }
    pub fn values(&self) -> &BTreeSet<String> {
        &self.values
    }
    pub fn contains(&self, name: &str) -> bool {
        self.values.iter().any(|v| same_name(v, name))
    }
    // a union redeclared by another domain takes over the domain and widens the set
    pub(crate) fn merge(&mut self, other: Union) {
        self.domain = other.domain;
        self.values.extend(other.values);
    }
    pub(crate) fn retain_values<F: FnMut(&String) -> bool>(&mut self, keep: F) {
        self.values.retain(keep);
    }
}

// ------------- Axiom -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Axiom {
    name: String,
    formalism: String,
    expression: String,
    domain: String,
}
impl Axiom {
    pub fn new(
        name: impl Into<String>,
        formalism: impl Into<String>,
        expression: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            formalism: formalism.into(),
            expression: expression.into(),
            domain: domain.into(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn formalism(&self) -> &str {
        &self.formalism
    }
    pub fn expression(&self) -> &str {
        &self.expression
    }
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

// ------------- Node -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Entity,
    Relationship,
}
impl NodeKind {
    /// Name of the universal root every tree of this kind hangs from.
    pub fn root_name(self) -> &'static str {
        match self {
            Self::Entity => "Entity",
            Self::Relationship => "Relationship",
        }
    }
    pub fn tag(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Relationship => "relationship",
        }
    }
}

/// An entity or relationship type. Relationship nodes additionally carry
/// an inverse name, a symmetry flag and their references.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    domain: Option<String>,
    description: String,
    notes: String,
    is_abstract: bool,
    attributes: Vec<Attribute>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    inverse: Option<String>,
    symmetric: bool,
    references: Vec<Reference>,
}
impl Node {
    pub fn new(name: impl Into<String>, domain: Option<String>) -> Self {
        Self {
            name: name.into(),
            domain,
            description: String::new(),
            notes: String::new(),
            is_abstract: false,
            attributes: Vec::new(),
            parent: None,
            children: Vec::new(),
            inverse: None,
            symmetric: false,
            references: Vec::new(),
        }
    }
    pub fn relationship(name: impl Into<String>, domain: Option<String>, inverse: Option<String>) -> Self {
        let mut node = Self::new(name, domain);
        node.inverse = inverse;
        node
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn notes(&self) -> &str {
        &self.notes
    }
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
    pub fn inverse(&self) -> Option<&str> {
        self.inverse.as_deref()
    }
    pub fn symmetric(&self) -> bool {
        self.symmetric
    }
    pub fn references(&self) -> &[Reference] {
        &self.references
    }
    pub fn reference(&self, subject: &str, object: &str) -> Option<&Reference> {
        self.references.iter().find(|r| r.same_key(subject, object))
    }
    pub fn subjects(&self) -> BTreeSet<String> {
        self.references.iter().map(|r| r.subject().to_string()).collect()
    }
    pub fn objects(&self) -> BTreeSet<String> {
        self.references.iter().map(|r| r.object().to_string()).collect()
    }
    pub fn set_domain(&mut self, domain: impl Into<String>) {
        self.domain = Some(domain.into());
    }
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }
    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }
    pub fn set_abstract(&mut self, is_abstract: bool) {
        self.is_abstract = is_abstract;
    }
    pub fn set_inverse(&mut self, inverse: impl Into<String>) {
        self.inverse = Some(inverse.into());
    }
    pub fn set_symmetric(&mut self, symmetric: bool) {
        self.symmetric = symmetric;
    }
    /// Attaches an attribute, replacing (and returning) any attribute of the same name.
    pub fn attach_attribute(&mut self, attribute: Attribute) -> Option<Attribute> {
        let replaced = self
            .attributes
            .iter()
            .position(|a| a.name() == attribute.name())
            .map(|at| self.attributes.remove(at));
        self.attributes.push(attribute);
        replaced
    }
    pub fn attach_attributes<I: IntoIterator<Item = Attribute>>(&mut self, attributes: I) {
        for attribute in attributes {
            self.attach_attribute(attribute);
        }
    }
    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        let at = self.attributes.iter().position(|a| a.name() == name)?;
        Some(self.attributes.remove(at))
    }
    /// Adds a reference, replacing (and returning) one with the same subject and object.
    pub fn add_reference(&mut self, reference: Reference) -> Option<Reference> {
        let replaced = self
            .references
            .iter()
            .position(|r| r.same_key(reference.subject(), reference.object()))
            .map(|at| self.references.remove(at));
        self.references.push(reference);
        replaced
    }
    pub(crate) fn remove_reference(&mut self, subject: &str, object: &str) -> Option<Reference> {
        let at = self.references.iter().position(|r| r.same_key(subject, object))?;
        Some(self.references.remove(at))
    }
    pub(crate) fn take_references<F: Fn(&Reference) -> bool>(&mut self, doomed: F) -> Vec<Reference> {
        let (taken, kept): (Vec<Reference>, Vec<Reference>) =
            self.references.drain(..).partition(|r| doomed(r));
        self.references = kept;
        taken
    }
}
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ------------- Tree -------------
// Owns all nodes of one hierarchy. Parents are handles into the same arena,
// and a name lookup mirrors exactly the nodes reachable from the root.
// Slots freed by `remove` are handed out again, so the handle of a removed
// node may later name another node.
#[derive(Debug, Clone)]
pub struct Tree {
    kind: NodeKind,
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    names: HashMap<String, NodeId, OtherHasher>,
}
impl Tree {
    const ROOT: NodeId = NodeId(0);

    pub fn new(kind: NodeKind) -> Self {
        let mut root = Node::new(kind.root_name(), None);
        match kind {
            NodeKind::Entity => root.attach_attributes([
                Attribute::new("name", AttributeType::String).with_mandatory(true),
                Attribute::new("description", AttributeType::String),
                Attribute::new("notes", AttributeType::String),
            ]),
            NodeKind::Relationship => root.set_inverse(kind.root_name()),
        }
        Self {
            kind,
            nodes: vec![Some(root)],
            free: Vec::new(),
            names: HashMap::default(),
        }
    }
    pub fn kind(&self) -> NodeKind {
        self.kind
    }
    pub fn root(&self) -> NodeId {
        Self::ROOT
    }
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }
    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }
    /// Number of nodes below the universal root.
    pub fn len(&self) -> usize {
        self.names.len()
    }
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
    /// Finds a node anywhere below the root, ignoring case.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(&name_key(name)).copied()
    }
    /// Finds a strict descendant of `start` by name, ignoring case.
    pub fn find_in(&self, start: NodeId, name: &str) -> Option<NodeId> {
        self.find(name).filter(|&id| self.has_ancestor(id, start))
    }
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(&name_key(name))
    }
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.get(id).map(Node::name)
    }
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::parent)
    }
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(Node::children).unwrap_or(&[])
    }
    pub fn top_nodes(&self) -> &[NodeId] {
        self.children(Self::ROOT)
    }
    pub fn is_top(&self, id: NodeId) -> bool {
        self.parent(id) == Some(Self::ROOT)
    }
    /// The top-level ancestor of a node (the node itself when it is top).
    pub fn top(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            if parent == Self::ROOT {
                break;
            }
            current = parent;
        }
        current
    }
    /// Whether `ancestor` lies strictly above `id`.
    pub fn has_ancestor(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }
    /// Root first, ending with the node itself.
    pub fn class_path(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = self.parent(id);
        while let Some(parent) = current {
            path.push(parent);
            current = self.parent(parent);
        }
        path.reverse();
        path
    }
    /// All nodes below `id` in depth-first pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            // tolerate dangling handles rather than failing a read
            let Some(node) = self.get(current) else { continue };
            found.push(current);
            stack.extend(node.children().iter().rev());
        }
        found
    }
    /// The node's own name followed by the names of all its descendants.
    pub fn subclass_names(&self, id: NodeId) -> Vec<String> {
        std::iter::once(id)
            .chain(self.descendants(id))
            .filter_map(|d| self.name(d))
            .map(str::to_string)
            .collect()
    }
    /// Every node below the root, depth-first.
    pub fn walk(&self) -> Vec<NodeId> {
        self.descendants(Self::ROOT)
    }
    /// Every node below the root, level by level.
    pub fn breadth_first(&self) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut queue: std::collections::VecDeque<NodeId> = self.top_nodes().iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            let Some(node) = self.get(current) else { continue };
            found.push(current);
            queue.extend(node.children());
        }
        found
    }
    /// Inherited attributes from the root down to the parent, then the node's own.
    pub fn all_attributes(&self, id: NodeId) -> Vec<&Attribute> {
        self.class_path(id)
            .into_iter()
            .filter_map(|n| self.get(n))
            .flat_map(|n| n.attributes())
            .collect()
    }
    /// Own attributes whose names the parent does not define itself.
    pub fn new_attributes(&self, id: NodeId) -> Vec<&Attribute> {
        let Some(node) = self.get(id) else { return Vec::new() };
        let inherited = self.parent(id).and_then(|p| self.get(p));
        node.attributes()
            .iter()
            .filter(|a| inherited.is_none_or(|p| p.attribute(a.name()).is_none()))
            .collect()
    }

    pub(crate) fn insert(&mut self, parent: NodeId, mut node: Node) -> Result<NodeId> {
        if self.get(parent).is_none() {
            return Err(SchemaError::UnresolvedReference(format!(
                "parent of {} \"{}\" is not part of the tree",
                self.kind.tag(),
                node.name()
            )));
        }
        let key = name_key(node.name());
        if self.names.contains_key(&key) || key == name_key(self.kind.root_name()) {
            return Err(SchemaError::DuplicateName {
                kind: self.kind.tag(),
                name: node.name().to_string(),
                domain: node.domain().unwrap_or_default().to_string(),
            });
        }
        node.parent = Some(parent);
        node.children.clear();
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        self.names.insert(key, id);
        if let Some(p) = self.get_mut(parent) {
            p.children.push(id);
        }
        Ok(id)
    }
    pub(crate) fn move_under(&mut self, id: NodeId, new_parent: NodeId) -> Result<()> {
        if id == Self::ROOT || new_parent == id || self.has_ancestor(new_parent, id) {
            return Err(SchemaError::TreeInconsistency {
                name: self.name(id).unwrap_or_default().to_string(),
                found_under: self.parent(id).and_then(|p| self.name(p)).unwrap_or_default().to_string(),
                target: self.name(new_parent).unwrap_or_default().to_string(),
            });
        }
        self.detach(id);
        if let Some(node) = self.get_mut(id) {
            node.parent = Some(new_parent);
        }
        if let Some(p) = self.get_mut(new_parent) {
            p.children.push(id);
        }
        Ok(())
    }
    /// Detaches a node and drops its whole subtree, returning the dropped nodes.
    pub(crate) fn remove(&mut self, id: NodeId) -> Vec<Node> {
        if id == Self::ROOT || self.get(id).is_none() {
            return Vec::new();
        }
        self.detach(id);
        let mut doomed = vec![id];
        doomed.extend(self.descendants(id));
        let mut removed = Vec::with_capacity(doomed.len());
        for d in doomed {
            if let Some(node) = self.nodes.get_mut(d.0).and_then(Option::take) {
                let key = name_key(node.name());
                if self.names.get(&key) == Some(&d) {
                    self.names.remove(&key);
                }
                self.free.push(d.0);
                removed.push(node);
            }
        }
        removed
    }
    fn detach(&mut self, id: NodeId) {
        let parent = self.get_mut(id).and_then(|n| n.parent.take());
        if let Some(p) = parent.and_then(|p| self.get_mut(p)) {
            p.children.retain(|&c| c != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicles() -> (Tree, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new(NodeKind::Entity);
        let root = tree.root();
        let vehicle = tree.insert(root, Node::new("Vehicle", Some("cars".into()))).unwrap();
        let car = tree.insert(vehicle, Node::new("Car", Some("cars".into()))).unwrap();
        let sports = tree.insert(car, Node::new("SportsCar", Some("cars".into()))).unwrap();
        (tree, vehicle, car, sports)
    }

    #[test]
    fn names_are_unique_ignoring_case() {
        let (mut tree, vehicle, _, _) = vehicles();
        assert_eq!(tree.find("sportscar"), tree.find("SportsCar"));
        assert!(matches!(
            tree.insert(vehicle, Node::new("CAR", None)),
            Err(SchemaError::DuplicateName { .. })
        ));
        assert!(tree.insert(vehicle, Node::new("entity", None)).is_err());
    }

    #[test]
    fn find_in_only_sees_descendants() {
        let (tree, vehicle, car, sports) = vehicles();
        assert_eq!(tree.find_in(vehicle, "sportscar"), Some(sports));
        assert_eq!(tree.find_in(car, "Car"), None);
        assert_eq!(tree.find_in(sports, "Vehicle"), None);
    }

    #[test]
    fn top_and_paths() {
        let (tree, vehicle, car, sports) = vehicles();
        assert_eq!(tree.top(sports), vehicle);
        assert!(tree.is_top(vehicle));
        assert!(!tree.is_top(car));
        assert_eq!(tree.class_path(sports), vec![tree.root(), vehicle, car, sports]);
        assert_eq!(tree.subclass_names(car), vec!["Car", "SportsCar"]);
    }

    #[test]
    fn move_refuses_cycles() {
        let (mut tree, vehicle, _, sports) = vehicles();
        assert!(matches!(
            tree.move_under(vehicle, sports),
            Err(SchemaError::TreeInconsistency { .. })
        ));
        let root = tree.root();
        tree.move_under(sports, root).unwrap();
        assert!(tree.is_top(sports));
        assert_eq!(tree.top_nodes(), &[vehicle, sports]);
    }

    #[test]
    fn remove_drops_subtree_from_lookup() {
        let (mut tree, vehicle, car, _) = vehicles();
        let removed = tree.remove(car);
        assert_eq!(removed.len(), 2);
        assert!(tree.find("SportsCar").is_none());
        assert!(tree.children(vehicle).is_empty());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn removed_slots_are_reused() {
        let (mut tree, vehicle, car, sports) = vehicles();
        let slots = tree.nodes.len();
        tree.remove(car);
        let boat = tree.insert(vehicle, Node::new("Boat", None)).unwrap();
        let yacht = tree.insert(boat, Node::new("Yacht", None)).unwrap();
        assert!([car, sports].contains(&boat));
        assert!([car, sports].contains(&yacht));
        assert_eq!(tree.nodes.len(), slots);
        assert_eq!(tree.name(boat), Some("Boat"));
        assert_eq!(tree.children(vehicle), &[boat]);
        assert_eq!(tree.find("yacht"), Some(yacht));
        assert!(tree.find("Car").is_none());

        tree.insert(yacht, Node::new("Dinghy", None)).unwrap();
        assert_eq!(tree.nodes.len(), slots + 1);
        assert_eq!(tree.walk().len(), 4);
    }

    #[test]
    fn attaching_replaces_by_name() {
        let mut node = Node::new("Car", None);
        node.attach_attribute(Attribute::new("plate", AttributeType::String));
        node.attach_attribute(Attribute::new("color", AttributeType::String));
        let replaced = node.attach_attribute(Attribute::new("plate", AttributeType::Select).with_mandatory(true));
        assert!(replaced.is_some());
        assert_eq!(node.attributes().len(), 2);
        let plate = node.attribute("plate").unwrap();
        assert_eq!(plate.data_type(), &AttributeType::Select);
        assert!(plate.is_descriptive());
    }
}
