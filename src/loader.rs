//! Turns schema documents into entity and relationship trees.
//!
//! A document is a `<domain name="...">` root whose sections must appear
//! in the order `imports, user-types, entities, union_entities,
//! relationships, axioms`, where only `entities` and `relationships` are
//! mandatory. Every tag is checked against the child tags and attributes
//! allowed in its context before anything is built from it.
//!
//! Imports are loaded depth-first before the importing document's own
//! sections, and each file is loaded at most once per load. Any error
//! aborts the whole load; [`crate::Domain`] stages loads on a copy so a
//! failure never leaves a half-built model behind.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use tracing::{debug, info, warn};

use crate::construct::{
    Attribute, AttributeOverride, AttributeType, Axiom, Node, NodeId, NodeKind, OtherHasher,
    Reference, Union, ValueTree, name_key, same_name,
};
use crate::domain::Domain;
use crate::error::{Result, SchemaError};
use crate::markup::{self, Element};
use crate::settings::Settings;

const SECTIONS: [&str; 6] = [
    "imports",
    "user-types",
    "entities",
    "union_entities",
    "relationships",
    "axioms",
];
const DELETED_ITEM_ATTRIBUTES: &[&str] = &["name"];

lazy_static! {
    // child tags allowed under each tag, anything missing allows none
    static ref VALID_CHILDREN: HashMap<&'static str, &'static [&'static str], OtherHasher> = {
        let mut valid: HashMap<&'static str, &'static [&'static str], OtherHasher> = HashMap::default();
        valid.insert("imports", &["import", "deleted"]);
        valid.insert("deleted", &["entity", "relationship"]);
        valid.insert("user-types", &["attribute"]);
        valid.insert("entities", &["entity"]);
        valid.insert("entity", &["entity", "attribute"]);
        valid.insert("union_entities", &["union"]);
        valid.insert("union", &["uvalue"]);
        valid.insert("relationships", &["relationship"]);
        valid.insert("relationship", &["relationship", "attribute", "reference"]);
        valid.insert("reference", &["attribute"]);
        valid.insert("attribute", &["value"]);
        valid.insert("value", &["value"]);
        valid.insert("axioms", &["axiom"]);
        valid
    };
    // attributes allowed on each tag
    static ref VALID_ATTRIBUTES: HashMap<&'static str, &'static [&'static str], OtherHasher> = {
        let mut valid: HashMap<&'static str, &'static [&'static str], OtherHasher> = HashMap::default();
        valid.insert("domain", &["name"]);
        valid.insert("import", &["schema"]);
        valid.insert("entity", &["name", "description", "abstract", "notes"]);
        valid.insert(
            "relationship",
            &["name", "inverse", "description", "abstract", "notes", "symmetric"],
        );
        valid.insert(
            "attribute",
            &[
                "name",
                "datatype",
                "description",
                "mandatory",
                "distinguishing",
                "display",
                "target",
                "notes",
            ],
        );
        valid.insert("reference", &["subject", "object"]);
        valid.insert("value", &["name"]);
        valid.insert("union", &["name"]);
        valid.insert("uvalue", &["name"]);
        valid.insert("axiom", &["name", "formalism", "rule"]);
        valid
    };
}

/// Loads one or more schema documents into a [`Domain`].
pub struct SchemaLoader<'a> {
    domain: &'a mut Domain,
    settings: &'a Settings,
    // (kind, declaring domain, lowercase name) of unions and axioms seen in this load
    declared: HashSet<(&'static str, String, String), OtherHasher>,
}

impl<'a> SchemaLoader<'a> {
    pub fn new(domain: &'a mut Domain, settings: &'a Settings) -> Self {
        Self {
            domain,
            settings,
            declared: HashSet::default(),
        }
    }

    /// Loads a schema file and, through it, everything it imports.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let absolute = canonical(path)?;
        if !self.domain.imported_files.contains(&absolute) {
            self.domain.imported_files.push(absolute.clone());
        }
        let text = fs::read_to_string(&absolute).map_err(|e| SchemaError::ImportResolution {
            path: absolute.clone(),
            reason: e.to_string(),
        })?;
        self.load_source(&text, &absolute)
    }

    /// Loads schema text. `origin` names where the text came from; its
    /// folder is where relative imports are looked up. An origin naming an
    /// existing file counts as imported, so a cycle leading back to it stops there.
    pub fn load_source(&mut self, text: &str, origin: &Path) -> Result<()> {
        if let Ok(absolute) = fs::canonicalize(origin) {
            if absolute.is_file() && !self.domain.imported_files.contains(&absolute) {
                self.domain.imported_files.push(absolute);
            }
        }
        let root = markup::parse(text)?;
        self.load_document(&root, origin)
    }

    fn load_document(&mut self, root: &Element, origin: &Path) -> Result<()> {
        if root.name() != "domain" {
            return Err(SchemaError::SchemaStructure(format!(
                "expected root tag <domain> but found <{}> in {}",
                root.name(),
                origin.display()
            )));
        }
        validate_attributes(root)?;
        let domain_name = required(root, "name")?.to_string();
        if self.domain.name.is_none() {
            self.domain.name = Some(domain_name.clone());
        }
        let folder = self.folder_of(origin);
        let sections = root.children();
        let mut cursor = 0;

        if let Some(imports) = optional_section(sections, &mut cursor, "imports") {
            self.parse_imports(&folder, imports)?;
        }
        if let Some(types) = optional_section(sections, &mut cursor, "user-types") {
            self.parse_user_types(types)?;
        }
        let entities = expect_section(sections, &mut cursor, "entities", &domain_name)?;
        self.parse_entities(entities, &domain_name)?;
        if let Some(unions) = optional_section(sections, &mut cursor, "union_entities") {
            self.parse_unions(unions, &domain_name)?;
        }
        let relationships = expect_section(sections, &mut cursor, "relationships", &domain_name)?;
        self.parse_relationships(relationships, &domain_name)?;
        if let Some(axioms) = optional_section(sections, &mut cursor, "axioms") {
            self.parse_axioms(axioms, &domain_name)?;
        }
        if let Some(extra) = sections.get(cursor) {
            return Err(SchemaError::SchemaStructure(format!(
                "unexpected tag <{}> on line {} in domain \"{}\", sections must follow the order {}",
                extra.name(),
                extra.line(),
                domain_name,
                SECTIONS.join(", ")
            )));
        }

        info!(
            source = %origin.display(),
            domain = %domain_name,
            entities = self.domain.entities.len(),
            relationships = self.domain.relationships.len(),
            references = self.domain.index.reference_count(),
            "schema loaded"
        );
        Ok(())
    }

    fn folder_of(&self, origin: &Path) -> PathBuf {
        match origin.parent() {
            Some(folder) if !folder.as_os_str().is_empty() => folder.to_path_buf(),
            _ => self.settings.schema_dir.clone(),
        }
    }

    // ------------- Imports -------------
    fn parse_imports(&mut self, folder: &Path, imports: &Element) -> Result<()> {
        validate_attributes(imports)?;
        validate_children(imports)?;
        let children = imports.children();
        let mut deleted = None;
        for (position, child) in children.iter().enumerate() {
            match child.name() {
                "deleted" if position + 1 != children.len() => {
                    return Err(SchemaError::SchemaStructure(format!(
                        "<deleted> must be the last child of <imports> (line {})",
                        child.line()
                    )));
                }
                "deleted" => deleted = Some(child),
                _ if deleted.is_some() => {
                    return Err(SchemaError::SchemaStructure(format!(
                        "<import> cannot follow <deleted> (line {})",
                        child.line()
                    )));
                }
                _ => {
                    validate_attributes(child)?;
                    validate_children(child)?;
                    let schema = required(child, "schema")?;
                    let path = self.resolve_import(folder, schema);
                    let absolute = canonical(&path)?;
                    if self.domain.imported_files.contains(&absolute) {
                        debug!(path = %absolute.display(), "already imported, skipping");
                        continue;
                    }
                    self.load_file(&absolute)?;
                }
            }
        }
        match deleted {
            Some(deleted) => self.parse_deleted(deleted),
            None => Ok(()),
        }
    }

    fn resolve_import(&self, folder: &Path, schema: &str) -> PathBuf {
        let candidate = Path::new(schema);
        if candidate.is_absolute() {
            return candidate.to_path_buf();
        }
        let path_like = schema.contains(['/', '\\'])
            || candidate.extension().is_some_and(|e| e == self.settings.extension.as_str());
        if path_like {
            folder.join(candidate)
        } else {
            folder.join(format!("{schema}.{}", self.settings.extension))
        }
    }

    fn parse_deleted(&mut self, deleted: &Element) -> Result<()> {
        validate_attributes(deleted)?;
        validate_children(deleted)?;
        for item in deleted.children() {
            check_attributes(item, DELETED_ITEM_ATTRIBUTES)?;
            if let Some(child) = item.children().first() {
                return Err(SchemaError::InvalidTag {
                    tag: child.name().to_string(),
                    parent: describe(item),
                    expected: Vec::new(),
                });
            }
            let name = required(item, "name")?;
            let (found, removed) = match item.name() {
                "entity" => (
                    self.domain.remove_entity(name),
                    &mut self.domain.removed_entities,
                ),
                _ => (
                    self.domain.remove_relationship(name),
                    &mut self.domain.removed_relationships,
                ),
            };
            if !found {
                warn!(kind = item.name(), name, "deleted name does not exist");
            }
            if !removed.iter().any(|r| r == name) {
                removed.push(name.to_string());
            }
        }
        Ok(())
    }

    // ------------- Attributes -------------
    fn parse_user_types(&mut self, types: &Element) -> Result<()> {
        validate_attributes(types)?;
        validate_children(types)?;
        for element in types.children() {
            let user_type = self.read_attribute(element)?;
            debug!(name = user_type.name(), datatype = %user_type.data_type(), "user type registered");
            let user_types = &mut self.domain.user_types;
            match user_types.iter().position(|t| t.name() == user_type.name()) {
                Some(at) => user_types[at] = user_type,
                None => user_types.push(user_type),
            }
        }
        Ok(())
    }

    fn read_attributes(&self, parent: &Element) -> Result<Vec<Attribute>> {
        parent
            .children_named("attribute")
            .map(|element| self.read_attribute(element))
            .collect()
    }

    fn read_attribute(&self, element: &Element) -> Result<Attribute> {
        validate_attributes(element)?;
        validate_children(element)?;
        let name = required(element, "name")?;
        let description = element.attribute("description").unwrap_or_default();
        let notes = element.attribute("notes");
        let mandatory = flag(element, "mandatory");
        let distinguishing = flag(element, "distinguishing");
        let display = flag(element, "display");

        let data_type = AttributeType::from_tag(element.attribute("datatype").unwrap_or("string"));
        let attribute = match data_type {
            AttributeType::UserTypes => {
                let target = element.attribute("target").ok_or_else(|| {
                    SchemaError::UnresolvedReference(format!(
                        "attribute \"{name}\" of datatype user-types needs a target"
                    ))
                })?;
                let template = self
                    .domain
                    .user_types
                    .iter()
                    .find(|t| t.name() == target)
                    .ok_or_else(|| {
                        SchemaError::UnresolvedReference(format!(
                            "user type \"{target}\" used by attribute \"{name}\" is not declared"
                        ))
                    })?;
                return Ok(template.overridden(&AttributeOverride {
                    name: name.to_string(),
                    description: description.to_string(),
                    notes: notes.map(str::to_string),
                    mandatory,
                    distinguishing,
                    display,
                }));
            }
            AttributeType::Entity => {
                let target = element.attribute("target").ok_or_else(|| {
                    SchemaError::UnresolvedReference(format!(
                        "attribute \"{name}\" of datatype entity needs a target"
                    ))
                })?;
                Attribute::new(name, data_type).with_target(target)
            }
            AttributeType::Select => {
                let mut values = Vec::new();
                for value in element.children_named("value") {
                    validate_attributes(value)?;
                    values.push(required(value, "name")?.to_string());
                }
                values.push(Attribute::OTHER.to_string());
                Attribute::new(name, data_type).with_values(values)
            }
            AttributeType::Tree => {
                let tree = read_value_tree(element, ValueTree::ROOT_LABEL)?;
                Attribute::new(name, data_type).with_value_tree(tree)
            }
            other => Attribute::new(name, other),
        };
        Ok(attribute
            .with_description(description)
            .with_notes(notes.unwrap_or_default())
            .with_mandatory(mandatory)
            .with_distinguishing(distinguishing)
            .with_display(display))
    }

    // ------------- Entities -------------
    fn parse_entities(&mut self, section: &Element, domain_name: &str) -> Result<()> {
        validate_attributes(section)?;
        validate_children(section)?;
        let root = self.domain.entities.root();
        for element in section.children() {
            self.parse_entity(element, root, domain_name)?;
        }
        Ok(())
    }

    fn parse_entity(&mut self, element: &Element, parent: NodeId, domain_name: &str) -> Result<()> {
        validate_attributes(element)?;
        validate_children(element)?;
        let name = required(element, "name")?;
        let attributes = self.read_attributes(element)?;
        let id = self.place(NodeKind::Entity, name, parent, domain_name)?;
        if let Some(node) = self.domain.entities.get_mut(id) {
            describe_node(node, element, domain_name);
            node.attach_attributes(attributes);
        }
        for child in element.children_named("entity") {
            self.parse_entity(child, id, domain_name)?;
        }
        Ok(())
    }

    // ------------- Relationships -------------
    fn parse_relationships(&mut self, section: &Element, domain_name: &str) -> Result<()> {
        validate_attributes(section)?;
        validate_children(section)?;
        let root = self.domain.relationships.root();
        for element in section.children() {
            self.parse_relationship(element, root, domain_name)?;
        }
        Ok(())
    }

    fn parse_relationship(&mut self, element: &Element, parent: NodeId, domain_name: &str) -> Result<()> {
        validate_attributes(element)?;
        validate_children(element)?;
        let name = required(element, "name")?;
        let inverse = if parent == self.domain.relationships.root() {
            Some(required(element, "inverse")?)
        } else {
            element.attribute("inverse")
        };
        let attributes = self.read_attributes(element)?;
        let id = self.place(NodeKind::Relationship, name, parent, domain_name)?;
        if let Some(node) = self.domain.relationships.get_mut(id) {
            describe_node(node, element, domain_name);
            if let Some(inverse) = inverse {
                node.set_inverse(inverse);
            }
            node.set_symmetric(flag(element, "symmetric"));
            node.attach_attributes(attributes);
        }
        for reference in element.children_named("reference") {
            self.parse_reference(reference, id)?;
        }
        for child in element.children_named("relationship") {
            self.parse_relationship(child, id, domain_name)?;
        }
        Ok(())
    }

    fn parse_reference(&mut self, element: &Element, relationship: NodeId) -> Result<()> {
        validate_attributes(element)?;
        validate_children(element)?;
        let subject = required(element, "subject")?;
        let object = required(element, "object")?;
        let reference = Reference::new(subject, object).with_attributes(self.read_attributes(element)?);
        self.domain.attach_reference(relationship, reference);
        Ok(())
    }

    /// Finds or creates the node a tag declares under `parent`.
    ///
    /// A name already placed under `parent` is updated in place. A name
    /// placed elsewhere by another domain is moved when its current parent
    /// is the root or an ancestor of `parent`. Anything else is an error.
    fn place(&mut self, kind: NodeKind, name: &str, parent: NodeId, domain_name: &str) -> Result<NodeId> {
        let tree = self.domain.tree_mut(kind);
        let Some(existing) = tree.find(name) else {
            let node = Node::new(name, Some(domain_name.to_string()));
            return tree.insert(parent, node);
        };
        let current = tree.parent(existing);
        if current == Some(parent) {
            return Ok(existing);
        }
        let foreign = tree
            .get(existing)
            .is_some_and(|node| node.domain() != Some(domain_name));
        let movable = current.is_some_and(|p| p == tree.root() || tree.has_ancestor(parent, p));
        if foreign && movable {
            tree.move_under(existing, parent)?;
            debug!(
                kind = kind.tag(),
                name,
                under = tree.name(parent).unwrap_or_default(),
                "moved"
            );
            return Ok(existing);
        }
        Err(SchemaError::TreeInconsistency {
            name: name.to_string(),
            found_under: current
                .and_then(|p| tree.name(p))
                .unwrap_or_default()
                .to_string(),
            target: tree.name(parent).unwrap_or_default().to_string(),
        })
    }

    // ------------- Unions -------------
    fn parse_unions(&mut self, section: &Element, domain_name: &str) -> Result<()> {
        validate_attributes(section)?;
        validate_children(section)?;
        let mut unions = Vec::new();
        for element in section.children() {
            validate_attributes(element)?;
            validate_children(element)?;
            let name = required(element, "name")?;
            if self.domain.entities.contains(name) {
                return Err(SchemaError::DuplicateName {
                    kind: "entity",
                    name: name.to_string(),
                    domain: domain_name.to_string(),
                });
            }
            let mut values = BTreeSet::new();
            for value in element.children() {
                validate_attributes(value)?;
                validate_children(value)?;
                values.insert(required(value, "name")?.to_string());
            }
            unions.push(Union::new(name, domain_name, values));
        }
        // every member must resolve before any union is added
        for union in &unions {
            if let Some(missing) = union.values().iter().find(|v| !self.domain.entities.contains(v)) {
                return Err(SchemaError::UnresolvedReference(format!(
                    "entity \"{missing}\" required by union \"{}\" does not exist",
                    union.name()
                )));
            }
        }
        for union in unions {
            self.declare("union", union.domain(), union.name())?;
            let existing = self
                .domain
                .unions
                .iter_mut()
                .find(|u| same_name(u.name(), union.name()));
            match existing {
                Some(existing) if existing.domain() == union.domain() => *existing = union,
                Some(existing) => {
                    debug!(name = union.name(), from = existing.domain(), into = union.domain(), "union merged");
                    existing.merge(union);
                }
                None => self.domain.unions.push(union),
            }
        }
        Ok(())
    }

    // ------------- Axioms -------------
    fn parse_axioms(&mut self, section: &Element, domain_name: &str) -> Result<()> {
        validate_attributes(section)?;
        validate_children(section)?;
        for element in section.children() {
            validate_attributes(element)?;
            validate_children(element)?;
            let axiom = Axiom::new(
                required(element, "name")?,
                required(element, "formalism")?,
                required(element, "rule")?,
                domain_name,
            );
            self.declare("axiom", domain_name, axiom.name())?;
            let axioms = &mut self.domain.axioms;
            match axioms.iter().position(|a| same_name(a.name(), axiom.name())) {
                Some(at) => axioms[at] = axiom,
                None => axioms.push(axiom),
            }
        }
        Ok(())
    }

    fn declare(&mut self, kind: &'static str, domain: &str, name: &str) -> Result<()> {
        if self.declared.insert((kind, domain.to_string(), name_key(name))) {
            return Ok(());
        }
        Err(SchemaError::DuplicateName {
            kind,
            name: name.to_string(),
            domain: domain.to_string(),
        })
    }
}

fn read_value_tree(element: &Element, label: &str) -> Result<ValueTree> {
    let mut tree = ValueTree::new(label);
    for value in element.children_named("value") {
        validate_attributes(value)?;
        validate_children(value)?;
        let name = required(value, "name")?;
        let mut branch = read_value_tree(value, name)?;
        if !branch.is_leaf() {
            branch.push(ValueTree::new(format!("{} {name}", Attribute::OTHER)));
        }
        tree.push(branch);
    }
    Ok(tree)
}

fn describe_node(node: &mut Node, element: &Element, domain_name: &str) {
    node.set_domain(domain_name);
    node.set_description(element.attribute("description").unwrap_or_default());
    node.set_notes(element.attribute("notes").unwrap_or_default());
    node.set_abstract(flag(element, "abstract"));
}

fn canonical(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|e| SchemaError::ImportResolution {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn optional_section<'e>(sections: &'e [Element], cursor: &mut usize, name: &str) -> Option<&'e Element> {
    let section = sections.get(*cursor).filter(|s| s.name() == name)?;
    *cursor += 1;
    Some(section)
}

fn expect_section<'e>(
    sections: &'e [Element],
    cursor: &mut usize,
    name: &str,
    domain_name: &str,
) -> Result<&'e Element> {
    if let Some(section) = optional_section(sections, cursor, name) {
        return Ok(section);
    }
    let message = match sections.get(*cursor) {
        None => format!("missing mandatory <{name}> section in domain \"{domain_name}\""),
        Some(found) if SECTIONS.contains(&found.name()) => format!(
            "section <{}> on line {} is out of order in domain \"{domain_name}\", expected <{name}> (order: {})",
            found.name(),
            found.line(),
            SECTIONS.join(", ")
        ),
        Some(found) => format!(
            "unexpected tag <{}> on line {} in domain \"{domain_name}\", expected <{name}>",
            found.name(),
            found.line()
        ),
    };
    Err(SchemaError::SchemaStructure(message))
}

fn describe(element: &Element) -> String {
    match element.attribute("name") {
        Some(name) => format!("{} name=\"{name}\"", element.name()),
        None => element.name().to_string(),
    }
}

fn validate_children(element: &Element) -> Result<()> {
    let expected = VALID_CHILDREN.get(element.name()).copied().unwrap_or_default();
    match element.children().iter().find(|c| !expected.contains(&c.name())) {
        Some(child) => Err(SchemaError::InvalidTag {
            tag: child.name().to_string(),
            parent: describe(element),
            expected: expected.iter().map(|e| e.to_string()).collect(),
        }),
        None => Ok(()),
    }
}

fn validate_attributes(element: &Element) -> Result<()> {
    let expected = VALID_ATTRIBUTES.get(element.name()).copied().unwrap_or_default();
    check_attributes(element, expected)
}

fn check_attributes(element: &Element, expected: &[&str]) -> Result<()> {
    match element.attributes().iter().find(|(k, _)| !expected.contains(&k.as_str())) {
        Some((attribute, _)) => Err(SchemaError::InvalidAttribute {
            attribute: attribute.clone(),
            tag: describe(element),
            expected: expected.iter().map(|e| e.to_string()).collect(),
        }),
        None => Ok(()),
    }
}

fn required<'e>(element: &'e Element, attribute: &str) -> Result<&'e str> {
    element
        .attribute(attribute)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| SchemaError::MissingAttribute {
            attribute: attribute.to_string(),
            tag: describe(element),
        })
}

// flags hold only for the literal "true"
fn flag(element: &Element, attribute: &str) -> bool {
    element.attribute(attribute) == Some("true")
}
