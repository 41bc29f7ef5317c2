use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type TableName = String;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub is_primary: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: impl Into<String>, is_primary: bool) -> Self {
        Self { name: name.into(), ty: ty.into(), is_primary }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub field: String,
    pub references_table: TableName,
    pub references_field: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: TableName,
    pub from_field: String,
    pub to_table: TableName,
    pub to_field: String,
}

impl Relationship {
    pub fn new(from_table: &str, from_field: &str, to_table: &str, to_field: &str) -> Self {
        Self {
            from_table: from_table.to_string(),
            from_field: from_field.to_string(),
            to_table: to_table.to_string(),
            to_field: to_field.to_string(),
        }
    }
}

/// The document served at `/api/schema`. Table order is the document order
/// and drives both scene construction and layout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub tables: IndexMap<TableName, Table>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub revision: u64,
}

/// A field that kept its row in the editor but changed its name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRename {
    pub from: String,
    pub to: String,
}

/// Body of `PUT /api/table/{name}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableUpdate {
    pub name: TableName,
    pub fields: Vec<Field>,
    pub base_revision: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub renames: Vec<FieldRename>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpdateError {
    #[error("table not found: {0}")]
    UnknownTable(String),
    #[error("schema changed since it was loaded (expected revision {expected}, found {found})")]
    RevisionConflict { expected: u64, found: u64 },
    #[error("a table named {0} already exists")]
    NameTaken(String),
    #[error("invalid table: {0}")]
    Invalid(String),
}

/// Checks a table definition before it is accepted as an update.
pub fn validate_table(name: &str, fields: &[Field]) -> Result<(), UpdateError> {
    if name.trim().is_empty() {
        return Err(UpdateError::Invalid("table name is empty".into()));
    }
    let mut seen = HashSet::new();
    for (idx, f) in fields.iter().enumerate() {
        let fname = f.name.trim();
        if fname.is_empty() {
            return Err(UpdateError::Invalid(format!("field #{} has no name", idx + 1)));
        }
        if !seen.insert(fname) {
            return Err(UpdateError::Invalid(format!("duplicate field name {}", fname)));
        }
    }
    Ok(())
}

impl SchemaDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn add_table(&mut self, name: impl Into<String>, fields: Vec<Field>) {
        self.tables.insert(name.into(), Table { fields, foreign_keys: Vec::new() });
    }

    pub fn add_relationship(&mut self, rel: Relationship) {
        self.relationships.push(rel);
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> { self.tables.get(name) }
    pub fn table_names(&self) -> impl Iterator<Item = &str> { self.tables.keys().map(String::as_str) }
    pub fn table_count(&self) -> usize { self.tables.len() }
    pub fn relationship_count(&self) -> usize { self.relationships.len() }

    // Relationships touching a table, in document order
    pub fn relationships_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.relationships
            .iter()
            .filter(move |r| r.from_table == table || r.to_table == table)
    }

    /// Applies an edit to `original`. Renames keep the table's position in
    /// the document and rewrite relationship endpoints and foreign keys that
    /// pointed at the table or at a renamed field. A rename whose old name
    /// was not a field, or whose new name is not in the update, is ignored.
    pub fn apply_update(&mut self, original: &str, update: TableUpdate) -> Result<&Table, UpdateError> {
        if update.base_revision != self.revision {
            return Err(UpdateError::RevisionConflict { expected: update.base_revision, found: self.revision });
        }
        let Some(index) = self.tables.get_index_of(original) else {
            return Err(UpdateError::UnknownTable(original.to_string()));
        };
        let new_name = update.name.trim().to_string();
        validate_table(&new_name, &update.fields)?;
        if new_name != original && self.tables.contains_key(&new_name) {
            return Err(UpdateError::NameTaken(new_name));
        }

        let fields: Vec<Field> = update
            .fields
            .into_iter()
            .map(|f| Field { name: f.name.trim().to_string(), ty: f.ty.trim().to_string(), is_primary: f.is_primary })
            .collect();

        let mut table = match self.tables.shift_remove(original) {
            Some(t) => t,
            None => return Err(UpdateError::UnknownTable(original.to_string())),
        };
        let renamed: HashMap<String, String> = update
            .renames
            .into_iter()
            .map(|r| (r.from.trim().to_string(), r.to.trim().to_string()))
            .filter(|(from, to)| {
                from != to
                    && table.fields.iter().any(|f| &f.name == from)
                    && fields.iter().any(|f| &f.name == to)
            })
            .collect();
        table.fields = fields;
        self.tables.shift_insert(index, new_name.clone(), table);

        if new_name != original {
            for rel in self.relationships.iter_mut() {
                if rel.from_table == original { rel.from_table = new_name.clone(); }
                if rel.to_table == original { rel.to_table = new_name.clone(); }
            }
            for t in self.tables.values_mut() {
                for fk in t.foreign_keys.iter_mut() {
                    if fk.references_table == original { fk.references_table = new_name.clone(); }
                }
            }
        }
        if !renamed.is_empty() {
            self.rename_field_refs(&new_name, &renamed);
        }
        self.revision += 1;
        self.tables
            .get(&new_name)
            .ok_or(UpdateError::UnknownTable(new_name))
    }

    // `table` is already under its new name here
    fn rename_field_refs(&mut self, table: &str, renamed: &HashMap<String, String>) {
        for rel in self.relationships.iter_mut() {
            if rel.from_table == table {
                if let Some(to) = renamed.get(&rel.from_field) { rel.from_field = to.clone(); }
            }
            if rel.to_table == table {
                if let Some(to) = renamed.get(&rel.to_field) { rel.to_field = to.clone(); }
            }
        }
        for (name, t) in self.tables.iter_mut() {
            for fk in t.foreign_keys.iter_mut() {
                if name.as_str() == table {
                    if let Some(to) = renamed.get(&fk.field) { fk.field = to.clone(); }
                }
                if fk.references_table == table {
                    if let Some(to) = renamed.get(&fk.references_field) { fk.references_field = to.clone(); }
                }
            }
        }
    }
}
