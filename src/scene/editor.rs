use crate::schema_utils::schema::{validate_table, Field, FieldRename, Table, TableUpdate, UpdateError};

// Shown as placeholder text in a freshly added row
pub const NEW_FIELD_TYPE_HINT: &str = "VARCHAR(255)";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldDraft {
    pub name: String,
    pub ty: String,
    pub is_primary: bool,
    // Name the row had when the editor opened; None for added rows
    pub original: Option<String>,
}

/// Editable copy of one table, backing the edit window. Changes stay local
/// until [`TableDraft::to_update`] is sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableDraft {
    pub original_name: String,
    pub name: String,
    pub rows: Vec<FieldDraft>,
    pub base_revision: u64,
    pub status: Option<String>,
    pub saving: bool,
}

impl TableDraft {
    pub fn from_table(name: &str, table: &Table, base_revision: u64) -> Self {
        let rows = table
            .fields
            .iter()
            .map(|f| FieldDraft {
                name: f.name.clone(),
                ty: f.ty.clone(),
                is_primary: f.is_primary,
                original: Some(f.name.clone()),
            })
            .collect();
        Self {
            original_name: name.to_string(),
            name: name.to_string(),
            rows,
            base_revision,
            status: None,
            saving: false,
        }
    }

    pub fn add_field(&mut self) {
        self.rows.push(FieldDraft::default());
    }

    pub fn remove_field(&mut self, index: usize) -> bool {
        if index < self.rows.len() {
            self.rows.remove(index);
            true
        } else {
            false
        }
    }

    pub fn to_update(&self) -> Result<TableUpdate, UpdateError> {
        let fields: Vec<Field> = self
            .rows
            .iter()
            .map(|r| Field {
                name: r.name.trim().to_string(),
                ty: if r.ty.trim().is_empty() { NEW_FIELD_TYPE_HINT.to_string() } else { r.ty.trim().to_string() },
                is_primary: r.is_primary,
            })
            .collect();
        let name = self.name.trim().to_string();
        validate_table(&name, &fields)?;
        let renames = self
            .rows
            .iter()
            .zip(&fields)
            .filter_map(|(row, field)| match &row.original {
                Some(from) if *from != field.name => Some(FieldRename { from: from.clone(), to: field.name.clone() }),
                _ => None,
            })
            .collect();
        Ok(TableUpdate { name, fields, base_revision: self.base_revision, renames })
    }
}
