//! Import of MySQL-style `CREATE TABLE` dumps into a [`SchemaDocument`].
//!
//! Only the parts needed for visualization are read: column names and their
//! declared types, primary keys (inline or table-level) and foreign keys.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use super::schema::{Field, ForeignKey, Relationship, SchemaDocument, Table};

// Header only; the body is found by scanning for the matching paren.
static TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?`?([A-Za-z0-9_$]+)`?\s*\(").expect("table pattern")
});
static COLUMN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^`?([^`\s]+)`?\s+(.+)$").expect("column pattern"));
static FK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)FOREIGN\s+KEY\s*\(\s*`?([^`)]+)`?\s*\)\s*REFERENCES\s+`?([^`(\s]+)`?\s*\(\s*`?([^`)]+)`?\s*\)")
        .expect("foreign key pattern")
});
static PK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:CONSTRAINT\s+(?:`[^`]*`|\S+)\s+)?PRIMARY\s+KEY\s*\((.*)\)").expect("primary key pattern")
});

pub fn import_sql_file(path: &Path) -> Result<SchemaDocument> {
    let sql = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(import_sql(&sql))
}

pub fn import_sql(sql: &str) -> SchemaDocument {
    let mut doc = SchemaDocument::new();
    let mut pos = 0usize;
    while let Some(caps) = TABLE_RE.captures_at(sql, pos) {
        let table_name = caps[1].to_string();
        let open_end = caps.get(0).map_or(sql.len(), |m| m.end());
        let Some(close) = closing_paren(&sql[open_end..]) else {
            log::warn!("table {} has no closing parenthesis, stopping import", table_name);
            break;
        };
        let body = &sql[open_end..open_end + close];
        pos = open_end + close + 1;
        let mut table = Table::default();
        let mut table_pks: Vec<String> = Vec::new();

        for def in split_top_level(body) {
            let upper = def.to_uppercase();
            if is_column_definition(&upper) {
                if let Some(col) = COLUMN_RE.captures(def) {
                    let ty = col[2].trim().to_string();
                    let ty_upper = ty.to_uppercase();
                    let is_primary = ty_upper.contains("PRIMARY KEY") || ty_upper.contains("AUTO_INCREMENT");
                    table.fields.push(Field { name: col[1].to_string(), ty, is_primary });
                }
            } else if upper.contains("FOREIGN KEY") {
                if let Some(fk) = FK_RE.captures(def) {
                    let fk = ForeignKey {
                        field: fk[1].trim().to_string(),
                        references_table: fk[2].trim().to_string(),
                        references_field: fk[3].trim().to_string(),
                    };
                    doc.relationships.push(Relationship {
                        from_table: table_name.clone(),
                        from_field: fk.field.clone(),
                        to_table: fk.references_table.clone(),
                        to_field: fk.references_field.clone(),
                    });
                    table.foreign_keys.push(fk);
                }
            } else if let Some(pk) = PK_RE.captures(def) {
                table_pks.extend(pk[1].split(',').map(|c| c.trim().trim_matches('`').to_string()));
            }
        }

        for f in table.fields.iter_mut() {
            if table_pks.iter().any(|pk| pk == &f.name) {
                f.is_primary = true;
            }
        }
        log::debug!("imported table {} ({} fields)", table_name, table.fields.len());
        doc.tables.insert(table_name, table);
    }
    doc
}

const CONSTRAINT_KEYWORDS: [&str; 9] =
    ["PRIMARY", "FOREIGN", "CONSTRAINT", "KEY", "INDEX", "UNIQUE", "FULLTEXT", "SPATIAL", "CHECK"];

fn is_column_definition(upper: &str) -> bool {
    if upper.starts_with('`') {
        return true;
    }
    let first = upper.split_whitespace().next().unwrap_or("");
    let word = first.split('(').next().unwrap_or("");
    !word.is_empty() && !CONSTRAINT_KEYWORDS.contains(&word)
}

// Yields each char with the paren depth it sits at, skipping anything
// inside quotes or backticks.
fn unquoted(text: &str) -> impl Iterator<Item = (usize, char, i32)> + '_ {
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    text.char_indices().filter_map(move |(i, ch)| {
        match (in_quote, ch) {
            (Some(q), c) if c == q => in_quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') | (None, '`') => in_quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                return Some((i, ch, depth + 1));
            }
            (None, c) => return Some((i, c, depth)),
        }
        None
    })
}

// Offset of the paren closing a body whose opening paren was already consumed.
fn closing_paren(rest: &str) -> Option<usize> {
    unquoted(rest).find(|&(_, ch, depth)| ch == ')' && depth == 0).map(|(i, _, _)| i)
}

// Split a column list on commas that are not nested inside parentheses,
// so `DECIMAL(10,2)` stays one definition.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for (i, ch, depth) in unquoted(body) {
        if ch == ',' && depth == 0 {
            out.push(body[start..i].trim());
            start = i + 1;
        }
    }
    out.push(body[start..].trim());
    out.retain(|s| !s.is_empty());
    out
}
