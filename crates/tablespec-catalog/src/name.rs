use std::fmt;

use crate::error::{CatalogError, CatalogResult};
use crate::utils::quote_name_if_needed;

/// A table name with up to three parts: `catalog.database.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub catalog: Option<String>,
    pub database: Option<String>,
    pub table: String,
}

impl TableName {
    /// Parses a dotted name. Parts may be quoted with backticks.
    pub fn parse(name: &str) -> CatalogResult<Self> {
        let mut parts = split_name_parts(name)?;
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(CatalogError::invalid(format!(
                "table name '{name}' has an empty part"
            )));
        }
        let table = parts.pop().unwrap_or_default();
        let database = parts.pop();
        let catalog = parts.pop();
        if !parts.is_empty() {
            return Err(CatalogError::invalid(format!(
                "table name '{name}' has more than three parts"
            )));
        }
        Ok(Self {
            catalog,
            database,
            table,
        })
    }

    pub fn parts(&self) -> Vec<&str> {
        self.catalog
            .iter()
            .chain(self.database.iter())
            .chain(std::iter::once(&self.table))
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted = self
            .parts()
            .into_iter()
            .map(quote_name_if_needed)
            .collect::<Vec<_>>();
        write!(f, "{}", quoted.join("."))
    }
}

fn split_name_parts(name: &str) -> CatalogResult<Vec<String>> {
    let mut parts = vec![];
    let mut current = String::new();
    let mut chars = name.chars().peekable();
    let mut quoted = false;
    while let Some(c) = chars.next() {
        match c {
            '`' if quoted && chars.peek() == Some(&'`') => {
                chars.next();
                current.push('`');
            }
            '`' => quoted = !quoted,
            '.' if !quoted => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    if quoted {
        return Err(CatalogError::invalid(format!(
            "table name '{name}' has an unterminated quote"
        )));
    }
    parts.push(current);
    Ok(parts)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table_name() {
        let name = TableName::parse("main.sales.orders").unwrap();
        assert_eq!(name.catalog.as_deref(), Some("main"));
        assert_eq!(name.database.as_deref(), Some("sales"));
        assert_eq!(name.table, "orders");

        let name = TableName::parse("orders").unwrap();
        assert_eq!(name.database, None);
        assert_eq!(name.to_string(), "orders");

        let name = TableName::parse("sales.`order lines`").unwrap();
        assert_eq!(name.table, "order lines");
        assert_eq!(name.to_string(), "sales.`order lines`");
    }

    #[test]
    fn test_parse_invalid_table_name() {
        assert!(TableName::parse("a.b.c.d").is_err());
        assert!(TableName::parse("sales..orders").is_err());
        assert!(TableName::parse("").is_err());
        assert!(TableName::parse("sales.`orders").is_err());
    }
}
