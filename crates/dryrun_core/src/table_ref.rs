//! Fully-qualified warehouse table references.

use serde::{Deserialize, Serialize};

/// A `database.schema.name` reference to a warehouse relation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    /// Project / database
    pub database: String,
    /// Dataset / schema
    pub schema: String,
    /// Table or view name
    pub name: String,
}

impl TableRef {
    /// Create a new reference
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// The three identifier parts in order
    #[must_use]
    pub fn parts(&self) -> [&str; 3] {
        [&self.database, &self.schema, &self.name]
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}`.`{}`.`{}`", self.database, self.schema, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_each_part() {
        let table_ref = TableRef::new("proj", "ds", "tbl");
        assert_eq!(table_ref.to_string(), "`proj`.`ds`.`tbl`");
    }

    #[test]
    fn test_parts() {
        let table_ref = TableRef::new("a", "b", "c");
        assert_eq!(table_ref.parts(), ["a", "b", "c"]);
    }
}
