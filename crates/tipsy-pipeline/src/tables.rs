//! Logical table name to table id mapping.

use crate::error::{PipelineError, PipelineResult};
use tipsy_openflow::TableId;

/// Name of the table that counts dropped traffic.
pub const DROP_TABLE: &str = "drop";

/// Table layout of a pipeline, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRegistry {
    tables: Vec<(String, TableId)>,
}

impl TableRegistry {
    /// Builds a registry from explicit `(name, id)` pairs.
    ///
    /// ```
    /// use tipsy_openflow::TableId;
    /// use tipsy_pipeline::TableRegistry;
    ///
    /// let tables = TableRegistry::new([("ingress", 0), ("drop", 9)]);
    /// assert_eq!(tables.get("drop"), Some(TableId(9)));
    /// ```
    pub fn new<'a>(tables: impl IntoIterator<Item = (&'a str, u8)>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|(name, id)| (name.to_string(), TableId(id)))
                .collect(),
        }
    }

    /// Numbers the tables 0, 1, 2... in the given order.
    pub fn sequential<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            tables: names
                .into_iter()
                .enumerate()
                .map(|(i, name)| (name.to_string(), TableId(i as u8)))
                .collect(),
        }
    }

    /// Id of the table called `name`, if the pipeline has one.
    pub fn get(&self, name: &str) -> Option<TableId> {
        self.tables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    /// Like [`get`](Self::get), but a missing table is an
    /// [`UnknownTable`](PipelineError::UnknownTable) error.
    pub fn resolve(&self, name: &str) -> PipelineResult<TableId> {
        self.get(name)
            .ok_or_else(|| PipelineError::UnknownTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Tables in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, TableId)> {
        self.tables.iter().map(|(n, id)| (n.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sequential_ids_keep_order() {
        let tables = TableRegistry::sequential(["classify", "forward", DROP_TABLE]);
        let names: Vec<_> = tables.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["classify", "forward", "drop"]);
        assert_eq!(tables.get("drop"), Some(TableId(2)));
    }

    #[test]
    fn test_resolve_unknown() {
        let tables = TableRegistry::new([("forward", 0), ("drop", 9)]);
        assert_eq!(tables.resolve("drop").unwrap(), TableId(9));
        assert!(matches!(
            tables.resolve("egress"),
            Err(PipelineError::UnknownTable(name)) if name == "egress"
        ));
    }
}
