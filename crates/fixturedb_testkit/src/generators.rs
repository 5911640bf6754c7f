//! Property-based test generators using proptest.
//!
//! The main strategy produces random acyclic foreign key graphs in a random
//! metamodel order, for checking that clearing never depends on the order
//! types are declared in.

use crate::scripted::ScriptedUnit;
use fixturedb_provider::{Column, EntityType, TypeKind};
use proptest::prelude::*;

/// A random table graph.
///
/// Table `i` may only reference tables with a smaller index, so the graph is
/// always acyclic. `order` is the metamodel declaration order.
#[derive(Debug, Clone)]
pub struct TableGraph {
    /// Table names, `T0`, `T1`, ...
    pub names: Vec<String>,
    /// `(child, parent)` index pairs.
    pub edges: Vec<(usize, usize)>,
    /// Declaration order, a permutation of table indexes.
    pub order: Vec<usize>,
    /// Rows per table.
    pub rows: Vec<u64>,
}

impl TableGraph {
    /// Number of tables.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if there are no tables.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Longest reference chain, counted in tables.
    pub fn depth(&self) -> usize {
        let mut depth = vec![1usize; self.len()];
        // Parents have smaller indexes, so one ascending sweep suffices.
        for child in 0..self.len() {
            for &(c, parent) in &self.edges {
                if c == child {
                    depth[child] = depth[child].max(depth[parent] + 1);
                }
            }
        }
        depth.into_iter().max().unwrap_or(0)
    }

    fn parents(&self, child: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .filter(move |(c, _)| *c == child)
            .map(|(_, p)| *p)
    }

    /// The graph as a scripted unit, tables declared in `order`.
    pub fn scripted_unit(&self) -> ScriptedUnit {
        let unit = self
            .order
            .iter()
            .fold(ScriptedUnit::new(), |unit, &i| unit.table(&self.names[i]));
        self.edges.iter().fold(unit, |unit, &(child, parent)| {
            unit.references(&self.names[child], &self.names[parent])
        })
    }

    /// Entity types in `order`, one `<parent>_id` column per reference.
    pub fn entity_types(&self) -> Vec<EntityType> {
        self.order
            .iter()
            .map(|&i| {
                self.parents(i).fold(
                    EntityType::with_type_name(self.names[i].as_str(), TypeKind::Entity)
                        .column(Column::id("id")),
                    |ty, p| {
                        ty.column(
                            Column::integer(format!("{}_id", self.names[p]))
                                .required()
                                .references(self.names[p].as_str()),
                        )
                    },
                )
            })
            .collect()
    }

    /// Inserts populating every table, parents first. Every child row
    /// references row 1 of each parent, so parents get at least one row
    /// when they have children.
    pub fn insert_statements(&self) -> Vec<String> {
        let mut statements = Vec::new();
        for (i, (_, rows)) in self.seed_rows().into_iter().enumerate() {
            let parents: Vec<usize> = self.parents(i).collect();
            for id in 1..=rows {
                let mut columns = vec!["\"id\"".to_string()];
                let mut values = vec![id.to_string()];
                for &p in &parents {
                    columns.push(format!("\"{}_id\"", self.names[p]));
                    values.push("1".to_string());
                }
                statements.push(format!(
                    "INSERT INTO \"{}\" ({}) VALUES ({})",
                    self.names[i],
                    columns.join(", "),
                    values.join(", ")
                ));
            }
        }
        statements
    }

    /// Rows per table for seeding a scripted store, parents non-empty
    /// whenever they have children.
    pub fn seed_rows(&self) -> Vec<(String, u64)> {
        (0..self.len())
            .map(|i| {
                let has_children = self.edges.iter().any(|&(_, p)| p == i);
                let rows = if has_children {
                    self.rows[i].max(1)
                } else {
                    self.rows[i]
                };
                (self.names[i].clone(), rows)
            })
            .collect()
    }
}

/// Strategy for acyclic table graphs with 1 to `max_tables` tables.
pub fn table_graph_strategy(max_tables: usize) -> impl Strategy<Value = TableGraph> {
    (1..=max_tables.max(1))
        .prop_flat_map(|n| {
            let pairs: Vec<(usize, usize)> = (0..n)
                .flat_map(|child| (0..child).map(move |parent| (child, parent)))
                .collect();
            let picks = prop::collection::vec(any::<bool>(), pairs.len());
            let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
            let rows = prop::collection::vec(0u64..4, n);
            (Just(n), Just(pairs), picks, order, rows)
        })
        .prop_map(|(n, pairs, picks, order, rows)| TableGraph {
            names: (0..n).map(|i| format!("T{i}")).collect(),
            edges: pairs
                .into_iter()
                .zip(picks)
                .filter_map(|(pair, keep)| keep.then_some(pair))
                .collect(),
            order,
            rows,
        })
}

/// A chain `T0 <- T1 <- ... <- Tn-1` declared parents first, one row each,
/// the worst case for clearing.
pub fn reversed_chain(len: usize) -> TableGraph {
    TableGraph {
        names: (0..len).map(|i| format!("T{i}")).collect(),
        edges: (1..len).map(|i| (i, i - 1)).collect(),
        order: (0..len).collect(),
        rows: vec![1; len],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn graphs_are_acyclic(graph in table_graph_strategy(8)) {
            for &(child, parent) in &graph.edges {
                prop_assert!(parent < child);
            }
            let mut order = graph.order.clone();
            order.sort_unstable();
            prop_assert_eq!(order, (0..graph.len()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn chain_depth() {
        assert_eq!(reversed_chain(5).depth(), 5);
        assert_eq!(reversed_chain(1).depth(), 1);
    }

    #[test]
    fn inserts_reference_parents() {
        let statements = reversed_chain(2).insert_statements();
        assert_eq!(
            statements,
            vec![
                "INSERT INTO \"T0\" (\"id\") VALUES (1)",
                "INSERT INTO \"T1\" (\"id\", \"T0_id\") VALUES (1, 1)",
            ]
        );
    }
}
