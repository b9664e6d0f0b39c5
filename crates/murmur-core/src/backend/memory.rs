//! In-process [`DataApi`] holding relations as JSON rows.
//!
//! Each call yields to the scheduler first so concurrent callers interleave
//! the way they would across real network round trips.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use super::{value_as_text, DataApi, EdgeRelation, RemoteError, RemoteResult, SelectQuery};
use crate::util::lock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataCall {
    Find { table: String, target: String },
    Insert { table: String, target: String },
    Delete { table: String, target: String },
    Select { table: String },
}

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Value>>,
    failures: VecDeque<RemoteError>,
    calls: Vec<DataCall>,
}

#[derive(Default)]
pub struct MemoryDataApi {
    tables: Mutex<Tables>,
}

impl MemoryDataApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        lock(&self.tables)
            .rows
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn seed_edge(&self, relation: &EdgeRelation, actor_id: &str, target_id: &str) {
        self.seed(relation.table, [relation.row(actor_id, target_id)]);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        lock(&self.tables)
            .rows
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_edge(&self, relation: &EdgeRelation, actor_id: &str, target_id: &str) -> bool {
        let filters = relation.pair_filters(actor_id, target_id);
        self.rows(relation.table)
            .iter()
            .any(|row| filters.iter().all(|filter| filter.matches(row)))
    }

    /// Make the next call fail with `error` instead of touching the tables
    pub fn fail_next(&self, error: RemoteError) {
        lock(&self.tables).failures.push_back(error);
    }

    pub fn calls(&self) -> Vec<DataCall> {
        lock(&self.tables).calls.clone()
    }

    async fn enter(&self, call: DataCall) -> RemoteResult<()> {
        tokio::task::yield_now().await;
        let mut tables = lock(&self.tables);
        tables.calls.push(call);
        tables.failures.pop_front().map_or(Ok(()), Err)
    }
}

impl DataApi for MemoryDataApi {
    async fn find_edge(
        &self,
        relation: &EdgeRelation,
        actor_id: &str,
        target_id: &str,
    ) -> RemoteResult<Option<Value>> {
        self.enter(DataCall::Find {
            table: relation.table.to_string(),
            target: target_id.to_string(),
        })
        .await?;
        let filters = relation.pair_filters(actor_id, target_id);
        Ok(self
            .rows(relation.table)
            .into_iter()
            .find(|row| filters.iter().all(|filter| filter.matches(row))))
    }

    async fn insert_edge(
        &self,
        relation: &EdgeRelation,
        actor_id: &str,
        target_id: &str,
    ) -> RemoteResult<()> {
        self.enter(DataCall::Insert {
            table: relation.table.to_string(),
            target: target_id.to_string(),
        })
        .await?;
        self.seed_edge(relation, actor_id, target_id);
        Ok(())
    }

    async fn delete_edge(
        &self,
        relation: &EdgeRelation,
        actor_id: &str,
        target_id: &str,
    ) -> RemoteResult<()> {
        self.enter(DataCall::Delete {
            table: relation.table.to_string(),
            target: target_id.to_string(),
        })
        .await?;
        let filters = relation.pair_filters(actor_id, target_id);
        if let Some(rows) = lock(&self.tables).rows.get_mut(relation.table) {
            rows.retain(|row| !filters.iter().all(|filter| filter.matches(row)));
        }
        Ok(())
    }

    async fn select(&self, query: &SelectQuery) -> RemoteResult<Vec<Value>> {
        self.enter(DataCall::Select {
            table: query.table.clone(),
        })
        .await?;
        let mut rows = self
            .rows(&query.table)
            .into_iter()
            .filter(|row| query.filters.iter().all(|filter| filter.matches(row)))
            .filter(|row| query.before.as_ref().is_none_or(|bound| bound.matches(row)))
            .collect::<Vec<_>>();
        rows.sort_by(|left, right| {
            query
                .order
                .iter()
                .map(|order| {
                    let sort_key = |row: &Value| row.get(&order.column).and_then(value_as_text);
                    let ordering = sort_key(left).cmp(&sort_key(right));
                    if order.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}
