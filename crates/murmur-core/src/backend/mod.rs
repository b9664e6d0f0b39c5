//! Backend data API boundary.
//!
//! Relations are addressed by name and filtered by column; the concrete
//! transport is Supabase's PostgREST endpoint in production and an
//! in-process table store in tests.

mod memory;
mod postgrest;

use std::fmt;
use std::future::Future;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub use memory::{DataCall, MemoryDataApi};
pub use postgrest::PostgrestDataApi;

/// Failure talking to the backend. `Api` carries the server's message as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("{message}")]
    Api { status: Option<u16>, message: String },
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// A relation whose rows are `(actor, target)` pairs, e.g. `likes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeRelation {
    pub table: &'static str,
    pub actor_column: &'static str,
    pub target_column: &'static str,
}

impl EdgeRelation {
    pub const LIKES: Self = Self::new("likes", "user_id", "post_id");
    pub const SAVES: Self = Self::new("saves", "user_id", "post_id");
    pub const SHARES: Self = Self::new("shares", "user_id", "post_id");
    pub const FOLLOWS: Self = Self::new("follows", "follower_id", "following_id");
    pub const BLOCKS: Self = Self::new("user_blocks", "blocker_id", "blocked_id");

    pub const fn new(
        table: &'static str,
        actor_column: &'static str,
        target_column: &'static str,
    ) -> Self {
        Self {
            table,
            actor_column,
            target_column,
        }
    }

    /// Row payload inserted for a new edge
    pub fn row(&self, actor_id: &str, target_id: &str) -> Value {
        let mut row = serde_json::Map::new();
        row.insert(self.actor_column.to_string(), Value::from(actor_id));
        row.insert(self.target_column.to_string(), Value::from(target_id));
        Value::Object(row)
    }

    /// Filters selecting the edge between `actor_id` and `target_id`
    pub fn pair_filters(&self, actor_id: &str, target_id: &str) -> Vec<Filter> {
        vec![
            Filter::eq(self.actor_column, actor_id),
            Filter::eq(self.target_column, target_id),
        ]
    }
}

impl fmt::Display for EdgeRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    Eq(String),
    In(Vec<String>),
}

/// One column predicate of a [`SelectQuery`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq(value.into()),
        }
    }

    pub fn in_list<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            column: column.into(),
            op: FilterOp::In(values.into_iter().map(Into::into).collect()),
        }
    }

    /// PostgREST operator syntax, e.g. `eq.abc` or `in.("a","b")`
    pub fn to_postgrest(&self) -> String {
        match &self.op {
            FilterOp::Eq(value) => format!("eq.{value}"),
            FilterOp::In(values) => {
                let quoted = values
                    .iter()
                    .map(|value| quote_postgrest(value))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("in.({quoted})")
            }
        }
    }

    /// Evaluate against a JSON row, comparing values as text
    pub fn matches(&self, row: &Value) -> bool {
        let Some(actual) = row.get(&self.column).and_then(value_as_text) else {
            return false;
        };
        match &self.op {
            FilterOp::Eq(expected) => &actual == expected,
            FilterOp::In(values) => values.contains(&actual),
        }
    }
}

/// Keyset bound for descending pagination on `(column, tiebreak)`.
///
/// Selects rows strictly after the last row of a page ordered by
/// `column desc, tiebreak desc`, so rows sharing `value` are not skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysetBound {
    pub column: String,
    pub value: String,
    pub tiebreak_column: String,
    pub tiebreak_value: String,
}

impl KeysetBound {
    pub fn new(
        column: impl Into<String>,
        value: impl Into<String>,
        tiebreak_column: impl Into<String>,
        tiebreak_value: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            tiebreak_column: tiebreak_column.into(),
            tiebreak_value: tiebreak_value.into(),
        }
    }

    /// PostgREST `or` filter value:
    /// `(c.lt."v",and(c.eq."v",t.lt."tv"))`
    pub fn to_postgrest(&self) -> String {
        let value = quote_postgrest(&self.value);
        let tiebreak = quote_postgrest(&self.tiebreak_value);
        format!(
            "({column}.lt.{value},and({column}.eq.{value},{tie}.lt.{tiebreak}))",
            column = self.column,
            tie = self.tiebreak_column,
        )
    }

    pub fn matches(&self, row: &Value) -> bool {
        let (Some(primary), Some(tiebreak)) = (
            row.get(&self.column).and_then(value_as_text),
            row.get(&self.tiebreak_column).and_then(value_as_text),
        ) else {
            return false;
        };
        primary < self.value || (primary == self.value && tiebreak < self.tiebreak_value)
    }
}

fn quote_postgrest(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Row text used for filtering and ordering
pub(crate) fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Filtered read of a relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub before: Option<KeysetBound>,
    /// Sort keys, most significant first
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            before: None,
            order: Vec::new(),
            limit: None,
        }
    }

    #[must_use]
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn before(mut self, bound: KeysetBound) -> Self {
        self.before = Some(bound);
        self
    }

    /// Append a descending sort key; earlier calls take precedence
    #[must_use]
    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order.push(Order {
            column: column.into(),
            descending: true,
        });
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Point reads and writes against named relations.
///
/// Methods return `Send` futures so callers may spawn them on a
/// multi-threaded runtime.
pub trait DataApi: Send + Sync {
    /// The edge row between `actor_id` and `target_id`, if one exists
    fn find_edge(
        &self,
        relation: &EdgeRelation,
        actor_id: &str,
        target_id: &str,
    ) -> impl Future<Output = RemoteResult<Option<Value>>> + Send;

    fn insert_edge(
        &self,
        relation: &EdgeRelation,
        actor_id: &str,
        target_id: &str,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Delete every edge row between the pair
    fn delete_edge(
        &self,
        relation: &EdgeRelation,
        actor_id: &str,
        target_id: &str,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    fn select(&self, query: &SelectQuery) -> impl Future<Output = RemoteResult<Vec<Value>>> + Send;
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

/// Render a Supabase error body (auth or PostgREST shape) with its status
pub(crate) fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", crate::util::compact_text(trimmed), status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_api_error_prefers_message_fields() {
        let body = r#"{"code":"23505","message":"duplicate key value","details":null}"#;
        assert_eq!(
            parse_api_error(StatusCode::CONFLICT, body),
            "duplicate key value (409)"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, r#"{"error_description":"bad grant"}"#),
            "bad grant (400)"
        );
    }

    #[test]
    fn parse_api_error_falls_back_to_body_or_status() {
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
    }

    #[test]
    fn filter_renders_postgrest_syntax() {
        assert_eq!(Filter::eq("user_id", "u1").to_postgrest(), "eq.u1");
        assert_eq!(
            Filter::in_list("post_id", ["p1", "p\"2"]).to_postgrest(),
            r#"in.("p1","p\"2")"#
        );
    }

    #[test]
    fn keyset_bound_renders_or_filter() {
        let bound = KeysetBound::new("created_at", "2024-01-01T00:00:00.5+00:00", "id", "p2");
        assert_eq!(
            bound.to_postgrest(),
            r#"(created_at.lt."2024-01-01T00:00:00.5+00:00",and(created_at.eq."2024-01-01T00:00:00.5+00:00",id.lt."p2"))"#
        );
    }

    #[test]
    fn keyset_bound_breaks_ties_on_second_column() {
        let bound = KeysetBound::new("created_at", "2024-01-02", "id", "p2");
        assert!(bound.matches(&json!({ "created_at": "2024-01-01", "id": "p9" })));
        assert!(bound.matches(&json!({ "created_at": "2024-01-02", "id": "p1" })));
        assert!(!bound.matches(&json!({ "created_at": "2024-01-02", "id": "p2" })));
        assert!(!bound.matches(&json!({ "created_at": "2024-01-02", "id": "p3" })));
        assert!(!bound.matches(&json!({ "created_at": "2024-01-03", "id": "p0" })));
        assert!(!bound.matches(&json!({ "created_at": "2024-01-01" })));
    }

    #[test]
    fn filter_matches_json_rows() {
        let row = json!({ "user_id": "u1", "count": 3 });
        assert!(Filter::eq("user_id", "u1").matches(&row));
        assert!(Filter::eq("count", "3").matches(&row));
        assert!(Filter::in_list("user_id", ["u0", "u1"]).matches(&row));
        assert!(!Filter::eq("missing", "x").matches(&row));
    }

    #[test]
    fn edge_relation_builds_rows() {
        assert_eq!(
            EdgeRelation::FOLLOWS.row("a", "b"),
            json!({ "follower_id": "a", "following_id": "b" })
        );
    }
}
