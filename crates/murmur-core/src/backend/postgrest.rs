//! Supabase PostgREST transport for [`DataApi`].

use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use super::{
    parse_api_error, DataApi, EdgeRelation, Filter, RemoteError, RemoteResult, SelectQuery,
};
use crate::auth::AuthContext;
use crate::util::is_http_url;

/// Data API client bound to one Supabase project.
///
/// Requests carry the anon key as `apikey` and the signed-in user's access
/// token as bearer when the auth context has one, so row-level security
/// sees the real actor.
#[derive(Clone)]
pub struct PostgrestDataApi {
    rest_url: String,
    anon_key: String,
    client: Client,
    auth: Arc<dyn AuthContext>,
}

impl PostgrestDataApi {
    pub fn new(
        supabase_url: &str,
        anon_key: impl Into<String>,
        auth: Arc<dyn AuthContext>,
    ) -> RemoteResult<Self> {
        let rest_url = normalize_rest_url(supabase_url)?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(RemoteError::api("Supabase anon key must not be empty"));
        }
        Ok(Self {
            rest_url,
            anon_key,
            client: Client::builder().build()?,
            auth,
        })
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    fn request(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .auth
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| (filter.column.clone(), filter.to_postgrest()))
        .collect()
}

/// Keyset bound, ordering and limit of a select
fn select_params(query: &SelectQuery) -> Vec<(String, String)> {
    let mut params = Vec::new();
    if let Some(bound) = &query.before {
        params.push(("or".to_string(), bound.to_postgrest()));
    }
    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|order| {
                let direction = if order.descending { "desc" } else { "asc" };
                format!("{}.{direction}", order.column)
            })
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

async fn ensure_success(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Api {
        status: Some(status.as_u16()),
        message: parse_api_error(status, &body),
    })
}

impl DataApi for PostgrestDataApi {
    async fn find_edge(
        &self,
        relation: &EdgeRelation,
        actor_id: &str,
        target_id: &str,
    ) -> RemoteResult<Option<Value>> {
        let query = relation
            .pair_filters(actor_id, target_id)
            .into_iter()
            .fold(SelectQuery::new(relation.table), SelectQuery::filter)
            .limit(1);
        let rows = self.select(&query).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_edge(
        &self,
        relation: &EdgeRelation,
        actor_id: &str,
        target_id: &str,
    ) -> RemoteResult<()> {
        let response = self
            .request(self.client.post(self.table_url(relation.table)))
            .header("Prefer", "return=minimal")
            .json(&relation.row(actor_id, target_id))
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(table = relation.table, actor = actor_id, target = target_id, "Edge inserted");
        Ok(())
    }

    async fn delete_edge(
        &self,
        relation: &EdgeRelation,
        actor_id: &str,
        target_id: &str,
    ) -> RemoteResult<()> {
        let response = self
            .request(self.client.delete(self.table_url(relation.table)))
            .header("Prefer", "return=minimal")
            .query(&filter_params(&relation.pair_filters(actor_id, target_id)))
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(table = relation.table, actor = actor_id, target = target_id, "Edge deleted");
        Ok(())
    }

    async fn select(&self, query: &SelectQuery) -> RemoteResult<Vec<Value>> {
        let mut params = vec![("select".to_string(), query.columns.clone())];
        params.extend(filter_params(&query.filters));
        params.extend(select_params(query));

        let response = self
            .request(self.client.get(self.table_url(&query.table)))
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await?;
        let rows = ensure_success(response).await?.json::<Vec<Value>>().await?;
        Ok(rows)
    }
}

fn normalize_rest_url(url: &str) -> RemoteResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if !is_http_url(trimmed) {
        return Err(RemoteError::api(
            "Supabase URL must include http:// or https://",
        ));
    }
    if trimmed.ends_with("/rest/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/rest/v1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthContext;
    use crate::backend::KeysetBound;

    #[test]
    fn rest_url_is_derived_from_project_url() {
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/rest/v1").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
        assert!(normalize_rest_url("demo.supabase.co").is_err());
    }

    #[test]
    fn new_rejects_blank_anon_key() {
        let auth = Arc::new(StaticAuthContext::anonymous());
        assert!(PostgrestDataApi::new("https://demo.supabase.co", "  ", auth.clone()).is_err());
        let api = PostgrestDataApi::new("https://demo.supabase.co", "anon", auth).unwrap();
        assert_eq!(api.rest_url(), "https://demo.supabase.co/rest/v1");
    }

    #[test]
    fn keyset_page_params_order_by_both_columns() {
        let query = SelectQuery::new("posts")
            .order_desc("created_at")
            .order_desc("id")
            .before(KeysetBound::new("created_at", "2024-01-01T00:00:00Z", "id", "p2"))
            .limit(20);
        assert_eq!(
            select_params(&query),
            vec![
                (
                    "or".to_string(),
                    r#"(created_at.lt."2024-01-01T00:00:00Z",and(created_at.eq."2024-01-01T00:00:00Z",id.lt."p2"))"#
                        .to_string()
                ),
                ("order".to_string(), "created_at.desc,id.desc".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn filters_become_query_params() {
        let params = filter_params(&EdgeRelation::LIKES.pair_filters("u1", "p1"));
        assert_eq!(
            params,
            vec![
                ("user_id".to_string(), "eq.u1".to_string()),
                ("post_id".to_string(), "eq.p1".to_string()),
            ]
        );
    }
}
