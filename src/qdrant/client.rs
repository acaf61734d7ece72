//! HTTP client wrapper for interacting with Qdrant.

use crate::qdrant::{
    payload::{CONTENT_FIELD, build_point, chunk_from_payload, current_timestamp_rfc3339},
    types::QueryResponse,
};
use crate::store::{ChunkRecord, IndexStore, ScoredChunk, SearchMode, SearchQuery, StoreError};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Lightweight HTTP client for Qdrant collections, one collection per index.
pub struct QdrantStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) hybrid: bool,
}

impl QdrantStore {
    /// Construct a client for the given base URL.
    pub fn new(
        client: Client,
        url: &str,
        api_key: Option<String>,
        hybrid: bool,
    ) -> Result<Self, StoreError> {
        let base_url = normalize_base_url(url).map_err(StoreError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            hybrid,
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            hybrid,
        })
    }

    /// Ensure the full-text payload index backing keyword matching exists.
    pub async fn ensure_text_index(&self, collection_name: &str) -> Result<(), StoreError> {
        let body = json!({
            "field_name": CONTENT_FIELD,
            "field_schema": {
                "type": "text",
                "tokenizer": "word",
                "lowercase": true
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}/index"))?
            .query(&[("wait", true)])
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            tracing::debug!(collection = collection_name, "Text index ensured");
            Ok(())
        } else if response.status() == StatusCode::CONFLICT {
            tracing::debug!(collection = collection_name, "Text index already exists");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::UnexpectedStatus { status, body })
        }
    }

    fn search_body(&self, query: &SearchQuery) -> Value {
        let terms = keyword_terms(&query.text);
        if query.mode == SearchMode::Hybrid && self.hybrid && !terms.is_empty() {
            let prefetch_limit = (query.limit * 4).max(20);
            // Full-text match needs every word of its value present; one condition per term.
            let conditions: Vec<Value> = terms
                .iter()
                .map(|term| json!({ "key": CONTENT_FIELD, "match": { "text": term } }))
                .collect();
            json!({
                "prefetch": [
                    {
                        "query": query.vector,
                        "limit": prefetch_limit
                    },
                    {
                        "query": query.vector,
                        "filter": { "should": conditions },
                        "limit": prefetch_limit
                    }
                ],
                "query": { "fusion": "rrf" },
                "limit": query.limit,
                "with_payload": true
            })
        } else {
            json!({
                "query": query.vector,
                "limit": query.limit,
                "with_payload": true
            })
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, StoreError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl IndexStore for QdrantStore {
    async fn create_index(&self, name: &str, dimension: usize) -> Result<(), StoreError> {
        if self.index_exists(name).await? {
            tracing::warn!(collection = name, "Replacing existing collection");
            self.delete_index(name).await?;
        }

        let body = json!({
            "vectors": {
                "size": dimension,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{name}"))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = name, dimension, "Collection created");
        })
        .await?;

        if self.hybrid
            && let Err(error) = self.ensure_text_index(name).await
        {
            tracing::warn!(collection = name, error = %error, "Failed to create text index; keyword matching will be unindexed");
        }

        Ok(())
    }

    async fn index_exists(&self, name: &str) -> Result<bool, StoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{name}"))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::error!(collection = name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn upsert(&self, name: &str, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let now = current_timestamp_rfc3339();
        let points: Vec<Value> = records
            .into_iter()
            .map(|record| build_point(record, &now))
            .collect();
        let point_count = points.len();

        let response = self
            .request(Method::PUT, &format!("collections/{name}/points"))?
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(name.to_string()));
        }

        self.ensure_success(response, || {
            tracing::debug!(collection = name, points = point_count, "Points indexed");
        })
        .await
    }

    async fn search(&self, name: &str, query: &SearchQuery) -> Result<Vec<ScoredChunk>, StoreError> {
        let body = self.search_body(query);

        let response = self
            .request(Method::POST, &format!("collections/{name}/points/query"))?
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(name.to_string()));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(collection = name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let results = payload
            .result
            .into_points()
            .into_iter()
            .filter_map(|point| {
                let chunk = point.payload.as_ref().and_then(chunk_from_payload);
                if chunk.is_none() {
                    tracing::warn!(collection = name, id = %point.id, "Skipping point without content payload");
                }
                chunk.map(|chunk| ScoredChunk {
                    chunk,
                    score: point.score,
                })
            })
            .collect();

        Ok(results)
    }

    async fn delete_index(&self, name: &str) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{name}"))?
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(collection = name, "Collection already absent");
            return Ok(());
        }

        self.ensure_success(response, || {
            tracing::debug!(collection = name, "Collection deleted");
        })
        .await
    }

    fn supports_hybrid(&self) -> bool {
        self.hybrid
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Lowercased, de-duplicated words of `text` in first-seen order.
fn keyword_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        let word = word.to_lowercase();
        if !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::Chunk;
    use httpmock::{
        Method::{DELETE, GET, POST, PUT},
        MockServer,
    };
    use std::collections::BTreeMap;

    fn store(server: &MockServer, hybrid: bool) -> QdrantStore {
        QdrantStore::new(
            Client::builder()
                .user_agent("docrag-test")
                .build()
                .expect("client"),
            &server.base_url(),
            Some("qdrant-key".into()),
            hybrid,
        )
        .expect("store")
    }

    fn query(mode: SearchMode) -> SearchQuery {
        SearchQuery {
            text: "solar panels".into(),
            vector: vec![0.1, 0.2],
            limit: 4,
            mode,
        }
    }

    #[test]
    fn invalid_url_is_rejected() {
        let error = QdrantStore::new(Client::new(), "not a url", None, false)
            .err()
            .expect("invalid url");
        assert!(matches!(error, StoreError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn hybrid_search_fuses_dense_and_keyword_prefetches() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/brave-falcon/points/query")
                    .header("api-key", "qdrant-key")
                    .json_body_partial(
                        r#"{
                            "query": { "fusion": "rrf" },
                            "limit": 4,
                            "prefetch": [
                                { "limit": 20 },
                                {
                                    "limit": 20,
                                    "filter": { "should": [
                                        { "key": "content", "match": { "text": "solar" } },
                                        { "key": "content", "match": { "text": "panels" } }
                                    ] }
                                }
                            ]
                        }"#,
                    );
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "9b1c2b0e-0000-4000-8000-000000000001",
                                "score": 0.5,
                                "payload": {
                                    "content": "Clean solar panels twice a year.",
                                    "metadata": { "Header 1": "Maintenance" }
                                }
                            },
                            { "id": 7, "score": 0.2, "payload": { "metadata": {} } }
                        ]
                    }
                }));
            })
            .await;

        let hits = store(&server, true)
            .search("brave-falcon", &query(SearchMode::Hybrid))
            .await
            .expect("search");

        mock.assert();
        assert_eq!(hits.len(), 1);
        let mut metadata = BTreeMap::new();
        metadata.insert("Header 1".to_string(), "Maintenance".to_string());
        assert_eq!(
            hits[0].chunk,
            Chunk::new("Clean solar panels twice a year.", metadata)
        );
        assert!((hits[0].score - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn semantic_search_sends_plain_vector_query() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/idx/points/query")
                    .json_body(json!({
                        "query": [0.1, 0.2],
                        "limit": 4,
                        "with_payload": true
                    }));
                then.status(200).json_body(json!({ "result": { "points": [] } }));
            })
            .await;

        // Hybrid requested, but the store was configured without it.
        let hits = store(&server, false)
            .search("idx", &query(SearchMode::Hybrid))
            .await
            .expect("search");

        mock.assert();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn search_on_missing_collection_is_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/ghost/points/query");
                then.status(404)
                    .json_body(json!({ "status": { "error": "Not found: Collection `ghost` doesn't exist!" } }));
            })
            .await;

        let error = store(&server, true)
            .search("ghost", &query(SearchMode::Semantic))
            .await
            .expect_err("missing");
        assert!(matches!(error, StoreError::NotFound(ref name) if name == "ghost"));
    }

    #[tokio::test]
    async fn create_index_sizes_collection_and_adds_text_index() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/calm-otter");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/calm-otter")
                    .json_body(json!({ "vectors": { "size": 1536, "distance": "Cosine" } }));
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let text_index = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/calm-otter/index")
                    .json_body_partial(
                        r#"{ "field_name": "content", "field_schema": { "type": "text" } }"#,
                    );
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        store(&server, true)
            .create_index("calm-otter", 1536)
            .await
            .expect("create");

        exists.assert();
        create.assert();
        text_index.assert();
    }

    #[tokio::test]
    async fn upsert_writes_points_with_payload() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/idx/points")
                    .query_param("wait", "true")
                    .json_body_partial(
                        r#"{ "points": [ { "vector": [1.0, 0.0], "payload": { "content": "Hello world.", "source": "a.md" } } ] }"#,
                    );
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        store(&server, true)
            .upsert(
                "idx",
                vec![ChunkRecord {
                    chunk: Chunk::new("Hello world.", BTreeMap::new()),
                    vector: vec![1.0, 0.0],
                    source: Some("a.md".into()),
                }],
            )
            .await
            .expect("upsert");

        mock.assert();
    }

    #[tokio::test]
    async fn upsert_failure_surfaces_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/idx/points");
                then.status(500).body("disk full");
            })
            .await;

        let error = store(&server, true)
            .upsert(
                "idx",
                vec![ChunkRecord {
                    chunk: Chunk::new("x", BTreeMap::new()),
                    vector: vec![1.0],
                    source: None,
                }],
            )
            .await
            .expect_err("failure");
        assert!(matches!(
            error,
            StoreError::UnexpectedStatus { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn delete_tolerates_missing_collection() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/gone");
                then.status(404);
            })
            .await;

        store(&server, true).delete_index("gone").await.expect("delete");
        mock.assert();
    }

    #[test]
    fn keyword_prefetch_matches_any_question_term() {
        let store = QdrantStore::new(Client::new(), "http://127.0.0.1:6333", None, true)
            .expect("store");
        let body = store.search_body(&SearchQuery {
            text: "How often should solar panels be rinsed? Solar!".into(),
            vector: vec![0.3, 0.4],
            limit: 3,
            mode: SearchMode::Hybrid,
        });

        let terms: Vec<&str> = body["prefetch"][1]["filter"]["should"]
            .as_array()
            .expect("should conditions")
            .iter()
            .map(|condition| condition["match"]["text"].as_str().expect("term"))
            .collect();
        assert_eq!(
            terms,
            ["how", "often", "should", "solar", "panels", "be", "rinsed"]
        );
        assert!(body["prefetch"][1]["filter"].get("must").is_none());
    }

    #[test]
    fn punctuation_only_query_falls_back_to_semantic() {
        let store = QdrantStore::new(Client::new(), "http://127.0.0.1:6333", None, true)
            .expect("store");
        let body = store.search_body(&SearchQuery {
            text: "?!".into(),
            vector: vec![0.3, 0.4],
            limit: 3,
            mode: SearchMode::Hybrid,
        });
        assert!(body.get("prefetch").is_none());
        assert_eq!(body["query"], json!(vec![0.3_f32, 0.4_f32]));
    }
}
