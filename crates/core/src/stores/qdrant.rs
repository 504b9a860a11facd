use crate::traits::VectorIndex;
use crate::{ChunkMetadata, MetadataFilter, RagError, VectorMatch, VectorRecord};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

const BACKEND: &str = "qdrant";

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    api_key: Option<String>,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            collection: collection.into(),
            api_key: None,
            client: Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, RagError> {
        self.authorized(request)
            .send()
            .await
            .map_err(|error| RagError::index(BACKEND, error))
    }

    async fn create_collection(&self, dimensions: usize) -> Result<(), RagError> {
        let response = self
            .send(self.client.put(self.collection_url()).json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" }
            })))
            .await?;

        // A concurrent creator may have won the race.
        if response.status() == StatusCode::CONFLICT {
            debug!(collection = %self.collection, "qdrant collection created concurrently");
            return Ok(());
        }
        ensure_success(response).await?;

        info!(collection = %self.collection, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn check_vector_size(&self, response: reqwest::Response, dimensions: usize) -> Result<(), RagError> {
        let parsed: Value = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| RagError::index(BACKEND, error))?;

        match existing_vector_size(&parsed) {
            Some(existing) if existing != dimensions => Err(RagError::index(
                BACKEND,
                format!(
                    "collection {} has vector size {existing}, embedder produces {dimensions}",
                    self.collection
                ),
            )),
            _ => Ok(()),
        }
    }

    /// Keyword index on `doc_id`; Qdrant treats a repeated PUT as a no-op.
    async fn ensure_payload_index(&self) -> Result<(), RagError> {
        let response = self
            .send(
                self.client
                    .put(format!("{}/index?wait=true", self.collection_url()))
                    .json(&payload_index_body()),
            )
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_index(&self, dimensions: usize) -> Result<(), RagError> {
        let response = self.send(self.client.get(self.collection_url())).await?;

        if response.status() == StatusCode::NOT_FOUND {
            self.create_collection(dimensions).await?;
        } else {
            self.check_vector_size(response, dimensions).await?;
            debug!(collection = %self.collection, "qdrant collection already exists");
        }

        self.ensure_payload_index().await
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), RagError> {
        if records.is_empty() {
            return Ok(());
        }

        let points = records.iter().map(point_body).collect::<Vec<_>>();
        let response = self
            .send(
                self.client
                    .put(format!("{}/points?wait=true", self.collection_url()))
                    .json(&json!({ "points": points })),
            )
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, RagError> {
        let response = self
            .send(
                self.client
                    .post(format!("{}/points/search", self.collection_url()))
                    .json(&json!({
                        "vector": vector,
                        "limit": top_k,
                        "with_payload": true,
                        "filter": filter_body(filter),
                    })),
            )
            .await?;

        let parsed: Value = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| RagError::index(BACKEND, error))?;

        Ok(parse_matches(&parsed))
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<(), RagError> {
        let response = self
            .send(
                self.client
                    .post(format!("{}/points/delete?wait=true", self.collection_url()))
                    .json(&json!({ "filter": filter_body(filter) })),
            )
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RagError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(RagError::Index {
        backend: BACKEND.to_string(),
        details: format!("{status}: {body}"),
    })
}

fn existing_vector_size(collection: &Value) -> Option<usize> {
    collection
        .pointer("/result/config/params/vectors/size")
        .and_then(Value::as_u64)
        .map(|size| size as usize)
}

fn payload_index_body() -> Value {
    json!({ "field_name": "doc_id", "field_schema": "keyword" })
}

fn point_body(record: &VectorRecord) -> Value {
    json!({
        "id": record.id,
        "vector": record.embedding,
        "payload": {
            "doc_id": record.metadata.doc_id,
            "chunk_index": record.metadata.chunk_index,
            "text": record.metadata.text,
        },
    })
}

fn filter_body(filter: &MetadataFilter) -> Value {
    json!({
        "must": [
            { "key": "doc_id", "match": { "value": filter.doc_id } }
        ]
    })
}

fn parse_matches(parsed: &Value) -> Vec<VectorMatch> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.iter()
        .map(|hit| {
            let id = match hit.pointer("/id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => String::new(),
            };
            let payload_str = |field: &str| {
                hit.pointer(&format!("/payload/{field}"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };

            VectorMatch {
                id,
                score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                metadata: ChunkMetadata {
                    doc_id: payload_str("doc_id"),
                    chunk_index: hit
                        .pointer("/payload/chunk_index")
                        .and_then(Value::as_u64)
                        .unwrap_or_default(),
                    text: payload_str("text"),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_payload_carries_all_metadata_fields() {
        let record = VectorRecord {
            id: "3f1c".to_string(),
            embedding: vec![0.5, 0.5],
            metadata: ChunkMetadata {
                doc_id: "doc-a".to_string(),
                chunk_index: 4,
                text: "pump pressure".to_string(),
            },
        };

        let body = point_body(&record);
        assert_eq!(body["id"], "3f1c");
        assert_eq!(body["payload"]["doc_id"], "doc-a");
        assert_eq!(body["payload"]["chunk_index"], 4);
        assert_eq!(body["payload"]["text"], "pump pressure");
    }

    #[test]
    fn filter_is_doc_id_equality() {
        let body = filter_body(&MetadataFilter::doc_id("doc-a"));
        assert_eq!(body["must"][0]["key"], "doc_id");
        assert_eq!(body["must"][0]["match"]["value"], "doc-a");
    }

    #[test]
    fn search_response_is_parsed_in_order() {
        let response = json!({
            "result": [
                {"id": "b", "score": 0.91, "payload": {"doc_id": "doc-a", "chunk_index": 2, "text": "second"}},
                {"id": 7, "score": 0.42, "payload": {"doc_id": "doc-a", "chunk_index": 0, "text": "first"}}
            ]
        });

        let matches = parse_matches(&response);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "b");
        assert_eq!(matches[0].metadata.chunk_index, 2);
        assert_eq!(matches[1].id, "7");
        assert_eq!(matches[1].metadata.text, "first");
    }

    #[test]
    fn missing_result_yields_no_matches() {
        assert!(parse_matches(&json!({"status": "ok"})).is_empty());
    }

    #[test]
    fn vector_size_is_read_from_collection_info() {
        let info = json!({"result": {"config": {"params": {"vectors": {"size": 384, "distance": "Cosine"}}}}});
        assert_eq!(existing_vector_size(&info), Some(384));
        assert_eq!(existing_vector_size(&json!({"result": {}})), None);
    }

    mod ensure_index {
        use super::*;
        use std::sync::{Arc, Mutex};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};

        const COLLECTION: &str = "docs";

        #[derive(Clone, Copy)]
        enum Collection {
            Existing(usize),
            CreatedConcurrently,
            Missing,
        }

        type RequestLog = Arc<Mutex<Vec<String>>>;

        /// Serves the few Qdrant routes `ensure_index` touches, one request per
        /// connection, and records `METHOD path` for each.
        async fn serve(collection: Collection) -> std::io::Result<(String, RequestLog)> {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            let endpoint = format!("http://{}", listener.local_addr()?);
            let log: RequestLog = Arc::default();
            let seen = log.clone();

            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let Ok(request) = read_request(&mut socket).await else {
                        continue;
                    };
                    let (status, body) = respond(collection, &request);
                    if let Ok(mut seen) = seen.lock() {
                        seen.push(request);
                    }
                    let response = format!(
                        "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
            });

            Ok((endpoint, log))
        }

        async fn read_request(socket: &mut TcpStream) -> std::io::Result<String> {
            let mut buffer = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let read = socket.read(&mut chunk).await?;
                if read == 0 {
                    return Ok(String::new());
                }
                buffer.extend_from_slice(&chunk[..read]);

                let Some(head_end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
                let body_len = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buffer.len() < head_end + 4 + body_len {
                    let read = socket.read(&mut chunk).await?;
                    if read == 0 {
                        break;
                    }
                    buffer.extend_from_slice(&chunk[..read]);
                }

                let request_line = head.lines().next().unwrap_or_default();
                return Ok(request_line.split_whitespace().take(2).collect::<Vec<_>>().join(" "));
            }
        }

        fn respond(collection: Collection, request: &str) -> (u16, String) {
            let collection_path = format!("/collections/{COLLECTION}");
            let ok = json!({"status": "ok", "result": {}}).to_string();

            match request.split_once(' ') {
                Some(("GET", path)) if path == collection_path => match collection {
                    Collection::Existing(size) => (
                        200,
                        json!({"result": {"config": {"params": {"vectors": {"size": size, "distance": "Cosine"}}}}})
                            .to_string(),
                    ),
                    _ => (404, json!({"status": {"error": "not found"}}).to_string()),
                },
                Some(("PUT", path)) if path == collection_path => match collection {
                    Collection::CreatedConcurrently => (409, json!({"status": {"error": "exists"}}).to_string()),
                    _ => (200, ok),
                },
                Some(("PUT", path)) if path.starts_with(&format!("{collection_path}/index")) => (200, ok),
                _ => (400, json!({"status": {"error": "unexpected request"}}).to_string()),
            }
        }

        fn requests(log: &RequestLog) -> Vec<String> {
            log.lock().map(|seen| seen.clone()).unwrap_or_default()
        }

        fn store(endpoint: String) -> Result<QdrantStore, reqwest::Error> {
            let client = Client::builder().no_proxy().build()?;
            Ok(QdrantStore::new(endpoint, COLLECTION).with_client(client))
        }

        fn payload_index_request() -> String {
            format!("PUT /collections/{COLLECTION}/index?wait=true")
        }

        #[tokio::test]
        async fn missing_collection_is_created_with_payload_index() -> Result<(), Box<dyn std::error::Error>> {
            let (endpoint, log) = serve(Collection::Missing).await?;
            store(endpoint)?.ensure_index(4).await?;

            assert_eq!(
                requests(&log),
                vec![
                    format!("GET /collections/{COLLECTION}"),
                    format!("PUT /collections/{COLLECTION}"),
                    payload_index_request(),
                ]
            );
            Ok(())
        }

        #[tokio::test]
        async fn concurrently_created_collection_still_gets_payload_index(
        ) -> Result<(), Box<dyn std::error::Error>> {
            let (endpoint, log) = serve(Collection::CreatedConcurrently).await?;
            store(endpoint)?.ensure_index(4).await?;

            assert!(requests(&log).contains(&payload_index_request()));
            Ok(())
        }

        #[tokio::test]
        async fn existing_collection_gets_payload_index() -> Result<(), Box<dyn std::error::Error>> {
            let (endpoint, log) = serve(Collection::Existing(4)).await?;
            store(endpoint)?.ensure_index(4).await?;

            assert_eq!(
                requests(&log),
                vec![format!("GET /collections/{COLLECTION}"), payload_index_request()]
            );
            Ok(())
        }

        #[tokio::test]
        async fn existing_collection_with_other_size_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
            let (endpoint, log) = serve(Collection::Existing(384)).await?;
            let result = store(endpoint)?.ensure_index(4).await;

            assert!(matches!(result, Err(RagError::Index { .. })));
            assert!(!requests(&log).contains(&payload_index_request()));
            Ok(())
        }
    }
}
