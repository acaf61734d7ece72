//! Ingestion and query pipelines, plus the service facade shared by the HTTP server and CLI.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError, build_embedding_client},
    generation::{CompletionClient, build_completion_client, fill_prompt},
    metrics::{MetricsSnapshot, RagMetrics},
    naming::IndexNameGenerator,
    parsing::{DocumentParser, build_document_parser},
    processing::{
        chunking::HeaderSplitter,
        retrieval::{Retriever, assemble_context},
        types::{Chunk, Document, IngestionError, InitError, QueryError},
        upload::stage_upload,
    },
    store::{ChunkRecord, IndexStore, StoreError, build_index_store},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Texts sent per embedding request.
const EMBEDDING_BATCH_SIZE: usize = 16;

/// Completion temperature for answers; retrieval answers should be deterministic.
const ANSWER_TEMPERATURE: f32 = 0.0;

/// Turns an uploaded document into a freshly named, fully populated index.
pub struct IngestionPipeline {
    parser: Arc<dyn DocumentParser>,
    splitter: HeaderSplitter,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn IndexStore>,
    names: IndexNameGenerator,
    upsert_batch_size: usize,
    metrics: Arc<RagMetrics>,
}

impl IngestionPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        splitter: HeaderSplitter,
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn IndexStore>,
        upsert_batch_size: usize,
    ) -> Self {
        Self {
            parser,
            splitter,
            embedder,
            store,
            names: IndexNameGenerator::new(),
            upsert_batch_size: upsert_batch_size.max(1),
            metrics: Arc::new(RagMetrics::new()),
        }
    }

    /// Record ingestion counters into a shared registry.
    pub fn with_metrics(mut self, metrics: Arc<RagMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Parse, split, embed, and index `document`, returning the new index identifier.
    ///
    /// A failed ingestion never leaves a partially written index behind.
    pub async fn ingest(&self, document: Document) -> Result<String, IngestionError> {
        let filename = document.filename.clone();
        tracing::info!(filename = %filename, bytes = document.bytes.len(), "Ingesting document");

        let staged = stage_upload(document).await?;
        let pages = self.parser.parse(staged.path()).await?;
        drop(staged);

        let Some(first_page) = pages.first() else {
            return Err(IngestionError::EmptyDocument);
        };
        if first_page.page_content.trim().is_empty() {
            return Err(IngestionError::EmptyDocument);
        }
        if pages.len() > 1 {
            tracing::warn!(
                filename = %filename,
                ignored_pages = pages.len() - 1,
                "Only the first parsed page is indexed"
            );
        }

        let chunks = self.splitter.split_text(&first_page.page_content);
        if chunks.is_empty() {
            tracing::warn!(filename = %filename, "Document produced no chunks");
            return Err(IngestionError::NoChunksProduced);
        }
        let index_name = self.names.generate();
        tracing::debug!(index = %index_name, chunks = chunks.len(), "Document split");

        let vectors = self.embed_chunks(&chunks).await?;
        let chunk_count = chunks.len();
        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord {
                chunk,
                vector,
                source: Some(filename.clone()),
            })
            .collect();

        let guard = PartialIndexGuard::arm(self.store.clone(), &index_name);
        let stored = self.store_records(&index_name, records).await;
        guard.disarm();
        if let Err(error) = stored {
            tracing::error!(index = %index_name, error = %error, "Indexing failed; removing partial index");
            if let Err(cleanup) = self.store.delete_index(&index_name).await {
                tracing::warn!(index = %index_name, error = %cleanup, "Failed to remove partial index");
            }
            return Err(IngestionError::StorageFailure(error));
        }

        self.metrics.record_document(chunk_count as u64);
        tracing::info!(index = %index_name, chunks = chunk_count, "Document indexed");
        Ok(index_name)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected_dimension = self.embedder.dimension();
        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(EMBEDDING_BATCH_SIZE) {
            let texts = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let embedded = self.embedder.generate_embeddings(texts).await?;
            if embedded.len() != batch.len() {
                return Err(EmbeddingClientError::InvalidResponse(format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            if let Some(vector) = embedded
                .iter()
                .find(|vector| vector.len() != expected_dimension)
            {
                return Err(EmbeddingClientError::DimensionMismatch {
                    expected: expected_dimension,
                    actual: vector.len(),
                });
            }
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    async fn store_records(
        &self,
        index_name: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<(), StoreError> {
        self.store
            .create_index(index_name, self.embedder.dimension())
            .await?;

        let mut remaining = records.into_iter();
        let mut batch_number = 0usize;
        loop {
            let batch: Vec<ChunkRecord> = remaining.by_ref().take(self.upsert_batch_size).collect();
            if batch.is_empty() {
                break;
            }
            batch_number += 1;
            tracing::debug!(index = index_name, batch = batch_number, size = batch.len(), "Upserting batch");
            self.store.upsert(index_name, batch).await?;
        }

        Ok(())
    }
}

/// Removes an index whose ingestion was abandoned mid-write, e.g. when the request is cancelled.
///
/// Dropping an armed guard schedules `delete_index` on the current runtime.
struct PartialIndexGuard {
    store: Arc<dyn IndexStore>,
    name: Option<String>,
}

impl PartialIndexGuard {
    fn arm(store: Arc<dyn IndexStore>, name: &str) -> Self {
        Self {
            store,
            name: Some(name.to_string()),
        }
    }

    fn disarm(mut self) {
        self.name = None;
    }
}

impl Drop for PartialIndexGuard {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(index = %name, "No runtime to remove abandoned partial index");
            return;
        };
        tracing::warn!(index = %name, "Ingestion abandoned; removing partial index");
        let store = self.store.clone();
        runtime.spawn(async move {
            if let Err(error) = store.delete_index(&name).await {
                tracing::warn!(index = %name, error = %error, "Failed to remove partial index");
            }
        });
    }
}

/// Answers questions against an existing index.
pub struct QueryPipeline {
    retriever: Retriever,
    generator: Arc<dyn CompletionClient>,
    metrics: Arc<RagMetrics>,
}

impl QueryPipeline {
    /// Assemble a pipeline from a retriever and a completion backend.
    pub fn new(retriever: Retriever, generator: Arc<dyn CompletionClient>) -> Self {
        Self {
            retriever,
            generator,
            metrics: Arc::new(RagMetrics::new()),
        }
    }

    /// Record answer counters into a shared registry.
    pub fn with_metrics(mut self, metrics: Arc<RagMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Answer `question` from the chunks stored under `index_name`.
    ///
    /// The generated text is returned verbatim.
    pub async fn answer(&self, index_name: &str, question: &str) -> Result<String, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let results = self
            .retriever
            .retrieve(index_name, question, self.retriever.top_k())
            .await?;
        let context = assemble_context(&results);
        let prompt = fill_prompt(&context, question);
        tracing::debug!(
            index = index_name,
            retrieved = results.len(),
            context_chars = context.len(),
            "Generating answer"
        );

        let answer = self.generator.complete(&prompt, ANSWER_TEMPERATURE).await?;
        self.metrics.record_answer();
        tracing::info!(index = index_name, "Question answered");
        Ok(answer)
    }
}

/// Abstraction over the pipelines used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Index a document and return its identifier.
    async fn ingest(&self, document: Document) -> Result<String, IngestionError>;

    /// Answer a question against a previously returned identifier.
    async fn answer(&self, index_name: &str, question: &str) -> Result<String, QueryError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns both pipelines and the metrics registry they share.
///
/// Construct once near process start and share through an `Arc`.
pub struct RagService {
    ingestion: IngestionPipeline,
    query: QueryPipeline,
    metrics: Arc<RagMetrics>,
}

impl RagService {
    /// Combine pipelines, wiring them to a single metrics registry.
    pub fn new(ingestion: IngestionPipeline, query: QueryPipeline) -> Self {
        let metrics = Arc::new(RagMetrics::new());
        Self {
            ingestion: ingestion.with_metrics(metrics.clone()),
            query: query.with_metrics(metrics.clone()),
            metrics,
        }
    }

    /// Build every backend adapter selected by `config`.
    pub fn from_config(config: &Config) -> Result<Self, InitError> {
        let http = config.http_client()?;
        let parser = build_document_parser(config, http.clone())?;
        let embedder = build_embedding_client(config, http.clone())?;
        let store = build_index_store(config, http.clone())?;
        let generator = build_completion_client(config, http)?;
        let splitter = HeaderSplitter::from_config(config)?;

        let ingestion = IngestionPipeline::new(
            parser,
            splitter,
            embedder.clone(),
            store.clone(),
            config.upsert_batch_size,
        );
        let retriever = Retriever::new(embedder, store, config.retrieval_top_k);
        let query = QueryPipeline::new(retriever, generator);

        tracing::info!("RAG service initialized");
        Ok(Self::new(ingestion, query))
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest(&self, document: Document) -> Result<String, IngestionError> {
        let result = self.ingestion.ingest(document).await;
        if result.is_err() {
            self.metrics.record_ingestion_failure();
        }
        result
    }

    async fn answer(&self, index_name: &str, question: &str) -> Result<String, QueryError> {
        let result = self.query.answer(index_name, question).await;
        if result.is_err() {
            self.metrics.record_query_failure();
        }
        result
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::offline_config;
    use crate::embedding::HashEmbeddingClient;
    use crate::generation::GenerationError;
    use crate::parsing::{LocalParser, ParseError, ParsedPage};
    use crate::processing::types::RetrievalError;
    use crate::store::{InMemoryIndexStore, ScoredChunk, SearchQuery};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedPages(Vec<&'static str>);

    #[async_trait]
    impl DocumentParser for FixedPages {
        async fn parse(&self, _path: &Path) -> Result<Vec<ParsedPage>, ParseError> {
            Ok(self.0.iter().map(|page| ParsedPage::new(*page)).collect())
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionClient for RecordingGenerator {
        async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
            assert_eq!(temperature, 0.0);
            self.prompts
                .lock()
                .expect("prompt log")
                .push(prompt.to_string());
            Ok(" The answer. ".into())
        }
    }

    /// Fails every upsert after the first `allowed` batches.
    struct FlakyStore {
        inner: InMemoryIndexStore,
        allowed: usize,
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl IndexStore for FlakyStore {
        async fn create_index(&self, name: &str, dimension: usize) -> Result<(), StoreError> {
            self.inner.create_index(name, dimension).await
        }
        async fn index_exists(&self, name: &str) -> Result<bool, StoreError> {
            self.inner.index_exists(name).await
        }
        async fn upsert(&self, name: &str, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
            if self.upserts.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(StoreError::Rejected("disk full".into()));
            }
            self.inner.upsert(name, records).await
        }
        async fn search(
            &self,
            name: &str,
            query: &SearchQuery,
        ) -> Result<Vec<ScoredChunk>, StoreError> {
            self.inner.search(name, query).await
        }
        async fn delete_index(&self, name: &str) -> Result<(), StoreError> {
            self.inner.delete_index(name).await
        }
        fn supports_hybrid(&self) -> bool {
            false
        }
    }

    /// Upserts after the first batch never complete.
    struct HangingStore {
        inner: InMemoryIndexStore,
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl IndexStore for HangingStore {
        async fn create_index(&self, name: &str, dimension: usize) -> Result<(), StoreError> {
            self.inner.create_index(name, dimension).await
        }
        async fn index_exists(&self, name: &str) -> Result<bool, StoreError> {
            self.inner.index_exists(name).await
        }
        async fn upsert(&self, name: &str, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
            if self.upserts.fetch_add(1, Ordering::SeqCst) >= 1 {
                std::future::pending::<()>().await;
            }
            self.inner.upsert(name, records).await
        }
        async fn search(
            &self,
            name: &str,
            query: &SearchQuery,
        ) -> Result<Vec<ScoredChunk>, StoreError> {
            self.inner.search(name, query).await
        }
        async fn delete_index(&self, name: &str) -> Result<(), StoreError> {
            self.inner.delete_index(name).await
        }
        fn supports_hybrid(&self) -> bool {
            false
        }
    }

    /// Remembers where the upload was staged, then fails or returns fixed pages.
    struct StagedPathParser {
        pages: Option<Vec<&'static str>>,
        seen: Mutex<Option<PathBuf>>,
    }

    impl StagedPathParser {
        fn new(pages: Option<Vec<&'static str>>) -> Self {
            Self {
                pages,
                seen: Mutex::new(None),
            }
        }

        fn staged_path(&self) -> PathBuf {
            self.seen
                .lock()
                .expect("seen path")
                .clone()
                .expect("parser was called")
        }
    }

    #[async_trait]
    impl DocumentParser for StagedPathParser {
        async fn parse(&self, path: &Path) -> Result<Vec<ParsedPage>, ParseError> {
            assert!(path.exists(), "upload must be staged before parsing");
            *self.seen.lock().expect("seen path") = Some(path.to_path_buf());
            match &self.pages {
                Some(pages) => Ok(pages.iter().map(|page| ParsedPage::new(*page)).collect()),
                None => Err(ParseError::AnalysisFailed("corrupt layout".into())),
            }
        }
    }

    fn ingestion(parser: Arc<dyn DocumentParser>, store: Arc<dyn IndexStore>) -> IngestionPipeline {
        IngestionPipeline::new(
            parser,
            HeaderSplitter::default(),
            Arc::new(HashEmbeddingClient::new(32)),
            store,
            2,
        )
    }

    #[tokio::test]
    async fn ingest_indexes_first_page_only() {
        let store = Arc::new(InMemoryIndexStore::new());
        let pipeline = ingestion(
            Arc::new(FixedPages(vec![
                "# Intro\nHello world.\n## Details\nMore text.",
                "# Ignored\nSecond page",
            ])),
            store.clone(),
        );

        let name = pipeline
            .ingest(Document::new("doc.md", b"ignored".to_vec()))
            .await
            .expect("ingest");

        assert_eq!(store.len(&name).await, Some(2));
        assert_eq!(pipeline.metrics.snapshot().chunks_indexed, 2);
    }

    #[tokio::test]
    async fn blank_or_missing_pages_are_empty_documents() {
        let store = Arc::new(InMemoryIndexStore::new());
        for pages in [vec![], vec!["  \n\t"]] {
            let error = ingestion(Arc::new(FixedPages(pages)), store.clone())
                .ingest(Document::new("doc.md", Vec::new()))
                .await
                .expect_err("empty");
            assert!(matches!(error, IngestionError::EmptyDocument));
        }
        assert!(store.index_names().await.is_empty());
    }

    #[tokio::test]
    async fn headings_only_document_produces_no_index() {
        let store = Arc::new(InMemoryIndexStore::new());
        let error = ingestion(Arc::new(FixedPages(vec!["# A\n## B\n"])), store.clone())
            .ingest(Document::new("doc.md", Vec::new()))
            .await
            .expect_err("no chunks");
        assert!(matches!(error, IngestionError::NoChunksProduced));
        assert!(store.index_names().await.is_empty());
    }

    #[tokio::test]
    async fn failed_upsert_removes_partial_index() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryIndexStore::new(),
            allowed: 1,
            upserts: AtomicUsize::new(0),
        });
        let pipeline = ingestion(
            Arc::new(FixedPages(vec!["# A\none\n# B\ntwo\n# C\nthree"])),
            store.clone(),
        );

        let error = pipeline
            .ingest(Document::new("doc.md", Vec::new()))
            .await
            .expect_err("storage failure");

        assert!(matches!(error, IngestionError::StorageFailure(_)));
        assert_eq!(store.upserts.load(Ordering::SeqCst), 2);
        assert!(store.inner.index_names().await.is_empty());
        assert_eq!(pipeline.metrics.snapshot().documents_indexed, 0);
    }

    #[tokio::test]
    async fn parse_failures_propagate() {
        let store = Arc::new(InMemoryIndexStore::new());
        let error = ingestion(Arc::new(LocalParser::new()), store)
            .ingest(Document::new("blob.bin", vec![0xff, 0xfe, 0x00]))
            .await
            .expect_err("unsupported");
        assert!(matches!(error, IngestionError::Parse(ParseError::Unsupported(_))));
    }

    #[tokio::test]
    async fn cancelled_ingestion_removes_partial_index() {
        let store = Arc::new(HangingStore {
            inner: InMemoryIndexStore::new(),
            upserts: AtomicUsize::new(0),
        });
        let pipeline = ingestion(
            Arc::new(FixedPages(vec!["# A\none\n# B\ntwo\n# C\nthree"])),
            store.clone(),
        );

        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            pipeline.ingest(Document::new("doc.md", Vec::new())),
        )
        .await;
        assert!(outcome.is_err(), "ingestion should still be waiting on the store");
        assert_eq!(store.upserts.load(Ordering::SeqCst), 2);

        for _ in 0..50 {
            if store.inner.index_names().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.inner.index_names().await.is_empty());
        assert_eq!(pipeline.metrics.snapshot().documents_indexed, 0);
    }

    #[tokio::test]
    async fn staged_upload_is_removed_after_parse_failure() {
        let parser = Arc::new(StagedPathParser::new(None));
        let error = ingestion(parser.clone(), Arc::new(InMemoryIndexStore::new()))
            .ingest(Document::new("scan.pdf", b"%PDF-1.7".to_vec()))
            .await
            .expect_err("analysis failure");

        assert!(matches!(error, IngestionError::Parse(ParseError::AnalysisFailed(_))));
        assert!(!parser.staged_path().exists());
    }

    #[tokio::test]
    async fn staged_upload_is_removed_after_storage_failure() {
        let parser = Arc::new(StagedPathParser::new(Some(vec!["# A\none\n# B\ntwo\n# C\nthree"])));
        let store = Arc::new(FlakyStore {
            inner: InMemoryIndexStore::new(),
            allowed: 0,
            upserts: AtomicUsize::new(0),
        });
        let error = ingestion(parser.clone(), store)
            .ingest(Document::new("notes.md", b"ignored".to_vec()))
            .await
            .expect_err("storage failure");

        assert!(matches!(error, IngestionError::StorageFailure(_)));
        assert!(!parser.staged_path().exists());
    }

    #[tokio::test]
    async fn answer_fills_prompt_and_returns_verbatim() {
        let store = Arc::new(InMemoryIndexStore::new());
        let embedder = Arc::new(HashEmbeddingClient::new(32));
        let ingest = IngestionPipeline::new(
            Arc::new(FixedPages(vec!["# Intro\nHello world.\n## Details\nMore text."])),
            HeaderSplitter::default(),
            embedder.clone(),
            store.clone(),
            8,
        );
        let generator = Arc::new(RecordingGenerator::default());
        let query = QueryPipeline::new(Retriever::new(embedder, store, 4), generator.clone());
        let service = RagService::new(ingest, query);

        let name = service
            .ingest(Document::new("doc.md", Vec::new()))
            .await
            .expect("ingest");
        let answer = service.answer(&name, "What is X?").await.expect("answer");

        assert_eq!(answer, " The answer. ");
        let prompts = generator.prompts.lock().expect("prompt log");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Question: What is X?"));
        assert!(prompts[0].contains("Hello world."));
        assert!(prompts[0].contains("More text."));

        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.documents_indexed, 1);
        assert_eq!(snapshot.chunks_indexed, 2);
        assert_eq!(snapshot.questions_answered, 1);
    }

    #[tokio::test]
    async fn blank_question_is_rejected_before_retrieval() {
        let generator = Arc::new(RecordingGenerator::default());
        let query = QueryPipeline::new(
            Retriever::new(
                Arc::new(HashEmbeddingClient::new(8)),
                Arc::new(InMemoryIndexStore::new()),
                4,
            ),
            generator.clone(),
        );

        let error = query.answer("brave-falcon", "   ").await.expect_err("blank");
        assert!(matches!(error, QueryError::EmptyQuestion));

        let error = query.answer("brave-falcon", "hi?").await.expect_err("missing");
        assert!(matches!(
            error,
            QueryError::Retrieval(RetrievalError::IndexNotFound(_))
        ));
        assert!(generator.prompts.lock().expect("prompt log").is_empty());
    }

    #[test]
    fn service_builds_from_offline_config() {
        let service = RagService::from_config(&offline_config()).expect("service");
        assert_eq!(service.metrics_snapshot().documents_indexed, 0);
    }
}
