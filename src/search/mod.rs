//! Tantivy-based search index module.
//!
//! Provides full-text search over store names and descriptions, with the name
//! weighted above the description.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::Store;

const BOOST_NAME: f32 = 10.0;
const BOOST_DESCRIPTION: f32 = 5.0;

/// Search hit with its relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub store_id: String,
    pub score: f32,
}

/// Search index schema fields.
struct SearchFields {
    store_id: Field,
    name: Field,
    description: Field,
}

/// Tantivy search index for stores.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        // STRING so the id is indexed untokenized and delete_term can find it
        let store_id = schema_builder.add_text_field("store_id", STRING | STORED);
        let name = schema_builder.add_text_field("name", TEXT | STORED);
        let description = schema_builder.add_text_field("description", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            store_id,
            name,
            description,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer_with_num_threads(1, 50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from the database contents.
    pub async fn rebuild(&self, stores: &[Store]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for store in stores {
            writer.add_document(self.create_document(store))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} stores", stores.len());
        Ok(())
    }

    /// Index a single store, replacing any previous entry.
    pub async fn index_store(&self, store: &Store) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(self.fields.store_id, &store.id));
        writer.add_document(self.create_document(store))?;
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Search for stores matching the query, best match first.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<SearchResult>, AppError> {
        if query_str.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        // Lenient parsing: user input like `o'reilly` or `"cafe` must not fail.
        let subqueries: Vec<(Occur, Box<dyn Query>)> = [
            (self.fields.name, BOOST_NAME),
            (self.fields.description, BOOST_DESCRIPTION),
        ]
        .into_iter()
        .map(|(field, boost)| {
            let parser = QueryParser::for_index(&self.index, vec![field]);
            let (query, _errors) = parser.parse_query_lenient(query_str);
            let boosted: Box<dyn Query> = Box::new(BoostQuery::new(query, boost));
            (Occur::Should, boosted)
        })
        .collect();

        let combined_query = BooleanQuery::new(subqueries);

        let top_docs = searcher
            .search(&combined_query, &TopDocs::with_limit(limit))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results = top_docs
            .into_iter()
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let store_id = doc.get_first(self.fields.store_id)?.as_str()?.to_string();
                Some(SearchResult { store_id, score })
            })
            .collect();

        Ok(results)
    }

    fn create_document(&self, store: &Store) -> TantivyDocument {
        doc!(
            self.fields.store_id => store.id.clone(),
            self.fields.name => store.name.clone(),
            self.fields.description => store.description.clone().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;
    use tempfile::TempDir;

    fn create_test_store(id: &str, name: &str, description: &str) -> Store {
        Store {
            id: id.to_string(),
            name: name.to_string(),
            slug: crate::models::slugify(name),
            description: Some(description.to_string()),
            tags: vec![],
            created: "2024-01-01T00:00:00.000000Z".to_string(),
            location: Location::point(-79.38, 43.65, "1 Main St"),
            photo: None,
            author: "user-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_search_ranks_name_matches_first() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let stores = vec![
            create_test_store("1", "Bakery Bliss", "Fresh bread and coffee every morning"),
            create_test_store("2", "Coffee Corner", "Small espresso bar"),
            create_test_store("3", "Book Nook", "Used books and quiet tables"),
        ];
        index.rebuild(&stores).await.unwrap();

        let results = index.search("coffee", 5).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.store_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[tokio::test]
    async fn test_search_respects_limit() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let stores: Vec<Store> = (0..8)
            .map(|i| create_test_store(&i.to_string(), &format!("Pizza Place {}", i), "Pizza"))
            .collect();
        index.rebuild(&stores).await.unwrap();

        assert_eq!(index.search("pizza", 5).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_reindex_replaces_entry() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let mut store = create_test_store("1", "Tea House", "Loose leaf tea");
        index.index_store(&store).await.unwrap();

        store.name = "Juice Bar".to_string();
        store.description = Some("Cold pressed juice".to_string());
        index.index_store(&store).await.unwrap();

        assert!(index.search("tea", 5).unwrap().is_empty());
        assert_eq!(index.search("juice", 5).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        assert!(index.search("", 5).unwrap().is_empty());
        assert!(index.search("   ", 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_tolerates_query_syntax() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();
        index
            .rebuild(&[create_test_store("1", "O'Reilly Pub", "Pints")])
            .await
            .unwrap();

        assert!(index.search("\"o'reilly", 5).is_ok());
    }
}
