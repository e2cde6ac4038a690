//! Message embeddings with brute-force cosine search.

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use rusqlite::{params, params_from_iter, OptionalExtension};

use super::{from_ms, to_ms, SqliteStore};
use crate::error::HushResult;
use crate::retrieval::cosine_similarity;
use crate::traits::EmbeddingStore;
use crate::types::{MessageEmbedding, SimilarMessage};

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[async_trait]
impl EmbeddingStore for SqliteStore {
    async fn get_embedding(&self, message_id: &str) -> HushResult<Option<MessageEmbedding>> {
        let conn = self.conn()?;
        let embedding = conn
            .query_row(
                "SELECT message_id, conversation_id, vector, model, created_at_ms
                 FROM message_embeddings WHERE message_id = ?1",
                params![message_id],
                |row| {
                    let blob: Vec<u8> = row.get(2)?;
                    Ok(MessageEmbedding {
                        message_id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        vector: blob_to_vector(&blob),
                        model: row.get(3)?,
                        created_at: from_ms(row.get(4)?),
                    })
                },
            )
            .optional()?;
        Ok(embedding)
    }

    async fn put_embedding(&self, embedding: MessageEmbedding) -> HushResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO message_embeddings
                (message_id, conversation_id, vector, model, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                embedding.message_id,
                embedding.conversation_id,
                vector_to_blob(&embedding.vector),
                embedding.model,
                to_ms(embedding.created_at),
            ],
        )?;
        Ok(())
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        scope_conversation_ids: &[String],
        top_k: usize,
        exclude_message_ids: &[String],
    ) -> HushResult<Vec<SimilarMessage>> {
        if scope_conversation_ids.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; scope_conversation_ids.len()].join(", ");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT message_id, vector FROM message_embeddings WHERE conversation_id IN ({})",
            placeholders
        ))?;
        let rows = stmt
            .query_map(params_from_iter(scope_conversation_ids.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut hits: Vec<SimilarMessage> = rows
            .into_iter()
            .filter(|(id, _)| !exclude_message_ids.contains(id))
            .map(|(message_id, blob)| SimilarMessage {
                score: cosine_similarity(vector, &blob_to_vector(&blob)),
                message_id,
            })
            .collect();

        hits.sort_by(|a, b| OrderedFloat(b.score).cmp(&OrderedFloat(a.score)));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn embedding(id: &str, conversation: &str, vector: Vec<f32>) -> MessageEmbedding {
        MessageEmbedding {
            message_id: id.to_string(),
            conversation_id: conversation.to_string(),
            vector,
            model: "test".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_blob_round_trip() {
        let v = vec![0.5, -1.25, 3.0];
        assert_eq!(blob_to_vector(&vector_to_blob(&v)), v);
    }

    #[tokio::test]
    async fn test_put_keeps_existing_embedding() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_embedding(embedding("m1", "c1", vec![1.0, 0.0])).await.unwrap();
        store.put_embedding(embedding("m1", "c1", vec![0.0, 1.0])).await.unwrap();

        let stored = store.get_embedding("m1").await.unwrap().unwrap();
        assert_eq!(stored.vector, vec![1.0, 0.0]);
        assert!(store.get_embedding("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_similarity_search_scoped_and_ranked() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_embedding(embedding("a", "c1", vec![1.0, 0.0])).await.unwrap();
        store.put_embedding(embedding("b", "c1", vec![0.7, 0.7])).await.unwrap();
        store.put_embedding(embedding("c", "c1", vec![0.0, 1.0])).await.unwrap();
        store.put_embedding(embedding("d", "c2", vec![1.0, 0.0])).await.unwrap();

        let scope = vec!["c1".to_string()];
        let hits = store
            .similarity_search(&[1.0, 0.0], &scope, 2, &[])
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.message_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let hits = store
            .similarity_search(&[1.0, 0.0], &scope, 2, &["a".to_string()])
            .await
            .unwrap();
        assert_eq!(hits[0].message_id, "b");

        assert!(store
            .similarity_search(&[1.0, 0.0], &[], 5, &[])
            .await
            .unwrap()
            .is_empty());
    }
}
