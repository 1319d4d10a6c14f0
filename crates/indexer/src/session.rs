//! Per-session indexing pipeline: `Discovered -> Parsed -> Chunked ->
//! Tagged -> Embedded -> Committed`, with any stage failure dropping a
//! session to `Skipped` without aborting the rest of the batch.

use std::sync::Arc;

use claude_view_core::provider::Provider;
use claude_view_core::types::{Chunk, Message};
use claude_view_db::Database;
use claude_view_embedder::Embedder;
use tokio_stream::StreamExt;

/// What happened to one session during a reindex pass.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Committed {
        session_id: String,
        project_path: String,
        message_count: u32,
        chunk_count: u32,
    },
    Skipped {
        session_id: String,
        reason: String,
    },
}

/// Run one session through the full pipeline and persist the result.
///
/// `metadata_only` upserts just the `Session` row — messages, chunks, tags,
/// and embeddings are left untouched, for the cheap incremental pass a
/// caller can run between full reindexes.
pub async fn process_session(
    db: &Database,
    provider: &dyn Provider,
    session_id: &str,
    metadata_only: bool,
    embedder: Option<&Arc<dyn Embedder>>,
) -> SessionOutcome {
    let skipped = |reason: String| SessionOutcome::Skipped {
        session_id: session_id.to_string(),
        reason,
    };

    let mut session = match provider.parse_metadata(session_id).await {
        Ok(Some(s)) => s,
        Ok(None) => return skipped("provider reported no metadata for this session id".into()),
        Err(e) => return skipped(format!("parse_metadata failed: {e}")),
    };

    // Safe parent linkage: only point at a parent that already exists.
    // If it doesn't (yet), leave it null — parse_metadata re-evaluates
    // every pass, so a later run self-heals once the parent lands.
    if let Some(parent_id) = &session.parent_id {
        match db.session_exists(parent_id).await {
            Ok(true) => {}
            Ok(false) => session.parent_id = None,
            Err(e) => return skipped(format!("checking parent existence failed: {e}")),
        }
    }

    if metadata_only {
        return match db.upsert_session(&session).await {
            Ok(()) => SessionOutcome::Committed {
                session_id: session_id.to_string(),
                project_path: session.project_path,
                message_count: 0,
                chunk_count: 0,
            },
            Err(e) => skipped(format!("upsert_session failed: {e}")),
        };
    }

    let messages = match collect_messages(provider, session_id).await {
        Ok(m) => m,
        Err(reason) => return skipped(reason),
    };

    session.message_count = messages.len() as u32;
    session.turn_count = messages.iter().filter(|m| m.role == claude_view_core::types::Role::User).count() as u32;
    if session.first_prompt_preview.is_none() {
        session.first_prompt_preview = messages
            .iter()
            .find(|m| m.role == claude_view_core::types::Role::User)
            .map(|m| preview(&m.content));
    }

    let mut chunks = claude_view_chunker::chunk_session(&session, &messages);
    session.auto_tags = claude_view_tagger::generate_tags(&session, &messages);

    if let Some(embedder) = embedder {
        embed_chunks(embedder.as_ref(), &mut chunks).await;
    }

    let project_path = session.project_path.clone();
    let message_count = session.message_count;
    let chunk_count = chunks.len() as u32;

    if let Err(e) = db.replace_session(&session, &messages, &chunks).await {
        return skipped(format!("replace_session failed: {e}"));
    }

    SessionOutcome::Committed { session_id: session_id.to_string(), project_path, message_count, chunk_count }
}

/// Best-effort embedding: a chunk whose vector comes back `None` (no API
/// key, transient failure, exhausted retries) is still committed without
/// one — the chunk's text is never lost waiting on a later back-fill.
async fn embed_chunks(embedder: &dyn Embedder, chunks: &mut [Chunk]) {
    if !embedder.available() || chunks.is_empty() {
        return;
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = embedder.embed_texts(&texts).await;
    for (chunk, vector) in chunks.iter_mut().zip(vectors) {
        if let Some(vector) = vector {
            chunk.embedding_model = Some(embedder.model_name().to_string());
            chunk.embedding = Some(vector);
        }
    }
}

async fn collect_messages(provider: &dyn Provider, session_id: &str) -> Result<Vec<Message>, String> {
    let mut stream = provider.iter_messages(session_id).await;
    let mut messages = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(msg) => messages.push(msg),
            Err(e) => return Err(format!("iter_messages failed: {e}")),
        }
    }
    Ok(messages)
}

fn preview(content: &str) -> String {
    let chars: String = content.chars().take(200).collect();
    if content.chars().count() > 200 {
        format!("{chars}...")
    } else {
        chars
    }
}
