//! Durable, append-only conversation storage.
//!
//! Each conversation is persisted as newline-delimited JSON — one
//! [`TurnRecord`] per line, append-only, SHA-256 hash-chained to the previous
//! record so that post-hoc tampering or truncation of earlier lines is
//! detectable via [`ConversationStore::verify_integrity`]. A sidecar
//! `index.json` carries per-conversation summaries for listing and keyword
//! search.
//!
//! # Disk format
//!
//! ```text
//! conversations/
//!   ├─ index.json                 [{id, summary, turn_count, ...}, ...]
//!   ├─ 3f2a...e1.jsonl
//!   │    {"id":"3f2a...e1","created_at":"..."}          ← header line
//!   │    {"index":0,"prev_hash":"","hash":"ab..",...}   ← turn records
//!   │    {"index":1,"prev_hash":"ab..","hash":"cd..",...}
//!   └─ 9c07...b4.jsonl
//! ```
//!
//! # Concurrency
//!
//! Appends to the *same* conversation are serialized through a per-id async
//! mutex, so concurrent callers can never interleave partial writes or fork
//! the hash chain. Appends to *different* conversations proceed
//! independently. The store is the only shared mutable resource in the
//! engine; everything else is read-only after startup. The store itself is
//! cheap to clone — clones share the same locks and chain state.
//!
//! After a turn is durably appended, a summarization task is spawned
//! out-of-band (when a summarizer client is configured). A summarization
//! failure is logged and leaves the previous summary intact — it is never
//! fatal to the conversation itself.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use uuid::Uuid;

use crate::gert::conversation::{Conversation, Turn};
use crate::gert::provider::{Message, ProviderClient, Role};

/// Error types for store operations.
#[derive(Debug)]
pub enum StoreError {
    /// No conversation exists under the given id.
    NotFound(String),
    /// Underlying filesystem failure.
    Io(String),
    /// A persisted record failed to parse.
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Conversation not found: {}", id),
            StoreError::Io(msg) => write!(f, "Storage I/O error: {}", msg),
            StoreError::Corrupt(msg) => write!(f, "Corrupt conversation record: {}", msg),
        }
    }
}

impl Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// First line of every conversation file.
#[derive(Debug, Serialize, Deserialize)]
struct ConversationHeader {
    id: String,
    created_at: DateTime<Utc>,
}

/// One persisted turn, hash-chained to its predecessor.
#[derive(Debug, Serialize, Deserialize)]
struct TurnRecord {
    index: u64,
    prev_hash: String,
    hash: String,
    turn: Turn,
}

/// Index entry describing one stored conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub summary: Option<String>,
    pub turn_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Tail of a conversation's hash chain, cached between appends.
struct ChainTail {
    next_index: u64,
    last_hash: String,
}

const INDEX_FILE: &str = "index.json";

/// Maximum transcript length handed to the summarizer.
const SUMMARY_INPUT_LIMIT: usize = 2000;

fn compute_hash(index: u64, prev_hash: &str, turn_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(turn_json.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Durable conversation store partitioned by conversation id.
///
/// Clones share the same per-id locks and index lock.
#[derive(Clone)]
pub struct ConversationStore {
    dir: PathBuf,
    summarizer: Option<Arc<dyn ProviderClient>>,
    summary_timeout: Duration,
    /// Per-id append locks; the inner `Option<ChainTail>` is lazily loaded
    /// from disk on first access.
    chains: Arc<StdMutex<HashMap<String, Arc<TokioMutex<Option<ChainTail>>>>>>,
    /// Guards every access to `index.json`.
    index_lock: Arc<TokioMutex<()>>,
}

impl ConversationStore {
    /// Open (creating if necessary) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            summarizer: None,
            summary_timeout: Duration::from_secs(600),
            chains: Arc::new(StdMutex::new(HashMap::new())),
            index_lock: Arc::new(TokioMutex::new(())),
        })
    }

    /// Attach a provider client used for out-of-band summarization.
    pub fn with_summarizer(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.summarizer = Some(client);
        self
    }

    /// Override the deadline for summarizer calls.
    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout = timeout;
        self
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", id))
    }

    fn chain_handle(&self, id: &str) -> Arc<TokioMutex<Option<ChainTail>>> {
        let mut chains = self.chains.lock().unwrap();
        chains
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(None)))
            .clone()
    }

    /// Create a new empty conversation and return its id.
    pub async fn create(&self) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let header = ConversationHeader {
            id: id.clone(),
            created_at,
        };
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(self.file_path(&id))?;
        let line =
            serde_json::to_string(&header).map_err(|e| StoreError::Io(e.to_string()))?;
        writeln!(file, "{}", line)?;
        file.flush()?;

        self.update_index(|entries| {
            entries.push(IndexEntry {
                id: id.clone(),
                summary: None,
                turn_count: 0,
                created_at,
                last_updated: created_at,
            });
        })
        .await?;

        info!("created conversation {}", id);
        Ok(id)
    }

    /// Durably append one turn under `id`.
    ///
    /// Appends to the same id are serialized; the call returns only after the
    /// record is written and flushed. When a summarizer is configured, a
    /// refresh of the conversation summary is spawned out-of-band and does
    /// not block this call.
    pub async fn append(&self, id: &str, turn: Turn) -> Result<(), StoreError> {
        let handle = self.chain_handle(id);
        let mut tail = handle.lock().await;

        if tail.is_none() {
            *tail = Some(self.load_tail(id)?);
        }
        let state = tail.as_mut().unwrap();

        let turn_json =
            serde_json::to_string(&turn).map_err(|e| StoreError::Io(e.to_string()))?;
        let record = TurnRecord {
            index: state.next_index,
            prev_hash: state.last_hash.clone(),
            hash: compute_hash(state.next_index, &state.last_hash, &turn_json),
            turn,
        };

        let mut file = OpenOptions::new()
            .append(true)
            .open(self.file_path(id))
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StoreError::NotFound(id.to_string()),
                _ => StoreError::Io(e.to_string()),
            })?;
        let line =
            serde_json::to_string(&record).map_err(|e| StoreError::Io(e.to_string()))?;
        writeln!(file, "{}", line)?;
        file.flush()?;

        let turn_count = (record.index + 1) as usize;
        state.next_index += 1;
        state.last_hash = record.hash.clone();
        drop(tail);

        self.update_index(|entries| {
            if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
                entry.turn_count = turn_count;
                entry.last_updated = Utc::now();
            }
        })
        .await?;

        if self.summarizer.is_some() {
            let store = self.clone();
            let id = id.to_string();
            tokio::spawn(async move {
                store.refresh_summary(&id).await;
            });
        }

        Ok(())
    }

    fn load_tail(&self, id: &str) -> Result<ChainTail, StoreError> {
        let path = self.file_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let file = fs::File::open(&path)?;
        let reader = BufReader::new(file);
        let mut next_index = 0u64;
        let mut last_hash = String::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() || line_no == 0 {
                continue;
            }
            let record: TurnRecord = serde_json::from_str(&line)
                .map_err(|e| StoreError::Corrupt(format!("{}: line {}: {}", id, line_no, e)))?;
            next_index = record.index + 1;
            last_hash = record.hash;
        }
        Ok(ChainTail {
            next_index,
            last_hash,
        })
    }

    /// Retrieve a full conversation by id.
    pub async fn get(&self, id: &str) -> Result<Conversation, StoreError> {
        let handle = self.chain_handle(id);
        let _guard = handle.lock().await;

        let (header, records) = self.read_all(id)?;
        let summary = self
            .read_index()
            .await?
            .into_iter()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.summary);

        let updated_at = records
            .last()
            .map(|r| r.turn.timestamp)
            .unwrap_or(header.created_at);

        Ok(Conversation {
            id: header.id,
            turns: records.into_iter().map(|r| r.turn).collect(),
            summary,
            created_at: header.created_at,
            updated_at,
        })
    }

    fn read_all(&self, id: &str) -> Result<(ConversationHeader, Vec<TurnRecord>), StoreError> {
        let path = self.file_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let file = fs::File::open(&path)?;
        let reader = BufReader::new(file);

        let mut header: Option<ConversationHeader> = None;
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if line_no == 0 {
                header = Some(
                    serde_json::from_str(&line)
                        .map_err(|e| StoreError::Corrupt(format!("{}: header: {}", id, e)))?,
                );
            } else {
                records.push(serde_json::from_str(&line).map_err(|e| {
                    StoreError::Corrupt(format!("{}: line {}: {}", id, line_no, e))
                })?);
            }
        }

        let header =
            header.ok_or_else(|| StoreError::Corrupt(format!("{}: missing header", id)))?;
        Ok((header, records))
    }

    /// Walk the hash chain and confirm no record has been altered or dropped.
    pub async fn verify_integrity(&self, id: &str) -> Result<bool, StoreError> {
        let (_, records) = self.read_all(id)?;
        let mut prev_hash = String::new();
        for (expected_index, record) in records.iter().enumerate() {
            if record.index != expected_index as u64 || record.prev_hash != prev_hash {
                return Ok(false);
            }
            let turn_json = serde_json::to_string(&record.turn)
                .map_err(|e| StoreError::Io(e.to_string()))?;
            if compute_hash(record.index, &record.prev_hash, &turn_json) != record.hash {
                return Ok(false);
            }
            prev_hash = record.hash.clone();
        }
        Ok(true)
    }

    /// All index entries, most recently updated first.
    pub async fn list(&self) -> Result<Vec<IndexEntry>, StoreError> {
        let mut entries = self.read_index().await?;
        entries.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(entries)
    }

    /// Keyword search over summaries and turn content.
    ///
    /// Scores each conversation by the number of query-term occurrences and
    /// returns matching ids best-first (ties broken by recency). Finite and
    /// restartable: every call rescans the current index.
    pub async fn search(&self, query: &str) -> Result<Vec<String>, StoreError> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.read_index().await?;
        let mut scored: Vec<(usize, DateTime<Utc>, String)> = Vec::new();
        for entry in entries {
            let mut haystack = entry.summary.clone().unwrap_or_default();
            if let Ok((_, records)) = self.read_all(&entry.id) {
                for record in &records {
                    if let Some(content) = &record.turn.content {
                        haystack.push('\n');
                        haystack.push_str(content);
                    }
                }
            }
            let haystack = haystack.to_lowercase();
            let score: usize = terms
                .iter()
                .map(|term| haystack.matches(term.as_str()).count())
                .sum();
            if score > 0 {
                scored.push((score, entry.last_updated, entry.id));
            }
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        Ok(scored.into_iter().map(|(_, _, id)| id).collect())
    }

    /// Delete one conversation and its index entry.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let handle = self.chain_handle(id);
        let mut tail = handle.lock().await;

        let path = self.file_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        fs::remove_file(&path)?;
        *tail = None;
        drop(tail);

        self.update_index(|entries| {
            entries.retain(|entry| entry.id != id);
        })
        .await?;
        info!("deleted conversation {}", id);
        Ok(())
    }

    /// Remove every stored conversation and reset the index.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.index_lock.lock().await;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry
                .path()
                .extension()
                .map(|e| e == "jsonl")
                .unwrap_or(false)
            {
                fs::remove_file(entry.path())?;
            }
        }
        let index_path = self.dir.join(INDEX_FILE);
        if index_path.exists() {
            fs::remove_file(index_path)?;
        }
        self.chains.lock().unwrap().clear();
        info!("cleared all conversations");
        Ok(())
    }

    /// Regenerate the summary for one conversation.
    ///
    /// Normally spawned automatically after [`append`](Self::append); exposed
    /// so callers can force a refresh. Failures are logged and swallowed — the
    /// previous summary stays in place.
    pub async fn refresh_summary(&self, id: &str) {
        let client = match &self.summarizer {
            Some(client) => Arc::clone(client),
            None => return,
        };

        let conversation = match self.get(id).await {
            Ok(conversation) => conversation,
            Err(err) => {
                warn!("summarization skipped for {}: {}", id, err);
                return;
            }
        };

        let mut transcript = conversation.transcript();
        if transcript.len() > SUMMARY_INPUT_LIMIT {
            let mut cut = SUMMARY_INPUT_LIMIT;
            while !transcript.is_char_boundary(cut) {
                cut -= 1;
            }
            transcript.truncate(cut);
            transcript.push_str("...");
        }

        let prompt = format!(
            "Summarize this conversation in 1-2 concise sentences. Focus on the \
             main topic and any key outcomes or decisions.\n\nConversation:\n{}\n\nSummary:",
            transcript
        );
        let messages = [Message::new(Role::User, prompt)];

        let outcome =
            tokio::time::timeout(self.summary_timeout, client.send_message(&messages)).await;
        let summary = match outcome {
            Ok(Ok(message)) => message.content.trim().to_string(),
            Ok(Err(err)) => {
                warn!("summarization failed for {}: {}", id, err);
                return;
            }
            Err(_) => {
                warn!("summarization timed out for {}", id);
                return;
            }
        };

        if let Err(err) = self
            .update_index(|entries| {
                if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
                    entry.summary = Some(summary.clone());
                }
            })
            .await
        {
            warn!("failed to persist summary for {}: {}", id, err);
        }
    }

    fn load_index_unlocked(&self) -> Result<Vec<IndexEntry>, StoreError> {
        let path = self.dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&path)?;
        serde_json::from_str(&data).map_err(|e| StoreError::Corrupt(format!("index: {}", e)))
    }

    async fn read_index(&self) -> Result<Vec<IndexEntry>, StoreError> {
        let _guard = self.index_lock.lock().await;
        self.load_index_unlocked()
    }

    async fn update_index<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<IndexEntry>),
    {
        let _guard = self.index_lock.lock().await;
        let mut entries = self.load_index_unlocked()?;
        mutate(&mut entries);
        let data =
            serde_json::to_string_pretty(&entries).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::write(self.dir.join(INDEX_FILE), data)?;
        Ok(())
    }
}
