//! In-memory source, destination and checkpoint store for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::dest::{Destination, DestinationError, ObjectHead, PutRequest};
use crate::fingerprint::hash_reader;
use crate::source::{FetchError, PhotoSource, SourceError, SourceItem};
use crate::state::{CheckpointState, CheckpointStore, StateError};

#[derive(Default)]
pub struct FakeSource {
    items: Vec<SourceItem>,
    contents: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    fail_listing: bool,
    cancel_after: Option<(usize, CancellationToken)>,
    fetched: Mutex<Vec<PathBuf>>,
}

impl FakeSource {
    pub fn with_item(mut self, item: SourceItem, bytes: &[u8]) -> Self {
        self.contents.insert(item.id.clone(), bytes.to_vec());
        self.items.push(item);
        self
    }

    pub fn with_failing_item(mut self, item: SourceItem) -> Self {
        self.failing.insert(item.id.clone());
        self.items.push(item);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Cancel `token` once the `n`th fetch has written its content, as a
    /// signal arriving mid-item would.
    pub fn cancel_after(mut self, n: usize, token: &CancellationToken) -> Self {
        self.cancel_after = Some((n, token.clone()));
        self
    }

    /// `n` dated items with distinct content.
    pub fn numbered(n: usize) -> Self {
        (0..n).fold(Self::default(), |source, i| {
            let item = SourceItem::new(format!("ID{:03}", i)).with_filename(format!("IMG_{:04}.JPG", i));
            source.with_item(item, format!("content {}", i).as_bytes())
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    pub fn scratch_paths(&self) -> Vec<PathBuf> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoSource for FakeSource {
    async fn list_items(&self) -> Result<Vec<SourceItem>, SourceError> {
        if self.fail_listing {
            return Err(SourceError::ApiResponse("listing unavailable".into()));
        }
        Ok(self.items.clone())
    }

    async fn fetch(&self, item: &SourceItem, dest: &Path) -> Result<u64, FetchError> {
        let count = {
            let mut fetched = self.fetched.lock().unwrap();
            fetched.push(dest.to_path_buf());
            fetched.len()
        };
        if let Some((n, token)) = &self.cancel_after {
            if count == *n {
                token.cancel();
            }
        }
        if self.failing.contains(&item.id) {
            // a partial body hits the disk before the connection drops
            std::fs::write(dest, b"partial")?;
            return Err(FetchError::HttpStatus {
                status: 404,
                name: item.id.clone(),
            });
        }
        let bytes = self
            .contents
            .get(&item.id)
            .ok_or_else(|| FetchError::MissingLocator(item.id.clone()))?;
        std::fs::write(dest, bytes)?;
        Ok(bytes.len() as u64)
    }
}

#[derive(Default)]
struct DestinationInner {
    objects: HashMap<String, String>,
    puts: Vec<PutRequest>,
    heads: usize,
    fail_heads: bool,
    fail_puts: bool,
}

/// Bucket stand-in. Uploads store the body's MD5 as the integrity tag, so a
/// later probe of the same content matches.
#[derive(Clone, Default)]
pub struct FakeDestination {
    inner: Arc<Mutex<DestinationInner>>,
}

impl FakeDestination {
    pub fn insert(&self, key: &str, tag: &str) {
        self.inner
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), tag.to_string());
    }

    pub fn fail_heads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_heads = fail;
    }

    pub fn fail_puts(&self, fail: bool) {
        self.inner.lock().unwrap().fail_puts = fail;
    }

    pub fn puts(&self) -> Vec<PutRequest> {
        self.inner.lock().unwrap().puts.clone()
    }

    pub fn put_count(&self) -> usize {
        self.inner.lock().unwrap().puts.len()
    }

    pub fn head_count(&self) -> usize {
        self.inner.lock().unwrap().heads
    }
}

#[async_trait]
impl Destination for FakeDestination {
    async fn head_object(&self, key: &str) -> Result<Option<ObjectHead>, DestinationError> {
        let mut inner = self.inner.lock().unwrap();
        inner.heads += 1;
        if inner.fail_heads {
            return Err(DestinationError::Status {
                op: "HeadObject",
                target: key.to_string(),
                status: 403,
                message: "denied".into(),
            });
        }
        Ok(inner.objects.get(key).map(|tag| ObjectHead {
            integrity_tag: tag.clone(),
        }))
    }

    async fn put_object(&self, request: &PutRequest) -> Result<(), DestinationError> {
        let body = std::fs::File::open(&request.body).map_err(|e| DestinationError::Body {
            path: request.body.display().to_string(),
            message: e.to_string(),
        })?;
        let tag = hash_reader(body).map_err(|e| DestinationError::Body {
            path: request.body.display().to_string(),
            message: e.to_string(),
        })?;

        let mut inner = self.inner.lock().unwrap();
        if inner.fail_puts {
            return Err(DestinationError::Transport {
                op: "PutObject",
                target: request.key.clone(),
                message: "connection reset".into(),
            });
        }
        inner.puts.push(request.clone());
        inner
            .objects
            .insert(request.key.clone(), tag.as_str().to_string());
        Ok(())
    }
}

#[derive(Default)]
struct StoreInner {
    state: Option<CheckpointState>,
    fail_writes: bool,
    writes: usize,
}

/// Checkpoint store kept in memory; clones share contents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    pub fn seed(&self, state: CheckpointState) {
        self.inner.lock().unwrap().state = Some(state);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }

    pub fn snapshot(&self) -> Option<CheckpointState> {
        self.inner.lock().unwrap().state.clone()
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.inner.lock().unwrap().writes
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn read(&self) -> Result<Option<CheckpointState>, StateError> {
        Ok(self.snapshot())
    }

    async fn write(&self, state: &CheckpointState) -> Result<(), StateError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(StateError::Write {
                path: "memory".into(),
                source: std::io::Error::other("disk full"),
            });
        }
        inner.state = Some(state.clone());
        inner.writes += 1;
        Ok(())
    }

    fn location(&self) -> String {
        "memory".into()
    }
}
