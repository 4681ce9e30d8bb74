//! Clients for the remote backend the sync engine replays into.

use async_trait::async_trait;
use chrono::Utc;
use gym_proto::{
    ApplyOutcome, ApplyRequest, ApplyResponse, EntityKind, EntityRecord, ErrorBody, OperationKind,
    PendingOperation,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("remote backend unavailable")]
    Unavailable,
}

impl RemoteError {
    /// The request never got an answer from the server
    pub fn is_unreachable(&self) -> bool {
        matches!(self, RemoteError::Http(_) | RemoteError::Unavailable)
    }
}

/// The remote side of synchronization
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Cheap reachability check
    async fn health(&self) -> Result<(), RemoteError>;

    /// Apply one queued operation. Must be idempotent per `op_id` and per
    /// created entity id.
    async fn apply(&self, device_id: &str, op: &PendingOperation)
        -> Result<ApplyOutcome, RemoteError>;

    /// Every record of one kind the remote holds
    async fn fetch_all(&self, entity: EntityKind) -> Result<Vec<EntityRecord>, RemoteError>;
}

/// HTTP client for `gym-server`
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpRemote {
    pub fn new(
        server_url: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: normalize_base_url(server_url),
            api_token,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/api/{}", self.base_url, path));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Strip trailing slashes and a trailing `/api` so paths can be appended
fn normalize_base_url(server_url: &str) -> String {
    let trimmed = server_url.trim().trim_end_matches('/');
    trimmed.strip_suffix("/api").unwrap_or(trimmed).to_string()
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(RemoteError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RemoteBackend for HttpRemote {
    async fn health(&self) -> Result<(), RemoteError> {
        let response = self.request(reqwest::Method::GET, "health").send().await?;
        check(response).await?;
        Ok(())
    }

    async fn apply(
        &self,
        device_id: &str,
        op: &PendingOperation,
    ) -> Result<ApplyOutcome, RemoteError> {
        let body = ApplyRequest {
            device_id: device_id.to_string(),
            operation: op.clone(),
        };
        let response = self
            .request(reqwest::Method::POST, "sync/apply")
            .json(&body)
            .send()
            .await?;
        let reply: ApplyResponse = check(response).await?.json().await?;
        Ok(reply.outcome)
    }

    async fn fetch_all(&self, entity: EntityKind) -> Result<Vec<EntityRecord>, RemoteError> {
        let response = self
            .request(reqwest::Method::GET, &format!("entities/{}", entity.as_str()))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

/// In-process remote with the same idempotency rules as `gym-server`.
///
/// Used for local-only demos and for exercising the sync engine in tests:
/// it can be switched offline and told to fail after a number of applies.
#[derive(Default)]
pub struct MemoryRemote {
    records: Mutex<HashMap<(EntityKind, Uuid), EntityRecord>>,
    applied_ops: Mutex<HashSet<Uuid>>,
    offline: AtomicBool,
    fail_after: Mutex<Option<usize>>,
    apply_calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Accept `n` more applies, then fail every following one
    pub fn fail_after(&self, n: usize) {
        if let Ok(mut guard) = self.fail_after.lock() {
            *guard = Some(n);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut guard) = self.fail_after.lock() {
            *guard = None;
        }
    }

    /// Number of apply requests received, including failed and duplicate ones
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Forget which operations were applied, keeping the records. Simulates
    /// a server that lost its dedupe log, so only entity-id idempotency is left.
    pub fn forget_applied_ops(&self) {
        if let Ok(mut ops) = self.applied_ops.lock() {
            ops.clear();
        }
    }

    fn reachable(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteBackend for MemoryRemote {
    async fn health(&self) -> Result<(), RemoteError> {
        self.reachable()
    }

    async fn apply(
        &self,
        _device_id: &str,
        op: &PendingOperation,
    ) -> Result<ApplyOutcome, RemoteError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.reachable()?;
        {
            let mut budget = self.fail_after.lock().map_err(|_| RemoteError::Unavailable)?;
            if let Some(left) = budget.as_mut() {
                if *left == 0 {
                    return Err(RemoteError::Unavailable);
                }
                *left -= 1;
            }
        }

        let mut applied_ops = self.applied_ops.lock().map_err(|_| RemoteError::Unavailable)?;
        if applied_ops.contains(&op.op_id) {
            return Ok(ApplyOutcome::Duplicate);
        }
        let mut records = self.records.lock().map_err(|_| RemoteError::Unavailable)?;
        let key = (op.entity, op.entity_id);
        let outcome = match op.kind {
            OperationKind::Create if records.contains_key(&key) => ApplyOutcome::Duplicate,
            OperationKind::Create | OperationKind::Update => {
                let payload = op.payload.clone().ok_or_else(|| RemoteError::Rejected {
                    status: 422,
                    message: format!("{} {} has no payload", op.kind, op.entity),
                })?;
                records.insert(
                    key,
                    EntityRecord {
                        entity: op.entity,
                        id: op.entity_id,
                        payload,
                        updated_at: Utc::now(),
                    },
                );
                ApplyOutcome::Applied
            }
            OperationKind::Delete => {
                records.remove(&key);
                ApplyOutcome::Applied
            }
        };
        applied_ops.insert(op.op_id);
        Ok(outcome)
    }

    async fn fetch_all(&self, entity: EntityKind) -> Result<Vec<EntityRecord>, RemoteError> {
        self.reachable()?;
        let records = self.records.lock().map_err(|_| RemoteError::Unavailable)?;
        Ok(records
            .values()
            .filter(|r| r.entity == entity)
            .cloned()
            .collect())
    }
}
