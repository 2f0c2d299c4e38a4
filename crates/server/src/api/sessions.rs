// HTTP session table. Each session owns a worker task that executes its
// envelopes in arrival order.

use chrono::{DateTime, Utc};
use infra_mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use infra_mcp::McpHandler;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Envelopes that may wait for a session worker before POSTs block
const QUEUE_DEPTH: usize = 64;

/// Worker responses retained per session for diagnostics
const RECENT_RESPONSES: usize = 32;

#[derive(Debug, thiserror::Error)]
#[error("session {0} is closed")]
pub struct SessionClosed(pub String);

/// Connection state for one HTTP caller
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_seen: Mutex<Instant>,
    sender: Mutex<Option<mpsc::Sender<JsonRpcRequest>>>,
    /// Last responses the worker produced. Callers only ever receive the
    /// acknowledgement; these are never delivered over HTTP and only feed
    /// the close log and tests.
    recent: Arc<Mutex<VecDeque<JsonRpcResponse>>>,
}

impl Session {
    fn open(handler: Arc<McpHandler>) -> Arc<Self> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let recent = Arc::new(Mutex::new(VecDeque::with_capacity(RECENT_RESPONSES)));

        tokio::spawn(run_worker(id.clone(), handler, rx, Arc::clone(&recent)));

        Arc::new(Self {
            id,
            created_at: Utc::now(),
            last_seen: Mutex::new(Instant::now()),
            sender: Mutex::new(Some(tx)),
            recent,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Queue an envelope for the worker. Waits when the queue is full.
    pub async fn enqueue(&self, request: JsonRpcRequest) -> Result<(), SessionClosed> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| SessionClosed(self.id.clone()))?;

        self.touch();
        sender
            .send(request)
            .await
            .map_err(|_| SessionClosed(self.id.clone()))
    }

    /// Stop accepting envelopes; queued ones still run
    fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Most recent responses produced by the worker, oldest first
    #[cfg(test)]
    pub fn recent_responses(&self) -> Vec<JsonRpcResponse> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

async fn run_worker(
    session_id: String,
    handler: Arc<McpHandler>,
    mut rx: mpsc::Receiver<JsonRpcRequest>,
    recent: Arc<Mutex<VecDeque<JsonRpcResponse>>>,
) {
    tracing::debug!(session = %session_id, "Session worker started");

    while let Some(request) = rx.recv().await {
        let method = request.method.clone();
        let Some(response) = handler.handle(request).await else {
            continue;
        };

        if let Some(error) = &response.error {
            tracing::warn!(session = %session_id, method = %method, code = error.code, "{}", error.message);
        }

        let mut recent = recent.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.len() == RECENT_RESPONSES {
            recent.pop_front();
        }
        recent.push_back(response);
    }

    tracing::debug!(session = %session_id, "Session worker stopped");
}

/// Session table owned by the HTTP application state
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
    handler: Arc<McpHandler>,
}

impl SessionStore {
    pub fn new(handler: Arc<McpHandler>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            handler,
        }
    }

    /// Reuse the session named by `id` if it is active, otherwise open a
    /// new one. Closed ids are never resurrected.
    pub fn resolve(&self, id: Option<&str>) -> Arc<Session> {
        if let Some(session) = id.and_then(|id| self.get(id)) {
            session.touch();
            return session;
        }
        self.open()
    }

    pub fn open(&self) -> Arc<Session> {
        let session = Session::open(Arc::clone(&self.handler));
        self.lock()
            .insert(session.id().to_string(), Arc::clone(&session));
        tracing::info!(session = %session.id(), active = self.len(), "Session opened");
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.lock().get(id).cloned()
    }

    /// Close and evict a session; false when the id is unknown
    pub fn close(&self, id: &str) -> bool {
        let Some(session) = self.lock().remove(id) else {
            return false;
        };
        session.close();
        tracing::info!(
            session = %id,
            age_secs = (Utc::now() - session.created_at).num_seconds(),
            responses = session.recent.lock().unwrap_or_else(PoisonError::into_inner).len(),
            "Session closed"
        );
        true
    }

    /// Evict sessions idle for longer than `idle`, returning how many
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let evicted: Vec<Arc<Session>> = {
            let mut sessions = self.lock();
            let stale: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.idle_for() > idle)
                .map(|(id, _)| id.clone())
                .collect();
            stale.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &evicted {
            session.close();
            tracing::info!(session = %session.id(), "Evicted idle session");
        }
        evicted.len()
    }

    pub fn close_all(&self) {
        if self.is_empty() {
            return;
        }
        let drained: Vec<Arc<Session>> = self.lock().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close();
        }
        tracing::info!("Closed {} sessions", drained.len());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Periodically evict idle sessions
    pub fn spawn_sweeper(&self, idle: Duration, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = store.evict_idle(idle);
                if evicted > 0 {
                    tracing::debug!("Sweeper evicted {} sessions", evicted);
                }
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
