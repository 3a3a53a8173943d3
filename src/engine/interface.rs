use std::sync::mpsc::Sender;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::search::{NameKind, SearchHit};
use crate::feed::recency::RecencyWindow;
use crate::query::LogQuery;
use crate::types::{ActionPlan, LogEvent, ModAction, Summary};

/// Handle to the backend engine held by the UI layer.
///
/// Cheaply cloneable. When the last handle is dropped the sender channel
/// closes, signalling the engine to shut down.
#[derive(Clone)]
pub struct EngineHandle {
    tx: tokio::sync::mpsc::UnboundedSender<Request>,
}

impl EngineHandle {
    pub(super) fn new(tx: tokio::sync::mpsc::UnboundedSender<Request>) -> Self {
        Self { tx }
    }

    /// A handle wired to a bare receiver, for driving a session without an
    /// engine thread.
    pub fn pair() -> (Self, tokio::sync::mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send a request to the engine. Non-blocking, returns immediately.
    pub fn send(&self, req: Request) {
        // Ignore errors: if the receiver is gone the engine has already shut down.
        let _ = self.tx.send(req);
    }
}

/// Trait implemented by both `HttpEngine` and `StubEngine`.
pub trait Engine: Send + 'static {
    fn start(self) -> EngineHandle;
}

/// Which session context a request belongs to.
///
/// The engine never replies once `token` is cancelled; `generation` is echoed
/// back so the session can drop replies from a previous context.
#[derive(Debug, Clone)]
pub struct Scope {
    pub generation: u64,
    pub token: CancellationToken,
}

impl Scope {
    pub fn new(generation: u64, token: CancellationToken) -> Self {
        Self { generation, token }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// All operations the UI layer can send to the engine.
pub enum Request {
    // -----------------------------------------------------------------------
    // Fetch operations (UI pulls data on demand)
    // -----------------------------------------------------------------------
    FetchLogs {
        scope: Scope,
        guild_id: String,
        query: LogQuery,
        reply_tx: Sender<Event>,
    },
    /// One-shot head poll (manual refresh).
    PollHead {
        scope: Scope,
        guild_id: String,
        query: LogQuery,
        reply_tx: Sender<Event>,
    },
    FetchSummary {
        scope: Scope,
        guild_id: String,
        window: RecencyWindow,
        reply_tx: Sender<Event>,
    },
    FetchEvent {
        scope: Scope,
        guild_id: String,
        log_id: String,
        reply_tx: Sender<Event>,
    },
    ResolveNames {
        scope: Scope,
        guild_id: String,
        kind: NameKind,
        ids: Vec<String>,
        reply_tx: Sender<Event>,
    },
    Search {
        scope: Scope,
        guild_id: String,
        kind: NameKind,
        q: String,
        reply_tx: Sender<Event>,
    },

    // -----------------------------------------------------------------------
    // Background head polling (stream mode)
    // -----------------------------------------------------------------------
    /// Replaces any existing registration.
    RegisterHeadPoll {
        scope: Scope,
        guild_id: String,
        query: LogQuery,
        interval: Duration,
        notify_tx: Sender<Event>,
    },
    StopHeadPoll,

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------
    /// Not cancellable once sent.
    RunAction {
        generation: u64,
        ticket: u64,
        guild_id: String,
        action: ModAction,
        dry_run: bool,
        reply_tx: Sender<Event>,
    },

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------
    Shutdown,
}

/// All events the engine can push back to the session.
#[derive(Debug)]
pub enum Event {
    // -----------------------------------------------------------------------
    // Fetch results
    // -----------------------------------------------------------------------
    LogsFetched {
        generation: u64,
        events: Vec<LogEvent>,
        elapsed: Duration,
    },
    HeadFetched {
        generation: u64,
        events: Vec<LogEvent>,
        elapsed: Duration,
    },
    /// Polls fail silently; the session only logs this.
    HeadPollFailed {
        generation: u64,
        message: String,
    },
    SummaryFetched {
        generation: u64,
        summary: Summary,
    },
    EventFetched {
        generation: u64,
        event: Box<LogEvent>,
    },
    EventNotFound {
        generation: u64,
        log_id: String,
    },
    NamesResolved {
        generation: u64,
        kind: NameKind,
        requested: Vec<String>,
        labels: Vec<(String, String)>,
    },
    NamesFailed {
        generation: u64,
        kind: NameKind,
        requested: Vec<String>,
    },
    SearchResults {
        generation: u64,
        kind: NameKind,
        q: String,
        hits: Vec<SearchHit>,
    },
    /// Unified error event for fetch failures that reach the user.
    FetchError {
        generation: u64,
        context: String,
        message: String,
    },

    // -----------------------------------------------------------------------
    // Mutation results
    // -----------------------------------------------------------------------
    ActionPlanned {
        generation: u64,
        ticket: u64,
        plan: ActionPlan,
    },
    ActionApplied {
        generation: u64,
        ticket: u64,
    },
    ActionFailed {
        generation: u64,
        ticket: u64,
        message: String,
    },
}

impl Event {
    pub fn generation(&self) -> u64 {
        match *self {
            Self::LogsFetched { generation, .. }
            | Self::HeadFetched { generation, .. }
            | Self::HeadPollFailed { generation, .. }
            | Self::SummaryFetched { generation, .. }
            | Self::EventFetched { generation, .. }
            | Self::EventNotFound { generation, .. }
            | Self::NamesResolved { generation, .. }
            | Self::NamesFailed { generation, .. }
            | Self::SearchResults { generation, .. }
            | Self::FetchError { generation, .. }
            | Self::ActionPlanned { generation, .. }
            | Self::ActionApplied { generation, .. }
            | Self::ActionFailed { generation, .. } => generation,
        }
    }
}
