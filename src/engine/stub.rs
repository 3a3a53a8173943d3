use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::api::search::{NameKind, SearchHit};
use crate::query::LogQuery;
use crate::types::{ActionPlan, LogEvent, ModAction, Summary};

use super::interface::{Engine, EngineHandle, Event, Request};

/// Every action the stub received, with its dry-run flag.
pub type ActionLog = Arc<Mutex<Vec<(ModAction, bool)>>>;

/// A stub engine that serves pre-loaded fixture data without any network calls.
///
/// Useful for integration tests and demos that must not require a backend.
/// Queries are evaluated locally against `events`.
#[derive(Default)]
pub struct StubEngine {
    pub events: Vec<LogEvent>,
    pub members: Vec<SearchHit>,
    pub channels: Vec<SearchHit>,
    pub summary: Summary,
    pub plan: ActionPlan,
    pub action_log: ActionLog,
}

impl Engine for StubEngine {
    fn start(self) -> EngineHandle {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Request>();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().expect("stub tokio runtime");
            rt.block_on(self.run_loop(rx));
        });
        EngineHandle::new(tx)
    }
}

impl StubEngine {
    fn query(&self, query: &LogQuery) -> Vec<LogEvent> {
        let mut out: Vec<LogEvent> = self
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out.truncate(query.limit as usize);
        out
    }

    fn directory(&self, kind: NameKind) -> &[SearchHit] {
        match kind {
            NameKind::Member => &self.members,
            NameKind::Channel => &self.channels,
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn run_loop(self, mut rx: UnboundedReceiver<Request>) {
        while let Some(req) = rx.recv().await {
            match req {
                Request::FetchLogs {
                    scope,
                    query,
                    reply_tx,
                    ..
                } => {
                    if scope.is_cancelled() {
                        continue;
                    }
                    let _ = reply_tx.send(Event::LogsFetched {
                        generation: scope.generation,
                        events: self.query(&query),
                        elapsed: Duration::ZERO,
                    });
                }
                Request::PollHead {
                    scope,
                    query,
                    reply_tx,
                    ..
                } => {
                    if scope.is_cancelled() {
                        continue;
                    }
                    let _ = reply_tx.send(Event::HeadFetched {
                        generation: scope.generation,
                        events: self.query(&query),
                        elapsed: Duration::ZERO,
                    });
                }
                Request::FetchSummary {
                    scope, reply_tx, ..
                } => {
                    let _ = reply_tx.send(Event::SummaryFetched {
                        generation: scope.generation,
                        summary: self.summary.clone(),
                    });
                }
                Request::FetchEvent {
                    scope,
                    log_id,
                    reply_tx,
                    ..
                } => {
                    let event = match self.events.iter().find(|e| e.id == log_id) {
                        Some(event) => Event::EventFetched {
                            generation: scope.generation,
                            event: Box::new(event.clone()),
                        },
                        None => Event::EventNotFound {
                            generation: scope.generation,
                            log_id,
                        },
                    };
                    let _ = reply_tx.send(event);
                }
                Request::ResolveNames {
                    scope,
                    kind,
                    ids,
                    reply_tx,
                    ..
                } => {
                    let labels = self
                        .directory(kind)
                        .iter()
                        .filter(|h| ids.contains(&h.id))
                        .filter_map(|h| Some((h.id.clone(), h.known_label(kind)?)))
                        .collect();
                    let _ = reply_tx.send(Event::NamesResolved {
                        generation: scope.generation,
                        kind,
                        requested: ids,
                        labels,
                    });
                }
                Request::Search {
                    scope,
                    kind,
                    q,
                    reply_tx,
                    ..
                } => {
                    let needle = q.to_lowercase();
                    let hits = self
                        .directory(kind)
                        .iter()
                        .filter(|h| h.label(kind).to_lowercase().contains(&needle))
                        .cloned()
                        .collect();
                    let _ = reply_tx.send(Event::SearchResults {
                        generation: scope.generation,
                        kind,
                        q,
                        hits,
                    });
                }

                // Polling registration is ignored by the stub
                Request::RegisterHeadPoll { .. } | Request::StopHeadPoll => {}

                // Every action succeeds instantly
                Request::RunAction {
                    generation,
                    ticket,
                    action,
                    dry_run,
                    reply_tx,
                    ..
                } => {
                    if let Ok(mut log) = self.action_log.lock() {
                        log.push((action, dry_run));
                    }
                    let event = if dry_run {
                        Event::ActionPlanned {
                            generation,
                            ticket,
                            plan: self.plan.clone(),
                        }
                    } else {
                        Event::ActionApplied { generation, ticket }
                    };
                    let _ = reply_tx.send(event);
                }

                Request::Shutdown => break,
            }
        }
    }
}
