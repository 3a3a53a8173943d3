use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::api::moderation::{self, ActionOutcome};
use crate::api::{ApiClient, ApiError, logs, search};
use crate::config::types::AppConfig;

use super::interface::{Engine, EngineHandle, Event, Request, Scope};
use super::refresh::{DueHeadPoll, HeadPollScheduler};

/// Scheduler resolution. Poll intervals are whole seconds.
const TICK: Duration = Duration::from_secs(1);

/// The real HTTP backend engine.
pub struct HttpEngine {
    client: ApiClient,
}

impl HttpEngine {
    pub fn new(config: &AppConfig) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(&config.api)?,
        })
    }
}

impl Engine for HttpEngine {
    fn start(self) -> EngineHandle {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Request>();
        let handle = EngineHandle::new(tx);
        let _ = std::thread::Builder::new()
            .name("modfeed-engine".to_owned())
            .spawn(move || {
                let rt = tokio::runtime::Runtime::new().expect("tokio runtime init");
                rt.block_on(self.run_loop(rx));
            });
        handle
    }
}

impl HttpEngine {
    async fn run_loop(self, mut rx: UnboundedReceiver<Request>) {
        let mut scheduler = HeadPollScheduler::new();
        let mut poll_tick = tokio::time::interval(TICK);
        poll_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Consume the first immediate tick.
        poll_tick.tick().await;

        loop {
            tokio::select! {
                biased;
                maybe_req = rx.recv() => {
                    match maybe_req {
                        None | Some(Request::Shutdown) => {
                            tracing::debug!("engine: shutting down");
                            break;
                        }
                        Some(req) => dispatch(req, &self.client, &mut scheduler),
                    }
                }
                _ = poll_tick.tick() => {
                    if let Some(due) = scheduler.due() {
                        tracing::debug!("engine: head poll due for guild {}", due.guild_id);
                        tokio::spawn(poll_head(self.client.clone(), due));
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Request dispatch
// ---------------------------------------------------------------------------

/// Race `fut` against the scope's token. `None` means cancelled: no reply
/// may be sent.
async fn guarded<T>(
    scope: &Scope,
    fut: impl Future<Output = Result<T, ApiError>>,
) -> Option<Result<T, ApiError>> {
    let result = tokio::select! {
        biased;
        () = scope.token.cancelled() => return None,
        result = fut => result,
    };
    (!scope.is_cancelled()).then_some(result)
}

fn fetch_error(generation: u64, context: &str, err: &ApiError) -> Event {
    Event::FetchError {
        generation,
        context: context.to_owned(),
        message: err.user_message(),
    }
}

/// Registrations are applied inline; every network call runs as its own task
/// so a slow fetch never holds up the next request.
#[allow(clippy::too_many_lines)]
fn dispatch(req: Request, client: &ApiClient, scheduler: &mut HeadPollScheduler) {
    let client = client.clone();
    match req {
        // --- Full load ---
        Request::FetchLogs {
            scope,
            guild_id,
            query,
            reply_tx,
        } => {
            tokio::spawn(async move {
                let started = Instant::now();
                let fut = logs::fetch_logs(&client, &guild_id, &query);
                let Some(result) = guarded(&scope, fut).await else {
                    tracing::debug!("engine: FetchLogs gen={} cancelled", scope.generation);
                    return;
                };
                let event = match result {
                    Ok(events) => {
                        tracing::debug!(
                            "engine: sending LogsFetched gen={} count={}",
                            scope.generation,
                            events.len()
                        );
                        Event::LogsFetched {
                            generation: scope.generation,
                            events,
                            elapsed: started.elapsed(),
                        }
                    }
                    Err(e) => {
                        tracing::debug!("engine: FetchLogs error: {e}");
                        fetch_error(scope.generation, "FetchLogs", &e)
                    }
                };
                let _ = reply_tx.send(event);
            });
        }

        // --- Manual head poll ---
        Request::PollHead {
            scope,
            guild_id,
            query,
            reply_tx,
        } => {
            tokio::spawn(poll_head(
                client,
                DueHeadPoll {
                    scope,
                    guild_id,
                    query,
                    notify_tx: reply_tx,
                },
            ));
        }

        // --- Summary ---
        Request::FetchSummary {
            scope,
            guild_id,
            window,
            reply_tx,
        } => {
            tokio::spawn(async move {
                let fut = logs::fetch_summary(&client, &guild_id, window.as_str());
                let Some(result) = guarded(&scope, fut).await else {
                    return;
                };
                let event = match result {
                    Ok(summary) => Event::SummaryFetched {
                        generation: scope.generation,
                        summary,
                    },
                    Err(e) => {
                        tracing::debug!("engine: FetchSummary error: {e}");
                        fetch_error(scope.generation, "FetchSummary", &e)
                    }
                };
                let _ = reply_tx.send(event);
            });
        }

        // --- Single event ---
        Request::FetchEvent {
            scope,
            guild_id,
            log_id,
            reply_tx,
        } => {
            tokio::spawn(async move {
                let fut = logs::fetch_event(&client, &guild_id, &log_id);
                let Some(result) = guarded(&scope, fut).await else {
                    return;
                };
                let event = match result {
                    Ok(event) => Event::EventFetched {
                        generation: scope.generation,
                        event: Box::new(event),
                    },
                    Err(e) if e.is_not_found() => Event::EventNotFound {
                        generation: scope.generation,
                        log_id,
                    },
                    Err(e) => {
                        tracing::debug!("engine: FetchEvent {log_id} error: {e}");
                        fetch_error(scope.generation, "FetchEvent", &e)
                    }
                };
                let _ = reply_tx.send(event);
            });
        }

        // --- Name resolution batch ---
        Request::ResolveNames {
            scope,
            guild_id,
            kind,
            ids,
            reply_tx,
        } => {
            tokio::spawn(async move {
                let fut = search::resolve_batch(&client, &guild_id, kind, &ids);
                let Some(result) = guarded(&scope, fut).await else {
                    return;
                };
                let event = match result {
                    Ok(labels) => {
                        tracing::debug!(
                            "engine: resolved {}/{} {kind:?} ids",
                            labels.len(),
                            ids.len()
                        );
                        Event::NamesResolved {
                            generation: scope.generation,
                            kind,
                            requested: ids,
                            labels,
                        }
                    }
                    Err(e) => {
                        tracing::debug!("engine: ResolveNames {kind:?} error: {e}");
                        Event::NamesFailed {
                            generation: scope.generation,
                            kind,
                            requested: ids,
                        }
                    }
                };
                let _ = reply_tx.send(event);
            });
        }

        // --- Free-text search ---
        Request::Search {
            scope,
            guild_id,
            kind,
            q,
            reply_tx,
        } => {
            tokio::spawn(async move {
                let fut = search::search(&client, &guild_id, kind, &q);
                let Some(result) = guarded(&scope, fut).await else {
                    return;
                };
                let event = match result {
                    Ok(hits) => Event::SearchResults {
                        generation: scope.generation,
                        kind,
                        q,
                        hits,
                    },
                    Err(e) => fetch_error(scope.generation, "Search", &e),
                };
                let _ = reply_tx.send(event);
            });
        }

        // --- Register head poll ---
        Request::RegisterHeadPoll {
            scope,
            guild_id,
            query,
            interval,
            notify_tx,
        } => {
            tracing::debug!("engine: head poll every {interval:?} for guild {guild_id}");
            scheduler.register(scope, guild_id, query, interval, notify_tx);
        }
        Request::StopHeadPoll => scheduler.stop(),

        // --- Mutation ---
        Request::RunAction {
            generation,
            ticket,
            guild_id,
            action,
            dry_run,
            reply_tx,
        } => {
            tokio::spawn(async move {
                let name = action.name();
                let event = match moderation::run_action(&client, &guild_id, &action, dry_run).await {
                    Ok(ActionOutcome::Planned(plan)) => {
                        tracing::debug!("engine: {name} #{ticket} planned");
                        Event::ActionPlanned {
                            generation,
                            ticket,
                            plan,
                        }
                    }
                    Ok(ActionOutcome::Applied) => {
                        tracing::debug!("engine: {name} #{ticket} applied");
                        Event::ActionApplied { generation, ticket }
                    }
                    Err(e) => {
                        tracing::debug!("engine: {name} #{ticket} error: {e}");
                        Event::ActionFailed {
                            generation,
                            ticket,
                            message: e.user_message(),
                        }
                    }
                };
                let _ = reply_tx.send(event);
            });
        }

        Request::Shutdown => {}
    }
}

// ---------------------------------------------------------------------------
// Head poll
// ---------------------------------------------------------------------------

async fn poll_head(client: ApiClient, due: DueHeadPoll) {
    let DueHeadPoll {
        scope,
        guild_id,
        query,
        notify_tx,
    } = due;
    let started = Instant::now();
    let Some(result) = guarded(&scope, logs::fetch_logs(&client, &guild_id, &query)).await else {
        return;
    };
    let event = match result {
        Ok(events) => Event::HeadFetched {
            generation: scope.generation,
            events,
            elapsed: started.elapsed(),
        },
        Err(e) => {
            tracing::debug!("engine: head poll error: {e}");
            Event::HeadPollFailed {
                generation: scope.generation,
                message: e.to_string(),
            }
        }
    };
    let _ = notify_tx.send(event);
}
