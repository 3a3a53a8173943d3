use std::sync::mpsc::Sender;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::actions::flow::{ActionCommand, ActionFlow, ActionSource, FlowError, FlowOutcome};
use crate::api::ApiError;
use crate::api::search::SearchHit;
use crate::config::types::AppConfig;
use crate::engine::{EngineHandle, Event, Request, Scope};
use crate::export::{self, ExportFormat};
use crate::filter::FilterState;
use crate::prefs::{PrefStore, PrefsError, presets};
use crate::query::build_query;
use crate::types::{LogEvent, Millis, ModAction, Summary};

use super::card::CardContext;
use super::live::{self, AppendOptions, LiveState};
use super::names::{NameCache, NameKind, NameResolver};
use super::notify::{Level, Toasts, new_events_text};
use super::recency::{RECENCY_TICK_MS, RecencyWindow};
use super::render::{FeedView, RenderMode, Unresolved};

fn ms(v: u64) -> Millis {
    Millis::try_from(v).unwrap_or(Millis::MAX)
}

/// Timing and formatting knobs, resolved once from the config file.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub head_window: u32,
    pub poll_interval: Duration,
    pub long_pause_ms: Millis,
    pub date_format: String,
    pub toast_ms: Millis,
    pub flash_ms: Millis,
    pub recency: RecencyWindow,
    pub debounce_ms: Millis,
    pub batch_cap: usize,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let feed = &config.feed;
        Self {
            head_window: feed.head_window.max(1),
            poll_interval: Duration::from_secs(feed.poll_interval_secs.max(1)),
            long_pause_ms: ms(feed.long_pause_secs).saturating_mul(1_000),
            date_format: feed.date_format.clone(),
            toast_ms: ms(feed.toast_ms),
            flash_ms: ms(feed.flash_ms),
            recency: feed.recency_window,
            debounce_ms: ms(config.names.debounce_ms),
            batch_cap: config.names.batch_cap,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Round trips of the last full load and head poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Latency {
    pub full: Option<Duration>,
    pub head: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub kind: NameKind,
    pub q: String,
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    /// The one hit the query names: an exact, case-insensitive match on a
    /// username, nickname or channel name, else the only hit returned.
    pub fn unique_match(&self) -> Option<&SearchHit> {
        let needle = self.q.trim_start_matches(['@', '#']).to_lowercase();
        let mut exact = self.hits.iter().filter(|h| {
            [&h.username, &h.nickname, &h.display_name, &h.name]
                .into_iter()
                .flatten()
                .any(|n| n.to_lowercase() == needle)
        });
        match (exact.next(), exact.next()) {
            (Some(hit), None) => Some(hit),
            (Some(_), Some(_)) => None,
            (None, _) if self.hits.len() == 1 => self.hits.first(),
            (None, _) => None,
        }
    }
}

fn card_ctx<'a>(
    names: &'a NameResolver,
    settings: &'a SessionSettings,
    recency: RecencyWindow,
    now: Millis,
) -> CardContext<'a> {
    CardContext {
        names,
        date_format: &settings.date_format,
        recency,
        now,
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// All mutable state behind one feed view.
///
/// The driver owns the session on a single thread: it forwards engine events
/// to [`handle_event`](Self::handle_event) in arrival order and calls
/// [`tick`](Self::tick) whenever [`next_deadline`](Self::next_deadline)
/// passes. Every request carries the current generation and cancellation
/// token; switching guild or reloading bumps both, so a slow reply from an
/// earlier context can never touch the view.
pub struct FeedSession {
    engine: EngineHandle,
    reply_tx: Sender<Event>,
    guild_id: String,
    settings: SessionSettings,
    prefs: PrefStore,
    filter: FilterState,
    recency: RecencyWindow,

    view: FeedView,
    live: LiveState,
    names: NameResolver,
    actions: ActionFlow,
    toasts: Toasts,

    generation: u64,
    token: CancellationToken,
    loading: bool,
    latency: Latency,
    summary: Option<Summary>,
    detail: Option<LogEvent>,
    search: Option<SearchResults>,
    outcome: Option<FlowOutcome>,
    last_recency_tick: Millis,
}

impl FeedSession {
    pub fn new(
        engine: EngineHandle,
        reply_tx: Sender<Event>,
        guild_id: impl Into<String>,
        settings: SessionSettings,
        cache: NameCache,
        prefs: PrefStore,
    ) -> Self {
        let filter = prefs.prefs().filter.clone();
        let recency = prefs.prefs().recency_window.unwrap_or(settings.recency);
        let names = NameResolver::new(cache, settings.debounce_ms, settings.batch_cap);
        Self {
            engine,
            reply_tx,
            guild_id: guild_id.into(),
            settings,
            prefs,
            filter,
            recency,
            view: FeedView::new(),
            live: LiveState::default(),
            names,
            actions: ActionFlow::default(),
            toasts: Toasts::default(),
            generation: 0,
            token: CancellationToken::new(),
            loading: false,
            latency: Latency::default(),
            summary: None,
            detail: None,
            search: None,
            outcome: None,
            last_recency_tick: 0,
        }
    }

    // --- accessors ---

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn view(&self) -> &FeedView {
        &self.view
    }

    pub fn live(&self) -> &LiveState {
        &self.live
    }

    pub fn names(&self) -> &NameResolver {
        &self.names
    }

    pub fn toasts(&self) -> &Toasts {
        &self.toasts
    }

    pub fn actions(&self) -> &ActionFlow {
        &self.actions
    }

    pub fn prefs(&self) -> &PrefStore {
        &self.prefs
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn latency(&self) -> Latency {
        self.latency
    }

    pub fn recency(&self) -> RecencyWindow {
        self.recency
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn detail(&self) -> Option<&LogEvent> {
        self.detail.as_ref()
    }

    pub fn search_results(&self) -> Option<&SearchResults> {
        self.search.as_ref()
    }

    /// The last terminal result of the action flow, consumed once.
    pub fn take_outcome(&mut self) -> Option<FlowOutcome> {
        self.outcome.take()
    }

    fn scope(&self) -> Scope {
        Scope::new(self.generation, self.token.clone())
    }

    fn observe(&mut self, unresolved: Unresolved, now: Millis) {
        for (kind, id) in unresolved {
            self.names.observe(kind, &id, now);
        }
    }

    /// Show a transient notification.
    pub fn notify(&mut self, level: Level, text: impl Into<String>, now: Millis) {
        self.toasts.push(level, text, now, self.settings.toast_ms);
    }

    fn report(&mut self, result: Result<(), PrefsError>, now: Millis) {
        if let Err(e) = result {
            tracing::warn!("session: {e}");
            self.toasts
                .push(Level::Error, e.to_string(), now, self.settings.toast_ms);
        }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Abandon everything in flight for the current context.
    fn bump_generation(&mut self, now: Millis) {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.generation += 1;
        self.names.abandon_in_flight(now);
    }

    /// Full load of the configured window.
    pub fn reload(&mut self, now: Millis) {
        self.bump_generation(now);
        self.loading = true;
        tracing::debug!(
            "session: reload gen={} guild={}",
            self.generation,
            self.guild_id
        );
        self.engine.send(Request::FetchLogs {
            scope: self.scope(),
            guild_id: self.guild_id.clone(),
            query: build_query(&self.filter),
            reply_tx: self.reply_tx.clone(),
        });
    }

    /// Point the session at another guild. The label cache survives.
    pub fn switch_guild(&mut self, guild_id: impl Into<String>, now: Millis) {
        self.engine.send(Request::StopHeadPoll);
        self.guild_id = guild_id.into();
        self.names = NameResolver::new(
            self.names.cache().clone(),
            self.settings.debounce_ms,
            self.settings.batch_cap,
        );
        self.view.clear();
        self.live.clear();
        self.actions.reset();
        self.summary = None;
        self.detail = None;
        self.search = None;
        self.latency = Latency::default();
        self.reload(now);
    }

    /// Manual refresh: a head poll, or a full reload when grouped.
    pub fn refresh(&mut self, now: Millis) {
        if self.filter.group_by_mod {
            self.reload(now);
            return;
        }
        self.engine.send(Request::PollHead {
            scope: self.scope(),
            guild_id: self.guild_id.clone(),
            query: build_query(&self.filter).head(self.settings.head_window),
            reply_tx: self.reply_tx.clone(),
        });
    }

    fn register_stream(&self) {
        if !self.filter.stream || self.filter.group_by_mod {
            self.engine.send(Request::StopHeadPoll);
            return;
        }
        self.engine.send(Request::RegisterHeadPoll {
            scope: self.scope(),
            guild_id: self.guild_id.clone(),
            query: build_query(&self.filter).head(self.settings.head_window),
            interval: self.settings.poll_interval,
            notify_tx: self.reply_tx.clone(),
        });
    }

    /// Switch between automatic and manual refresh.
    pub fn set_stream(&mut self, on: bool, now: Millis) {
        self.filter.stream = on;
        let result = self.prefs.set_filter(&self.filter);
        self.report(result, now);
        if self.loading {
            // Registered once the pending load lands.
            return;
        }
        self.register_stream();
    }

    // -----------------------------------------------------------------------
    // Filter and pins
    // -----------------------------------------------------------------------

    /// Change the filter, persist it and reload.
    pub fn update_filter(&mut self, f: impl FnOnce(&mut FilterState), now: Millis) {
        f(&mut self.filter);
        self.filter.normalize();
        let result = self.prefs.set_filter(&self.filter);
        self.report(result, now);
        self.reload(now);
    }

    fn rerender(&mut self, now: Millis) {
        let ctx = card_ctx(&self.names, &self.settings, self.recency, now);
        let unresolved = self.view.rerender(&self.filter, &ctx);
        self.observe(unresolved, now);
    }

    pub fn toggle_pin(&mut self, key: &str, now: Millis) {
        self.filter.toggle_pin(key);
        let result = self.prefs.set_filter(&self.filter);
        self.report(result, now);
        self.rerender(now);
    }

    /// Move a pinned id within the custom pin order.
    pub fn move_pin(&mut self, key: &str, to: usize, now: Millis) {
        self.filter.move_pin(key, to);
        let result = self.prefs.set_filter(&self.filter);
        self.report(result, now);
        self.rerender(now);
    }

    // -----------------------------------------------------------------------
    // Engine events
    // -----------------------------------------------------------------------

    /// Apply one engine event. Returns whether anything visible changed.
    #[allow(clippy::too_many_lines)]
    pub fn handle_event(&mut self, event: Event, now: Millis) -> bool {
        let is_action = matches!(
            event,
            Event::ActionPlanned { .. } | Event::ActionApplied { .. } | Event::ActionFailed { .. }
        );
        // Action replies are matched by ticket instead: a filter reload must
        // not strand an action that was already confirmed.
        if !is_action && event.generation() != self.generation {
            tracing::debug!(
                "session: dropping stale event gen={} (current {})",
                event.generation(),
                self.generation
            );
            return false;
        }

        match event {
            Event::LogsFetched {
                events, elapsed, ..
            } => {
                self.loading = false;
                if self.filter.show_latency {
                    self.latency.full = Some(elapsed);
                }
                let ctx = card_ctx(&self.names, &self.settings, self.recency, now);
                let unresolved = self.view.load(events, &self.filter, &ctx);
                self.live.reset(self.view.events(), now);
                self.observe(unresolved, now);
                self.register_stream();
                true
            }
            Event::HeadFetched {
                events, elapsed, ..
            } => {
                if self.filter.show_latency {
                    self.latency.head = Some(elapsed);
                }
                let opts = AppendOptions {
                    order_desc: self.filter.order_desc,
                    long_pause_ms: self.settings.long_pause_ms,
                    flash_ms: self.settings.flash_ms,
                };
                let ctx = card_ctx(&self.names, &self.settings, self.recency, now);
                let outcome = live::append_head(&mut self.view, &mut self.live, &events, &ctx, opts);
                if outcome.inserted > 0 {
                    self.toasts.push(
                        Level::Info,
                        new_events_text(outcome.inserted),
                        now,
                        self.settings.toast_ms,
                    );
                }
                let inserted = outcome.inserted;
                self.observe(outcome.unresolved, now);
                inserted > 0 || self.filter.show_latency
            }
            Event::HeadPollFailed { message, .. } => {
                tracing::debug!("session: head poll skipped: {message}");
                false
            }
            Event::SummaryFetched { summary, .. } => {
                self.summary = Some(summary);
                true
            }
            Event::EventFetched { event, .. } => {
                self.detail = Some(*event);
                true
            }
            Event::EventNotFound { log_id, .. } => {
                tracing::debug!("session: event {log_id} not found");
                let msg = ApiError::NotFound {
                    what: "event".to_owned(),
                }
                .user_message();
                self.toasts.push(Level::Error, msg, now, self.settings.toast_ms);
                true
            }
            Event::NamesResolved {
                kind,
                requested,
                labels,
                ..
            } => {
                let labels = self.names.complete(kind, &requested, labels, now);
                self.view.apply_labels(kind, &labels) > 0
            }
            Event::NamesFailed {
                kind, requested, ..
            } => {
                self.names.fail(kind, &requested, now);
                false
            }
            Event::SearchResults { kind, q, hits, .. } => {
                self.search = Some(SearchResults { kind, q, hits });
                true
            }
            Event::FetchError {
                context, message, ..
            } => {
                tracing::warn!("session: {context} failed: {message}");
                if context == "FetchLogs" {
                    self.loading = false;
                }
                self.toasts
                    .push(Level::Error, message, now, self.settings.toast_ms);
                true
            }
            Event::ActionPlanned { ticket, plan, .. } => {
                let Some(outcome) = self.actions.on_planned(ticket, plan) else {
                    return false;
                };
                self.outcome = Some(outcome);
                true
            }
            Event::ActionApplied { ticket, .. } => {
                let Some(outcome) = self.actions.on_applied(ticket) else {
                    return false;
                };
                if let FlowOutcome::Applied(ref action) = outcome {
                    self.toasts.push(
                        Level::Info,
                        format!("{} applied", action.label()),
                        now,
                        self.settings.toast_ms,
                    );
                }
                self.outcome = Some(outcome);
                // The action usually produces a new log entry.
                self.refresh(now);
                true
            }
            Event::ActionFailed {
                ticket, message, ..
            } => {
                let Some(outcome) = self.actions.on_failed(ticket, message.clone()) else {
                    return false;
                };
                self.toasts
                    .push(Level::Error, message, now, self.settings.toast_ms);
                self.outcome = Some(outcome);
                true
            }
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Run every timer that is due. Returns whether anything visible changed.
    pub fn tick(&mut self, now: Millis) -> bool {
        for batch in self.names.take_due(now) {
            tracing::debug!(
                "session: resolving {} {:?} ids",
                batch.ids.len(),
                batch.kind
            );
            self.engine.send(Request::ResolveNames {
                scope: self.scope(),
                guild_id: self.guild_id.clone(),
                kind: batch.kind,
                ids: batch.ids,
                reply_tx: self.reply_tx.clone(),
            });
        }
        let mut changed = self.toasts.expire(now);
        changed |= self.view.clear_expired_flash(now);
        if now - self.last_recency_tick >= RECENCY_TICK_MS {
            self.view.recompute_recency(self.recency, now);
            self.last_recency_tick = now;
            changed = true;
        }
        changed
    }

    /// When [`tick`](Self::tick) next has work to do.
    pub fn next_deadline(&self) -> Millis {
        [
            self.names.next_deadline(),
            self.toasts.next_expiry(),
            self.view.next_flash_expiry(),
        ]
        .into_iter()
        .flatten()
        .fold(self.last_recency_tick + RECENCY_TICK_MS, Millis::min)
    }

    // -----------------------------------------------------------------------
    // View interaction
    // -----------------------------------------------------------------------

    /// The chunk sentinel scrolled into view. Returns whether cards were added.
    pub fn on_sentinel_visible(&mut self, now: Millis) -> bool {
        let before = self.view.items().len();
        let ctx = card_ctx(&self.names, &self.settings, self.recency, now);
        let unresolved = self.view.on_sentinel_visible(&ctx);
        self.observe(unresolved, now);
        self.view.items().len() != before
    }

    pub fn toggle_card(&mut self, id: &str) -> bool {
        self.view.toggle_card(id)
    }

    pub fn toggle_group(&mut self, key: &str, now: Millis) {
        let ctx = card_ctx(&self.names, &self.settings, self.recency, now);
        let unresolved = self.view.toggle_group(key, &ctx);
        self.observe(unresolved, now);
    }

    pub fn set_recency_window(&mut self, window: RecencyWindow, now: Millis) {
        self.recency = window;
        let result = self.prefs.update(|p| {
            p.recency_window = Some(window);
            Ok(())
        });
        self.report(result, now);
        self.view.recompute_recency(window, now);
        self.last_recency_tick = now;
        self.fetch_summary();
    }

    pub fn set_always_dry_run(&mut self, on: bool, now: Millis) {
        let result = self.prefs.update(|p| {
            p.always_dry_run = on;
            Ok(())
        });
        self.report(result, now);
    }

    // -----------------------------------------------------------------------
    // Side fetches
    // -----------------------------------------------------------------------

    pub fn fetch_summary(&self) {
        self.engine.send(Request::FetchSummary {
            scope: self.scope(),
            guild_id: self.guild_id.clone(),
            window: self.recency,
            reply_tx: self.reply_tx.clone(),
        });
    }

    pub fn fetch_event(&mut self, log_id: &str) {
        self.detail = None;
        self.engine.send(Request::FetchEvent {
            scope: self.scope(),
            guild_id: self.guild_id.clone(),
            log_id: log_id.to_owned(),
            reply_tx: self.reply_tx.clone(),
        });
    }

    pub fn search(&mut self, kind: NameKind, q: &str) {
        self.engine.send(Request::Search {
            scope: self.scope(),
            guild_id: self.guild_id.clone(),
            kind,
            q: q.trim().to_owned(),
            reply_tx: self.reply_tx.clone(),
        });
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    fn send_action(&self, cmd: ActionCommand) {
        tracing::debug!(
            "session: {} #{} dry_run={}",
            cmd.action.name(),
            cmd.ticket,
            cmd.dry_run
        );
        self.engine.send(Request::RunAction {
            generation: self.generation,
            ticket: cmd.ticket,
            guild_id: self.guild_id.clone(),
            action: cmd.action,
            dry_run: cmd.dry_run,
            reply_tx: self.reply_tx.clone(),
        });
    }

    pub fn begin_action(&mut self, action: ModAction, source: ActionSource) -> Result<(), FlowError> {
        let always_dry_run = self.prefs.prefs().always_dry_run;
        let cmd = self.actions.begin(action, source, always_dry_run)?;
        self.send_action(cmd);
        Ok(())
    }

    /// Answer the confirmation surface for the pending plan.
    pub fn confirm_action(&mut self, yes: bool) -> Result<(), FlowError> {
        match self.actions.confirm(yes)? {
            Some(cmd) => self.send_action(cmd),
            None => self.outcome = Some(FlowOutcome::Cancelled),
        }
        Ok(())
    }

    pub fn cancel_action(&mut self) -> bool {
        match self.actions.cancel() {
            Some(outcome) => {
                self.outcome = Some(outcome);
                true
            }
            None => false,
        }
    }

    /// Shortcut for the quick-action buttons on a card.
    pub fn quick_action(&mut self, log_id: &str, index: usize) -> Result<bool, FlowError> {
        let Some(action) = self
            .view
            .card(log_id)
            .and_then(|c| c.actions.get(index).cloned())
        else {
            return Ok(false);
        };
        self.begin_action(action, ActionSource::QuickAction)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Presets
    // -----------------------------------------------------------------------

    pub fn save_preset(&mut self, name: &str) -> Result<(), PrefsError> {
        let filter = self.filter.clone();
        self.prefs.update(|p| presets::save(p, name, &filter))
    }

    /// Replace the live filter with the preset and reload.
    pub fn apply_preset(&mut self, name: &str, now: Millis) -> Result<(), PrefsError> {
        self.filter = self.prefs.update(|p| presets::apply(p, name))?;
        self.reload(now);
        Ok(())
    }

    pub fn delete_preset(&mut self, name: &str, confirmed: bool) -> Result<(), PrefsError> {
        self.prefs.update(|p| presets::delete(p, name, confirmed))
    }

    pub fn preset_names(&self) -> Vec<&str> {
        presets::list(self.prefs.prefs())
    }

    pub fn is_grouped(&self) -> bool {
        self.view.mode() == RenderMode::Grouped
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    /// Snapshot of the whole loaded batch, or of one group. `None` when the
    /// group does not exist.
    pub fn export(
        &self,
        format: ExportFormat,
        group: Option<&str>,
        now: Millis,
    ) -> Option<Result<String, serde_json::Error>> {
        let ctx = card_ctx(&self.names, &self.settings, self.recency, now);
        match group {
            Some(key) => export::export_group(&self.view, key, format, &ctx),
            None => Some(export::export(self.view.events(), format, &ctx)),
        }
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::prefs::Prefs;
    use crate::types::{ActionPlan, RawLogEvent};

    fn ban(id: &str, executor: &str, user: &str, ts: Millis) -> LogEvent {
        let raw: RawLogEvent = serde_json::from_value(serde_json::json!({
            "id": id, "timestamp": ts, "type": "mod_ban_add",
            "data": { "executorId": executor, "userId": user }
        }))
        .unwrap();
        LogEvent::try_from(raw).unwrap()
    }

    fn session(prefs: Prefs) -> (FeedSession, UnboundedReceiver<Request>) {
        let (engine, rx) = EngineHandle::pair();
        let (reply_tx, _reply_rx) = std::sync::mpsc::channel();
        let s = FeedSession::new(
            engine,
            reply_tx,
            "G1",
            SessionSettings::default(),
            NameCache::new(),
            PrefStore::in_memory(prefs),
        );
        (s, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Request>) -> Vec<Request> {
        let mut out = Vec::new();
        while let Ok(req) = rx.try_recv() {
            out.push(req);
        }
        out
    }

    fn lookups_of(reqs: &[Request], wanted: &str) -> usize {
        reqs.iter()
            .filter(|r| matches!(r, Request::ResolveNames { ids, .. } if ids.iter().any(|i| i == wanted)))
            .count()
    }

    fn run_actions(reqs: &[Request]) -> Vec<(ModAction, bool)> {
        reqs.iter()
            .filter_map(|r| match r {
                Request::RunAction {
                    action, dry_run, ..
                } => Some((action.clone(), *dry_run)),
                _ => None,
            })
            .collect()
    }

    fn unban() -> ModAction {
        ModAction::Unban {
            user_id: "U2".into(),
        }
    }

    fn plan() -> ActionPlan {
        ActionPlan {
            plan: serde_json::json!({ "op": "unban" }),
            risks: vec![],
        }
    }

    #[test]
    fn name_is_looked_up_once_per_session() {
        let (mut s, mut rx) = session(Prefs::default());
        let mut sent = Vec::new();

        s.reload(0);
        let generation = s.generation();
        s.handle_event(
            Event::LogsFetched {
                generation,
                events: vec![ban("1", "U1", "U2", 1_000)],
                elapsed: Duration::ZERO,
            },
            0,
        );
        s.tick(1_000);
        sent.extend(drain(&mut rx));
        assert_eq!(lookups_of(&sent, "U1"), 1);

        s.handle_event(
            Event::NamesResolved {
                generation,
                kind: NameKind::Member,
                requested: vec!["U1".into(), "U2".into()],
                labels: vec![("U1".into(), "alice".into())],
            },
            1_100,
        );
        assert_eq!(s.view().cards().next().unwrap().executor.as_ref().unwrap().text, "alice");

        // Two more cards referencing U1, through a poll and a reload.
        s.handle_event(
            Event::HeadFetched {
                generation,
                events: vec![ban("2", "U1", "U3", 2_000)],
                elapsed: Duration::ZERO,
            },
            2_000,
        );
        s.reload(3_000);
        let generation = s.generation();
        s.handle_event(
            Event::LogsFetched {
                generation,
                events: vec![ban("3", "U1", "U3", 3_000), ban("2", "U1", "U3", 2_000)],
                elapsed: Duration::ZERO,
            },
            3_000,
        );
        s.tick(10_000);
        s.tick(20_000);
        sent.extend(drain(&mut rx));
        assert_eq!(lookups_of(&sent, "U1"), 1);
        assert!(lookups_of(&sent, "U3") >= 1);
    }

    #[test]
    fn modal_dry_run_gates_the_apply_call() {
        let (mut s, mut rx) = session(Prefs::default());
        s.begin_action(unban(), ActionSource::Modal).unwrap();
        let ticket = match s.actions().state() {
            crate::actions::FlowState::DryRunRequested { ticket, .. } => *ticket,
            other => panic!("unexpected state {other:?}"),
        };
        assert_eq!(run_actions(&drain(&mut rx)), vec![(unban(), true)]);

        s.handle_event(
            Event::ActionPlanned {
                generation: 0,
                ticket,
                plan: plan(),
            },
            0,
        );
        assert!(matches!(s.take_outcome(), Some(FlowOutcome::Planned(_))));
        s.confirm_action(false).unwrap();
        assert_eq!(s.take_outcome(), Some(FlowOutcome::Cancelled));
        assert!(run_actions(&drain(&mut rx)).is_empty());

        s.begin_action(unban(), ActionSource::Modal).unwrap();
        let ticket = match s.actions().state() {
            crate::actions::FlowState::DryRunRequested { ticket, .. } => *ticket,
            other => panic!("unexpected state {other:?}"),
        };
        s.handle_event(
            Event::ActionPlanned {
                generation: 0,
                ticket,
                plan: plan(),
            },
            0,
        );
        s.confirm_action(true).unwrap();
        assert_eq!(
            run_actions(&drain(&mut rx)),
            vec![(unban(), true), (unban(), false)]
        );
    }

    #[test]
    fn modal_without_dry_run_pref_applies_directly() {
        let prefs = Prefs {
            always_dry_run: false,
            ..Prefs::default()
        };
        let (mut s, mut rx) = session(prefs);
        s.begin_action(unban(), ActionSource::Modal).unwrap();
        assert_eq!(run_actions(&drain(&mut rx)), vec![(unban(), false)]);
        assert!(matches!(
            s.begin_action(unban(), ActionSource::QuickAction),
            Err(FlowError::Busy)
        ));
    }

    #[test]
    fn stale_generation_is_discarded() {
        let (mut s, _rx) = session(Prefs::default());
        s.reload(0);
        let old = s.generation();
        s.switch_guild("G2", 0);
        assert_ne!(s.generation(), old);
        let changed = s.handle_event(
            Event::LogsFetched {
                generation: old,
                events: vec![ban("1", "U1", "U2", 1_000)],
                elapsed: Duration::ZERO,
            },
            0,
        );
        assert!(!changed);
        assert!(s.view().items().is_empty());
        assert!(s.is_loading());
    }

    #[test]
    fn switching_guild_cancels_the_previous_token() {
        let (mut s, mut rx) = session(Prefs::default());
        s.reload(0);
        let Some(Request::FetchLogs { scope, .. }) = drain(&mut rx).pop() else {
            panic!("expected FetchLogs");
        };
        s.switch_guild("G2", 0);
        assert!(scope.is_cancelled());
        let reqs = drain(&mut rx);
        assert!(matches!(reqs.first(), Some(Request::StopHeadPoll)));
        assert!(
            matches!(reqs.last(), Some(Request::FetchLogs { guild_id, .. }) if guild_id == "G2")
        );
    }

    #[test]
    fn stream_mode_registers_after_load() {
        let mut prefs = Prefs::default();
        prefs.filter.stream = true;
        let (mut s, mut rx) = session(prefs);
        s.reload(0);
        drain(&mut rx);
        let generation = s.generation();
        s.handle_event(
            Event::LogsFetched {
                generation,
                events: vec![],
                elapsed: Duration::ZERO,
            },
            0,
        );
        let reqs = drain(&mut rx);
        assert!(matches!(
            reqs.as_slice(),
            [Request::RegisterHeadPoll { query, .. }] if query.limit == 5
        ));
    }

    #[test]
    fn live_append_toasts_the_count() {
        let (mut s, _rx) = session(Prefs::default());
        s.reload(0);
        let generation = s.generation();
        s.handle_event(
            Event::LogsFetched {
                generation,
                events: vec![ban("1", "U1", "U2", 1_000)],
                elapsed: Duration::ZERO,
            },
            0,
        );
        let head = vec![ban("3", "U1", "U2", 3_000), ban("2", "U1", "U2", 2_000)];
        assert!(s.handle_event(
            Event::HeadFetched {
                generation,
                events: head.clone(),
                elapsed: Duration::ZERO,
            },
            10_000,
        ));
        assert_eq!(s.toasts().iter().next().unwrap().text, "2 new events");
        assert_eq!(s.view().rendered_ids(), vec!["3", "2", "1"]);

        // Same window again: nothing changes.
        assert!(!s.handle_event(
            Event::HeadFetched {
                generation,
                events: head,
                elapsed: Duration::ZERO,
            },
            11_000,
        ));
        assert!(s.tick(10_000 + SessionSettings::default().toast_ms));
        assert!(s.toasts().is_empty());
    }

    #[test]
    fn not_found_event_gets_friendly_toast() {
        let (mut s, _rx) = session(Prefs::default());
        s.fetch_event("L9");
        s.handle_event(
            Event::EventNotFound {
                generation: 0,
                log_id: "L9".into(),
            },
            0,
        );
        let toast = s.toasts().iter().next().unwrap();
        assert_eq!(toast.level, Level::Error);
        assert!(toast.text.contains("no longer exists"));
    }

    #[test]
    fn failed_head_poll_is_silent() {
        let (mut s, _rx) = session(Prefs::default());
        assert!(!s.handle_event(
            Event::HeadPollFailed {
                generation: 0,
                message: "timeout".into(),
            },
            0,
        ));
        assert!(s.toasts().is_empty());
    }

    #[test]
    fn applying_a_preset_replaces_filter_and_reloads() {
        let (mut s, mut rx) = session(Prefs::default());
        s.update_filter(|f| f.group_by_mod = true, 0);
        s.save_preset("grouped").unwrap();
        s.update_filter(|f| f.group_by_mod = false, 0);
        drain(&mut rx);
        s.apply_preset("grouped", 0).unwrap();
        assert!(s.filter().group_by_mod);
        assert!(matches!(drain(&mut rx).as_slice(), [Request::FetchLogs { .. }]));
        assert!(matches!(
            s.delete_preset("grouped", false),
            Err(PrefsError::ConfirmationRequired(_))
        ));
        s.delete_preset("grouped", true).unwrap();
        assert!(s.preset_names().is_empty());
    }

    fn hits(rows: serde_json::Value) -> Vec<SearchHit> {
        serde_json::from_value(rows).unwrap()
    }

    #[test]
    fn unique_match_prefers_exact_names() {
        let results = SearchResults {
            kind: NameKind::Member,
            q: "@Alice".into(),
            hits: hits(serde_json::json!([
                { "id": "U1", "username": "alice" },
                { "id": "U2", "username": "alice2" }
            ])),
        };
        assert_eq!(results.unique_match().map(|h| h.id.as_str()), Some("U1"));
    }

    #[test]
    fn unique_match_takes_a_lone_fuzzy_hit() {
        let results = SearchResults {
            kind: NameKind::Channel,
            q: "#gen".into(),
            hits: hits(serde_json::json!([{ "id": "C1", "name": "general" }])),
        };
        assert_eq!(results.unique_match().map(|h| h.id.as_str()), Some("C1"));
    }

    #[test]
    fn ambiguous_search_has_no_unique_match() {
        let results = SearchResults {
            kind: NameKind::Member,
            q: "al".into(),
            hits: hits(serde_json::json!([
                { "id": "U1", "username": "alice" },
                { "id": "U2", "username": "albert" }
            ])),
        };
        assert!(results.unique_match().is_none());
    }
}
