use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use modfeed::actions::{ActionSource, FlowOutcome};
use modfeed::api::search::{NameKind, SearchHit};
use modfeed::engine::{Engine, Event, Request, Scope, StubEngine};
use modfeed::feed::notify::Level;
use modfeed::feed::{FeedSession, NameCache, SessionSettings};
use modfeed::filter::{Family, FilterState, name_reference};
use modfeed::prefs::{PrefStore, Prefs};
use modfeed::query::build_query;
use modfeed::types::{ActionPlan, LogEvent, ModAction, RawLogEvent, Summary};

fn event(id: &str, ts: i64, kind: &str, data: serde_json::Value) -> LogEvent {
    let raw: RawLogEvent = serde_json::from_value(serde_json::json!({
        "id": id, "timestamp": ts, "type": kind, "data": data
    }))
    .expect("valid raw event");
    LogEvent::try_from(raw).expect("payload matches family")
}

fn fixture_events() -> Vec<LogEvent> {
    vec![
        event(
            "1",
            1_000,
            "mod_ban_add",
            serde_json::json!({ "executorId": "M1", "userId": "U1" }),
        ),
        event(
            "2",
            2_000,
            "mod_message_delete",
            serde_json::json!({ "executorId": "M1", "channelId": "C1" }),
        ),
    ]
}

fn alice() -> SearchHit {
    serde_json::from_value(serde_json::json!({ "id": "U1", "username": "alice" }))
        .expect("valid search hit")
}

fn next(rx: &Receiver<Event>) -> Event {
    rx.recv_timeout(Duration::from_secs(2))
        .expect("engine should reply within 2 seconds")
}

fn session_with(stub: StubEngine, prefs: Prefs) -> (FeedSession, Receiver<Event>) {
    let handle = stub.start();
    let (tx, rx) = mpsc::channel::<Event>();
    let session = FeedSession::new(
        handle,
        tx,
        "G1",
        SessionSettings::default(),
        NameCache::new(),
        PrefStore::in_memory(prefs),
    );
    (session, rx)
}

#[test]
fn stub_engine_filters_logs_by_family() {
    let stub = StubEngine {
        events: fixture_events(),
        ..StubEngine::default()
    };
    let handle = stub.start();
    let (tx, rx) = mpsc::channel::<Event>();

    let mut filter = FilterState::default();
    filter.set_families([Family::Bans]);
    handle.send(Request::FetchLogs {
        scope: Scope::new(7, CancellationToken::new()),
        guild_id: "G1".into(),
        query: build_query(&filter),
        reply_tx: tx,
    });

    match next(&rx) {
        Event::LogsFetched {
            generation, events, ..
        } => {
            assert_eq!(generation, 7);
            let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
            assert_eq!(ids, vec!["1"]);
        }
        other => panic!("expected LogsFetched, got {other:?}"),
    }
}

#[test]
fn cancelled_scope_gets_no_reply() {
    let stub = StubEngine {
        events: fixture_events(),
        ..StubEngine::default()
    };
    let handle = stub.start();
    let (tx, rx) = mpsc::channel::<Event>();

    let token = CancellationToken::new();
    token.cancel();
    handle.send(Request::FetchLogs {
        scope: Scope::new(1, token),
        guild_id: "G1".into(),
        query: build_query(&FilterState::default()),
        reply_tx: tx,
    });

    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
}

#[test]
fn session_loads_and_resolves_names_through_the_stub() {
    let stub = StubEngine {
        events: fixture_events(),
        members: vec![alice()],
        ..StubEngine::default()
    };
    let (mut session, rx) = session_with(stub, Prefs::default());

    session.reload(0);
    assert!(session.is_loading());
    session.handle_event(next(&rx), 0);
    assert!(!session.is_loading());
    // Newest first by default.
    let ids: Vec<&str> = session.view().cards().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["2", "1"]);

    // Past the debounce: the batched lookups go out.
    session.tick(1_000);
    while !session.names().is_idle() {
        session.handle_event(next(&rx), 1_100);
        session.tick(2_000);
    }
    assert_eq!(
        session.names().label(NameKind::Member, "U1").as_deref(),
        Some("alice")
    );
}

#[test]
fn dry_run_gate_holds_end_to_end() {
    let stub = StubEngine {
        plan: ActionPlan {
            plan: serde_json::json!("unban U1"),
            risks: vec!["User may rejoin".into()],
        },
        ..StubEngine::default()
    };
    let log = stub.action_log.clone();
    let (mut session, rx) = session_with(stub, Prefs::default());
    let unban = ModAction::Unban {
        user_id: "U1".into(),
    };

    session
        .begin_action(unban.clone(), ActionSource::Modal)
        .expect("flow is idle");
    session.handle_event(next(&rx), 0);
    match session.take_outcome() {
        Some(FlowOutcome::Planned(plan)) => assert_eq!(plan.risks.len(), 1),
        other => panic!("expected a plan, got {other:?}"),
    }
    assert_eq!(*log.lock().unwrap(), vec![(unban.clone(), true)]);

    session.confirm_action(true).expect("plan is pending");
    session.handle_event(next(&rx), 10);
    assert_eq!(session.take_outcome(), Some(FlowOutcome::Applied(unban.clone())));
    assert_eq!(
        *log.lock().unwrap(),
        vec![(unban.clone(), true), (unban, false)]
    );
}

#[test]
fn missing_event_yields_friendly_toast() {
    let stub = StubEngine {
        events: fixture_events(),
        ..StubEngine::default()
    };
    let (mut session, rx) = session_with(stub, Prefs::default());

    session.fetch_event("1");
    session.handle_event(next(&rx), 0);
    assert_eq!(session.detail().map(|e| e.id.as_str()), Some("1"));

    session.fetch_event("404");
    session.handle_event(next(&rx), 0);
    assert!(session.detail().is_none());
    let toast = session.toasts().iter().next().expect("one toast");
    assert_eq!(toast.level, Level::Error);
    assert!(toast.text.contains("no longer exists"));
}

#[test]
fn summary_and_search_round_trip() {
    let summary: Summary =
        serde_json::from_value(serde_json::json!({ "metrics": { "bans": 3, "note": "x" } }))
            .expect("valid summary");
    let stub = StubEngine {
        members: vec![alice()],
        summary,
        ..StubEngine::default()
    };
    let (mut session, rx) = session_with(stub, Prefs::default());

    session.fetch_summary();
    session.handle_event(next(&rx), 0);
    assert_eq!(session.summary().and_then(|s| s.counter("bans")), Some(3));

    session.search(NameKind::Member, "  ALI ");
    session.handle_event(next(&rx), 0);
    let results = session.search_results().expect("search answered");
    assert_eq!(results.q, "ALI");
    assert_eq!(results.hits.len(), 1);
    assert_eq!(results.hits[0].id, "U1");
}

#[test]
fn named_user_filter_resolves_to_an_id() {
    let namesake: SearchHit = serde_json::from_value(serde_json::json!({ "id": "U2", "username": "alice2" }))
        .expect("valid search hit");
    let stub = StubEngine {
        events: fixture_events(),
        members: vec![alice(), namesake],
        ..StubEngine::default()
    };
    let (mut session, rx) = session_with(stub, Prefs::default());

    let q = name_reference("@Alice").expect("a name, not an id");
    session.search(NameKind::Member, q);
    session.handle_event(next(&rx), 0);
    let results = session.search_results().expect("search answered");
    assert_eq!(results.hits.len(), 2);
    let id = results.unique_match().expect("exact name wins").id.clone();
    assert_eq!(id, "U1");

    session.update_filter(|f| f.user_id = id, 0);
    while session.is_loading() {
        session.handle_event(next(&rx), 0);
    }
    let ids: Vec<&str> = session.view().cards().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["1"]);
}
