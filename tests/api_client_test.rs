use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modfeed::api::moderation::{self, ActionOutcome};
use modfeed::api::search::{self, NameKind};
use modfeed::api::{ApiClient, ApiError, logs};
use modfeed::config::types::ApiConfig;
use modfeed::filter::{Family, FilterState};
use modfeed::query::build_query;
use modfeed::types::ModAction;

fn client(server: &MockServer) -> ApiClient {
    let config = ApiConfig {
        base_url: format!("{}/api/", server.uri()),
        token: Some("secret".into()),
        timeout_secs: 5,
    };
    ApiClient::new(&config).unwrap()
}

#[tokio::test]
async fn fetch_logs_sends_filter_and_drops_malformed_events() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/guild/G1/logs"))
        .and(query_param("type", "mod_ban_*"))
        .and(query_param("moderatorId", "M1"))
        .and(query_param("limit", "50"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "logs": [
                { "id": 1, "timestamp": 1000, "type": "mod_ban_add",
                  "data": { "executorId": "M1", "userId": "U1" } },
                { "id": 2, "timestamp": 900, "type": "mod_ban_add", "data": "oops" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut filter = FilterState {
        moderator_id: "M1".into(),
        ..FilterState::default()
    };
    filter.set_families([Family::Bans]);
    let events = logs::fetch_logs(&client(&server), "G1", &build_query(&filter))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "1");
    assert_eq!(events[0].executor_id(), Some("M1"));
}

#[tokio::test]
async fn application_error_body_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/guild/G1/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "error": { "code": "rate_limited", "message": "Slow down" }
        })))
        .mount(&server)
        .await;

    let err = logs::fetch_logs(&client(&server), "G1", &build_query(&FilterState::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Application { ref code, .. } if code.as_deref() == Some("rate_limited")));
    assert_eq!(err.user_message(), "Slow down");
}

#[tokio::test]
async fn bare_server_error_maps_to_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/guild/G1/logs"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = logs::fetch_logs(&client(&server), "G1", &build_query(&FilterState::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Http { status } if status.as_u16() == 500));
}

#[tokio::test]
async fn missing_event_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/guild/G1/moderation/event/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/guild/G1/moderation/event/null"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "success": true, "event": null })),
        )
        .mount(&server)
        .await;

    let c = client(&server);
    let err = logs::fetch_event(&c, "G1", "404").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.user_message().contains("no longer exists"));
    let err = logs::fetch_event(&c, "G1", "null").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn event_id_cannot_escape_its_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/guild/G1/moderation/event/a%2Fb"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = logs::fetch_event(&client(&server), "G1", "a/b").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn summary_passes_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/guild/G1/moderation/summary"))
        .and(query_param("window", "7d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "metrics": { "bans": 2, "timeouts": 5 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let summary = logs::fetch_summary(&client(&server), "G1", "7d").await.unwrap();
    assert_eq!(summary.counter("bans"), Some(2));
    assert_eq!(summary.numeric_pairs().len(), 2);
}

#[tokio::test]
async fn dry_run_sends_flag_and_returns_plan() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/guild/G1/moderation/action"))
        .and(body_json(serde_json::json!({
            "action": "unban", "userId": "U1", "dryRun": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "plan": "unban U1",
            "risks": ["User may rejoin"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/guild/G1/moderation/action"))
        .and(body_json(serde_json::json!({ "action": "unban", "userId": "U1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let c = client(&server);
    let action = ModAction::Unban {
        user_id: "U1".into(),
    };
    match moderation::run_action(&c, "G1", &action, true).await.unwrap() {
        ActionOutcome::Planned(plan) => {
            assert_eq!(plan.describe(), "unban U1");
            assert_eq!(plan.risks, vec!["User may rejoin".to_owned()]);
        }
        ActionOutcome::Applied => panic!("dry run must not apply"),
    }
    assert_eq!(
        moderation::run_action(&c, "G1", &action, false).await.unwrap(),
        ActionOutcome::Applied
    );
}

#[tokio::test]
async fn batch_lookup_keeps_only_requested_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/guild/G1/search/members"))
        .and(query_param("q", "U1,U2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "results": [
                { "id": "U1", "username": "alice", "nickname": "Al" },
                { "id": "U2" },
                { "id": "U9", "username": "mallory" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ids = vec!["U1".to_owned(), "U2".to_owned()];
    let labels = search::resolve_batch(&client(&server), "G1", NameKind::Member, &ids)
        .await
        .unwrap();
    assert_eq!(labels, vec![("U1".to_owned(), "alice (Al)".to_owned())]);
}
