use crate::query::LogQuery;
use crate::types::{LogEvent, RawLogEvent, Summary};

use super::client::{ApiClient, take_field};
use super::error::ApiError;

/// Validate raw events at the fetch boundary.
///
/// An event whose payload does not match its family is dropped with a
/// warning rather than failing the whole batch.
pub(crate) fn validate_events(raw: Vec<RawLogEvent>) -> Vec<LogEvent> {
    raw.into_iter()
        .filter_map(|r| {
            let id = r.id.clone();
            match LogEvent::try_from(r) {
                Ok(ev) => Some(ev),
                Err(e) => {
                    tracing::warn!("api: dropping malformed event {id}: {e}");
                    None
                }
            }
        })
        .collect()
}

/// `GET /guild/{id}/logs`.
pub async fn fetch_logs(
    client: &ApiClient,
    guild_id: &str,
    query: &LogQuery,
) -> Result<Vec<LogEvent>, ApiError> {
    let path = ["guild", guild_id, "logs"];
    let body = client.get_json(&path, &query.to_pairs(), "log").await?;
    let raw: Vec<RawLogEvent> = take_field(body, "logs")?;
    Ok(validate_events(raw))
}

/// `GET /guild/{id}/moderation/summary?window=`.
pub async fn fetch_summary(
    client: &ApiClient,
    guild_id: &str,
    window: &str,
) -> Result<Summary, ApiError> {
    let path = ["guild", guild_id, "moderation", "summary"];
    let body = client
        .get_json(&path, &[("window", window.to_owned())], "summary")
        .await?;
    Ok(serde_json::from_value(body)?)
}

/// `GET /guild/{id}/moderation/event/{logId}`.
pub async fn fetch_event(
    client: &ApiClient,
    guild_id: &str,
    log_id: &str,
) -> Result<LogEvent, ApiError> {
    let path = ["guild", guild_id, "moderation", "event", log_id];
    let body = client.get_json(&path, &[], "event").await?;
    let raw: Option<RawLogEvent> = take_field(body, "event")?;
    let raw = raw.ok_or_else(|| ApiError::NotFound {
        what: "event".to_owned(),
    })?;
    Ok(LogEvent::try_from(raw)?)
}
