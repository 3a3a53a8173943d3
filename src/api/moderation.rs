use crate::types::{ActionPlan, ActionRequestBody, ModAction};

use super::client::ApiClient;
use super::error::ApiError;

/// Result of `POST /moderation/action`.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Dry run: what would happen.
    Planned(ActionPlan),
    Applied,
}

/// Issue `action`, as a preview when `dry_run` is set.
pub async fn run_action(
    client: &ApiClient,
    guild_id: &str,
    action: &ModAction,
    dry_run: bool,
) -> Result<ActionOutcome, ApiError> {
    let path = ["guild", guild_id, "moderation", "action"];
    let body = ActionRequestBody { action, dry_run };
    let resp = client.post_json(&path, &body, "action target").await?;
    if dry_run {
        Ok(ActionOutcome::Planned(serde_json::from_value(resp)?))
    } else {
        Ok(ActionOutcome::Applied)
    }
}
