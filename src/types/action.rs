use serde::{Deserialize, Serialize};

/// A mutating moderation action understood by `POST /moderation/action`.
///
/// Serializes as `{ "action": "<name>", ...payload }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ModAction {
    Unban {
        user_id: String,
    },
    RevertRoles {
        user_id: String,
        /// Roles to give back (they were removed by the logged event).
        #[serde(default)]
        add: Vec<String>,
        /// Roles to take away (they were added by the logged event).
        #[serde(default)]
        remove: Vec<String>,
    },
    RevertNickname {
        user_id: String,
        #[serde(default)]
        nickname: Option<String>,
    },
    RestoreMessage {
        log_id: String,
        #[serde(default)]
        channel_id: Option<String>,
    },
    RestoreChannel {
        log_id: String,
    },
    RestoreRole {
        log_id: String,
    },
    MoveRole {
        role_id: String,
        position: i64,
    },
    MoveChannel {
        channel_id: String,
        position: i64,
    },
}

impl ModAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unban { .. } => "unban",
            Self::RevertRoles { .. } => "revert_roles",
            Self::RevertNickname { .. } => "revert_nickname",
            Self::RestoreMessage { .. } => "restore_message",
            Self::RestoreChannel { .. } => "restore_channel",
            Self::RestoreRole { .. } => "restore_role",
            Self::MoveRole { .. } => "move_role",
            Self::MoveChannel { .. } => "move_channel",
        }
    }

    /// Human label for buttons and confirmation prompts.
    pub fn label(&self) -> String {
        match self {
            Self::Unban { user_id } => format!("Unban {user_id}"),
            Self::RevertRoles { user_id, .. } => format!("Revert roles of {user_id}"),
            Self::RevertNickname { user_id, .. } => format!("Revert nickname of {user_id}"),
            Self::RestoreMessage { .. } => "Restore message".to_owned(),
            Self::RestoreChannel { .. } => "Restore channel".to_owned(),
            Self::RestoreRole { .. } => "Restore role".to_owned(),
            Self::MoveRole { role_id, position } => format!("Move role {role_id} to {position}"),
            Self::MoveChannel {
                channel_id,
                position,
            } => format!("Move channel {channel_id} to {position}"),
        }
    }

    /// Build an action from a name and `key=value` parameters, as typed into
    /// the manual action form.
    pub fn from_params(name: &str, params: &[(String, String)]) -> Result<Self, serde_json::Error> {
        let mut obj = serde_json::Map::new();
        obj.insert("action".to_owned(), serde_json::Value::String(name.to_owned()));
        for (key, value) in params {
            let parsed = match key.as_str() {
                "add" | "remove" => serde_json::Value::Array(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| serde_json::Value::String(s.to_owned()))
                        .collect(),
                ),
                "position" => value
                    .parse::<i64>()
                    .map_or_else(|_| serde_json::Value::String(value.clone()), Into::into),
                _ => serde_json::Value::String(value.clone()),
            };
            obj.insert(key.clone(), parsed);
        }
        serde_json::from_value(serde_json::Value::Object(obj))
    }
}

/// Wire body for the action endpoint.
#[derive(Debug, Serialize)]
pub struct ActionRequestBody<'a> {
    #[serde(flatten)]
    pub action: &'a ModAction,
    #[serde(rename = "dryRun", skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

/// What the backend would do for a dry-run action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(default)]
    pub plan: serde_json::Value,
    #[serde(default)]
    pub risks: Vec<String>,
}

impl ActionPlan {
    /// One-line description of the planned operation.
    pub fn describe(&self) -> String {
        match &self.plan {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "(no plan returned)".to_owned(),
            serde_json::Value::Object(obj) => obj
                .get("summary")
                .or_else(|| obj.get("description"))
                .and_then(serde_json::Value::as_str)
                .map_or_else(|| self.plan.to_string(), str::to_owned),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_flat_with_dry_run() {
        let action = ModAction::RevertRoles {
            user_id: "U1".into(),
            add: vec!["R1".into()],
            remove: vec![],
        };
        let body = ActionRequestBody {
            action: &action,
            dry_run: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["action"], "revert_roles");
        assert_eq!(json["userId"], "U1");
        assert_eq!(json["add"][0], "R1");
        assert_eq!(json["dryRun"], true);
    }

    #[test]
    fn apply_body_omits_dry_run() {
        let action = ModAction::Unban { user_id: "U1".into() };
        let json = serde_json::to_value(ActionRequestBody {
            action: &action,
            dry_run: false,
        })
        .unwrap();
        assert!(json.get("dryRun").is_none());
    }

    #[test]
    fn from_params_parses_lists_and_positions() {
        let action = ModAction::from_params(
            "move_role",
            &[("roleId".into(), "R9".into()), ("position".into(), "3".into())],
        )
        .unwrap();
        assert_eq!(
            action,
            ModAction::MoveRole {
                role_id: "R9".into(),
                position: 3
            }
        );
    }

    #[test]
    fn from_params_rejects_missing_fields() {
        assert!(ModAction::from_params("unban", &[]).is_err());
        assert!(ModAction::from_params("launch_rockets", &[]).is_err());
    }

    #[test]
    fn plan_description_prefers_summary() {
        let plan = ActionPlan {
            plan: serde_json::json!({ "summary": "Remove ban for U1", "op": "DELETE" }),
            risks: vec![],
        };
        assert_eq!(plan.describe(), "Remove ban for U1");
    }
}
