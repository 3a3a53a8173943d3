use crate::types::{EventKind, EventPayload, LogEvent, ModAction};

// ---------------------------------------------------------------------------
// Contextual quick actions for a card
// ---------------------------------------------------------------------------

/// Remediation actions that make sense for `event`, most specific first.
pub fn suggested(event: &LogEvent) -> Vec<ModAction> {
    let mut actions = Vec::new();
    match (&event.kind, &event.payload) {
        (EventKind::BanAdd, EventPayload::Ban(p)) => {
            if let Some(ref user_id) = p.user_id {
                actions.push(ModAction::Unban {
                    user_id: user_id.clone(),
                });
            }
        }
        (EventKind::MemberUpdate, EventPayload::Member(p)) => {
            if let Some(ref user_id) = p.user_id {
                if !p.roles_added.is_empty() || !p.roles_removed.is_empty() {
                    actions.push(ModAction::RevertRoles {
                        user_id: user_id.clone(),
                        add: p.roles_removed.clone(),
                        remove: p.roles_added.clone(),
                    });
                }
                if p.nick_before != p.nick_after {
                    actions.push(ModAction::RevertNickname {
                        user_id: user_id.clone(),
                        nickname: p.nick_before.clone(),
                    });
                }
            }
        }
        (EventKind::MessageDelete, EventPayload::Message(p)) => {
            actions.push(ModAction::RestoreMessage {
                log_id: event.id.clone(),
                channel_id: p.channel_id.clone(),
            });
        }
        (EventKind::ChannelDelete, _) => actions.push(ModAction::RestoreChannel {
            log_id: event.id.clone(),
        }),
        (EventKind::RoleDelete, _) => actions.push(ModAction::RestoreRole {
            log_id: event.id.clone(),
        }),
        (EventKind::RoleUpdate, EventPayload::Role(p)) => {
            if let (Some(role_id), Some(before)) = (&p.role_id, p.position_before)
                && p.position_after != Some(before)
            {
                actions.push(ModAction::MoveRole {
                    role_id: role_id.clone(),
                    position: before,
                });
            }
        }
        (EventKind::ChannelUpdate, EventPayload::Channel(p)) => {
            if let (Some(channel_id), Some(before)) = (&p.channel_id, p.position_before)
                && p.position_after != Some(before)
            {
                actions.push(ModAction::MoveChannel {
                    channel_id: channel_id.clone(),
                    position: before,
                });
            }
        }
        _ => {}
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawLogEvent;

    fn event(kind: &str, data: serde_json::Value) -> LogEvent {
        let raw: RawLogEvent = serde_json::from_value(serde_json::json!({
            "id": "L1", "timestamp": 0, "type": kind, "data": data
        }))
        .unwrap();
        LogEvent::try_from(raw).unwrap()
    }

    #[test]
    fn ban_suggests_unban() {
        let ev = event("mod_ban_add", serde_json::json!({ "userId": "U1", "executorId": "M1" }));
        assert_eq!(suggested(&ev), vec![ModAction::Unban { user_id: "U1".into() }]);
    }

    #[test]
    fn role_change_suggests_inverse_delta() {
        let ev = event(
            "mod_member_update",
            serde_json::json!({ "userId": "U1", "rolesAdded": ["R1"], "rolesRemoved": ["R2"] }),
        );
        assert_eq!(
            suggested(&ev),
            vec![ModAction::RevertRoles {
                user_id: "U1".into(),
                add: vec!["R2".into()],
                remove: vec!["R1".into()],
            }]
        );
    }

    #[test]
    fn nickname_change_suggests_revert() {
        let ev = event(
            "mod_member_update",
            serde_json::json!({ "userId": "U1", "nickBefore": "old", "nickAfter": "new" }),
        );
        assert_eq!(
            suggested(&ev),
            vec![ModAction::RevertNickname {
                user_id: "U1".into(),
                nickname: Some("old".into()),
            }]
        );
    }

    #[test]
    fn position_change_suggests_move_back() {
        let ev = event(
            "mod_role_update",
            serde_json::json!({ "roleId": "R1", "positionBefore": 4, "positionAfter": 1 }),
        );
        assert_eq!(
            suggested(&ev),
            vec![ModAction::MoveRole { role_id: "R1".into(), position: 4 }]
        );
    }

    #[test]
    fn voice_events_have_no_actions() {
        let ev = event("mod_voice_join", serde_json::json!({ "userId": "U1" }));
        assert!(suggested(&ev).is_empty());
    }
}
