use crate::types::{ActionPlan, ModAction};

/// Where an action was triggered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSource {
    /// A suggestion button on a card. Always previewed first.
    QuickAction,
    /// The generic per-event action prompt, gated by the `always_dry_run` pref.
    Modal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    Idle,
    DryRunRequested { ticket: u64, action: ModAction },
    PlanReceived { ticket: u64, action: ModAction, plan: ActionPlan },
    /// Past the confirmation step; not cancellable.
    Confirmed { ticket: u64, action: ModAction },
}

/// What the driver must send next.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCommand {
    pub ticket: u64,
    pub action: ModAction,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("another action is still in flight")]
    Busy,
    #[error("no plan is awaiting confirmation")]
    NothingToConfirm,
}

/// Terminal result of one action, reported back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    Planned(ActionPlan),
    Applied(ModAction),
    Cancelled,
    Failed(String),
}

/// Preview-then-confirm state machine for mutating actions.
///
/// `Idle → DryRunRequested → PlanReceived → Confirmed → Idle`, with cancel
/// and every failure going straight back to `Idle`. Replies are matched by
/// ticket so a late reply for an abandoned action is ignored.
#[derive(Debug)]
pub struct ActionFlow {
    state: FlowState,
    next_ticket: u64,
}

impl Default for ActionFlow {
    fn default() -> Self {
        Self {
            state: FlowState::Idle,
            next_ticket: 1,
        }
    }
}

impl ActionFlow {
    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// A request is on the wire; triggering controls stay disabled.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            FlowState::DryRunRequested { .. } | FlowState::Confirmed { .. }
        )
    }

    pub fn pending_plan(&self) -> Option<(&ModAction, &ActionPlan)> {
        match self.state {
            FlowState::PlanReceived {
                ref action,
                ref plan,
                ..
            } => Some((action, plan)),
            _ => None,
        }
    }

    fn ticket(&mut self) -> u64 {
        let t = self.next_ticket;
        self.next_ticket += 1;
        t
    }

    /// Start an action. Quick actions always preview; the modal previews
    /// unless `always_dry_run` is off.
    pub fn begin(
        &mut self,
        action: ModAction,
        source: ActionSource,
        always_dry_run: bool,
    ) -> Result<ActionCommand, FlowError> {
        if self.is_busy() {
            return Err(FlowError::Busy);
        }
        let dry_run = source == ActionSource::QuickAction || always_dry_run;
        let ticket = self.ticket();
        self.state = if dry_run {
            FlowState::DryRunRequested {
                ticket,
                action: action.clone(),
            }
        } else {
            FlowState::Confirmed {
                ticket,
                action: action.clone(),
            }
        };
        Ok(ActionCommand {
            ticket,
            action,
            dry_run,
        })
    }

    pub fn on_planned(&mut self, ticket: u64, plan: ActionPlan) -> Option<FlowOutcome> {
        match std::mem::replace(&mut self.state, FlowState::Idle) {
            FlowState::DryRunRequested { ticket: t, action } if t == ticket => {
                self.state = FlowState::PlanReceived {
                    ticket,
                    action,
                    plan: plan.clone(),
                };
                Some(FlowOutcome::Planned(plan))
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Answer the confirmation surface. Only a positive answer re-issues the
    /// identical action without the dry-run flag.
    pub fn confirm(&mut self, yes: bool) -> Result<Option<ActionCommand>, FlowError> {
        if !matches!(self.state, FlowState::PlanReceived { .. }) {
            return Err(FlowError::NothingToConfirm);
        }
        let FlowState::PlanReceived { ticket, action, .. } =
            std::mem::replace(&mut self.state, FlowState::Idle)
        else {
            return Err(FlowError::NothingToConfirm);
        };
        if !yes {
            return Ok(None);
        }
        self.state = FlowState::Confirmed {
            ticket,
            action: action.clone(),
        };
        Ok(Some(ActionCommand {
            ticket,
            action,
            dry_run: false,
        }))
    }

    pub fn cancel(&mut self) -> Option<FlowOutcome> {
        match self.state {
            FlowState::DryRunRequested { .. } | FlowState::PlanReceived { .. } => {
                self.state = FlowState::Idle;
                Some(FlowOutcome::Cancelled)
            }
            _ => None,
        }
    }

    pub fn on_applied(&mut self, ticket: u64) -> Option<FlowOutcome> {
        match std::mem::replace(&mut self.state, FlowState::Idle) {
            FlowState::Confirmed { ticket: t, action } if t == ticket => {
                Some(FlowOutcome::Applied(action))
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    pub fn on_failed(&mut self, ticket: u64, message: String) -> Option<FlowOutcome> {
        let ours = match self.state {
            FlowState::DryRunRequested { ticket: t, .. } | FlowState::Confirmed { ticket: t, .. } => {
                t == ticket
            }
            _ => false,
        };
        if !ours {
            return None;
        }
        self.state = FlowState::Idle;
        Some(FlowOutcome::Failed(message))
    }

    /// Forget everything, e.g. on guild switch.
    pub fn reset(&mut self) {
        self.state = FlowState::Idle;
    }
}
