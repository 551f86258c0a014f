#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentChange {
    Assigned,
    Revoked,
}

impl AssignmentChange {
    fn user_role_event(self) -> &'static str {
        match self {
            AssignmentChange::Assigned => "user_role_assigned",
            AssignmentChange::Revoked => "user_role_revoked",
        }
    }

    fn group_role_event(self) -> &'static str {
        match self {
            AssignmentChange::Assigned => "group_role_assigned",
            AssignmentChange::Revoked => "group_role_revoked",
        }
    }

    fn membership_event(self) -> &'static str {
        match self {
            AssignmentChange::Assigned => "group_member_added",
            AssignmentChange::Revoked => "group_member_removed",
        }
    }
}

pub fn audit_user_role_change(
    change: AssignmentChange,
    user_id: &str,
    role_id: &str,
    resource_id: Option<&str>,
) {
    tracing::info!(
        target: "audit",
        event = change.user_role_event(),
        user_id = user_id,
        role_id = role_id,
        resource_id = resource_id.unwrap_or("*"),
        "user role changed"
    );
}

pub fn audit_group_role_change(
    change: AssignmentChange,
    group_id: &str,
    role_id: &str,
    resource_id: Option<&str>,
    affected_users: usize,
) {
    tracing::info!(
        target: "audit",
        event = change.group_role_event(),
        group_id = group_id,
        role_id = role_id,
        resource_id = resource_id.unwrap_or("*"),
        affected_users = affected_users as u64,
        "group role changed"
    );
}

pub fn audit_membership_change(change: AssignmentChange, user_id: &str, group_id: &str) {
    tracing::info!(
        target: "audit",
        event = change.membership_event(),
        user_id = user_id,
        group_id = group_id,
        "group membership changed"
    );
}

pub fn audit_invalidation(user_id: &str, trigger: &str) {
    tracing::info!(
        target: "audit",
        event = "user_invalidated",
        user_id = user_id,
        trigger = trigger,
        "cached decisions invalidated"
    );
}
