use crate::model::{DecisionReason, Effect, PermissionDecision, ResolvedDecision};

/// Default deny, then deny overrides allow. Scope specificity plays no part.
///
/// The witness is the smallest qualifying decision, so the outcome does not depend on the
/// order the decisions were collected in.
pub fn resolve(decisions: &[PermissionDecision]) -> ResolvedDecision {
    if let Some(deny) = decisions.iter().filter(|d| d.effect == Effect::Deny).min() {
        return ResolvedDecision {
            effect: Effect::Deny,
            reason: DecisionReason::ExplicitDeny(deny.clone()),
        };
    }

    match decisions.iter().min() {
        Some(allow) => ResolvedDecision {
            effect: Effect::Allow,
            reason: DecisionReason::Granted(allow.clone()),
        },
        None => ResolvedDecision {
            effect: Effect::Deny,
            reason: DecisionReason::NoApplicableGrant,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GrantSource;
    use proptest::prelude::*;

    fn decision(effect: Effect, role: &str, permission: &str, scope: Option<&str>) -> PermissionDecision {
        PermissionDecision {
            effect,
            source_role_id: role.to_string(),
            source_permission_id: permission.to_string(),
            via: GrantSource::Direct,
            scope: scope.map(str::to_string),
        }
    }

    #[test]
    fn empty_set_is_default_deny() {
        let resolved = resolve(&[]);

        assert_eq!(resolved.effect, Effect::Deny);
        assert_eq!(resolved.reason, DecisionReason::NoApplicableGrant);
    }

    #[test]
    fn single_allow_is_granted() {
        let allow = decision(Effect::Allow, "editor", "p1", None);

        let resolved = resolve(std::slice::from_ref(&allow));

        assert!(resolved.is_allowed());
        assert_eq!(resolved.reason, DecisionReason::Granted(allow));
    }

    #[test]
    fn deny_wins_over_many_allows() {
        let deny = decision(Effect::Deny, "blocked", "p9", Some("w1"));
        let decisions = vec![
            decision(Effect::Allow, "a", "p1", None),
            decision(Effect::Allow, "b", "p2", Some("org")),
            deny.clone(),
            decision(Effect::Allow, "c", "p3", Some("w1")),
        ];

        let resolved = resolve(&decisions);

        assert_eq!(resolved.effect, Effect::Deny);
        assert_eq!(resolved.reason, DecisionReason::ExplicitDeny(deny));
    }

    #[test]
    fn broader_deny_still_beats_narrower_allow() {
        let decisions = vec![
            decision(Effect::Allow, "owner", "p1", Some("w1")),
            decision(Effect::Deny, "freeze", "p2", None),
        ];

        let resolved = resolve(&decisions);

        assert_eq!(resolved.effect, Effect::Deny);
    }

    #[test]
    fn allow_and_deny_from_different_roles_at_same_scope() {
        let decisions = vec![
            decision(Effect::Allow, "allow-role", "ws-delete-allow", Some("w1")),
            decision(Effect::Deny, "deny-role", "ws-delete-deny", Some("w1")),
        ];

        let resolved = resolve(&decisions);

        assert!(!resolved.is_allowed());
        assert!(
            matches!(resolved.reason, DecisionReason::ExplicitDeny(ref d) if d.source_role_id == "deny-role")
        );
    }

    fn arb_decision() -> impl Strategy<Value = PermissionDecision> {
        (
            prop_oneof![Just(Effect::Allow), Just(Effect::Deny)],
            "[a-d]",
            "p[0-3]",
            proptest::option::of("[wxyz]"),
            proptest::option::of("g[0-2]"),
        )
            .prop_map(|(effect, role, permission, scope, group)| PermissionDecision {
                effect,
                source_role_id: role,
                source_permission_id: permission,
                via: group.map_or(GrantSource::Direct, |group_id| GrantSource::Group { group_id }),
                scope,
            })
    }

    proptest! {
        #[test]
        fn any_deny_resolves_to_deny(decisions in proptest::collection::vec(arb_decision(), 0..12)) {
            let resolved = resolve(&decisions);
            let has_deny = decisions.iter().any(|d| d.effect == Effect::Deny);

            prop_assert_eq!(resolved.effect == Effect::Deny, has_deny || decisions.is_empty());
        }

        #[test]
        fn resolution_ignores_order(
            (decisions, shuffled) in proptest::collection::vec(arb_decision(), 0..12)
                .prop_flat_map(|d| (Just(d.clone()), Just(d).prop_shuffle()))
        ) {
            prop_assert_eq!(resolve(&decisions), resolve(&shuffled));
        }
    }
}
