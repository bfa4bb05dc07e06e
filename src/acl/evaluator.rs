//! ACL rule evaluation engine

use crate::mqtt::TopicMatcher;
use std::sync::Arc;
use tracing::{debug, warn};

use super::hooks::PolicyHook;
use super::rules::{AccessRequest, Decision, RuleRow};

/// Policy evaluator - combines policy hooks and ACL rows into a decision
///
/// Rules form a flat allow-list: any candidate rule whose access bits
/// intersect the request and whose pattern matches the topic grants access.
/// There are no deny rules and no ordering between rules.
#[derive(Clone, Default)]
pub struct PolicyEvaluator {
    /// Hooks evaluated in order before any rule
    hooks: Vec<Arc<dyn PolicyHook>>,
    /// Topic matcher for wildcard patterns
    topic_matcher: TopicMatcher,
}

impl PolicyEvaluator {
    /// Create an evaluator with the given hook chain
    pub fn new(hooks: Vec<Arc<dyn PolicyHook>>) -> Self {
        Self {
            hooks,
            topic_matcher: TopicMatcher::new(),
        }
    }

    /// Evaluate a request against hooks, then rules
    pub fn evaluate(&self, request: &AccessRequest<'_>, rules: &[RuleRow]) -> Decision {
        self.hook_decision(request)
            .unwrap_or_else(|| self.scan_rules(request, rules))
    }

    /// Run the hook chain; the first hook with an answer wins
    ///
    /// Hooks need no store access, so callers may run this before fetching
    /// rules.
    pub fn hook_decision(&self, request: &AccessRequest<'_>) -> Option<Decision> {
        self.hooks.iter().find_map(|hook| {
            let decision = hook.check(request)?;
            debug!(
                hook = %hook.name(),
                username = %request.requester.username,
                topic = %request.topic,
                allowed = decision.is_allowed(),
                "Policy hook decided"
            );
            Some(decision)
        })
    }

    /// Scan ACL rows for any rule granting the request
    pub fn scan_rules(&self, request: &AccessRequest<'_>, rules: &[RuleRow]) -> Decision {
        let requester = request.requester;

        for row in rules {
            let rule = match row {
                Ok(rule) => rule,
                Err(e) => {
                    warn!(error = %e, username = %requester.username, "Skipping malformed ACL row");
                    continue;
                }
            };

            if !rule.applies_to(&requester.username) {
                continue;
            }

            if !rule.access.intersects(request.access) {
                continue;
            }

            if !self.topic_matcher.matches(
                &rule.pattern,
                request.topic,
                &requester.username,
                &requester.client_id,
            ) {
                continue;
            }

            debug!(
                owner = %rule.owner,
                pattern = %rule.pattern,
                topic = %request.topic,
                access = %request.access,
                "ACL rule matched"
            );
            return Decision::allow(format!("matched {} rule {:?}", rule.owner, rule.pattern));
        }

        debug!(
            username = %requester.username,
            topic = %request.topic,
            access = %request.access,
            "No ACL rule matched"
        );
        Decision::deny("no matching rule")
    }

    /// Number of configured hooks
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }
}
