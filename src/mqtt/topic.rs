//! MQTT topic matching with wildcards and placeholders
//!
//! ACL patterns are MQTT topic filters that may also embed `{username}` and
//! `{clientid}` placeholders. Placeholders are substituted literally before
//! the pattern is split into levels.

use std::borrow::Cow;

/// Placeholder replaced by the requester's username
pub const USERNAME_PLACEHOLDER: &str = "{username}";
/// Placeholder replaced by the requester's client id
pub const CLIENT_ID_PLACEHOLDER: &str = "{clientid}";

/// Topic matcher for ACL patterns
#[derive(Debug, Clone)]
pub struct TopicMatcher;

impl TopicMatcher {
    /// Create a new topic matcher
    pub fn new() -> Self {
        Self
    }

    /// Check if a topic matches an ACL pattern for the given requester
    ///
    /// # Arguments
    /// * `pattern` - The ACL pattern (may contain `+`, `#` and placeholders)
    /// * `topic` - The actual topic being accessed
    /// * `username` - Substituted for `{username}`
    /// * `client_id` - Substituted for `{clientid}`
    ///
    /// # Wildcard Rules
    /// * `+` matches exactly one topic level
    /// * `#` matches zero or more remaining levels and is only valid last
    ///
    /// # Examples
    /// ```
    /// use sentinel_agent_mqtt_pgauth::mqtt::TopicMatcher;
    ///
    /// let matcher = TopicMatcher::new();
    /// assert!(matcher.matches("devices/{username}/#", "devices/alice/up", "alice", ""));
    /// assert!(!matcher.matches("devices/{username}/#", "devices/bob/up", "alice", ""));
    /// assert!(matcher.matches("a/+/c", "a/x/c", "", ""));
    /// ```
    pub fn matches(&self, pattern: &str, topic: &str, username: &str, client_id: &str) -> bool {
        let pattern = substitute_placeholders(pattern, username, client_id);

        let filter_levels: Vec<&str> = pattern.split('/').collect();
        let topic_levels: Vec<&str> = topic.split('/').collect();

        self.match_levels(&filter_levels, &topic_levels)
    }

    fn match_levels(&self, filter: &[&str], topic: &[&str]) -> bool {
        let last = filter.len() - 1;

        for (idx, f_level) in filter.iter().enumerate() {
            if idx >= topic.len() {
                // Topic exhausted: only a terminal # can still match
                return *f_level == "#" && idx == last;
            }

            match *f_level {
                "#" => return idx == last,
                "+" => {}
                literal => {
                    if topic[idx] != literal {
                        return false;
                    }
                }
            }
        }

        filter.len() == topic.len()
    }

    /// Check if a topic filter is valid
    ///
    /// # Rules
    /// * `#` must be the last level and alone in it
    /// * `+` must be the entire level
    /// * Empty levels are literal and allowed (`/devices/#`, `a//b`)
    pub fn is_valid_filter(&self, filter: &str) -> bool {
        if filter.is_empty() {
            return false;
        }

        let levels: Vec<&str> = filter.split('/').collect();

        for (i, level) in levels.iter().enumerate() {
            if level.contains('#') && (*level != "#" || i != levels.len() - 1) {
                return false;
            }

            if level.contains('+') && *level != "+" {
                return false;
            }
        }

        true
    }
}

impl Default for TopicMatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn substitute_placeholders<'a>(pattern: &'a str, username: &str, client_id: &str) -> Cow<'a, str> {
    if !pattern.contains('{') {
        return Cow::Borrowed(pattern);
    }
    Cow::Owned(
        pattern
            .replace(USERNAME_PLACEHOLDER, username)
            .replace(CLIENT_ID_PLACEHOLDER, client_id),
    )
}
