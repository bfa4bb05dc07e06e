//! Policy hooks evaluated before ACL rules
//!
//! A hook sees the source address, username, topic and requested access and
//! may return an immediate decision. The first hook that answers wins.

use super::rules::{Access, AccessRequest, Decision};
use crate::config::HookConfig;
use crate::error::ConfigError;
use crate::mqtt::TopicMatcher;
use ipnet::IpNet;
use std::sync::Arc;

/// Short-circuit check run before rule scanning
pub trait PolicyHook: Send + Sync {
    /// Return `Some` to decide immediately, `None` to defer
    fn check(&self, request: &AccessRequest<'_>) -> Option<Decision>;

    /// Hook name for logging
    fn name(&self) -> &str;
}

/// Allow everything from trusted source networks
#[derive(Debug, Clone)]
pub struct AddressBypass {
    networks: Vec<IpNet>,
}

impl AddressBypass {
    pub fn new(networks: Vec<IpNet>) -> Self {
        Self { networks }
    }
}

impl PolicyHook for AddressBypass {
    fn check(&self, request: &AccessRequest<'_>) -> Option<Decision> {
        let addr = request.requester.address?;
        self.networks
            .iter()
            .find(|net| net.contains(&addr))
            .map(|net| Decision::allow(format!("source {} in bypass network {}", addr, net)))
    }

    fn name(&self) -> &str {
        "address-bypass"
    }
}

/// Let privileged users read and subscribe to `$SYS/` topics
#[derive(Debug, Clone)]
pub struct SystemTopicAccess {
    users: Vec<String>,
    matcher: TopicMatcher,
}

impl SystemTopicAccess {
    pub fn new(users: Vec<String>) -> Self {
        Self {
            users,
            matcher: TopicMatcher::new(),
        }
    }
}

impl PolicyHook for SystemTopicAccess {
    fn check(&self, request: &AccessRequest<'_>) -> Option<Decision> {
        if !self.matcher.matches("$SYS/#", request.topic, "", "") {
            return None;
        }
        let read_only = Access::READ | Access::SUBSCRIBE;
        if request.access.is_empty() || !read_only.contains(request.access) {
            return None;
        }
        self.users
            .iter()
            .any(|u| *u == request.requester.username)
            .then(|| Decision::allow("privileged system topic access"))
    }

    fn name(&self) -> &str {
        "system-topic-access"
    }
}

/// Build the configured hook chain, in evaluation order
pub fn hooks_from_config(config: &HookConfig) -> Result<Vec<Arc<dyn PolicyHook>>, ConfigError> {
    let mut hooks: Vec<Arc<dyn PolicyHook>> = Vec::new();

    let networks = config.bypass_networks()?;
    if !networks.is_empty() {
        hooks.push(Arc::new(AddressBypass::new(networks)));
    }
    if !config.system_topic_users.is_empty() {
        hooks.push(Arc::new(SystemTopicAccess::new(
            config.system_topic_users.clone(),
        )));
    }

    Ok(hooks)
}
