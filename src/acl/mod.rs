//! Access Control List (ACL) module
//!
//! Provides topic-based access control for MQTT operations.

mod evaluator;
mod hooks;
mod rules;

pub use evaluator::PolicyEvaluator;
pub use hooks::{hooks_from_config, AddressBypass, PolicyHook, SystemTopicAccess};
pub use rules::{
    Access, AccessRequest, AclRule, Decision, Requester, RuleRow, Verdict, GLOBAL_OWNER,
};
