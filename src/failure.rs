//! Failure policy around store-dependent operations
//!
//! Every operation runs under a deadline. Store outages and timeouts resolve
//! to Allow when fail-open is set and to Deny otherwise. Any other fault,
//! including a panic, is contained here and resolves to Deny.

use crate::acl::Decision;
use crate::error::{EngineError, EngineResult};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{error, warn};

/// Timeout and fail-open/fail-closed wrapper
#[derive(Debug, Clone, Copy)]
pub struct FailurePolicy {
    timeout: Duration,
    fail_open: bool,
}

impl FailurePolicy {
    pub fn new(timeout: Duration, fail_open: bool) -> Self {
        Self { timeout, fail_open }
    }

    /// Run an operation and always come back with a decision
    ///
    /// On deadline expiry the operation future is dropped, which releases any
    /// pool connection it held.
    pub async fn wrap<F>(&self, operation: &'static str, fut: F) -> Decision
    where
        F: Future<Output = EngineResult<Decision>>,
    {
        let guarded = AssertUnwindSafe(fut).catch_unwind();

        match tokio::time::timeout(self.timeout, guarded).await {
            Ok(Ok(Ok(decision))) => decision,
            Ok(Ok(Err(e))) => self.resolve(operation, e),
            Ok(Err(panic)) => {
                error!(
                    operation = %operation,
                    panic = %panic_message(panic.as_ref()),
                    "Contained panic in evaluation path, denying"
                );
                Decision::deny("internal fault")
            }
            Err(_) => self.resolve(operation, EngineError::StoreTimeout(self.timeout)),
        }
    }

    /// Convert an error into a decision
    pub fn resolve(&self, operation: &'static str, err: EngineError) -> Decision {
        if !err.is_infrastructure() {
            error!(operation = %operation, error = %err, "Unexpected fault, denying");
            return Decision::deny(format!("fault: {}", err));
        }

        if self.fail_open {
            warn!(
                operation = %operation,
                error = %err,
                security = true,
                "Store failure with fail-open enabled, ALLOWING request"
            );
            Decision::allow(format!("fail-open: {}", err))
        } else {
            warn!(operation = %operation, error = %err, "Store failure, denying request");
            Decision::deny(format!("fail-closed: {}", err))
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn fail_open(&self) -> bool {
        self.fail_open
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
