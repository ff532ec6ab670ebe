//! Spool admission gate. Runs first in every chain so an operator downing
//! a service wins over a live backend.

use crate::checker::{CheckContext, CheckResult};
use crate::spool::SpoolStore;

pub fn check(store: &SpoolStore, ctx: &CheckContext<'_>) -> CheckResult {
    match store.is_up(ctx.service, Some(ctx.port)) {
        Ok((true, info)) => CheckResult::new(200, info.reason),
        Ok((false, info)) => {
            let mut message = format!("Service {} in down state", info.service);
            if !info.reason.is_empty() {
                message.push_str(": ");
                message.push_str(&info.reason);
            }
            CheckResult::new(503, message)
        }
        Err(e) => CheckResult::new(500, format!("error reading spool: {e}")),
    }
}
