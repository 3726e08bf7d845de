//! Bounded readiness polling

use crate::context::ProvisionContext;
use crate::{Error, Result};
use command_executor::Command;
use tracing::{debug, info};

/// Poll `probe` until it succeeds or the configured attempts run out
pub async fn wait_for(ctx: &ProvisionContext, what: &str, probe: &Command) -> Result<()> {
    let readiness = ctx.readiness();
    for attempt in 1..=readiness.attempts {
        if ctx.probe(probe).await {
            info!("{} is ready", what);
            return Ok(());
        }
        debug!(
            "{} not ready (attempt {}/{})",
            what, attempt, readiness.attempts
        );
        if attempt < readiness.attempts && !readiness.interval.is_zero() {
            smol::Timer::after(readiness.interval).await;
        }
    }
    Err(Error::Readiness {
        what: what.to_string(),
        attempts: readiness.attempts,
    })
}
