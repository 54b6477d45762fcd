//! Failure handling and reconnection with exponential backoff.
//!
//! Contains the shared [`LinkContext`], the backoff policy, the single
//! failure path every transport error funnels into, and the one-shot
//! reconnect timer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;
use crate::dispatcher::DeliveryHandle;
use crate::manager::{Attempt, establish};
use crate::types::{ConnectionState, LinkConfig, LinkEvent, ReconnectConfig};
use crate::ws_client::{Connector, LinkError, WsClient};

/// When and which attempt to run next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPlan {
    /// 1-based attempt number.
    pub attempt: u32,
    pub delay: Duration,
}

/// Computes the next attempt given how many have already been used.
///
/// Returns `None` once the budget is exhausted.
pub fn next_plan(config: &ReconnectConfig, attempt_count: u32) -> Option<ReconnectPlan> {
    if attempt_count >= config.max_attempts {
        return None;
    }
    let attempt = attempt_count + 1;
    Some(ReconnectPlan {
        attempt,
        delay: config.delay_for_attempt(attempt),
    })
}

/// Mutable link state. Only touched under [`LinkContext::lock`], and the
/// lock is never held across an `.await`.
pub(crate) struct LinkState {
    pub(crate) state: ConnectionState,
    pub(crate) attempt_count: u32,
    pub(crate) explicitly_closed: bool,
    /// Bumped on every attempt; failures from older transports are ignored.
    pub(crate) generation: u64,
    pub(crate) client: Option<WsClient>,
    pub(crate) reconnect_cancel: Option<CancellationToken>,
}

impl LinkState {
    pub(crate) fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt_count: 0,
            explicitly_closed: false,
            generation: 0,
            client: None,
            reconnect_cancel: None,
        }
    }

    /// Cancels the pending reconnect timer, if any.
    pub(crate) fn cancel_reconnect(&mut self) {
        if let Some(token) = self.reconnect_cancel.take() {
            token.cancel();
        }
    }
}

/// Shared state handed to pumps and timers. Cheap to clone.
#[derive(Clone)]
pub(crate) struct LinkContext {
    pub(crate) config: Arc<LinkConfig>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) delivery: DeliveryHandle,
    pub(crate) link: Arc<Mutex<LinkState>>,
}

impl LinkContext {
    pub(crate) fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum FailureOutcome {
    Stopped,
    Retry(ReconnectPlan, CancellationToken),
    GaveUp(u32),
}

/// The single failure path.
///
/// Ignored for stale transports and when the link is already down.
/// Otherwise tears the transport down and, unless the close was explicit,
/// hands off to the backoff policy.
pub(crate) fn handle_failure(ctx: &LinkContext, generation: u64, error: LinkError) {
    let (outcome, stale_client) = {
        let mut link = ctx.lock();
        if link.generation != generation {
            debug!(generation, current = link.generation, error = %error, "ignoring failure from stale transport");
            return;
        }
        if link.state == ConnectionState::Disconnected {
            debug!(error = %error, "link already down, ignoring failure");
            return;
        }

        warn!(error = %error, state = ?link.state, attempt_count = link.attempt_count, "live link failed");

        let client = link.client.take();
        link.cancel_reconnect();
        link.state = ConnectionState::Disconnected;

        let outcome = if link.explicitly_closed {
            FailureOutcome::Stopped
        } else {
            match next_plan(&ctx.config.reconnect, link.attempt_count) {
                Some(plan) => {
                    link.attempt_count = plan.attempt;
                    let token = CancellationToken::new();
                    link.reconnect_cancel = Some(token.clone());
                    FailureOutcome::Retry(plan, token)
                }
                None => FailureOutcome::GaveUp(link.attempt_count),
            }
        };
        (outcome, client)
    };

    if let Some(client) = stale_client {
        client.close();
    }
    ctx.delivery
        .deliver(LinkEvent::StateChanged(ConnectionState::Disconnected));

    match outcome {
        FailureOutcome::Stopped => debug!("explicitly closed, not reconnecting"),
        FailureOutcome::Retry(plan, token) => {
            info!(
                attempt = plan.attempt,
                delay_secs = plan.delay.as_secs_f64(),
                "reconnecting"
            );
            ctx.delivery.deliver(LinkEvent::Reconnecting {
                attempt: plan.attempt,
                delay: plan.delay,
            });
            tokio::spawn(reconnect_after(ctx.clone(), plan, token));
        }
        FailureOutcome::GaveUp(attempts) => {
            info!(attempts, "retry budget exhausted, giving up");
            ctx.delivery.deliver(LinkEvent::GaveUp { attempts });
        }
    }
}

/// One-shot reconnect timer.
///
/// Cancellation stops it while sleeping; once it fires, the explicit-close
/// flag is re-checked inside [`establish`] since a disconnect may have
/// raced the wakeup.
pub(crate) async fn reconnect_after(ctx: LinkContext, plan: ReconnectPlan, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(attempt = plan.attempt, "reconnect cancelled");
            return;
        }
        _ = tokio::time::sleep(plan.delay) => {}
    }

    if cancel.is_cancelled() {
        return;
    }

    establish(ctx, Attempt::Retry).await;
}
