//! Hop routing: primary/fallback connect strategies over a session.
//!
//! The router owns a [`ConnectionRoute`] and drives a [`RemoteSession`]
//! through it: try the active hop, optionally provision credentials and
//! retry the same hop once on an authentication failure, then try the
//! fallback hop (at most once, sticky for later reconnects), and finally
//! escalate a typed connection error carrying the whole hop identity.

use std::sync::Arc;

use crate::domain::errors::{ConnectionError, SessionError};
use crate::domain::models::{prompt, ConnectionRoute, Hop, TargetKind};
use crate::domain::ports::{KeyProvisioner, TransportError};
use crate::services::session::RemoteSession;

/// Prompt signature that proves the channel landed on the wrong hop.
#[derive(Debug, Clone)]
pub struct WrongHopSignature {
    /// Anchored pattern of the unwanted host's prompt.
    pub pattern: String,
    /// Which host that prompt belongs to.
    pub actual: TargetKind,
}

pub struct HopRouter {
    target: TargetKind,
    route: ConnectionRoute,
    /// When false, the fallback hop is never attempted even if configured.
    fail_safe: bool,
    provisioner: Option<Arc<dyn KeyProvisioner>>,
    wrong_hop: Option<WrongHopSignature>,
    /// Hop executed inside the established session (ssh from the entry
    /// host onwards to the final node).
    second_leg: Option<Hop>,
}

impl HopRouter {
    pub fn new(target: TargetKind, route: ConnectionRoute) -> Self {
        Self {
            target,
            route,
            fail_safe: true,
            provisioner: None,
            wrong_hop: None,
            second_leg: None,
        }
    }

    /// Disable the fallback hop for this router.
    #[must_use]
    pub fn fail_safe(mut self, enabled: bool) -> Self {
        self.fail_safe = enabled;
        self
    }

    /// Provision credentials and retry once when a hop rejects
    /// authentication.
    #[must_use]
    pub fn with_provisioner(mut self, provisioner: Arc<dyn KeyProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Treat a channel whose matched prompt fits `signature` as a hard
    /// connection failure even though it is open.
    #[must_use]
    pub fn rejecting_prompt(mut self, signature: WrongHopSignature) -> Self {
        self.wrong_hop = Some(signature);
        self
    }

    /// Continue from the entry host to the final node with an in-session
    /// ssh hop after the route is established.
    #[must_use]
    pub fn with_second_leg(mut self, hop: Hop) -> Self {
        self.second_leg = Some(hop);
        self
    }

    pub fn route(&self) -> &ConnectionRoute {
        &self.route
    }

    /// Forget a sticky fallback choice.
    pub fn reset_route(&mut self) {
        self.route.reset();
    }

    /// Establish connectivity to the target through the route.
    pub async fn establish(&mut self, session: &mut RemoteSession) -> Result<(), SessionError> {
        let hop = self.route.active_hop().clone();
        if let Err(err) = self.attempt_with_provisioning(session, &hop).await {
            let cause = match err {
                SessionError::Transport(cause)
                    if cause.is_recoverable() && self.fail_safe =>
                {
                    cause
                }
                SessionError::Transport(cause) => return Err(self.escalate(session, &hop, cause)),
                other => return Err(other),
            };

            let Some(fallback) = self.route.select_fallback().cloned() else {
                return Err(self.escalate(session, &hop, cause));
            };
            tracing::warn!(
                target_kind = %self.target,
                primary = %hop.address,
                fallback = %fallback.address,
                error = %cause,
                "hop failed, attempting fallback"
            );
            if let Err(fallback_err) = self.attempt(session, &fallback).await {
                return Err(match fallback_err {
                    SessionError::Transport(cause) => self.escalate(session, &fallback, cause),
                    other => other,
                });
            }
        }

        if let Some(leg) = self.second_leg.clone() {
            if let Err(err) = session.hop_within(&leg).await {
                return Err(match err {
                    SessionError::Transport(cause) => self.escalate(session, &leg, cause),
                    other => other,
                });
            }
        }
        Ok(())
    }

    /// One hop attempt, with a single provisioning retry on authentication
    /// failure. A failing provisioner re-raises the original error.
    async fn attempt_with_provisioning(
        &self,
        session: &mut RemoteSession,
        hop: &Hop,
    ) -> Result<(), SessionError> {
        let err = match self.attempt(session, hop).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        let (Some(provisioner), SessionError::Transport(cause)) = (&self.provisioner, &err) else {
            return Err(err);
        };
        if !cause.is_authentication() {
            return Err(err);
        }

        tracing::info!(
            target_kind = %self.target,
            address = %hop.address,
            "authentication rejected, provisioning credentials and retrying"
        );
        if let Err(provision_err) = provisioner.install_key(hop).await {
            tracing::warn!(
                address = %hop.address,
                error = %provision_err,
                "credential provisioning failed"
            );
            return Err(err);
        }
        self.attempt(session, hop).await
    }

    async fn attempt(&self, session: &mut RemoteSession, hop: &Hop) -> Result<(), SessionError> {
        session.connect_hop(hop).await?;
        if let Some(signature) = &self.wrong_hop {
            let matched = session.matched_prompt().unwrap_or_default();
            if prompt::prompt_matches(&matched, &signature.pattern)? {
                session.disconnect().await;
                return Err(SessionError::WrongHop {
                    matched,
                    actual: signature.actual,
                    expected: self.target,
                });
            }
        }
        Ok(())
    }

    fn escalate(
        &self,
        session: &RemoteSession,
        hop: &Hop,
        cause: TransportError,
    ) -> SessionError {
        SessionError::Connection(ConnectionError::new(
            session.transport_kind(),
            self.target,
            hop.kind,
            hop.address.clone(),
            hop.port,
            hop.credentials.username.clone(),
            Some(cause),
        ))
    }
}
