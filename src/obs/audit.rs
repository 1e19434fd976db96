//! Audit-event contract between the broker and an external audit logger.
//!
//! The broker never persists audit data itself: it emits structured [`AuditEvent`] values
//! through whichever [`AuditSink`] the caller injected and moves on. Events carry identity
//! and outcome, never token or key material.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, OrganizationId},
	obs::{FlowKind, FlowOutcome},
};

/// Structured event emitted around every token acquisition attempt.
#[derive(Clone, Debug)]
pub struct AuditEvent {
	/// Organization whose configuration drove the flow.
	pub organization: OrganizationId,
	/// Backend-services client the flow ran for.
	pub client: ClientId,
	/// Flow that was executed.
	pub flow: FlowKind,
	/// Outcome being reported.
	pub outcome: FlowOutcome,
	/// Target resource the token is for (e.g., the FHIR base URL).
	pub target: Option<String>,
	/// Failure summary; never contains secrets.
	pub detail: Option<String>,
}
impl AuditEvent {
	/// Creates a new event for the provided identity and flow.
	pub fn new(
		organization: OrganizationId,
		client: ClientId,
		flow: FlowKind,
		outcome: FlowOutcome,
	) -> Self {
		Self { organization, client, flow, outcome, target: None, detail: None }
	}

	/// Attaches the target resource.
	pub fn with_target(mut self, target: impl Into<String>) -> Self {
		self.target = Some(target.into());

		self
	}

	/// Attaches a human-readable failure summary.
	pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
		self.detail = Some(detail.into());

		self
	}
}

/// Contract the broker uses to hand events to an external audit logger.
///
/// Implementations must be cheap and non-blocking; the broker calls `log` inline on its hot
/// path and does not await persistence.
pub trait AuditSink: Send + Sync {
	/// Accepts one event for out-of-band persistence.
	fn log(&self, event: AuditEvent);
}

/// Sink that forwards events to `tracing` (a no-op when the feature is disabled).
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;
impl AuditSink for TracingAuditSink {
	fn log(&self, event: AuditEvent) {
		#[cfg(feature = "tracing")]
		{
			tracing::info!(
				organization = %event.organization,
				client = %event.client,
				flow = event.flow.as_str(),
				outcome = event.outcome.as_str(),
				target = event.target.as_deref(),
				detail = event.detail.as_deref(),
				"smart_broker.audit",
			);
		}

		#[cfg(not(feature = "tracing"))]
		{
			let _ = event;
		}
	}
}

/// Sink that drops every event; useful for tests and minimal deployments.
#[derive(Clone, Debug, Default)]
pub struct NullAuditSink;
impl AuditSink for NullAuditSink {
	fn log(&self, _event: AuditEvent) {}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	};
	// self
	use super::*;

	struct CountingSink(AtomicUsize);
	impl AuditSink for CountingSink {
		fn log(&self, _event: AuditEvent) {
			self.0.fetch_add(1, Ordering::Relaxed);
		}
	}

	fn event(outcome: FlowOutcome) -> AuditEvent {
		let organization =
			OrganizationId::new("org-audit").expect("Organization fixture should be valid.");
		let client = ClientId::new("client-audit").expect("Client fixture should be valid.");

		AuditEvent::new(organization, client, FlowKind::Access, outcome)
			.with_target("https://fhir.example.com/r4")
	}

	#[test]
	fn sinks_receive_events() {
		let sink = Arc::new(CountingSink(AtomicUsize::new(0)));

		sink.log(event(FlowOutcome::Attempt));
		sink.log(event(FlowOutcome::Success));

		assert_eq!(sink.0.load(Ordering::Relaxed), 2);
	}

	#[test]
	fn default_sinks_do_not_panic() {
		TracingAuditSink.log(event(FlowOutcome::Failure));
		NullAuditSink.log(event(FlowOutcome::Failure));
	}
}
