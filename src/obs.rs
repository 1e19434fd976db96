//! Observability helpers and the audit-event contract for broker flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `smart_broker.flow` with the `flow`
//!   (grant/stage) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `smart_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.
//!
//! Independent of both features, every token acquisition emits an [`AuditEvent`] through the
//! configured [`AuditSink`]; persisting those events is the job of an external collaborator.

mod metrics;
mod tracing;

pub mod audit;

pub use audit::*;
pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Broker flows observed by spans, counters, and audit events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Caller-facing access-token acquisition (cache checks included).
	Access,
	/// Client Credentials exchange leg.
	ClientCredentials,
	/// Refresh Token exchange leg.
	Refresh,
	/// `.well-known` discovery fetch.
	Discovery,
	/// Explicit cache invalidation requested by a caller.
	Invalidate,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Access => "access",
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::Refresh => "refresh",
			FlowKind::Discovery => "discovery",
			FlowKind::Invalidate => "invalidate",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
