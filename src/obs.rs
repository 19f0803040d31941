//! Optional observability helpers for coordinator flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `bearer_gate.flow` with the `flow` (request,
//!   refresh, replay) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `bearer_gate_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Caller-initiated request through [`send`](crate::coordinator::Coordinator::send).
	Request,
	/// Refresh-token exchange.
	Refresh,
	/// Replay of a request after a successful refresh.
	Replay,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Request => "request",
			FlowKind::Refresh => "refresh",
			FlowKind::Replay => "replay",
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
	/// Entry to a coordinator operation.
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

/// Logs a swallowed vault failure (best-effort persistence keeps the flow alive).
pub(crate) fn warn_vault_failure(stage: &'static str, err: &crate::store::StoreError) {
	#[cfg(feature = "tracing")]
	::tracing::warn!(stage, error = %err, "Durable token vault operation failed.");

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, err);
	}
}
