// self
use crate::{_prelude::*, obs::FlowKind};

/// Future type produced by [`FlowSpan::instrument`]; instrumented when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Structured span wrapped around each broker flow.
///
/// Without the `tracing` feature the type is a zero-sized no-op, so flows can instrument
/// their futures unconditionally. Spans are attached to futures rather than entered, which
/// keeps guards away from `.await` points.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for the given flow kind at the named call site.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self { span: tracing::info_span!("smart_broker.flow", flow = kind.as_str(), stage) }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Attaches the span to a flow future.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrumented_futures_resolve_normally() {
		let span = FlowSpan::new(FlowKind::Access, "instrumented_futures_resolve_normally");
		let value = span.instrument(async { 7 }).await;

		assert_eq!(value, 7);
	}
}
