use gstflow_core::{RunId, RunScope};

/// Span wrapping one coordinator pass over a run.
///
/// Events logged inside carry `run_id`, `channel`, `gstin` and `month`.
pub fn run_span(run_id: RunId, scope: &RunScope) -> ::tracing::Span {
    ::tracing::info_span!(
        "run",
        run_id = %run_id,
        channel = scope.channel.as_str(),
        gstin = %scope.gstin,
        month = %scope.month,
    )
}
