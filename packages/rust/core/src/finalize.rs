//! Run summary aggregation.

use chrono::Utc;
use tracing::{info, warn};

use marketpulse_shared::PipelineStage;

use crate::state::{PipelineState, RunStats};

/// Compute [`RunStats`] from what the stages recorded and mark the run finalized.
pub fn finalize(state: &mut PipelineState) {
    info!("=== finalize: aggregating stats ===");

    let total_duration_seconds = state.stage_durations.iter().map(|d| d.duration).sum::<f64>();
    let stats = RunStats {
        workflow_complete: true,
        total_duration_seconds,
        stages_completed: state.stage_durations.len(),
        errors_count: state.errors.len(),
        timestamp: Utc::now(),
        stage_breakdown: state.stage_durations.clone(),
        raw_items_count: state.raw_items.len(),
        deduplicated_items_count: state.deduplicated_items.len(),
        query_results_count: state.query_results.len(),
    };

    info!(
        run_id = %state.run_id,
        duration_secs = total_duration_seconds,
        errors = stats.errors_count,
        "workflow finished"
    );
    for error in &state.errors {
        warn!(%error, "error captured during run");
    }

    state.stats = Some(stats);
    state.advance(PipelineStage::Finalized);
}
