//! End-of-run report.

use crate::controller::ControllerSummary;
use crate::dispatch::DispatchSummary;
use crate::listener::ListenerStats;
use crate::tracker::CrossShardTracker;
use std::fmt;

/// What a run did, assembled once the controller stops.
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub controller: ControllerSummary,
    pub dispatch: DispatchSummary,
    pub blocks_applied: u64,
    pub blocks_ignored: u64,
    pub blocks_rejected: u64,
    pub resolution_fallbacks: u64,
    pub cross_shard_settled: u64,
    /// Cross-shard transactions still awaiting some shard at exit.
    pub cross_shard_pending: usize,
}

impl RunReport {
    pub fn new(
        controller: ControllerSummary,
        dispatch: DispatchSummary,
        listener: &ListenerStats,
        tracker: &CrossShardTracker,
    ) -> Self {
        Self {
            controller,
            dispatch,
            blocks_applied: listener.applied(),
            blocks_ignored: listener.ignored(),
            blocks_rejected: listener.rejected(),
            resolution_fallbacks: listener.fallbacks(),
            cross_shard_settled: tracker.settled_count(),
            cross_shard_pending: tracker.len(),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Txgen Report ===")?;
        writeln!(f, "Rounds:            {}", self.controller.rounds)?;
        writeln!(f, "Generated:         {}", self.controller.generated)?;
        writeln!(f, "Dropped (cap):     {}", self.controller.dropped)?;
        if self.controller.conflicts > 0 {
            writeln!(f, "Spend conflicts:   {}", self.controller.conflicts)?;
        }
        writeln!(f, "Sent:              {}", self.dispatch.transactions())?;
        writeln!(f, "Send failures:     {}", self.dispatch.failures())?;
        for (shard, stats) in &self.dispatch.per_shard {
            writeln!(
                f,
                "  {}: {} txs in {} batches, {} failed",
                shard, stats.transactions, stats.batches, stats.failures
            )?;
        }
        writeln!(
            f,
            "Cross-shard:       {} recorded, {} settled, {} pending",
            self.controller.cross_shard_recorded,
            self.cross_shard_settled,
            self.cross_shard_pending
        )?;
        writeln!(
            f,
            "Blocks:            {} applied, {} ignored, {} rejected, {} fallbacks",
            self.blocks_applied, self.blocks_ignored, self.blocks_rejected, self.resolution_fallbacks
        )?;
        writeln!(f, "Stops delivered:   {}", self.controller.stops_delivered)?;
        if self.dispatch.latency_samples > 0 {
            writeln!(
                f,
                "Send latency:      p50={:?} p99={:?} max={:?}",
                self.dispatch.latency_p50, self.dispatch.latency_p99, self.dispatch.latency_max
            )?;
        }
        Ok(())
    }
}
