//! Plan command - shows what `serve` would do with the current configuration.

use anyhow::Result;
use clap::Parser;
use leanserve::pool::{host_cpu_count, PoolSizing};
use leanserve::server::MountPlan;
use serde_json::json;

use super::{CommandContext, EXIT_OK};
use crate::cli::OverrideArgs;

/// Arguments for the plan command
#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    /// Execute the plan command
    pub fn execute(&self, ctx: &CommandContext) -> Result<i32> {
        let snapshot = &ctx.snapshot;
        let plan = MountPlan::resolve(snapshot);
        let cpu_count = host_cpu_count();
        let workers = PoolSizing::workers_for(snapshot);

        if self.json {
            let report = json!({
                "version": leanserve::version(),
                "cpu_count": cpu_count,
                "workers": workers,
                "worker_pool": snapshot.use_worker_pool(),
                "threads": snapshot.threads(),
                "groups": plan,
                "components": plan.component_keys(),
                "flags": snapshot.flags(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(EXIT_OK);
        }

        let out = &ctx.output;
        out.banner(&format!("leanserve {}", leanserve::version()));

        out.section("Worker pool");
        out.key_value("address", snapshot.bind_address());
        out.key_value("cpus", cpu_count);
        out.key_value(
            "workers",
            if snapshot.use_worker_pool() {
                workers.to_string()
            } else {
                "1 (single process)".to_string()
            },
        );
        out.key_value("threads per worker", snapshot.threads());
        let recycle = snapshot.recycle();
        out.key_value(
            "recycle after",
            match recycle.threshold_range() {
                Some(range) => format!("{}..={} requests", range.start(), range.end()),
                None => "disabled".to_string(),
            },
        );

        out.section("Route groups");
        for decision in plan.decisions() {
            let detail = decision
                .blocked_by
                .iter()
                .map(|gate| gate.flag())
                .collect::<Vec<_>>()
                .join(", ");
            out.group(decision.group.name(), decision.mounted, &detail);
        }

        out.section("Flags");
        for (name, value) in snapshot.flags() {
            out.key_value(name, value);
        }

        Ok(EXIT_OK)
    }
}
