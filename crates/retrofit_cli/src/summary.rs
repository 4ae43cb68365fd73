//! One-screen text summary of a simulation run.

use retrofit_core::runner::RunResult;

pub fn render_summary(result: &RunResult) -> String {
    let agg = &result.kpis.aggregate;
    let mut out = String::new();

    out.push_str(&format!(
        "simulated {:.0} min: {} wagons arrived, {} parked, {} rejected, {} in flight\n",
        agg.sim_minutes, agg.wagons_arrived, agg.wagons_parked, agg.wagons_rejected,
        agg.wagons_in_flight
    ));

    for workshop in &result.kpis.workshops {
        out.push_str(&format!(
            "workshop {}: {} retrofits, {:.2}/h, {:.1}% utilized\n",
            workshop.workshop_id,
            workshop.completed_retrofits,
            workshop.throughput_per_hour,
            workshop.utilization_percent
        ));
    }
    for loco in &result.kpis.locomotives {
        out.push_str(&format!(
            "locomotive {}: {:.1}% parked, {:.1}% moving, {:.1}% coupling, {:.1}% decoupling\n",
            loco.locomotive_id,
            loco.parking_percent,
            loco.moving_percent,
            loco.coupling_percent,
            loco.decoupling_percent
        ));
    }

    if let Some(cause) = &result.final_state.aborted {
        out.push_str(&format!("run aborted: {cause}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrofit_core::metrics::{AggregateKpis, RunKpis};
    use retrofit_core::runner::FinalState;

    #[test]
    fn summary_includes_counts_and_abort_cause() {
        let result = RunResult {
            events: vec![],
            kpis: RunKpis {
                aggregate: AggregateKpis {
                    wagons_arrived: 3,
                    wagons_parked: 1,
                    wagons_rejected: 1,
                    wagons_in_flight: 1,
                    completed_retrofits: 1,
                    sim_minutes: 480.0,
                },
                workshops: vec![],
                locomotives: vec![],
                tracks: vec![],
                wagons: vec![],
            },
            final_state: FinalState {
                aborted: Some("boom".to_string()),
                sim_minutes: 480.0,
                wagons: vec![],
            },
        };
        let text = render_summary(&result);
        assert!(text.contains("3 wagons arrived"));
        assert!(text.contains("run aborted: boom"));
    }
}
