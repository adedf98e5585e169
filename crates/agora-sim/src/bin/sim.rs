#![forbid(unsafe_code)]

use agora_sim::oracle::AllocationOracle;
use agora_sim::{SimulationConfig, Simulator};
use anyhow::Result;

fn main() -> Result<()> {
    let mut simulator = Simulator::new(SimulationConfig::default())?;
    let result = simulator.run()?;
    let oracle = AllocationOracle::check_all(&result);

    println!(
        "simulation complete: processed={} allocated={} peak_level={} passed={} interesting={}",
        result.stats.processed,
        result.stats.allocated_agents,
        result.peak_level,
        oracle.passed,
        result.interesting_state_reached
    );
    if !oracle.passed {
        println!("{}", serde_json::to_string_pretty(&oracle.violations)?);
        std::process::exit(1);
    }

    Ok(())
}
