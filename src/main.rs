//! Runs the surveillance loop against a local ontology and simulated motion.
//!
//! Logging follows `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use surveillance_core::sim::{self, SimulatedFollower, SimulatedPlanner, SimulatedRecharger};
use surveillance_core::{
    KnowledgeBaseClient, MotionServices, Result, SledOntology, SurveillanceConfig,
    SurveillanceWorkflow, TaskCoordinator,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const PLANNER_STEP: Duration = Duration::from_millis(300);
const FOLLOWER_STEP: Duration = Duration::from_millis(300);
const MAX_VIA_POINTS: usize = 8;
const RECHARGE_TIME: Duration = Duration::from_secs(5);
const DISCHARGE_TIME: (Duration, Duration) = (Duration::from_secs(15), Duration::from_secs(40));

#[derive(Parser, Debug)]
#[command(name = "surveillance", version, about = "Surveillance robot decision core")]
struct Cli {
    /// JSON config file; every missing field takes its default.
    config: Option<PathBuf>,

    /// Stop after this many surveillance dwells instead of running forever.
    #[arg(long)]
    visits: Option<usize>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("surveillance_core=info,surveillance=info")),
        )
        .init();

    if let Err(e) = run(cli).await {
        error!(error = %e, "surveillance stopped");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => SurveillanceConfig::from_file(path)?,
        None => SurveillanceConfig::default(),
    };

    // Map generation only runs against a fresh ontology.
    let ontology = SledOntology::temporary()?.with_urgency_threshold(config.urgency_threshold_secs);
    let kb = KnowledgeBaseClient::new(Arc::new(ontology));

    let services = MotionServices {
        planner: Arc::new(SimulatedPlanner {
            environment_size: config.environment_size,
            max_via_points: MAX_VIA_POINTS,
            step: PLANNER_STEP,
        }),
        follower: Arc::new(SimulatedFollower {
            step: FOLLOWER_STEP,
        }),
        recharger: Arc::new(SimulatedRecharger {
            duration: RECHARGE_TIME,
        }),
    };

    let coordinator = TaskCoordinator::new(config, kb, services)?;
    let _battery = coordinator
        .battery_monitor()
        .spawn(sim::battery_events(DISCHARGE_TIME));

    info!("starting surveillance");
    let visits = SurveillanceWorkflow::new(coordinator).run(cli.visits).await?;
    info!(visits, "surveillance finished");
    Ok(())
}
