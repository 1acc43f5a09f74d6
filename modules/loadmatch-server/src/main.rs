use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use loadmatch_common::{Config, EventType};
use loadmatch_engine::{ComplianceAlertLogger, EventDispatcher, EventLogger};
use loadmatch_events::EventLog;
use loadmatch_graph::{migrate, GraphClient, GraphSynchronizer, Neo4jGraph};
use loadmatch_routing::{
    DirectionsService, GoogleDirections, OptimizationConstraints, OptimizationOrchestrator,
    OptimizationResponse, PgLoadRepository, RouteGeometryProvider,
};

#[derive(Parser)]
#[command(name = "loadmatch", about = "Freight load graph sync and route optimization")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume the event bus and keep the graph in sync until Ctrl-C.
    Consume,
    /// Create graph constraints/indexes and bus tables.
    Migrate,
    /// Plan, persist and announce a route for a load on a given vehicle.
    Optimize {
        #[arg(long)]
        load_id: String,
        #[arg(long)]
        vehicle_id: String,
        #[arg(long)]
        driver_id: Option<String>,
    },
    /// Pick the best driver/vehicle for a load from the graph.
    OptimizeAdvanced {
        #[arg(long)]
        load_id: String,
        #[arg(long, default_value_t = 50.0)]
        max_driver_distance_miles: f64,
        #[arg(long, default_value_t = 11.0)]
        max_route_duration_hours: f64,
        /// Save the selection as a planned route and emit ROUTE_OPTIMIZED.
        #[arg(long)]
        persist: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("loadmatch=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.log_redacted();

    let client = GraphClient::from_config(&config)
        .await
        .context("connecting to Neo4j")?;
    client.verify().await?;
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;
    let bus = EventLog::new(pool.clone(), config.bus.partitions);

    match cli.command {
        Command::Migrate => {
            migrate(&client).await?;
            bus.ensure_schema().await?;
            info!("Migrations complete");
        }
        Command::Consume => consume(&config, client, bus).await?,
        Command::Optimize {
            load_id,
            vehicle_id,
            driver_id,
        } => {
            let orchestrator = orchestrator(&config, client, pool, bus);
            let response = orchestrator
                .optimize(&load_id, &vehicle_id, driver_id.as_deref())
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::OptimizeAdvanced {
            load_id,
            max_driver_distance_miles,
            max_route_duration_hours,
            persist,
        } => {
            let constraints = OptimizationConstraints {
                max_driver_distance_miles,
                max_route_duration_hours,
                ..OptimizationConstraints::default()
            };
            let orchestrator = orchestrator(&config, client, pool, bus);
            let response = orchestrator.optimize_advanced(&load_id, &constraints).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            if let (true, OptimizationResponse::Success(selection)) = (persist, &response) {
                let route_id = orchestrator.persist_selection(&load_id, selection).await?;
                info!(load_id = %load_id, route_id = %route_id, "Persisted advanced selection");
            }
        }
    }

    Ok(())
}

async fn consume(config: &Config, client: GraphClient, bus: EventLog) -> Result<()> {
    migrate(&client).await?;
    bus.ensure_schema().await?;

    let graph = Arc::new(Neo4jGraph::new(client));
    let synchronizer = Arc::new(GraphSynchronizer::new(graph));
    let dispatcher = Arc::new(EventDispatcher::new(
        synchronizer,
        Duration::from_millis(config.bus.commit_interval_ms),
    ));

    for event_type in EventType::ALL {
        dispatcher.register_handler(event_type, Arc::new(EventLogger));
    }
    for event_type in ComplianceAlertLogger::EVENT_TYPES {
        dispatcher.register_handler(event_type, Arc::new(ComplianceAlertLogger));
    }

    let stopper = dispatcher.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            stopper.stop();
        }
    });

    let mut consumer = bus.consumer(&config.bus);
    dispatcher.run(&mut consumer, &config.bus.topics).await?;

    let stats = dispatcher.stats();
    info!(
        events_processed = stats.events_processed,
        decode_failures = stats.decode_failures,
        handler_failures = stats.handler_failures,
        mutation_failures = stats.mutation_failures,
        transport_errors = stats.transport_errors,
        "Consumer finished"
    );
    for failure in dispatcher.take_failures() {
        warn!(
            event_id = failure.event_id.as_deref().unwrap_or("-"),
            event_type = failure.event_type.as_deref().unwrap_or("-"),
            stage = ?failure.stage,
            error = %failure.error,
            "Unresolved failure"
        );
    }
    Ok(())
}

fn orchestrator(config: &Config, client: GraphClient, pool: PgPool, bus: EventLog) -> OptimizationOrchestrator {
    let directions: Option<Arc<dyn DirectionsService>> = config
        .maps_api_key
        .clone()
        .map(|key| Arc::new(GoogleDirections::new(key)) as Arc<dyn DirectionsService>);

    OptimizationOrchestrator::new(
        Arc::new(Neo4jGraph::new(client)),
        Arc::new(PgLoadRepository::new(pool)),
        Arc::new(bus),
        RouteGeometryProvider::new(directions),
    )
}
