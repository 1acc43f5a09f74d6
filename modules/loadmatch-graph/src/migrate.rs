use neo4rs::query;
use tracing::{info, warn};

use crate::mutation::NodeLabel;
use crate::GraphClient;

/// One node per external id, for every label the projection writes.
pub async fn migrate(client: &GraphClient) -> Result<(), neo4rs::Error> {
    let g = &client.graph;

    info!("Running graph schema migrations...");

    for label in NodeLabel::ALL {
        let name = label.as_str();
        let cypher = format!(
            "CREATE CONSTRAINT {}_id_unique IF NOT EXISTS FOR (n:{name}) REQUIRE n.id IS UNIQUE",
            name.to_lowercase()
        );
        run_ignoring_exists(g, &cypher).await?;
    }
    info!("Id uniqueness constraints ready");

    let indexes = [
        "CREATE INDEX driver_status IF NOT EXISTS FOR (n:Driver) ON (n.status)",
        "CREATE INDEX vehicle_status IF NOT EXISTS FOR (n:Vehicle) ON (n.status)",
        "CREATE INDEX load_status IF NOT EXISTS FOR (n:Load) ON (n.status)",
    ];
    for idx in &indexes {
        run_ignoring_exists(g, idx).await?;
    }
    info!("Status indexes ready");

    Ok(())
}

async fn run_ignoring_exists(g: &neo4rs::Graph, cypher: &str) -> Result<(), neo4rs::Error> {
    match g.run(query(cypher)).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let msg = e.to_string().to_lowercase();
            if msg.contains("already exists") || msg.contains("equivalent") {
                warn!("Already exists (skipped): {}", cypher.chars().take(80).collect::<String>());
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}
