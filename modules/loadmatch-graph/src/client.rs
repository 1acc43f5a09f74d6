use loadmatch_common::Config;
use neo4rs::{query, ConfigBuilder, Graph};
use tracing::info;

use crate::error::GraphError;

/// Pooled bolt connection shared by the projection and the optimizer.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) graph: Graph,
}

impl GraphClient {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, neo4rs::Error> {
        // Candidate lookups return at most ten rows; writes return none.
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(200)
            .max_connections(8)
            .build()?;
        let graph = Graph::connect(config).await?;
        Ok(Self { graph })
    }

    pub async fn from_config(config: &Config) -> Result<Self, neo4rs::Error> {
        Self::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password).await
    }

    /// Round-trip a trivial query so bad credentials fail at startup rather
    /// than on the first event.
    pub async fn verify(&self) -> Result<(), GraphError> {
        let mut rows = self.graph.execute(query("RETURN 1 AS ok")).await?;
        match rows.next().await? {
            Some(_) => {
                info!("Neo4j connection verified");
                Ok(())
            }
            None => Err(GraphError::Decode("empty response to RETURN 1".into())),
        }
    }

    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}
