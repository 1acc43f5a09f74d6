use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Neo4j error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    /// A row came back without a field the caller needs.
    #[error("Row decode error: {0}")]
    Decode(String),
}
