//! A throwaway Neo4j for `#[ignore]`d live-database tests.

use std::sync::Arc;

use testcontainers::{
    core::{ContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

use crate::{migrate, GraphClient, Neo4jGraph};

const IMAGE: (&str, &str) = ("neo4j", "5.25.1-community");
const PASSWORD: &str = "loadmatch-test";

/// A migrated Neo4j in a container. Dropping the container stops it, so
/// hold on to it for the whole test.
pub struct TestGraph {
    pub container: ContainerAsync<GenericImage>,
    pub client: GraphClient,
    pub graph: Arc<Neo4jGraph>,
}

pub async fn neo4j_graph() -> TestGraph {
    let container = GenericImage::new(IMAGE.0, IMAGE.1)
        .with_exposed_port(ContainerPort::Tcp(7687))
        .with_wait_for(WaitFor::message_on_stdout("Started."))
        .with_env_var("NEO4J_AUTH", format!("neo4j/{PASSWORD}"))
        .start()
        .await
        .expect("Neo4j container did not start");

    let port = container
        .get_host_port_ipv4(7687)
        .await
        .expect("Neo4j bolt port not mapped");

    let client = GraphClient::connect(&format!("bolt://127.0.0.1:{port}"), "neo4j", PASSWORD)
        .await
        .expect("could not connect to Neo4j container");
    migrate(&client).await.expect("graph migration failed");

    TestGraph {
        container,
        graph: Arc::new(Neo4jGraph::new(client.clone())),
        client,
    }
}
