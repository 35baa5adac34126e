//! Cluster Example
//!
//! Slot-routed commands, a split MGET and a fan-out across all masters.
//!
//! Usage:
//!   cargo run --example cluster -- 127.0.0.1:7000 127.0.0.1:7001

use slotwise_client::{Client, ClientConfig, Commands, NodeAddress};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut seeds: Vec<NodeAddress> = std::env::args()
        .skip(1)
        .map(|s| s.parse())
        .collect::<Result<_, _>>()?;
    if seeds.is_empty() {
        seeds.push(NodeAddress::new("127.0.0.1", 7000));
    }

    let config = ClientConfig::builder()
        .with_nodes(seeds)
        .with_cluster_mode()
        .build()?;
    let client = Client::new(config);
    let mut cluster = client.cluster()?;

    println!("Slotwise - Cluster Example\n");

    let topology = cluster.topology().await?;
    println!("1. Topology: {} nodes", topology.nodes().len());
    for (master, replicas) in topology.master_replica_map() {
        println!("   {} serves {} slots, {} replica(s)", master, master.slot_count(), replicas.len());
    }

    println!("\n2. Keys land on the master owning their slot");
    for key in ["foo", "bar", "{user:42}.name", "{user:42}.email"] {
        cluster.strings().set(key, "value").await?.done()?;
        let node = cluster.node_for_key(key).await?;
        println!("   {} -> slot {} on {}", key, cluster.key_slot(key), node.address);
    }

    println!("\n3. MGET across slots is split per node and reassembled");
    let values: Vec<Option<String>> = cluster
        .strings()
        .mget(&["foo", "bar", "missing"])
        .await?
        .done()?;
    println!("   {:?}", values);

    println!("\n4. Fan-out");
    println!("   DBSIZE across masters: {}", cluster.db_size().await?);
    let pings = cluster.ping_all().await?;
    for entry in pings.iter() {
        let status = if entry.is_ok() { "ok" } else { "fail" };
        println!("   PING {} {}", entry.node().address, status);
    }

    client.shutdown().await;
    println!("\nExample completed successfully!");
    Ok(())
}
