//! Basic Standalone Example
//!
//! Strings, a pipeline and a WATCH-guarded transaction against one node.
//!
//! Usage:
//!   cargo run --example basic

use slotwise_client::{Client, ClientConfig, Commands, NodeAddress, TransactionOutcome};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = ClientConfig::builder()
        .with_node(NodeAddress::new("127.0.0.1", 6379))
        .with_client_name("slotwise-basic")
        .build()?;
    let client = Client::new(config);
    let mut conn = client.connection().await?;

    println!("Slotwise - Basic Example\n");

    // 1. Direct commands
    println!("1. Setting 'greeting' and reading it back");
    conn.strings().set("greeting", "Hello, Redis!").await?.done()?;
    let value: Option<String> = conn.strings().get("greeting").await?.done()?;
    println!("   Value: {:?}\n", value);

    println!("2. Setting 'session' with a 10s TTL");
    conn.strings()
        .set_ex("session", "temporary-token", Duration::from_secs(10))
        .await?
        .done()?;
    let ttl = conn.keys().ttl("session").await?.done()?;
    println!("   TTL: {}s\n", ttl);

    // 2. Pipeline: replies come back with the flush
    println!("3. Pipelining three commands");
    conn.begin_pipeline()?;
    let _ = conn.strings().set("counter", 0).await?;
    let first = conn.strings().incr("counter").await?.pending()?;
    let second = conn.strings().incr_by("counter", 10).await?.pending()?;
    let results = conn.flush().await?;
    println!(
        "   INCR -> {}, INCRBY 10 -> {}\n",
        results.get(&first)?,
        results.get(&second)?
    );

    // 3. Optimistic transaction
    println!("4. Transaction guarded by WATCH");
    conn.watch(&["counter"]).await?;
    conn.begin_transaction()?;
    let doubled = conn.strings().incr_by("counter", 11).await?.pending()?;
    match conn.commit().await? {
        TransactionOutcome::Committed(results) => {
            println!("   Committed, counter = {}\n", results.get(&doubled)?)
        }
        TransactionOutcome::Aborted => println!("   Aborted: 'counter' changed meanwhile\n"),
    }

    client.release(conn).await;
    client.shutdown().await;
    println!("Example completed successfully!");
    Ok(())
}
