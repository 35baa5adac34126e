use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::json;
use slotwise_client::cluster::hash_slot;
use slotwise_client::{
    Client, ClientConfig, ClusterConnection, Cmd, CommandConnection, MultiNodeResult,
    NodeAddress, Value,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "slotwise")]
#[command(about = "Slotwise CLI - redis-cli style client with cluster routing", long_about = None)]
#[command(disable_help_flag = true)]
struct Args {
    /// Server host
    #[arg(short = 'h', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short = 'p', long, default_value = "6379")]
    port: u16,

    /// YAML client configuration; overrides host, port and --cluster
    #[arg(long)]
    config: Option<PathBuf>,

    /// Treat the address as a cluster seed
    #[arg(long)]
    cluster: bool,

    /// Print replies as JSON
    #[arg(long)]
    json: bool,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,

    /// Command to execute (if not in interactive mode)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

enum Target {
    Standalone(CommandConnection),
    Cluster(ClusterConnection),
}

struct SlotwiseCli {
    client: Client,
    target: Target,
    json: bool,
}

impl SlotwiseCli {
    async fn connect(config: ClientConfig, json: bool) -> Result<Self> {
        let client = Client::new(config);
        let target = if client.config().is_cluster() {
            let cluster = client.cluster()?;
            cluster
                .topology()
                .await
                .context("Cannot discover the cluster topology")?;
            Target::Cluster(cluster)
        } else {
            Target::Standalone(client.connection().await.context("Cannot connect")?)
        };
        Ok(Self {
            client,
            target,
            json,
        })
    }

    fn describe(&self) -> String {
        let nodes: Vec<String> = self
            .client
            .config()
            .nodes()
            .iter()
            .map(ToString::to_string)
            .collect();
        match self.target {
            Target::Standalone(_) => nodes.join(","),
            Target::Cluster(_) => format!("cluster {}", nodes.join(",")),
        }
    }

    async fn execute_command(&mut self, parts: &[String]) -> Result<String> {
        let start = Instant::now();
        let name = parts[0].to_uppercase();

        let response = match name.as_str() {
            "HELP" => help_text(),
            "TOPOLOGY" => self.cmd_topology().await?,
            "FANOUT" => self.cmd_fanout(&parts[1..]).await?,
            "KEYSLOT" if parts.len() == 2 => {
                format!("(integer) {}", hash_slot(parts[1].as_bytes()))
            }
            _ => {
                let cmd = build_command(parts);
                debug!("Sending {} with {} key(s)", cmd.name(), cmd.key_count());
                let value = match &mut self.target {
                    Target::Standalone(conn) => conn.execute(cmd).await?.done()?,
                    Target::Cluster(cluster) => cluster.execute(cmd).await?,
                };
                if self.json {
                    value_to_json(&value).to_string()
                } else {
                    format_value(&value, 0)
                }
            }
        };

        if self.json {
            return Ok(response);
        }
        let elapsed = start.elapsed();
        Ok(format!(
            "{}\n{}",
            response,
            format!("({:.2?})", elapsed).dimmed()
        ))
    }

    async fn cmd_topology(&self) -> Result<String> {
        let Target::Cluster(cluster) = &self.target else {
            bail!("TOPOLOGY needs a cluster connection (--cluster)");
        };
        let topology = cluster.refresh_topology().await?;

        if self.json {
            return Ok(serde_json::to_string_pretty(topology.nodes())?);
        }

        let mut lines = Vec::new();
        for (master, replicas) in topology.master_replica_map() {
            let slots: Vec<String> = master.slots.iter().map(ToString::to_string).collect();
            lines.push(format!(
                "{} {} {} [{}] {} slots",
                "master".bold(),
                master.address,
                short_id(&master.id),
                slots.join(","),
                master.slot_count()
            ));
            for replica in replicas {
                lines.push(format!(
                    "  {} {} {}",
                    "replica".dimmed(),
                    replica.address,
                    short_id(&replica.id)
                ));
            }
        }
        let covered = topology.slot_coverage();
        let coverage = format!("{} / 16384 slots covered", covered);
        lines.push(if topology.has_full_coverage() {
            coverage.green().to_string()
        } else {
            coverage.yellow().to_string()
        });
        Ok(lines.join("\n"))
    }

    async fn cmd_fanout(&self, parts: &[String]) -> Result<String> {
        let Target::Cluster(cluster) = &self.target else {
            bail!("FANOUT needs a cluster connection (--cluster)");
        };
        if parts.is_empty() {
            bail!("Usage: FANOUT command [arg ...]");
        }
        let result = cluster.execute_on_all_masters(build_command(parts)).await?;
        if self.json {
            return Ok(fan_out_json(&result).to_string());
        }

        let lines: Vec<String> = result
            .iter()
            .map(|entry| match entry.outcome() {
                Ok(value) => format!(
                    "{} {} {}",
                    entry.node().address.to_string().bold(),
                    "ok".green(),
                    format_value(value, 0).replace('\n', " ")
                ),
                Err(e) => format!(
                    "{} {} {}",
                    entry.node().address.to_string().bold(),
                    "fail".red(),
                    e
                ),
            })
            .collect();
        Ok(lines.join("\n"))
    }

    async fn close(self) {
        if let Target::Standalone(conn) = self.target {
            self.client.release(conn).await;
        }
        self.client.shutdown().await;
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Build a command, marking key arguments for the common commands so
/// cluster routing can find them
fn build_command(parts: &[String]) -> Cmd {
    let name = parts[0].to_uppercase();
    let args = &parts[1..];
    let mut cmd = Cmd::new(name.as_str());

    let is_key: Box<dyn Fn(usize) -> bool> = match name.as_str() {
        "MGET" | "DEL" | "EXISTS" | "UNLINK" | "TOUCH" | "SINTER" | "SUNION" | "SDIFF"
        | "WATCH" => Box::new(|_| true),
        "MSET" => Box::new(|i| i % 2 == 0),
        "RENAME" => Box::new(|i| i < 2),
        "PING" | "ECHO" | "INFO" | "DBSIZE" | "FLUSHDB" | "FLUSHALL" | "KEYS" | "CONFIG"
        | "TIME" | "CLUSTER" | "SELECT" | "LASTSAVE" | "SAVE" | "BGSAVE" | "RANDOMKEY"
        | "CLIENT" | "MULTI" | "EXEC" | "DISCARD" | "UNWATCH" => Box::new(|_| false),
        _ => Box::new(|i| i == 0),
    };

    for (i, arg) in args.iter().enumerate() {
        if is_key(i) {
            cmd.push_key(arg.as_str());
        } else {
            cmd.push_arg(arg.as_str());
        }
    }
    cmd
}

fn format_value(value: &Value, depth: usize) -> String {
    match value {
        Value::Nil => "(nil)".dimmed().to_string(),
        Value::Int(n) => format!("(integer) {}", n),
        Value::Data(data) => format!("\"{}\"", String::from_utf8_lossy(data)),
        Value::Status(status) => status.clone(),
        Value::Okay => "OK".green().to_string(),
        Value::Array(items) if items.is_empty() => "(empty array)".dimmed().to_string(),
        Value::Array(items) => {
            let indent = "   ".repeat(depth);
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let prefix = if i == 0 { String::new() } else { indent.clone() };
                    format!("{}{}) {}", prefix, i + 1, format_value(item, depth + 1))
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Nil => serde_json::Value::Null,
        Value::Int(n) => json!(n),
        Value::Data(data) => json!(String::from_utf8_lossy(data)),
        Value::Status(status) => json!(status),
        Value::Okay => json!("OK"),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
    }
}

fn fan_out_json(result: &MultiNodeResult) -> serde_json::Value {
    let nodes: Vec<serde_json::Value> = result
        .iter()
        .map(|entry| match entry.outcome() {
            Ok(value) => json!({
                "node": entry.node().id,
                "address": entry.node().address.to_string(),
                "ok": true,
                "value": value_to_json(value),
            }),
            Err(e) => json!({
                "node": entry.node().id,
                "address": entry.node().address.to_string(),
                "ok": false,
                "error": e.to_string(),
            }),
        })
        .collect();
    json!({ "all_succeeded": result.all_succeeded(), "nodes": nodes })
}

fn help_text() -> String {
    format!(
        r#"{}

{}
  Any command is sent as typed, e.g. SET key value, MGET k1 k2, HGETALL key

{}
  TOPOLOGY                   Refresh and print masters, replicas and slot ranges
  FANOUT cmd [arg ...]       Run a command on every master, one line per node
  KEYSLOT key                Hash slot of a key (computed locally)

{}
  HELP                       Show this help message
  QUIT                       Exit the CLI
"#,
        "Slotwise CLI - Available Commands".bold().cyan(),
        "Redis Commands:".bold(),
        "Cluster Commands:".bold(),
        "Session:".bold(),
    )
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    if let Some(path) = &args.config {
        return ClientConfig::from_yaml_file(path)
            .with_context(|| format!("Cannot load {}", path.display()));
    }
    let mut builder = ClientConfig::builder().with_node(NodeAddress::new(&args.host, args.port));
    if args.cluster {
        builder = builder.with_cluster_mode();
    }
    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut cli = SlotwiseCli::connect(config, args.json).await?;

    if !args.command.is_empty() {
        // Command mode: execute single command and exit
        let outcome = cli.execute_command(&args.command).await;
        cli.close().await;
        match outcome {
            Ok(output) => {
                println!("{}", output);
                Ok(())
            }
            Err(e) => {
                eprintln!("{}", format!("(error) {}", e).red());
                std::process::exit(1);
            }
        }
    } else {
        let result = run_interactive(&mut cli).await;
        cli.close().await;
        result
    }
}

async fn run_interactive(cli: &mut SlotwiseCli) -> Result<()> {
    println!(
        "{}",
        format!("Slotwise CLI v{}", env!("CARGO_PKG_VERSION"))
            .bold()
            .cyan()
    );
    println!("Connected to {}", cli.describe());
    println!("Type {} for available commands\n", "HELP".bold());

    let mut rl = DefaultEditor::new()?;
    let prompt = format!("{}> ", cli.describe().green());

    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let parts: Vec<String> = line.split_whitespace().map(String::from).collect();
                if parts.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line)?;

                let cmd = parts[0].to_uppercase();
                if cmd == "QUIT" || cmd == "EXIT" {
                    println!("Goodbye!");
                    break;
                }

                match cli.execute_command(&parts).await {
                    Ok(output) => println!("{}", output),
                    Err(e) => eprintln!("{}", format!("(error) {}", e).red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => return Err(anyhow!("Readline error: {:?}", err)),
        }
    }

    Ok(())
}
