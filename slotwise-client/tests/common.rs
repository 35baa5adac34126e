//! Common test utilities
//!
//! [`FakeRedis`] is an in-memory stand-in for one Redis server or a whole
//! cluster. Clients reach it through [`FakeFactory`], which hands out
//! transports that decode the RESP commands the client writes and answer
//! them from shared state.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use slotwise_client::cluster::hash_slot;
use slotwise_client::resp::{Frame, FrameDecoder};
use slotwise_client::transport::{Transport, TransportError, TransportFactory};
use slotwise_client::{Client, ClientConfig, NodeAddress};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INT: &str = "ERR value is not an integer or out of range";

const SINGLE_KEY: &[&str] = &[
    "GET", "SET", "GETSET", "INCR", "INCRBY", "DECR", "DECRBY", "APPEND", "STRLEN", "EXPIRE",
    "PEXPIRE", "TTL", "PTTL", "PERSIST", "TYPE", "HSET", "HGET", "HMGET", "HGETALL", "HDEL",
    "HEXISTS", "HLEN", "HKEYS", "HVALS", "HINCRBY", "LPUSH", "RPUSH", "LPOP", "RPOP", "LRANGE",
    "LLEN", "LINDEX", "LREM", "LTRIM", "SADD", "SREM", "SMEMBERS", "SISMEMBER", "SCARD", "SPOP",
    "ZADD", "ZREM", "ZSCORE", "ZINCRBY", "ZCARD", "ZRANK", "ZRANGE", "ZRANGEBYSCORE", "ZCOUNT",
];
const ALL_KEYS: &[&str] = &[
    "MGET", "DEL", "EXISTS", "UNLINK", "TOUCH", "SINTER", "SUNION", "SDIFF", "WATCH",
];
const KEYLESS: &[&str] = &[
    "PING", "ECHO", "CLIENT", "SELECT", "ASKING", "MSET", "RENAME", "KEYS", "RANDOMKEY", "DBSIZE",
    "FLUSHDB", "FLUSHALL", "SAVE", "BGSAVE", "LASTSAVE", "TIME", "INFO", "CONFIG", "CLUSTER",
    "MULTI", "EXEC", "DISCARD", "UNWATCH",
];
const WRITES: &[&str] = &[
    "SET", "GETSET", "INCR", "INCRBY", "DECR", "DECRBY", "APPEND", "MSET", "DEL", "UNLINK",
    "EXPIRE", "PEXPIRE", "PERSIST", "RENAME", "HSET", "HDEL", "HINCRBY", "LPUSH", "RPUSH", "LPOP",
    "RPOP", "LREM", "LTRIM", "SADD", "SREM", "SPOP", "ZADD", "ZREM", "ZINCRBY",
];

#[derive(Debug, Clone)]
enum Stored {
    Str(Vec<u8>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    List(VecDeque<Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
    ZSet(BTreeMap<Vec<u8>, f64>),
}

impl Stored {
    fn type_name(&self) -> &'static str {
        match self {
            Stored::Str(_) => "string",
            Stored::Hash(_) => "hash",
            Stored::List(_) => "list",
            Stored::Set(_) => "set",
            Stored::ZSet(_) => "zset",
        }
    }
}

type Db = HashMap<Vec<u8>, Stored>;

struct Node {
    id: String,
    address: NodeAddress,
    replica_of: Option<String>,
    slots: Vec<(u16, u16)>,
    reachable: bool,
    dbs: HashMap<u32, Db>,
    versions: HashMap<(u32, Vec<u8>), u64>,
    expires: HashMap<(u32, Vec<u8>), i64>,
    migrating: HashMap<u16, String>,
    importing: HashMap<u16, String>,
    redirect_all_to: Option<usize>,
    drop_after_replies: Option<usize>,
    connects: usize,
    log: Vec<String>,
    config: HashMap<String, String>,
    last_save: i64,
}

impl Node {
    fn new(index: usize, address: NodeAddress) -> Self {
        let mut config = HashMap::new();
        config.insert("maxmemory".to_string(), "0".to_string());
        Self {
            id: format!("{:040x}", index + 1),
            address,
            replica_of: None,
            slots: Vec::new(),
            reachable: true,
            dbs: HashMap::new(),
            versions: HashMap::new(),
            expires: HashMap::new(),
            migrating: HashMap::new(),
            importing: HashMap::new(),
            redirect_all_to: None,
            drop_after_replies: None,
            connects: 0,
            log: Vec::new(),
            config,
            last_save: 1_700_000_000 + index as i64,
        }
    }

    fn owns(&self, slot: u16) -> bool {
        self.slots.iter().any(|&(s, e)| s <= slot && slot <= e)
    }

    fn db(&mut self, db: u32) -> &mut Db {
        self.dbs.entry(db).or_default()
    }

    fn remove_slot(&mut self, slot: u16) {
        let mut kept = Vec::new();
        for &(s, e) in &self.slots {
            if slot < s || slot > e {
                kept.push((s, e));
                continue;
            }
            if s < slot {
                kept.push((s, slot - 1));
            }
            if slot < e {
                kept.push((slot + 1, e));
            }
        }
        self.slots = kept;
    }
}

#[derive(Default)]
struct Session {
    db: u32,
    multi: Option<Vec<Vec<Vec<u8>>>>,
    queue_failed: bool,
    watched: Vec<((u32, Vec<u8>), u64)>,
    asking: bool,
}

struct State {
    cluster: bool,
    hostless_redirects: bool,
    next_version: u64,
    nodes: Vec<Node>,
}

/// Shared in-memory Redis deployment
#[derive(Clone)]
pub struct FakeRedis {
    state: Arc<Mutex<State>>,
}

impl FakeRedis {
    pub fn standalone() -> Self {
        Self::build(false, vec![Node::new(0, standalone_address())])
    }

    /// `masters` masters on 127.0.0.1:7000.., slots split evenly
    pub fn cluster(masters: usize) -> Self {
        let nodes = (0..masters)
            .map(|i| {
                let mut node = Node::new(i, NodeAddress::new("127.0.0.1", 7000 + i as u16));
                let start = (i * 16384 / masters) as u16;
                let end = ((i + 1) * 16384 / masters - 1) as u16;
                node.slots.push((start, end));
                node
            })
            .collect();
        Self::build(true, nodes)
    }

    fn build(cluster: bool, nodes: Vec<Node>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                cluster,
                hostless_redirects: false,
                next_version: 0,
                nodes,
            })),
        }
    }

    /// Add a replica of master `master`; returns its index
    pub fn add_replica(&self, master: usize) -> usize {
        let mut state = self.state.lock();
        let index = state.nodes.len();
        let mut node = Node::new(index, NodeAddress::new("127.0.0.1", 7100 + index as u16));
        node.replica_of = Some(state.nodes[master].id.clone());
        state.nodes.push(node);
        index
    }

    pub fn factory(&self) -> Arc<FakeFactory> {
        Arc::new(FakeFactory {
            redis: self.clone(),
        })
    }

    pub fn client(&self, config: ClientConfig) -> Client {
        Client::with_transport_factory(config, self.factory())
    }

    /// Cluster client seeded with every master, topology cached for a minute
    pub fn cluster_client(&self) -> Client {
        self.client(self.cluster_config().build().unwrap())
    }

    pub fn cluster_config(&self) -> slotwise_client::ClientConfigBuilder {
        ClientConfig::builder()
            .with_nodes(self.master_addresses())
            .with_cluster_mode()
            .with_topology_ttl(Duration::from_secs(60))
    }

    pub fn standalone_client(&self) -> Client {
        self.client(
            ClientConfig::builder()
                .with_node(standalone_address())
                .build()
                .unwrap(),
        )
    }

    pub fn address(&self, node: usize) -> NodeAddress {
        self.state.lock().nodes[node].address.clone()
    }

    pub fn id(&self, node: usize) -> String {
        self.state.lock().nodes[node].id.clone()
    }

    pub fn master_addresses(&self) -> Vec<NodeAddress> {
        self.state
            .lock()
            .nodes
            .iter()
            .filter(|n| n.replica_of.is_none())
            .map(|n| n.address.clone())
            .collect()
    }

    /// Index of the node serving `key` right now
    pub fn owner_of(&self, key: &str) -> usize {
        let slot = hash_slot(key.as_bytes());
        self.state
            .lock()
            .owner(slot)
            .expect("slot has no owner")
    }

    pub fn set_reachable(&self, node: usize, reachable: bool) {
        self.state.lock().nodes[node].reachable = reachable;
    }

    /// Reassign `slot` to `to` on the server side only
    pub fn move_slot(&self, slot: u16, to: usize) {
        self.state.lock().assign(slot, to);
    }

    /// Leave `slot` without an owner
    pub fn unassign_slot(&self, slot: u16) {
        for node in &mut self.state.lock().nodes {
            node.remove_slot(slot);
        }
    }

    pub fn start_migration(&self, slot: u16, from: usize, to: usize) {
        let mut state = self.state.lock();
        let to_id = state.nodes[to].id.clone();
        let from_id = state.nodes[from].id.clone();
        state.nodes[from].migrating.insert(slot, to_id);
        state.nodes[to].importing.insert(slot, from_id);
    }

    /// Answer every keyed command on `from` with a MOVED to `to`
    pub fn redirect_all(&self, from: usize, to: usize) {
        self.state.lock().nodes[from].redirect_all_to = Some(to);
    }

    pub fn use_hostless_redirects(&self) {
        self.state.lock().hostless_redirects = true;
    }

    /// Drop the connection instead of delivering reply number `replies + 1`
    pub fn drop_after_replies(&self, node: usize, replies: usize) {
        self.state.lock().nodes[node].drop_after_replies = Some(replies);
    }

    pub fn set_last_save(&self, node: usize, timestamp: i64) {
        self.state.lock().nodes[node].last_save = timestamp;
    }

    pub fn connects(&self, node: usize) -> usize {
        self.state.lock().nodes[node].connects
    }

    pub fn total_connects(&self) -> usize {
        self.state.lock().nodes.iter().map(|n| n.connects).sum()
    }

    /// Commands node `node` has processed, as `NAME arg arg ...`
    pub fn log(&self, node: usize) -> Vec<String> {
        self.state.lock().nodes[node].log.clone()
    }

    pub fn total_commands(&self) -> usize {
        self.state.lock().nodes.iter().map(|n| n.log.len()).sum()
    }

    /// Commands on `node` whose text starts with `prefix`
    pub fn count(&self, node: usize, prefix: &str) -> usize {
        self.state.lock().nodes[node]
            .log
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn count_all(&self, prefix: &str) -> usize {
        let nodes = self.state.lock().nodes.len();
        (0..nodes).map(|n| self.count(n, prefix)).sum()
    }

    /// String value of `key` in database `db` of `node`
    pub fn string(&self, node: usize, db: u32, key: &str) -> Option<String> {
        let mut state = self.state.lock();
        match state.nodes[node].db(db).get(key.as_bytes()) {
            Some(Stored::Str(v)) => Some(String::from_utf8_lossy(v).into_owned()),
            _ => None,
        }
    }

    pub fn key_count(&self, node: usize) -> usize {
        self.state.lock().nodes[node].db(0).len()
    }
}

pub fn standalone_address() -> NodeAddress {
    NodeAddress::new("127.0.0.1", 6379)
}

impl State {
    fn index_of(&self, address: &NodeAddress) -> Option<usize> {
        self.nodes.iter().position(|n| &n.address == address)
    }

    fn index_of_id(&self, id: &[u8]) -> Option<usize> {
        self.nodes.iter().position(|n| n.id.as_bytes() == id)
    }

    fn owner(&self, slot: u16) -> Option<usize> {
        self.nodes.iter().position(|n| n.owns(slot))
    }

    fn assign(&mut self, slot: u16, to: usize) {
        for node in &mut self.nodes {
            node.remove_slot(slot);
            node.migrating.remove(&slot);
            node.importing.remove(&slot);
        }
        self.nodes[to].slots.push((slot, slot));
    }

    fn redirect_target(&self, node: usize) -> String {
        let address = &self.nodes[node].address;
        if self.hostless_redirects {
            format!(":{}", address.port())
        } else {
            address.to_string()
        }
    }

    fn bump(&mut self, node: usize, db: u32, key: &[u8]) {
        self.next_version += 1;
        let version = self.next_version;
        self.nodes[node].versions.insert((db, key.to_vec()), version);
    }

    fn version(&self, node: usize, db: u32, key: &[u8]) -> u64 {
        self.nodes[node]
            .versions
            .get(&(db, key.to_vec()))
            .copied()
            .unwrap_or(0)
    }

    /// Entry point for one decoded command
    fn handle(&mut self, node: usize, session: &mut Session, args: Vec<Vec<u8>>) -> Frame {
        let name = upper(&args[0]);
        let text = std::iter::once(name.clone())
            .chain(args[1..].iter().map(|a| String::from_utf8_lossy(a).into_owned()))
            .collect::<Vec<_>>()
            .join(" ");
        self.nodes[node].log.push(text);

        match name.as_str() {
            "MULTI" => {
                if session.multi.is_some() {
                    return error("ERR MULTI calls can not be nested");
                }
                session.multi = Some(Vec::new());
                session.queue_failed = false;
                ok()
            }
            "EXEC" => {
                let Some(queued) = session.multi.take() else {
                    return error("ERR EXEC without MULTI");
                };
                let watched = std::mem::take(&mut session.watched);
                if session.queue_failed {
                    session.queue_failed = false;
                    return error("EXECABORT Transaction discarded because of previous errors.");
                }
                if watched
                    .iter()
                    .any(|((db, key), version)| self.version(node, *db, key) != *version)
                {
                    return Frame::Array(None);
                }
                let replies = queued
                    .into_iter()
                    .map(|cmd| self.run(node, session, cmd))
                    .collect();
                Frame::Array(Some(replies))
            }
            "DISCARD" => {
                if session.multi.take().is_none() {
                    return error("ERR DISCARD without MULTI");
                }
                session.watched.clear();
                session.queue_failed = false;
                ok()
            }
            "WATCH" => {
                if session.multi.is_some() {
                    return error("ERR WATCH inside MULTI is not allowed");
                }
                for key in &args[1..] {
                    let version = self.version(node, session.db, key);
                    session.watched.push(((session.db, key.clone()), version));
                }
                ok()
            }
            "UNWATCH" => {
                session.watched.clear();
                ok()
            }
            _ if session.multi.is_some() => {
                if !is_known(&name) {
                    session.queue_failed = true;
                    return error(&format!("ERR unknown command '{}'", name));
                }
                if let Some(queue) = session.multi.as_mut() {
                    queue.push(args);
                }
                Frame::Simple("QUEUED".into())
            }
            _ => self.run(node, session, args),
        }
    }

    fn run(&mut self, node: usize, session: &mut Session, args: Vec<Vec<u8>>) -> Frame {
        let asking = std::mem::take(&mut session.asking);
        let name = upper(&args[0]);
        if !is_known(&name) {
            return error(&format!(
                "ERR unknown command '{}', with args beginning with: ",
                name
            ));
        }

        if self.cluster {
            let keys = key_args(&name, &args);
            if let Some(first) = keys.first() {
                let slot = hash_slot(first);
                if keys.iter().any(|k| hash_slot(k) != slot) {
                    return error("CROSSSLOT Keys in request don't hash to the same slot");
                }
                if let Some(target) = self.nodes[node].redirect_all_to {
                    return error(&format!("MOVED {} {}", slot, self.redirect_target(target)));
                }
                match self.owner(slot) {
                    None => return error("CLUSTERDOWN Hash slot not served"),
                    Some(owner) if owner == node => {
                        let migrating = self.nodes[node].migrating.get(&slot).cloned();
                        if let Some(target) = migrating {
                            let exists = self.nodes[node].db(0).contains_key(*first);
                            if !exists {
                                let target = self.index_of_id(target.as_bytes()).unwrap_or(node);
                                return error(&format!(
                                    "ASK {} {}",
                                    slot,
                                    self.redirect_target(target)
                                ));
                            }
                        }
                    }
                    Some(_) if asking && self.nodes[node].importing.contains_key(&slot) => {}
                    Some(owner) => {
                        return error(&format!("MOVED {} {}", slot, self.redirect_target(owner)));
                    }
                }
            }
        }

        let reply = self.apply(node, session, &name, &args);
        if !reply.is_error() && WRITES.contains(&name.as_str()) {
            for key in key_args(&name, &args) {
                self.bump(node, session.db, key);
            }
        }
        reply
    }

    fn apply(&mut self, node: usize, session: &mut Session, name: &str, args: &[Vec<u8>]) -> Frame {
        if args.len() < min_args(name) {
            return error(&format!(
                "ERR wrong number of arguments for '{}' command",
                name.to_lowercase()
            ));
        }
        let cluster = self.cluster;
        let db_index = session.db;
        let key = args.get(1).cloned().unwrap_or_default();

        match name {
            "PING" => match args.get(1) {
                Some(message) => bulk(message.clone()),
                None => Frame::Simple("PONG".into()),
            },
            "ECHO" => bulk(key),
            "CLIENT" => ok(),
            "ASKING" => {
                session.asking = true;
                ok()
            }
            "SELECT" => {
                if cluster {
                    return error("ERR SELECT is not allowed in cluster mode");
                }
                match parse_int(&key) {
                    Some(db) if (0..16).contains(&db) => {
                        session.db = db as u32;
                        ok()
                    }
                    _ => error("ERR DB index is out of range"),
                }
            }
            "CLUSTER" => self.cluster_command(node, args),
            "DBSIZE" => Frame::Integer(self.nodes[node].db(db_index).len() as i64),
            "FLUSHDB" => {
                self.nodes[node].db(db_index).clear();
                ok()
            }
            "FLUSHALL" => {
                self.nodes[node].dbs.clear();
                ok()
            }
            "SAVE" => ok(),
            "BGSAVE" => Frame::Simple("Background saving started".into()),
            "LASTSAVE" => Frame::Integer(self.nodes[node].last_save),
            "TIME" => Frame::Array(Some(vec![
                bulk(b"1700000000".to_vec()),
                bulk(b"123456".to_vec()),
            ])),
            "INFO" => {
                let role = if self.nodes[node].replica_of.is_some() {
                    "slave"
                } else {
                    "master"
                };
                bulk(
                    format!(
                        "# Server\r\nredis_version:7.2.0\r\ntcp_port:{}\r\n\r\n# Replication\r\nrole:{}\r\n",
                        self.nodes[node].address.port(),
                        role
                    )
                    .into_bytes(),
                )
            }
            "CONFIG" => match upper(&key).as_str() {
                "GET" => {
                    let pattern = String::from_utf8_lossy(&args[2]).into_owned();
                    match self.nodes[node].config.get(&pattern) {
                        Some(value) => Frame::Array(Some(vec![
                            bulk(pattern.into_bytes()),
                            bulk(value.clone().into_bytes()),
                        ])),
                        None => Frame::Array(Some(Vec::new())),
                    }
                }
                "SET" if args.len() >= 4 => {
                    let field = String::from_utf8_lossy(&args[2]).into_owned();
                    let value = String::from_utf8_lossy(&args[3]).into_owned();
                    self.nodes[node].config.insert(field, value);
                    ok()
                }
                _ => error("ERR unknown subcommand"),
            },
            "KEYS" => {
                let pattern = String::from_utf8_lossy(&key).into_owned();
                let mut keys: Vec<Vec<u8>> = self.nodes[node]
                    .db(db_index)
                    .keys()
                    .filter(|k| glob(&pattern, k))
                    .cloned()
                    .collect();
                keys.sort();
                Frame::Array(Some(keys.into_iter().map(bulk).collect()))
            }
            "RANDOMKEY" => {
                let mut keys: Vec<&Vec<u8>> = Vec::new();
                let db = self.nodes[node].db(db_index);
                keys.extend(db.keys());
                keys.sort();
                match keys.first() {
                    Some(k) => bulk((*k).clone()),
                    None => nil(),
                }
            }
            _ => {
                let db = self.nodes[node].db(db_index);
                let expires = &mut Vec::new();
                let reply = data_command(db, name, args, expires);
                let node = &mut self.nodes[node];
                for (key, ttl) in expires.drain(..) {
                    match ttl {
                        Some(ttl) => node.expires.insert((db_index, key), ttl),
                        None => node.expires.remove(&(db_index, key)),
                    };
                }
                match name {
                    "TTL" | "PTTL" => ttl_reply(node, db_index, &key, name == "PTTL"),
                    "PERSIST" => {
                        let exists = node.db(db_index).contains_key(&key);
                        Frame::Integer(
                            (exists && node.expires.remove(&(db_index, key)).is_some()) as i64,
                        )
                    }
                    _ => reply,
                }
            }
        }
    }

    fn cluster_command(&mut self, node: usize, args: &[Vec<u8>]) -> Frame {
        if !self.cluster {
            return error("ERR This instance has cluster support disabled");
        }
        let sub = args.get(1).map(|a| upper(a)).unwrap_or_default();
        let slot_arg = |i: usize| args.get(i).and_then(|a| parse_int(a)).map(|s| s as u16);
        match sub.as_str() {
            "NODES" => bulk(self.nodes_text(node).into_bytes()),
            "INFO" => {
                let assigned: usize = self
                    .nodes
                    .iter()
                    .flat_map(|n| n.slots.iter())
                    .map(|&(s, e)| (e - s) as usize + 1)
                    .sum();
                bulk(
                    format!(
                        "cluster_state:ok\r\ncluster_slots_assigned:{}\r\ncluster_known_nodes:{}\r\n",
                        assigned,
                        self.nodes.len()
                    )
                    .into_bytes(),
                )
            }
            "KEYSLOT" => Frame::Integer(hash_slot(&args[2]) as i64),
            "COUNTKEYSINSLOT" => {
                let Some(slot) = slot_arg(2) else {
                    return error("ERR Invalid slot");
                };
                let count = self.nodes[node]
                    .db(0)
                    .keys()
                    .filter(|k| hash_slot(k) == slot)
                    .count();
                Frame::Integer(count as i64)
            }
            "GETKEYSINSLOT" => {
                let (Some(slot), Some(count)) = (slot_arg(2), slot_arg(3)) else {
                    return error("ERR Invalid slot or number of keys");
                };
                let mut keys: Vec<Vec<u8>> = self.nodes[node]
                    .db(0)
                    .keys()
                    .filter(|k| hash_slot(k) == slot)
                    .cloned()
                    .collect();
                keys.sort();
                keys.truncate(count as usize);
                Frame::Array(Some(keys.into_iter().map(bulk).collect()))
            }
            "SETSLOT" => {
                let Some(slot) = slot_arg(2) else {
                    return error("ERR Invalid slot");
                };
                let mode = args.get(3).map(|a| upper(a)).unwrap_or_default();
                let peer = args.get(4).cloned().unwrap_or_default();
                let peer_index = self.index_of_id(&peer);
                match (mode.as_str(), peer_index) {
                    ("STABLE", _) => {
                        self.nodes[node].migrating.remove(&slot);
                        self.nodes[node].importing.remove(&slot);
                    }
                    ("IMPORTING", Some(_)) => {
                        let id = String::from_utf8_lossy(&peer).into_owned();
                        self.nodes[node].importing.insert(slot, id);
                    }
                    ("MIGRATING", Some(_)) => {
                        let id = String::from_utf8_lossy(&peer).into_owned();
                        self.nodes[node].migrating.insert(slot, id);
                    }
                    ("NODE", Some(target)) => self.assign(slot, target),
                    (_, None) => return error("ERR I don't know about node"),
                    _ => return error("ERR Invalid CLUSTER SETSLOT action or number of arguments"),
                }
                ok()
            }
            "ADDSLOTS" => {
                let mut slots = Vec::new();
                for i in 2..args.len() {
                    let Some(slot) = slot_arg(i) else {
                        return error("ERR Invalid or out of range slot");
                    };
                    if self.owner(slot).is_some() {
                        return error(&format!("ERR Slot {} is already busy", slot));
                    }
                    slots.push(slot);
                }
                for slot in slots {
                    self.nodes[node].slots.push((slot, slot));
                }
                ok()
            }
            "DELSLOTS" => {
                for i in 2..args.len() {
                    let Some(slot) = slot_arg(i) else {
                        return error("ERR Invalid or out of range slot");
                    };
                    self.nodes[node].remove_slot(slot);
                }
                ok()
            }
            "FORGET" => {
                if args.get(2).map(|a| a.as_slice()) == Some(self.nodes[node].id.as_bytes()) {
                    return error("ERR I tried hard but I can't forget myself...");
                }
                ok()
            }
            "MEET" => ok(),
            "REPLICATE" => {
                let master = args.get(2).cloned().unwrap_or_default();
                if self.index_of_id(&master).is_none() {
                    return error("ERR Unknown node");
                }
                self.nodes[node].replica_of = Some(String::from_utf8_lossy(&master).into_owned());
                self.nodes[node].slots.clear();
                ok()
            }
            _ => error("ERR unknown subcommand"),
        }
    }

    fn nodes_text(&self, myself: usize) -> String {
        let mut text = String::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let role = if node.replica_of.is_some() { "slave" } else { "master" };
            let flags = if i == myself {
                format!("myself,{}", role)
            } else {
                role.to_string()
            };
            let master = node.replica_of.clone().unwrap_or_else(|| "-".into());
            text.push_str(&format!(
                "{} {}:{}@{} {} {} 0 0 {} connected",
                node.id,
                node.address.host(),
                node.address.port(),
                node.address.port() as u32 + 10000,
                flags,
                master,
                i + 1
            ));
            for &(s, e) in &node.slots {
                if s == e {
                    text.push_str(&format!(" {}", s));
                } else {
                    text.push_str(&format!(" {}-{}", s, e));
                }
            }
            text.push('\n');
        }
        text
    }
}

fn ttl_reply(node: &mut Node, db: u32, key: &[u8], millis: bool) -> Frame {
    if !node.db(db).contains_key(key) {
        return Frame::Integer(-2);
    }
    match node.expires.get(&(db, key.to_vec())) {
        Some(&seconds) if millis => Frame::Integer(seconds * 1000),
        Some(&seconds) => Frame::Integer(seconds),
        None => Frame::Integer(-1),
    }
}

/// Keyed data commands. `expires` collects TTL changes to apply afterwards.
fn data_command(
    db: &mut Db,
    name: &str,
    args: &[Vec<u8>],
    expires: &mut Vec<(Vec<u8>, Option<i64>)>,
) -> Frame {
    let key = args[1].clone();
    match name {
        "GET" => match db.get(&key) {
            Some(Stored::Str(v)) => bulk(v.clone()),
            Some(_) => error(WRONGTYPE),
            None => nil(),
        },
        "SET" => {
            let mut nx = false;
            let mut ttl = None;
            let mut i = 3;
            while i < args.len() {
                match upper(&args[i]).as_str() {
                    "NX" => nx = true,
                    "EX" => {
                        ttl = args.get(i + 1).and_then(|a| parse_int(a));
                        i += 1;
                    }
                    _ => return error("ERR syntax error"),
                }
                i += 1;
            }
            if nx && db.contains_key(&key) {
                return nil();
            }
            db.insert(key.clone(), Stored::Str(args[2].clone()));
            expires.push((key, ttl));
            ok()
        }
        "GETSET" => {
            let old = match db.get(&key) {
                Some(Stored::Str(v)) => bulk(v.clone()),
                Some(_) => return error(WRONGTYPE),
                None => nil(),
            };
            db.insert(key.clone(), Stored::Str(args[2].clone()));
            expires.push((key, None));
            old
        }
        "MGET" => Frame::Array(Some(
            args[1..]
                .iter()
                .map(|k| match db.get(k) {
                    Some(Stored::Str(v)) => bulk(v.clone()),
                    _ => nil(),
                })
                .collect(),
        )),
        "MSET" => {
            if args.len() % 2 != 1 {
                return error("ERR wrong number of arguments for 'mset' command");
            }
            for pair in args[1..].chunks(2) {
                db.insert(pair[0].clone(), Stored::Str(pair[1].clone()));
            }
            ok()
        }
        "INCR" | "DECR" | "INCRBY" | "DECRBY" => {
            let delta = match name {
                "INCR" => Some(1),
                "DECR" => Some(-1),
                "INCRBY" => parse_int(&args[2]),
                _ => parse_int(&args[2]).map(|d| -d),
            };
            let Some(delta) = delta else {
                return error(NOT_INT);
            };
            let current = match db.get(&key) {
                Some(Stored::Str(v)) => match parse_int(v) {
                    Some(n) => n,
                    None => return error(NOT_INT),
                },
                Some(_) => return error(WRONGTYPE),
                None => 0,
            };
            let next = current + delta;
            db.insert(key, Stored::Str(next.to_string().into_bytes()));
            Frame::Integer(next)
        }
        "APPEND" => match db.entry(key).or_insert_with(|| Stored::Str(Vec::new())) {
            Stored::Str(v) => {
                v.extend_from_slice(&args[2]);
                Frame::Integer(v.len() as i64)
            }
            _ => error(WRONGTYPE),
        },
        "STRLEN" => match db.get(&key) {
            Some(Stored::Str(v)) => Frame::Integer(v.len() as i64),
            Some(_) => error(WRONGTYPE),
            None => Frame::Integer(0),
        },
        "DEL" | "UNLINK" => {
            let removed = args[1..].iter().filter(|k| db.remove(*k).is_some()).count();
            for k in &args[1..] {
                expires.push((k.clone(), None));
            }
            Frame::Integer(removed as i64)
        }
        "EXISTS" | "TOUCH" => {
            Frame::Integer(args[1..].iter().filter(|k| db.contains_key(*k)).count() as i64)
        }
        "EXPIRE" | "PEXPIRE" => {
            if !db.contains_key(&key) {
                return Frame::Integer(0);
            }
            let Some(amount) = parse_int(&args[2]) else {
                return error(NOT_INT);
            };
            let seconds = if name == "PEXPIRE" { amount / 1000 } else { amount };
            expires.push((key, Some(seconds)));
            Frame::Integer(1)
        }
        "TTL" | "PTTL" | "PERSIST" => Frame::Integer(0),
        "TYPE" => Frame::Simple(db.get(&key).map(Stored::type_name).unwrap_or("none").into()),
        "RENAME" => match db.remove(&key) {
            Some(value) => {
                db.insert(args[2].clone(), value);
                ok()
            }
            None => error("ERR no such key"),
        },
        _ if name.starts_with('H') => hash_command(db, name, key, args),
        _ if name.starts_with('L') || name.starts_with('R') => list_command(db, name, key, args),
        _ if name.starts_with('S') => set_command(db, name, key, args),
        _ if name.starts_with('Z') => zset_command(db, name, key, args),
        _ => error(&format!("ERR unknown command '{}'", name)),
    }
}

fn hash_command(db: &mut Db, name: &str, key: Vec<u8>, args: &[Vec<u8>]) -> Frame {
    if name == "HSET" {
        if args.len() % 2 != 0 {
            return error("ERR wrong number of arguments for 'hset' command");
        }
        let Stored::Hash(hash) = db.entry(key).or_insert_with(|| Stored::Hash(BTreeMap::new()))
        else {
            return error(WRONGTYPE);
        };
        let added = args[2..]
            .chunks(2)
            .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
            .count();
        return Frame::Integer(added as i64);
    }
    if name == "HINCRBY" {
        let Some(delta) = parse_int(&args[3]) else {
            return error(NOT_INT);
        };
        let Stored::Hash(hash) = db.entry(key).or_insert_with(|| Stored::Hash(BTreeMap::new()))
        else {
            return error(WRONGTYPE);
        };
        let current = match hash.get(&args[2]) {
            Some(v) => match parse_int(v) {
                Some(n) => n,
                None => return error("ERR hash value is not an integer"),
            },
            None => 0,
        };
        hash.insert(args[2].clone(), (current + delta).to_string().into_bytes());
        return Frame::Integer(current + delta);
    }

    let empty = BTreeMap::new();
    let hash = match db.get(&key) {
        Some(Stored::Hash(h)) => h,
        Some(_) => return error(WRONGTYPE),
        None => &empty,
    };
    match name {
        "HGET" => hash.get(&args[2]).cloned().map(bulk).unwrap_or_else(nil),
        "HMGET" => Frame::Array(Some(
            args[2..]
                .iter()
                .map(|f| hash.get(f).cloned().map(bulk).unwrap_or_else(nil))
                .collect(),
        )),
        "HGETALL" => Frame::Array(Some(
            hash.iter()
                .flat_map(|(f, v)| [bulk(f.clone()), bulk(v.clone())])
                .collect(),
        )),
        "HEXISTS" => Frame::Integer(hash.contains_key(&args[2]) as i64),
        "HLEN" => Frame::Integer(hash.len() as i64),
        "HKEYS" => Frame::Array(Some(hash.keys().cloned().map(bulk).collect())),
        "HVALS" => Frame::Array(Some(hash.values().cloned().map(bulk).collect())),
        "HDEL" => {
            let fields = &args[2..];
            let Some(Stored::Hash(hash)) = db.get_mut(&key) else {
                return Frame::Integer(0);
            };
            let removed = fields.iter().filter(|f| hash.remove(*f).is_some()).count();
            if hash.is_empty() {
                db.remove(&key);
            }
            Frame::Integer(removed as i64)
        }
        _ => error(&format!("ERR unknown command '{}'", name)),
    }
}

fn list_command(db: &mut Db, name: &str, key: Vec<u8>, args: &[Vec<u8>]) -> Frame {
    if name == "LPUSH" || name == "RPUSH" {
        let Stored::List(list) = db.entry(key).or_insert_with(|| Stored::List(VecDeque::new()))
        else {
            return error(WRONGTYPE);
        };
        for value in &args[2..] {
            if name == "LPUSH" {
                list.push_front(value.clone());
            } else {
                list.push_back(value.clone());
            }
        }
        return Frame::Integer(list.len() as i64);
    }

    let list = match db.get_mut(&key) {
        Some(Stored::List(list)) => list,
        Some(_) => return error(WRONGTYPE),
        None if name == "LRANGE" => return Frame::Array(Some(Vec::new())),
        None if name == "LLEN" || name == "LREM" => return Frame::Integer(0),
        None if name == "LTRIM" => return ok(),
        None => return nil(),
    };
    let reply = match name {
        "LPOP" => list.pop_front().map(bulk).unwrap_or_else(nil),
        "RPOP" => list.pop_back().map(bulk).unwrap_or_else(nil),
        "LLEN" => Frame::Integer(list.len() as i64),
        "LINDEX" => {
            let index = parse_int(&args[2]).unwrap_or(i64::MAX);
            let index = if index < 0 { list.len() as i64 + index } else { index };
            usize::try_from(index)
                .ok()
                .and_then(|i| list.get(i).cloned())
                .map(bulk)
                .unwrap_or_else(nil)
        }
        "LRANGE" => {
            let items = match bounds(list.len(), &args[2], &args[3]) {
                Some((s, e)) => list.range(s..=e).cloned().map(bulk).collect(),
                None => Vec::new(),
            };
            Frame::Array(Some(items))
        }
        "LTRIM" => {
            let kept: VecDeque<Vec<u8>> = match bounds(list.len(), &args[2], &args[3]) {
                Some((s, e)) => list.range(s..=e).cloned().collect(),
                None => VecDeque::new(),
            };
            *list = kept;
            ok()
        }
        "LREM" => {
            let count = parse_int(&args[2]).unwrap_or(0);
            let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
            let mut removed = 0;
            let mut kept: Vec<Vec<u8>> = Vec::with_capacity(list.len());
            let items: Vec<Vec<u8>> = if count < 0 {
                list.iter().rev().cloned().collect()
            } else {
                list.iter().cloned().collect()
            };
            for item in items {
                if removed < limit && item == args[3] {
                    removed += 1;
                } else {
                    kept.push(item);
                }
            }
            if count < 0 {
                kept.reverse();
            }
            *list = kept.into();
            Frame::Integer(removed as i64)
        }
        _ => error(&format!("ERR unknown command '{}'", name)),
    };
    if list.is_empty() {
        db.remove(&key);
    }
    reply
}

fn set_command(db: &mut Db, name: &str, key: Vec<u8>, args: &[Vec<u8>]) -> Frame {
    match name {
        "SINTER" | "SUNION" | "SDIFF" => {
            let sets: Vec<BTreeSet<Vec<u8>>> = args[1..]
                .iter()
                .map(|k| match db.get(k) {
                    Some(Stored::Set(s)) => s.clone(),
                    _ => BTreeSet::new(),
                })
                .collect();
            let mut result = sets[0].clone();
            for other in &sets[1..] {
                result = match name {
                    "SINTER" => result.intersection(other).cloned().collect(),
                    "SUNION" => result.union(other).cloned().collect(),
                    _ => result.difference(other).cloned().collect(),
                };
            }
            return Frame::Array(Some(result.into_iter().map(bulk).collect()));
        }
        "SADD" => {
            let Stored::Set(set) = db.entry(key).or_insert_with(|| Stored::Set(BTreeSet::new()))
            else {
                return error(WRONGTYPE);
            };
            let added = args[2..].iter().filter(|m| set.insert((*m).clone())).count();
            return Frame::Integer(added as i64);
        }
        _ => {}
    }

    let set = match db.get_mut(&key) {
        Some(Stored::Set(set)) => set,
        Some(_) => return error(WRONGTYPE),
        None if name == "SMEMBERS" => return Frame::Array(Some(Vec::new())),
        None if name == "SPOP" => return nil(),
        None => return Frame::Integer(0),
    };
    let reply = match name {
        "SREM" => Frame::Integer(args[2..].iter().filter(|m| set.remove(*m)).count() as i64),
        "SMEMBERS" => Frame::Array(Some(set.iter().cloned().map(bulk).collect())),
        "SISMEMBER" => Frame::Integer(set.contains(&args[2]) as i64),
        "SCARD" => Frame::Integer(set.len() as i64),
        "SPOP" => set.pop_first().map(bulk).unwrap_or_else(nil),
        _ => error(&format!("ERR unknown command '{}'", name)),
    };
    if set.is_empty() {
        db.remove(&key);
    }
    reply
}

fn zset_command(db: &mut Db, name: &str, key: Vec<u8>, args: &[Vec<u8>]) -> Frame {
    match name {
        "ZADD" => {
            if args.len() % 2 != 0 {
                return error("ERR syntax error");
            }
            let mut pairs = Vec::new();
            for pair in args[2..].chunks(2) {
                let Some(score) = parse_float(&pair[0]) else {
                    return error("ERR value is not a valid float");
                };
                pairs.push((score, pair[1].clone()));
            }
            let Stored::ZSet(zset) = db.entry(key).or_insert_with(|| Stored::ZSet(BTreeMap::new()))
            else {
                return error(WRONGTYPE);
            };
            let added = pairs
                .into_iter()
                .filter(|(score, member)| zset.insert(member.clone(), *score).is_none())
                .count();
            return Frame::Integer(added as i64);
        }
        "ZINCRBY" => {
            let Some(delta) = parse_float(&args[2]) else {
                return error("ERR value is not a valid float");
            };
            let Stored::ZSet(zset) = db.entry(key).or_insert_with(|| Stored::ZSet(BTreeMap::new()))
            else {
                return error(WRONGTYPE);
            };
            let score = zset.entry(args[3].clone()).or_insert(0.0);
            *score += delta;
            return bulk(format_score(*score).into_bytes());
        }
        _ => {}
    }

    let empty = BTreeMap::new();
    let zset = match db.get(&key) {
        Some(Stored::ZSet(z)) => z,
        Some(_) => return error(WRONGTYPE),
        None => &empty,
    };
    let mut ordered: Vec<(&Vec<u8>, f64)> = zset.iter().map(|(m, s)| (m, *s)).collect();
    ordered.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

    match name {
        "ZSCORE" => zset
            .get(&args[2])
            .map(|s| bulk(format_score(*s).into_bytes()))
            .unwrap_or_else(nil),
        "ZCARD" => Frame::Integer(zset.len() as i64),
        "ZRANK" => ordered
            .iter()
            .position(|(m, _)| **m == args[2])
            .map(|i| Frame::Integer(i as i64))
            .unwrap_or_else(nil),
        "ZRANGE" => {
            let with_scores = args.get(4).map(|a| upper(a)) == Some("WITHSCORES".into());
            let mut out = Vec::new();
            if let Some((s, e)) = bounds(ordered.len(), &args[2], &args[3]) {
                for (member, score) in &ordered[s..=e] {
                    out.push(bulk((*member).clone()));
                    if with_scores {
                        out.push(bulk(format_score(*score).into_bytes()));
                    }
                }
            }
            Frame::Array(Some(out))
        }
        "ZRANGEBYSCORE" | "ZCOUNT" => {
            let (Some(min), Some(max)) = (parse_float(&args[2]), parse_float(&args[3])) else {
                return error("ERR min or max is not a float");
            };
            let matching: Vec<&Vec<u8>> = ordered
                .iter()
                .filter(|(_, s)| *s >= min && *s <= max)
                .map(|(m, _)| *m)
                .collect();
            if name == "ZCOUNT" {
                Frame::Integer(matching.len() as i64)
            } else {
                Frame::Array(Some(matching.into_iter().cloned().map(bulk).collect()))
            }
        }
        "ZREM" => {
            let members = &args[2..];
            let Some(Stored::ZSet(zset)) = db.get_mut(&key) else {
                return Frame::Integer(0);
            };
            let removed = members.iter().filter(|m| zset.remove(*m).is_some()).count();
            if zset.is_empty() {
                db.remove(&key);
            }
            Frame::Integer(removed as i64)
        }
        _ => error(&format!("ERR unknown command '{}'", name)),
    }
}

fn key_args<'a>(name: &str, args: &'a [Vec<u8>]) -> Vec<&'a [u8]> {
    if SINGLE_KEY.contains(&name) {
        args.get(1).map(|k| vec![k.as_slice()]).unwrap_or_default()
    } else if ALL_KEYS.contains(&name) {
        args[1..].iter().map(|k| k.as_slice()).collect()
    } else if name == "MSET" {
        args[1..].iter().step_by(2).map(|k| k.as_slice()).collect()
    } else if name == "RENAME" {
        args[1..].iter().take(2).map(|k| k.as_slice()).collect()
    } else {
        Vec::new()
    }
}

fn min_args(name: &str) -> usize {
    match name {
        "PING" | "DBSIZE" | "FLUSHDB" | "FLUSHALL" | "SAVE" | "BGSAVE" | "LASTSAVE" | "TIME"
        | "INFO" | "ASKING" | "RANDOMKEY" => 1,
        "SET" | "GETSET" | "INCRBY" | "DECRBY" | "APPEND" | "EXPIRE" | "PEXPIRE" | "RENAME"
        | "HGET" | "HMGET" | "HDEL" | "HEXISTS" | "LPUSH" | "RPUSH" | "LINDEX" | "SADD" | "SREM"
        | "SISMEMBER" | "ZREM" | "ZSCORE" | "ZRANK" | "CONFIG" => 3,
        "HSET" | "HINCRBY" | "LRANGE" | "LREM" | "LTRIM" | "ZADD" | "ZINCRBY" | "ZRANGE"
        | "ZRANGEBYSCORE" | "ZCOUNT" => 4,
        _ => 2,
    }
}

fn is_known(name: &str) -> bool {
    SINGLE_KEY.contains(&name) || ALL_KEYS.contains(&name) || KEYLESS.contains(&name)
}

fn upper(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).to_ascii_uppercase()
}

fn parse_int(arg: &[u8]) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

fn parse_float(arg: &[u8]) -> Option<f64> {
    match std::str::from_utf8(arg).ok()? {
        "+inf" | "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.abs() < 1e15 {
        format!("{}", score as i64)
    } else {
        format!("{}", score)
    }
}

/// Inclusive index range for LRANGE-style `start stop`
fn bounds(len: usize, start: &[u8], stop: &[u8]) -> Option<(usize, usize)> {
    let len = len as i64;
    let (start, stop) = (parse_int(start)?, parse_int(stop)?);
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// `*` and trailing-`*` prefix patterns only
fn glob(pattern: &str, key: &[u8]) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix.as_bytes()),
        None => key == pattern.as_bytes(),
    }
}

fn ok() -> Frame {
    Frame::Simple("OK".into())
}

fn nil() -> Frame {
    Frame::Bulk(None)
}

fn bulk(data: Vec<u8>) -> Frame {
    Frame::Bulk(Some(data))
}

fn error(message: &str) -> Frame {
    Frame::Error(message.to_string())
}

/// Transport factory bound to a [`FakeRedis`]
pub struct FakeFactory {
    redis: FakeRedis,
}

impl TransportFactory for FakeFactory {
    fn create(
        &self,
        address: &NodeAddress,
        _config: &ClientConfig,
    ) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(FakeTransport {
            redis: self.redis.clone(),
            address: address.clone(),
            connected: false,
            session: Session::default(),
            replies: VecDeque::new(),
        }))
    }
}

pub struct FakeTransport {
    redis: FakeRedis,
    address: NodeAddress,
    connected: bool,
    session: Session,
    replies: VecDeque<Frame>,
}

impl FakeTransport {
    fn refused() -> TransportError {
        TransportError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.redis.state.lock();
        let node = state.index_of(&self.address).ok_or_else(Self::refused)?;
        if !state.nodes[node].reachable {
            return Err(Self::refused());
        }
        state.nodes[node].connects += 1;
        self.connected = true;
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let mut state = self.redis.state.lock();
        let node = state.index_of(&self.address).ok_or_else(Self::refused)?;
        if !state.nodes[node].reachable {
            self.connected = false;
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }

        let mut buf = BytesMut::from(payload);
        let mut decoder = FrameDecoder::new();
        while let Some(frame) = decoder.decode(&mut buf)? {
            let Frame::Array(Some(parts)) = frame else {
                return Err(TransportError::Protocol("expected a command array".into()));
            };
            let args = parts
                .into_iter()
                .map(|part| match part {
                    Frame::Bulk(Some(arg)) => Ok(arg),
                    other => Err(TransportError::Protocol(format!(
                        "unexpected argument {:?}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            if args.is_empty() {
                return Err(TransportError::Protocol("empty command".into()));
            }
            let reply = state.handle(node, &mut self.session, args);
            self.replies.push_back(reply);
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Frame, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        {
            let mut state = self.redis.state.lock();
            if let Some(node) = state.index_of(&self.address) {
                let countdown = &mut state.nodes[node].drop_after_replies;
                match *countdown {
                    Some(0) => {
                        *countdown = None;
                        self.connected = false;
                        self.replies.clear();
                        return Err(TransportError::Io(io::Error::new(
                            io::ErrorKind::ConnectionReset,
                            "connection reset by peer",
                        )));
                    }
                    Some(n) => *countdown = Some(n - 1),
                    None => {}
                }
            }
        }
        self.replies.pop_front().ok_or(TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        self.replies.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
