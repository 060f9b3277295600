//! In-process stand-in for a pubsubsql server.
//!
//! Understands enough of the command grammar for the client tests: `status`,
//! `insert ... [returning *]`, `select * from T`, `subscribe [skip] * from T`,
//! `unsubscribe from T [where pubsubid = id]`, `close` and the `stream` prefix.
//! Select results are sent in batches of [`BATCH_SIZE`] rows.
use std::{
    collections::HashMap,
    net::{TcpListener, TcpStream},
    sync::{Arc, Mutex},
    thread,
};

use pubsubsql::protocol::{PUSH_REQUEST_ID, ProtocolTransport};
use serde_json::{Value, json};

pub const BATCH_SIZE: usize = 3;

type Writer = Arc<Mutex<ProtocolTransport<TcpStream>>>;

#[derive(Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<HashMap<String, String>>,
}

impl Table {
    fn data(&self, rows: &[HashMap<String, String>]) -> Value {
        rows.iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or_default())
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

struct Subscription {
    id: u64,
    table: String,
    conn: u64,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    subscriptions: Vec<Subscription>,
    writers: HashMap<u64, Writer>,
    next_conn: u64,
    next_row_id: u64,
    next_pubsub_id: u64,
}

enum Target {
    Reply,
    Conn(u64),
}

pub struct LoopbackServer {
    pub address: String,
}

impl LoopbackServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(State::default()));

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let state = Arc::clone(&state);
                thread::spawn(move || handle_connection(stream, state));
            }
        });

        Self { address }
    }
}

fn handle_connection(stream: TcpStream, state: Arc<Mutex<State>>) {
    let mut reader = ProtocolTransport::new(stream.try_clone().unwrap());
    let writer: Writer = Arc::new(Mutex::new(ProtocolTransport::new(stream)));

    let conn = {
        let mut state = state.lock().unwrap();
        state.next_conn += 1;
        let conn = state.next_conn;
        state.writers.insert(conn, Arc::clone(&writer));
        conn
    };

    while let Ok(frame) = reader.read_frame() {
        let text = String::from_utf8_lossy(&frame.payload).into_owned();
        if text == "close" {
            break;
        }
        let (streamed, command) = match text.strip_prefix("stream ") {
            Some(command) => (true, command.to_string()),
            None => (false, text.clone()),
        };

        let (outgoing, writers) = {
            let mut state = state.lock().unwrap();
            let outgoing = handle_command(&mut state, conn, &command);
            (outgoing, state.writers.clone())
        };

        for (target, json) in outgoing {
            let payload = json.to_string();
            match target {
                Target::Reply if !streamed => {
                    let _ = writer
                        .lock()
                        .unwrap()
                        .write_frame(frame.request_id(), payload.as_bytes());
                }
                Target::Reply => {}
                Target::Conn(other) => {
                    if let Some(w) = writers.get(&other) {
                        let _ = w
                            .lock()
                            .unwrap()
                            .write_frame(PUSH_REQUEST_ID, payload.as_bytes());
                    }
                }
            }
        }
    }

    let mut state = state.lock().unwrap();
    state.writers.remove(&conn);
    state.subscriptions.retain(|s| s.conn != conn);
}

fn error(msg: &str) -> Vec<(Target, Value)> {
    vec![(Target::Reply, json!({"status": "err", "msg": msg}))]
}

fn between<'a>(s: &'a str, open: &str, close: char) -> Option<&'a str> {
    let start = s.find(open)? + open.len();
    let end = s[start..].find(close)? + start;
    Some(&s[start..end])
}

fn list(s: &str) -> Vec<String> {
    s.split(',').map(|v| v.trim().to_string()).collect()
}

fn handle_command(state: &mut State, conn: u64, command: &str) -> Vec<(Target, Value)> {
    let words: Vec<&str> = command.split_whitespace().collect();
    match words.as_slice() {
        ["status"] => vec![(Target::Reply, json!({"status": "ok", "action": "status"}))],
        ["insert", "into", table, ..] => insert(state, table, command),
        ["select", "*", "from", table] => select(state, table),
        ["subscribe", "skip", "*", "from", table] => subscribe(state, conn, table, true),
        ["subscribe", "*", "from", table] => subscribe(state, conn, table, false),
        ["unsubscribe", "from", table, rest @ ..] => unsubscribe(state, conn, table, rest),
        _ => error(&format!("unsupported command: {command}")),
    }
}

fn insert(state: &mut State, table: &str, command: &str) -> Vec<(Target, Value)> {
    let (Some(columns), Some(values)) = (
        between(command, "(", ')'),
        between(command, "values (", ')'),
    ) else {
        return error("malformed insert");
    };
    let (columns, values) = (list(columns), list(values));
    if columns.len() != values.len() {
        return error("column and value count differ");
    }

    state.next_row_id += 1;
    let id = state.next_row_id.to_string();

    let t = state.tables.entry(table.to_string()).or_default();
    if t.columns.is_empty() {
        t.columns.push("id".to_string());
    }
    for c in &columns {
        if !t.columns.contains(c) {
            t.columns.push(c.clone());
        }
    }
    let mut row: HashMap<String, String> = columns.into_iter().zip(values).collect();
    row.insert("id".to_string(), id.clone());
    t.rows.push(row.clone());

    let row_json = |extra: Value| {
        let mut body = json!({
            "rows": 1,
            "fromrow": 1,
            "torow": 1,
            "columns": t.columns,
            "data": t.data(std::slice::from_ref(&row)),
        });
        if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
            body.extend(extra);
        }
        body
    };

    // subscribers hear about the change before the writer gets its answer
    let mut out: Vec<(Target, Value)> = state
        .subscriptions
        .iter()
        .filter(|s| s.table == table)
        .map(|s| {
            let event = row_json(json!({"action": "insert", "pubsubid": s.id.to_string()}));
            (Target::Conn(s.conn), event)
        })
        .collect();

    let reply = if command.ends_with("returning *") {
        row_json(json!({"status": "ok", "action": "insert", "id": id}))
    } else {
        json!({"status": "ok", "action": "insert", "id": id})
    };
    out.push((Target::Reply, reply));
    out
}

fn select(state: &State, table: &str) -> Vec<(Target, Value)> {
    let Some(t) = state.tables.get(table) else {
        return error(&format!("table {table} does not exist"));
    };

    let total = t.rows.len();
    if total == 0 {
        return vec![(
            Target::Reply,
            json!({"status": "ok", "action": "select", "rows": 0, "columns": t.columns, "data": []}),
        )];
    }

    t.rows
        .chunks(BATCH_SIZE)
        .enumerate()
        .map(|(i, chunk)| {
            let from = i * BATCH_SIZE + 1;
            (
                Target::Reply,
                json!({
                    "status": "ok",
                    "action": "select",
                    "rows": total,
                    "fromrow": from,
                    "torow": from + chunk.len() - 1,
                    "columns": t.columns,
                    "data": t.data(chunk),
                }),
            )
        })
        .collect()
}

fn subscribe(state: &mut State, conn: u64, table: &str, skip: bool) -> Vec<(Target, Value)> {
    state.next_pubsub_id += 1;
    let id = state.next_pubsub_id;
    state.subscriptions.push(Subscription {
        id,
        table: table.to_string(),
        conn,
    });

    let mut out = vec![(
        Target::Reply,
        json!({"status": "ok", "action": "subscribe", "pubsubid": id.to_string()}),
    )];

    if let Some(t) = state.tables.get(table).filter(|t| !skip && !t.rows.is_empty()) {
        out.push((
            Target::Conn(conn),
            json!({
                "action": "add",
                "pubsubid": id.to_string(),
                "rows": t.rows.len(),
                "fromrow": 1,
                "torow": t.rows.len(),
                "columns": t.columns,
                "data": t.data(&t.rows),
            }),
        ));
    }
    out
}

fn unsubscribe(state: &mut State, conn: u64, table: &str, rest: &[&str]) -> Vec<(Target, Value)> {
    let id = match rest {
        [] => None,
        ["where", "pubsubid", "=", id] => match id.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => return error("invalid pubsubid"),
        },
        _ => return error("malformed unsubscribe"),
    };

    state
        .subscriptions
        .retain(|s| !(s.conn == conn && s.table == table && id.is_none_or(|id| id == s.id)));
    vec![(Target::Reply, json!({"status": "ok", "action": "unsubscribe"}))]
}
