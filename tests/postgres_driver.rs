//! PgDriver against an in-process fake server
//!
//! The fake speaks just enough of protocol v3 to get through startup,
//! cleartext authentication, simple and extended queries, and Terminate.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use wire_lease::postgres::PgConfig;
use wire_lease::{ConnectionManager, Credentials, Driver, EndpointDescriptor, PgDriver, PgError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Startup(Vec<(String, String)>),
    Password(String),
    Query(String),
    Parse(String),
    Bind(usize),
    Terminate,
}

struct FakeServer {
    port: u16,
    seen: Arc<Mutex<Vec<Seen>>>,
    handle: JoinHandle<()>,
}

impl FakeServer {
    /// Serve `connections` clients one after another
    fn start(connections: usize, password: Option<&'static str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        let handle = std::thread::spawn(move || {
            for stream in listener.incoming().take(connections) {
                serve(stream.unwrap(), password, &log);
            }
        });

        Self { port, seen, handle }
    }

    fn endpoint(&self) -> EndpointDescriptor {
        EndpointDescriptor::tcp("127.0.0.1", self.port, "orders")
    }

    fn finish(self) -> Vec<Seen> {
        self.handle.join().unwrap();
        Arc::try_unwrap(self.seen).unwrap().into_inner().unwrap()
    }
}

fn frame(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn ready() -> Vec<u8> {
    frame(b'Z', b"I")
}

fn cstrings(body: &[u8]) -> Vec<String> {
    body.split(|&b| b == 0)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

fn read_frame(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut header = [0u8; 5];
    stream.read_exact(&mut header).ok()?;
    let len = i32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    let mut body = vec![0u8; len - 4];
    stream.read_exact(&mut body).ok()?;
    Some((header[0], body))
}

fn serve(mut stream: TcpStream, password: Option<&str>, seen: &Mutex<Vec<Seen>>) {
    // Startup packet has no tag byte
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).unwrap();
    let mut body = vec![0u8; i32::from_be_bytes(len) as usize - 4];
    stream.read_exact(&mut body).unwrap();
    let strings = cstrings(&body[4..]);
    let params = strings
        .chunks(2)
        .filter(|kv| kv.len() == 2 && !kv[0].is_empty())
        .map(|kv| (kv[0].clone(), kv[1].clone()))
        .collect();
    seen.lock().unwrap().push(Seen::Startup(params));

    if let Some(expected) = password {
        stream.write_all(&frame(b'R', &3i32.to_be_bytes())).unwrap();
        let (tag, body) = read_frame(&mut stream).unwrap();
        assert_eq!(tag, b'p');
        let given = cstrings(&body).remove(0);
        seen.lock().unwrap().push(Seen::Password(given.clone()));
        if given != expected {
            stream
                .write_all(&frame(
                    b'E',
                    b"SFATAL\0C28P01\0Mpassword authentication failed\0\0",
                ))
                .unwrap();
            return;
        }
    }

    let mut greeting = frame(b'R', &0i32.to_be_bytes());
    greeting.extend(frame(b'S', b"server_version\x0016.2\0"));
    greeting.extend(frame(b'K', &[0, 0, 0x30, 0x39, 0, 0, 0, 1]));
    greeting.extend(ready());
    stream.write_all(&greeting).unwrap();

    while let Some((tag, body)) = read_frame(&mut stream) {
        let reply = match tag {
            b'Q' => {
                let sql = cstrings(&body).remove(0);
                seen.lock().unwrap().push(Seen::Query(sql.clone()));
                let mut reply = if sql.starts_with("SELECT * FROM missing") {
                    frame(b'E', b"SERROR\0C42P01\0Mrelation \"missing\" does not exist\0\0")
                } else {
                    frame(b'C', b"UPDATE 2\0")
                };
                reply.extend(ready());
                reply
            }
            b'P' => {
                let strings = cstrings(&body);
                seen.lock().unwrap().push(Seen::Parse(strings[1].clone()));
                frame(b'1', b"")
            }
            b'B' => {
                // portal, statement, format count (0), param count
                let strings = cstrings(&body);
                let offset = strings[0].len() + strings[1].len() + 2 + 2;
                let count = i16::from_be_bytes([body[offset], body[offset + 1]]) as usize;
                seen.lock().unwrap().push(Seen::Bind(count));
                frame(b'2', b"")
            }
            b'E' => frame(b'C', b"INSERT 0 1\0"),
            b'S' => ready(),
            b'X' => {
                seen.lock().unwrap().push(Seen::Terminate);
                return;
            }
            other => panic!("fake server got unexpected tag {}", other as char),
        };
        stream.write_all(&reply).unwrap();
    }
}

#[test]
fn test_manager_over_pg_driver() {
    let server = FakeServer::start(1, None);

    let mut manager = ConnectionManager::new(
        PgDriver::with_config(PgConfig::new().application_name("lease-tests")),
        server.endpoint(),
        Credentials::without_password("app"),
        None,
    )
    .unwrap();

    let conn = manager.get_connection().unwrap();
    assert_eq!(conn.process_id(), Some(12345));
    assert_eq!(conn.parameter("server_version"), Some("16.2"));

    let rows = manager
        .get_statement()
        .unwrap()
        .execute("UPDATE orders SET state = 'shipped'")
        .unwrap();
    assert_eq!(rows, 2);

    let mut insert = manager
        .get_prepared_statement("INSERT INTO audit (order_id, note) VALUES ($1, $2)")
        .unwrap();
    assert_eq!(insert.name(), "wl_s0");
    assert_eq!(insert.execute(&[Some("17"), None]).unwrap(), 1);
    drop(insert);

    drop(manager);

    let seen = server.finish();
    match &seen[0] {
        Seen::Startup(params) => {
            assert!(params.contains(&("user".into(), "app".into())));
            assert!(params.contains(&("database".into(), "orders".into())));
            assert!(params.contains(&("application_name".into(), "lease-tests".into())));
        }
        other => panic!("expected startup, got {:?}", other),
    }
    assert_eq!(
        &seen[1..],
        &[
            Seen::Query("UPDATE orders SET state = 'shipped'".into()),
            Seen::Parse("INSERT INTO audit (order_id, note) VALUES ($1, $2)".into()),
            Seen::Bind(2),
            Seen::Terminate,
        ]
    );
}

#[test]
fn test_reset_opens_second_session() {
    let server = FakeServer::start(2, Some("hunter2"));

    let mut manager = ConnectionManager::new(
        PgDriver::new(),
        server.endpoint(),
        Credentials::new("app", "hunter2"),
        Some(Duration::from_secs(60)),
    )
    .unwrap();

    manager.get_connection().unwrap();
    manager.reset_connection().unwrap();
    drop(manager);

    let seen = server.finish();
    let terminates = seen.iter().filter(|s| **s == Seen::Terminate).count();
    let passwords = seen
        .iter()
        .filter(|s| **s == Seen::Password("hunter2".into()))
        .count();
    assert_eq!(terminates, 2);
    assert_eq!(passwords, 2);
}

#[test]
fn test_wrong_password_is_connection_error() {
    let server = FakeServer::start(1, Some("hunter2"));

    let mut manager = ConnectionManager::new(
        PgDriver::new(),
        server.endpoint(),
        Credentials::new("app", "wrong"),
        None,
    )
    .unwrap();

    let err = manager.get_connection().unwrap_err();
    assert!(err.is_connection());
    assert!(err.to_string().contains("28P01"));
    assert!(!manager.is_connected());

    server.finish();
}

#[test]
fn test_server_error_keeps_connection_usable() {
    let server = FakeServer::start(1, None);
    let driver = PgDriver::new();

    let mut conn = driver
        .connect(&server.endpoint(), &Credentials::without_password("app"))
        .unwrap();

    let err = driver
        .create_statement(&mut conn)
        .unwrap()
        .execute("SELECT * FROM missing")
        .unwrap_err();
    assert!(matches!(err, PgError::Server(_)));
    assert_eq!(err.sqlstate(), Some("42P01"));

    let rows = driver
        .create_statement(&mut conn)
        .unwrap()
        .execute("UPDATE orders SET archived = true")
        .unwrap();
    assert_eq!(rows, 2);

    driver.close(conn).unwrap();
    server.finish();
}

#[test]
fn test_refused_connect_leaves_manager_unconnected() {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let mut manager = ConnectionManager::new(
        PgDriver::new(),
        EndpointDescriptor::tcp("127.0.0.1", port, "orders"),
        Credentials::without_password("app"),
        None,
    )
    .unwrap();

    assert!(manager.get_connection().unwrap_err().is_connection());
    assert!(!manager.is_connected());
}

/// Requires a running Postgres; set POSTGRES_* to point at it
#[test]
#[ignore]
fn test_live_postgres() {
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "postgres".to_string());
    let database = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "postgres".to_string());

    let mut manager = ConnectionManager::new(
        PgDriver::new(),
        EndpointDescriptor::tcp(host, 5432, database),
        Credentials::new(user, password),
        Some(Duration::from_secs(5)),
    )
    .unwrap();

    manager.get_statement().unwrap().execute("SELECT 1").unwrap();
    let mut stmt = manager.get_prepared_statement("SELECT $1::int").unwrap();
    assert_eq!(stmt.execute(&[Some("42")]).unwrap(), 1);
}
