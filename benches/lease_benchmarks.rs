//! Benchmarks for the connection access path
//!
//! The driver here does no I/O, so these measure only the manager's own
//! bookkeeping (clock read, expiry check, deadline refresh) and protocol
//! encode/decode cost.
//!
//! Run with: cargo bench --bench lease_benchmarks

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::convert::Infallible;
use std::time::Duration;
use wire_lease::protocol::{decode_message, encode_message, FrontendMessage};
use wire_lease::{ConnectionManager, Credentials, Driver, EndpointDescriptor};

struct NoopDriver;

impl Driver for NoopDriver {
    type Connection = u64;
    type Statement<'c> = &'c mut u64;
    type PreparedStatement<'c> = &'c mut u64;
    type Error = Infallible;

    fn connect(&self, _: &EndpointDescriptor, _: &Credentials) -> Result<u64, Infallible> {
        Ok(0)
    }

    fn close(&self, _: u64) -> Result<(), Infallible> {
        Ok(())
    }

    fn create_statement<'c>(&'c self, conn: &'c mut u64) -> Result<&'c mut u64, Infallible> {
        Ok(conn)
    }

    fn prepare_statement<'c>(&'c self, conn: &'c mut u64, _: &str) -> Result<&'c mut u64, Infallible> {
        Ok(conn)
    }
}

fn manager(window: Duration) -> ConnectionManager<NoopDriver> {
    ConnectionManager::new(
        NoopDriver,
        EndpointDescriptor::tcp("localhost", 5432, "bench"),
        Credentials::without_password("bench"),
        Some(window),
    )
    .unwrap()
}

fn access_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("access");

    let mut fresh = manager(Duration::from_secs(3600));
    fresh.get_connection().unwrap();
    group.bench_function("get_connection_fresh", |b| {
        b.iter(|| {
            let conn = fresh.get_connection().unwrap();
            *conn += 1;
            black_box(*conn)
        })
    });

    // Zero window: every access closes and re-establishes
    let mut churn = manager(Duration::ZERO);
    group.bench_function("get_connection_expired", |b| {
        b.iter(|| black_box(*churn.get_connection().unwrap()))
    });

    let mut stmts = manager(Duration::from_secs(3600));
    group.bench_function("get_statement", |b| {
        b.iter(|| black_box(*stmts.get_statement().unwrap()))
    });

    group.finish();
}

fn protocol_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("protocol");

    for params in [1usize, 8, 32] {
        let msg = FrontendMessage::Bind {
            statement: "wl_s0".into(),
            params: (0..params).map(|i| Some(i.to_string())).collect(),
        };
        group.bench_with_input(BenchmarkId::new("encode_bind", params), &msg, |b, msg| {
            b.iter(|| black_box(encode_message(msg)))
        });
    }

    let mut reply = BytesMut::new();
    reply.extend_from_slice(b"C\0\0\0\x0eUPDATE 42\0");
    group.bench_function("decode_command_complete", |b| {
        b.iter(|| black_box(decode_message(&reply).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, access_benchmarks, protocol_benchmarks);
criterion_main!(benches);
