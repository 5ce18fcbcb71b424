//! Resolve a database from YAML config and run statements through a lease
//!
//! Expects `config/environment.yml` and `config/database.yml` in the working
//! directory (or a directory passed as the first argument), with an entry for
//! the key given as the second argument (default `primary`).
//!
//! Run with: RUST_LOG=wire_lease=debug cargo run --example lease_demo -- config primary

use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wire_lease::postgres::PgConfig;
use wire_lease::{ConnectionManager, Error, PgDriver, YamlCredentialProvider};

fn main() -> wire_lease::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let dir = args.next().unwrap_or_else(|| "config".to_string());
    let key = args.next().unwrap_or_else(|| "primary".to_string());

    let provider = YamlCredentialProvider::from_dir(&dir);
    let driver = PgDriver::with_config(
        PgConfig::new()
            .connect_timeout(Duration::from_secs(5))
            .application_name("lease_demo"),
    );

    // Short window so the second round below reconnects
    let mut manager =
        ConnectionManager::from_provider(driver, &provider, &key, Some(Duration::from_secs(2)))?;
    tracing::info!(endpoint = %manager.endpoint(), state = %manager.state(), "manager ready");

    for round in 0..2 {
        let rows = manager
            .get_statement()?
            .execute("SELECT 1")
            .map_err(Error::connection)?;
        tracing::info!(round, rows, state = %manager.state(), "statement ran");

        let mut prepared = manager.get_prepared_statement("SELECT $1::text")?;
        prepared
            .execute(&[Some("hello")])
            .map_err(Error::connection)?;

        std::thread::sleep(Duration::from_secs(3));
        tracing::info!(state = %manager.state(), "slept past the window");
    }

    manager.reset_connection()?;
    tracing::info!("done");
    Ok(())
}
