// SPDX-License-Identifier: Apache-2.0

//! Dumps schema snapshots as JSON.
//!
//! ```text
//! dbkit-schema [--config dbkit.json] databases
//! dbkit-schema [--config dbkit.json] tables <database> [--ignore-first-underline]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use dbkit::config::Settings;
use dbkit::schema::{SchemaIntrospector, TableListOptions};
use dbkit::{observability, Connection, EngineError, EngineResult};

const USAGE: &str = "usage: dbkit-schema [--config <file>] (databases | tables <database> [--ignore-first-underline])";

enum Command {
    Databases,
    Tables {
        database: String,
        options: TableListOptions,
    },
}

struct Args {
    config: PathBuf,
    command: Command,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> EngineResult<Args> {
    let mut config = PathBuf::from("dbkit.json");
    let mut positional = Vec::new();
    let mut options = TableListOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config = args
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| EngineError::configuration("--config needs a path"))?;
            }
            "--ignore-first-underline" => options.ignore_first_underline = true,
            _ => positional.push(arg),
        }
    }

    let command = match positional.as_slice() {
        [cmd] if cmd == "databases" => Command::Databases,
        [cmd, database] if cmd == "tables" => Command::Tables {
            database: database.clone(),
            options,
        },
        _ => return Err(EngineError::configuration(USAGE)),
    };

    Ok(Args { config, command })
}

async fn run(args: Args) -> EngineResult<String> {
    let mut settings = Settings::load(&args.config)?;
    settings.apply_env()?;
    observability::init_tracing(&settings.log);

    let mut conn = Connection::from_settings(&settings)?;

    let output = {
        let mut introspector = SchemaIntrospector::new(&mut conn);
        match args.command {
            Command::Databases => to_json(&introspector.list_databases().await?),
            Command::Tables { database, options } => {
                to_json(&introspector.list_tables(&database, options).await?)
            }
        }
    };

    conn.close().await;
    output
}

fn to_json<T: serde::Serialize>(value: &T) -> EngineResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::internal(format!("Failed to encode output: {}", e)))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "dbkit-schema failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
