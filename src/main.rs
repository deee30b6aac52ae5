//! limestone-price
//!
//! Usage: limestone-price [--verify] [--at DATE | --hours N] [--json-logs] SYMBOL...
//!
//! Prints the query result as JSON. `all` as the only symbol queries every
//! tracked symbol.

use anyhow::{bail, Context, Result};
use limestone::{Limestone, QueryBuilder};
use tracing::info;

const USAGE: &str =
    "Usage: limestone-price [--verify] [--at DATE | --hours N] [--json-logs] SYMBOL...";

#[derive(Debug, Default)]
struct Args {
    symbols: Vec<String>,
    verify: bool,
    at: Option<String>,
    hours: Option<u32>,
    json_logs: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--verify" => args.verify = true,
            "--json-logs" => args.json_logs = true,
            "--at" => args.at = Some(iter.next().context("--at needs a date")?),
            "--hours" => {
                let hours = iter.next().context("--hours needs a number")?;
                args.hours = Some(hours.parse().context("--hours must be a positive integer")?);
            }
            flag if flag.starts_with("--") => bail!("Unknown flag {}", flag),
            symbol => args.symbols.push(symbol.to_uppercase()),
        }
    }
    if args.symbols.is_empty() {
        bail!(USAGE);
    }
    Ok(args)
}

fn build_query(client: &Limestone, args: &Args) -> QueryBuilder {
    let mut query = match args.symbols.as_slice() {
        [only] if only == "ALL" => client.query().all_symbols(),
        [only] => client.query().symbol(only.clone()),
        many => client.query().symbols(many.to_vec()),
    };
    // Passing both --at and --hours is reported by the builder as a conflict.
    if let Some(date) = &args.at {
        query = query.at_date(date.as_str());
    }
    if let Some(hours) = args.hours {
        query = query.for_last_hours(hours);
    }
    if args.at.is_none() && args.hours.is_none() {
        query = query.latest();
    }
    query.verify_signature(args.verify)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    limestone::telemetry::init_tracing(args.json_logs);

    let client = Limestone::from_env()?;
    info!(symbols = ?args.symbols, verify = args.verify, "Querying prices");

    let response = match build_query(&client, &args).exec().await {
        Ok(response) => response,
        Err(err) if err.is_construction_error() => bail!("Invalid query: {}\n{}", err, USAGE),
        Err(err) => return Err(err.into()),
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
