//!
//! demosql CLI - Run SQL against an embedded database
//!
//! Provides commands for querying and plotting:
//! - demosql exec <sql>: Run a batch and print every row
//! - demosql query <sql>: Run one prepared statement with bound parameters
//! - demosql histogram <sql> --out <file>: Plot the last result column
//!

mod commands;
mod config;
mod errors;

use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::Level;

use demoplot::{HistogramOptions, PlotSize};
use demosql::Connection;

use config::Config;
use errors::CliError;

#[derive(Parser)]
#[command(name = "demosql")]
#[command(author, version, about = "Query an embedded SQLite database", long_about = None)]
struct Cli {
    /// Config file (defaults to ./demosql.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database location, a file path or :memory:
    #[arg(long, global = true)]
    database: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or more statements and print each produced row
    Exec {
        /// SQL batch to run
        sql: String,

        /// Stop after printing this many rows
        #[arg(long)]
        limit: Option<usize>,

        /// Print each row as a JSON object
        #[arg(long)]
        json: bool,
    },

    /// Run a single prepared statement and print a table
    Query {
        /// SQL statement; only the first statement is run
        sql: String,

        /// Positional parameter value (NULL, integer, real or text)
        #[arg(long = "param", allow_hyphen_values = true)]
        params: Vec<String>,
    },

    /// Render a histogram of the last result column
    Histogram {
        /// SQL statement producing the samples
        sql: String,

        /// Output PAM file
        #[arg(long)]
        out: PathBuf,

        #[arg(long)]
        width: Option<f64>,

        #[arg(long)]
        height: Option<f64>,

        /// Number of bins
        #[arg(long)]
        bins: Option<usize>,

        #[arg(long, default_value = "")]
        title: String,

        #[arg(long, default_value = "")]
        x_label: String,

        #[arg(long, default_value = "")]
        y_label: String,

        /// Positional parameter value (NULL, integer, real or text)
        #[arg(long = "param", allow_hyphen_values = true)]
        params: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(log_level(cli.verbose))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = Config::load(cli.config.as_deref(), Path::new("."))?;
    if let Some(database) = cli.database {
        config.database.location = database;
    }

    let conn = Connection::open_with_flags(
        &config.database.location,
        config.database.open_flags(),
    )?;
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Exec { sql, limit, json } => {
            commands::exec(&conn, &sql, limit, json, &mut stdout)?;
        }
        Commands::Query { sql, params } => {
            let params: Vec<_> = params.iter().map(|p| commands::parse_param(p)).collect();
            commands::query(&conn, &sql, &params, &mut stdout)?;
        }
        Commands::Histogram {
            sql,
            out,
            width,
            height,
            bins,
            title,
            x_label,
            y_label,
            params,
        } => {
            let size = PlotSize::new(
                width.unwrap_or(config.plot.width),
                height.unwrap_or(config.plot.height),
            );
            let options = HistogramOptions {
                x_label,
                y_label,
                title,
                bins: bins.unwrap_or(config.plot.bins),
            };
            let params: Vec<_> = params.iter().map(|p| commands::parse_param(p)).collect();
            commands::histogram(&conn, &sql, &params, size, &options, &out)?;
        }
    }

    conn.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_histogram_flags() {
        let cli = Cli::parse_from([
            "demosql",
            "-vv",
            "--database",
            "weather.sqlite",
            "histogram",
            "SELECT temp FROM readings WHERE day > ?",
            "--out",
            "temp.pam",
            "--bins",
            "20",
            "--param",
            "-3",
        ]);

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.database.as_deref(), Some("weather.sqlite"));
        match cli.command {
            Commands::Histogram {
                out, bins, params, width, ..
            } => {
                assert_eq!(out, PathBuf::from("temp.pam"));
                assert_eq!(bins, Some(20));
                assert_eq!(params, vec!["-3".to_string()]);
                assert_eq!(width, None);
            }
            _ => panic!("Expected histogram command"),
        }
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(0), Level::WARN);
        assert_eq!(log_level(2), Level::DEBUG);
        assert_eq!(log_level(9), Level::TRACE);
    }
}
