use anyhow::Result;
use std::path::PathBuf;
use tracing::{error, info};

use songplay_etl::{logging, Config, Pipeline};

#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<PathBuf>,
    input: Option<String>,
    output: Option<String>,
    dry_run: bool,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs::default();

    let value_for = |i: usize, flag: &str| -> String {
        match args.get(i + 1) {
            Some(value) => value.clone(),
            None => {
                eprintln!("Error: {} requires an argument", flag);
                std::process::exit(1);
            }
        }
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("songplay-etl {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                cli.config_path = Some(PathBuf::from(value_for(i, "--config")));
                i += 1;
            }
            "--input" => {
                cli.input = Some(value_for(i, "--input"));
                i += 1;
            }
            "--output" => {
                cli.output = Some(value_for(i, "--output"));
                i += 1;
            }
            "--dry-run" => cli.dry_run = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn print_help() {
    println!(
        r#"songplay-etl - build the songplays star schema from raw song and event logs

USAGE:
    songplay-etl [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --input LOC         Input location (overrides [storage] input)
    --output LOC        Output location (overrides [storage] output)
    --dry-run           Build every table but write nothing
    --version, -V       Show version
    --help, -h          Show this help message

LOCATIONS:
    s3://bucket[/prefix], file:///abs/path, a bare path, or memory://

ENVIRONMENT:
    SONGPLAY_CONFIG         Path to config file (overrides default location)
    SONGPLAY_LOG            Log level (trace, debug, info, warn, error)
    AWS_ACCESS_KEY_ID       S3 credentials, unless set in [aws]
    AWS_SECRET_ACCESS_KEY

Config file location: $XDG_CONFIG_HOME/songplay-etl/config.toml"#
    );
}

async fn run(cli: CliArgs) -> Result<()> {
    let mut config = match &cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    logging::init(&config.logging)?;

    if let Some(input) = cli.input {
        config.storage.input = input;
    }
    if let Some(output) = cli.output {
        config.storage.output = output;
    }
    info!("songplay-etl {} starting", env!("CARGO_PKG_VERSION"));

    let pipeline = Pipeline::from_config(&config, cli.dry_run)?;
    let summary = pipeline.run().await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = parse_args();

    if let Err(e) = run(cli).await {
        error!("Run failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
