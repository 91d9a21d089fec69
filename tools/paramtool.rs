// SPDX-License-Identifier: MIT
//! Parameter record inspection and maintenance tool

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use param_records::catalog::{self, RecordHeader};
use param_records::{
    overwrite_partial, read_record, verify_record, write_full, Config, Schema,
};

#[derive(Parser)]
#[command(name = "paramtool")]
#[command(about = "Inspect and maintain binary parameter records", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to PARAM_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in record schemas
    Schemas {
        /// Print each schema's layout
        #[arg(short, long)]
        verbose: bool,
    },
    /// Decode a record file and print it
    Dump {
        /// Schema name (see `schemas`)
        schema: String,
        path: PathBuf,
        /// Print JSON instead of an indented tree
        #[arg(long)]
        json: bool,
    },
    /// Check a record file's checksum and length field
    Verify { path: PathBuf },
    /// Increment the header's param_version in place
    BumpVersion { path: PathBuf },
    /// Create an empty record with the given header
    Init {
        schema: String,
        path: PathBuf,
        #[arg(long)]
        file_id: u16,
        #[arg(long, default_value_t = 1)]
        format_version: u8,
        #[arg(long, default_value_t = 0)]
        param_version: i16,
        /// Effective date in epoch seconds
        #[arg(long, default_value_t = 0)]
        eff_datetime: i32,
        #[arg(long, default_value_t = 0)]
        location_id: u16,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path).map_err(anyhow::Error::msg)?,
        None => Config::from_env(),
    };
    config.validate().map_err(anyhow::Error::msg)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Schemas { verbose } => list_schemas(verbose),
        Commands::Dump { schema, path, json } => dump(&config, &schema, &path, json)?,
        Commands::Verify { path } => verify(&path)?,
        Commands::BumpVersion { path } => bump_version(&config, &path)?,
        Commands::Init {
            schema,
            path,
            file_id,
            format_version,
            param_version,
            eff_datetime,
            location_id,
        } => {
            let header = RecordHeader {
                file_id,
                format_version,
                param_version,
                length: 0,
                eff_datetime,
                location_id,
            };
            init(&schema, &path, &header)?
        }
    }

    Ok(())
}

fn schema_named(name: &str) -> Result<Arc<Schema>> {
    match catalog::by_name(name) {
        Some(schema) => Ok(schema),
        None => bail!(
            "Unknown schema {:?}; expected one of: {}",
            name,
            catalog::names().join(", ")
        ),
    }
}

fn list_schemas(verbose: bool) {
    for name in catalog::names() {
        if verbose {
            if let Some(schema) = catalog::by_name(name) {
                print!("{}", schema);
            }
        } else {
            println!("{}", name);
        }
    }
}

fn dump(config: &Config, schema: &str, path: &Path, json: bool) -> Result<()> {
    let schema = schema_named(schema)?;
    let record = read_record(path, &schema)
        .with_context(|| format!("Failed to decode {} as {}", path.display(), schema.name()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print!("{}", record.dump(config.dump_indent));
    }
    Ok(())
}

fn verify(path: &Path) -> Result<()> {
    let integrity = verify_record(path)
        .with_context(|| format!("Failed to verify {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&integrity)?);
    if !integrity.is_valid() {
        bail!("{} failed verification", path.display());
    }
    Ok(())
}

fn bump_version(config: &Config, path: &Path) -> Result<()> {
    if config.verify_before_overwrite {
        let integrity = verify_record(path)
            .with_context(|| format!("Failed to verify {}", path.display()))?;
        if !integrity.checksum_ok() {
            bail!(
                "Refusing to rewrite {}: checksum is already wrong",
                path.display()
            );
        }
    }

    let mut header = read_record(path, &catalog::header())
        .with_context(|| format!("Failed to read header of {}", path.display()))?;
    let version = header.get_child_mut("param_version")?;
    let next = version.as_int().unwrap_or_default() + 1;
    version.set_int(next)?;
    overwrite_partial(path, version)
        .with_context(|| format!("Failed to rewrite {}", path.display()))?;

    info!("{} param_version is now {}", path.display(), next as i16);
    Ok(())
}

fn init(schema: &str, path: &Path, header: &RecordHeader) -> Result<()> {
    let schema = schema_named(schema)?;
    let record = catalog::new_record(&schema, header)?;
    let written = write_full(path, &record)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote empty {} record to {} ({} bytes)", schema.name(), path.display(), written);
    Ok(())
}
