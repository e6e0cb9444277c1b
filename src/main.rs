//! bitframe CLI
//!
//! Local administration of a bitframe data directory:
//! - Create and delete indexes and frames
//! - Set, clear and read bits
//! - Rank rows and query integer fields
//! - Import CSV bits and ingest JSON records

use anyhow::{bail, Context};
use bitframe::config::{generate_default_config, Config};
use bitframe::schema::{parse_timestamp, Field, TimeQuantum};
use bitframe::{
    CacheType, FrameOptions, Holder, Index, IndexOptions, InputDefinitionInfo, RangeOp,
    TopOptions,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bitframe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bitmap storage engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory, overriding the config
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate default config file
    InitConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create an index
    CreateIndex {
        name: String,
        /// Default time quantum for new frames (e.g. YMD)
        #[arg(long, default_value = "")]
        time_quantum: String,
        #[arg(long)]
        column_label: Option<String>,
    },

    /// Delete an index and all its data
    DeleteIndex { name: String },

    /// Create a frame
    CreateFrame {
        index: String,
        frame: String,
        /// Maintain the transposed inverse view
        #[arg(long)]
        inverse: bool,
        /// ranked, lru or none
        #[arg(long, default_value = "ranked")]
        cache_type: String,
        #[arg(long)]
        cache_size: Option<u32>,
        #[arg(long, default_value = "")]
        time_quantum: String,
        #[arg(long)]
        row_label: Option<String>,
        /// Integer field as name:min:max (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
    },

    /// Delete a frame and all its data
    DeleteFrame { index: String, frame: String },

    /// Set a bit
    SetBit {
        index: String,
        frame: String,
        row: u64,
        column: u64,
        #[arg(long, default_value = "standard")]
        view: String,
        /// Timestamp (RFC 3339 or 2017-03-02T04:00)
        #[arg(short, long)]
        time: Option<String>,
    },

    /// Clear a bit
    ClearBit {
        index: String,
        frame: String,
        row: u64,
        column: u64,
        #[arg(long, default_value = "standard")]
        view: String,
    },

    /// Print the columns set in a row
    Row {
        index: String,
        frame: String,
        row: u64,
        #[arg(long, default_value = "standard")]
        view: String,
        /// Restrict to [start, end) through the time views
        #[arg(long, requires = "end")]
        start: Option<String>,
        #[arg(long, requires = "start")]
        end: Option<String>,
    },

    /// Rank rows by cardinality
    TopN {
        index: String,
        frame: String,
        #[arg(short, default_value = "10")]
        n: usize,
        #[arg(long, default_value = "standard")]
        view: String,
        /// Only rank these rows
        #[arg(long)]
        ids: Vec<u64>,
        #[arg(long, default_value = "0")]
        threshold: u64,
    },

    /// Set an integer field value
    SetValue {
        index: String,
        frame: String,
        field: String,
        column: u64,
        #[arg(allow_hyphen_values = true)]
        value: i64,
    },

    /// Read an integer field value
    Value {
        index: String,
        frame: String,
        field: String,
        column: u64,
    },

    /// Sum an integer field over all columns
    Sum {
        index: String,
        frame: String,
        field: String,
    },

    /// Columns whose field value matches a predicate (==, !=, <, <=, >, >=)
    FieldRange {
        index: String,
        frame: String,
        field: String,
        op: String,
        #[arg(allow_hyphen_values = true)]
        value: i64,
    },

    /// Import row,column[,timestamp] lines from a CSV file
    Import {
        index: String,
        frame: String,
        path: PathBuf,
        /// Skip the first line
        #[arg(long)]
        header: bool,
    },

    /// Create an input definition from a JSON file
    CreateInput { index: String, path: PathBuf },

    /// Ingest a JSON array of records through an input definition
    Ingest {
        index: String,
        definition: String,
        path: PathBuf,
    },

    /// Describe every index, frame and view
    Schema,
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("bitframe={}", config.logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.to_string_lossy().to_string();
    }
    init_logging(&config);

    if let Commands::InitConfig { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("Wrote default config to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let storage = config.storage.to_storage_config()?;
    tracing::debug!("Data directory: {:?}", storage.data_dir);
    let holder = Holder::open(storage)?;

    let result = run(&holder, cli.command, &cli.format);
    holder.close()?;
    result
}

fn run(holder: &Holder, command: Commands, format: &str) -> anyhow::Result<()> {
    match command {
        Commands::InitConfig { .. } => {}

        Commands::CreateIndex {
            name,
            time_quantum,
            column_label,
        } => {
            let mut options = IndexOptions {
                time_quantum: TimeQuantum::new(&time_quantum)?,
                ..Default::default()
            };
            if let Some(label) = column_label {
                options.column_label = label;
            }
            holder.create_index(&name, options)?;
            println!("Created index {}", name);
        }

        Commands::DeleteIndex { name } => {
            holder.delete_index(&name)?;
            println!("Deleted index {}", name);
        }

        Commands::CreateFrame {
            index,
            frame,
            inverse,
            cache_type,
            cache_size,
            time_quantum,
            row_label,
            fields,
        } => {
            let cache_type: CacheType = cache_type.parse().map_err(anyhow::Error::msg)?;
            let mut options = FrameOptions {
                inverse_enabled: inverse,
                cache_type,
                time_quantum: TimeQuantum::new(&time_quantum)?,
                fields: fields
                    .iter()
                    .map(|f| parse_field(f))
                    .collect::<anyhow::Result<Vec<_>>>()?,
                ..Default::default()
            };
            options.range_enabled = !options.fields.is_empty();
            if let Some(size) = cache_size {
                options.cache_size = size;
            }
            if let Some(label) = row_label {
                options.row_label = label;
            }
            require_index(holder, &index)?.create_frame(&frame, options)?;
            println!("Created frame {}/{}", index, frame);
        }

        Commands::DeleteFrame { index, frame } => {
            require_index(holder, &index)?.delete_frame(&frame)?;
            println!("Deleted frame {}/{}", index, frame);
        }

        Commands::SetBit {
            index,
            frame,
            row,
            column,
            view,
            time,
        } => {
            let t = time.as_deref().map(parse_time).transpose()?;
            let changed = require_frame(holder, &index, &frame)?.set_bit(&view, row, column, t)?;
            println!("{}", changed);
        }

        Commands::ClearBit {
            index,
            frame,
            row,
            column,
            view,
        } => {
            let changed = require_frame(holder, &index, &frame)?.clear_bit(&view, row, column)?;
            println!("{}", changed);
        }

        Commands::Row {
            index,
            frame,
            row,
            view,
            start,
            end,
        } => {
            let frame = require_frame(holder, &index, &frame)?;
            let bits = match (start, end) {
                (Some(start), Some(end)) => frame
                    .range(&view, row, parse_time(&start)?, parse_time(&end)?)?
                    .bits(),
                _ => frame.row(&view, row)?.bits(),
            };
            if format == "json" {
                println!("{}", serde_json::to_string(&bits)?);
            } else {
                for column in bits {
                    println!("{}", column);
                }
            }
        }

        Commands::TopN {
            index,
            frame,
            n,
            view,
            ids,
            threshold,
        } => {
            let opts = TopOptions {
                n,
                row_ids: ids,
                filter: None,
                min_threshold: threshold,
            };
            let pairs = require_frame(holder, &index, &frame)?.top_n(&view, &opts)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&pairs)?);
            } else {
                println!("{:<20} {}", "Row", "Count");
                println!("{}", "-".repeat(32));
                for pair in pairs {
                    println!("{:<20} {}", pair.id, pair.count);
                }
            }
        }

        Commands::SetValue {
            index,
            frame,
            field,
            column,
            value,
        } => {
            let changed =
                require_frame(holder, &index, &frame)?.set_field_value(column, &field, value)?;
            println!("{}", changed);
        }

        Commands::Value {
            index,
            frame,
            field,
            column,
        } => match require_frame(holder, &index, &frame)?.field_value(column, &field)? {
            Some(value) => println!("{}", value),
            None => println!("(unset)"),
        },

        Commands::Sum {
            index,
            frame,
            field,
        } => {
            let sum = require_frame(holder, &index, &frame)?.field_sum(None, &field)?;
            if format == "json" {
                println!("{}", serde_json::to_string(&sum)?);
            } else {
                println!("sum={} count={}", sum.sum, sum.count);
            }
        }

        Commands::FieldRange {
            index,
            frame,
            field,
            op,
            value,
        } => {
            let op: RangeOp = op.parse().map_err(anyhow::Error::msg)?;
            let columns = require_frame(holder, &index, &frame)?
                .field_range(&field, op, value)?
                .bits();
            println!("{}", serde_json::to_string(&columns)?);
        }

        Commands::Import {
            index,
            frame,
            path,
            header,
        } => {
            let frame = require_frame(holder, &index, &frame)?;
            let result = bitframe::CsvImporter::new().with_header(header).import(&path)?;
            for error in &result.errors {
                eprintln!("{}", error);
            }
            let changed = frame.import(&result.bits)?;
            println!(
                "Imported {} lines ({} failed), {} bits changed",
                result.rows_processed, result.rows_failed, changed
            );
        }

        Commands::CreateInput { index, path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let info: InputDefinitionInfo = serde_json::from_str(&content)?;
            let definition = require_index(holder, &index)?.create_input_definition(info)?;
            println!("Created input definition {}/{}", index, definition.name());
        }

        Commands::Ingest {
            index,
            definition,
            path,
        } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let records: Vec<serde_json::Value> = serde_json::from_str(&content)?;
            let bits = require_index(holder, &index)?.input(&definition, &records)?;
            println!("Ingested {} records ({} bits)", records.len(), bits);
        }

        Commands::Schema => {
            let schema = holder.schema()?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                for index in schema {
                    println!("{}", index.name);
                    for frame in index.frames {
                        println!("  {} [{}]", frame.name, frame.views.join(", "));
                    }
                }
            }
        }
    }
    Ok(())
}

fn require_index(holder: &Holder, name: &str) -> anyhow::Result<Arc<Index>> {
    holder
        .index(name)?
        .with_context(|| format!("Index not found: {}", name))
}

fn require_frame(holder: &Holder, index: &str, frame: &str) -> anyhow::Result<Arc<bitframe::Frame>> {
    require_index(holder, index)?
        .frame(frame)?
        .with_context(|| format!("Frame not found: {}", frame))
}

fn parse_time(s: &str) -> anyhow::Result<DateTime<Utc>> {
    match parse_timestamp(s) {
        Some(t) => Ok(t),
        None => bail!("Invalid timestamp: {}", s),
    }
}

/// `name:min:max`
fn parse_field(s: &str) -> anyhow::Result<Field> {
    let parts: Vec<&str> = s.split(':').collect();
    let [name, min, max] = parts.as_slice() else {
        bail!("Invalid field {:?}, expected name:min:max", s);
    };
    Ok(Field::int(
        *name,
        min.parse().with_context(|| format!("Invalid min in {:?}", s))?,
        max.parse().with_context(|| format!("Invalid max in {:?}", s))?,
    ))
}
