mod capture;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use vkmarshal_codegen::{generate, generate_all, write_files, GenConfig, Target};
use vkmarshal_types::sample::sample_registry;
use vkmarshal_types::TypeRegistry;

#[derive(Parser)]
#[command(name = "vkmarshal")]
#[command(about = "Vulkan command marshaling generator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the marshaling stack from a registry
    Generate {
        /// Registry JSON file, or "sample" for the built-in registry
        #[arg(short, long, default_value = "sample")]
        registry: String,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Only these targets (repeatable); all of them when omitted
        #[arg(short, long)]
        target: Vec<Target>,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List the opcode assigned to every command
    Opcodes {
        /// Registry JSON file, or "sample" for the built-in registry
        #[arg(short, long, default_value = "sample")]
        registry: String,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the built-in sample registry as JSON
    DumpSample,

    /// List the packets of a captured command stream
    Decode {
        /// Captured stream
        file: PathBuf,

        /// Registry JSON file, or "sample" for the built-in registry
        #[arg(short, long, default_value = "sample")]
        registry: String,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dump packet bodies as hex
        #[arg(long)]
        hex: bool,
    },
}

fn load_registry(source: &str) -> anyhow::Result<TypeRegistry> {
    if source == "sample" {
        return Ok(sample_registry()?);
    }
    TypeRegistry::load(Path::new(source)).with_context(|| format!("loading registry {source}"))
}

/// An explicit config path must load; without one the defaults apply.
fn load_config(path: Option<&Path>) -> anyhow::Result<GenConfig> {
    match path {
        Some(path) => GenConfig::load(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(GenConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    vkmarshal_common::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            registry,
            out,
            target,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let registry = load_registry(&registry)?;

            let files = if target.is_empty() {
                generate_all(&registry, &config)?
            } else {
                let mut files = Vec::new();
                for t in target {
                    files.extend(generate(&registry, &config, t)?);
                }
                files
            };
            write_files(&out, &files)?;
            info!(dir = %out.display(), files = files.len(), "generation complete");
            for file in &files {
                println!("{}", out.join(&file.name).display());
            }
        }

        Commands::Opcodes { registry, config } => {
            let config = load_config(config.as_deref())?;
            let registry = load_registry(&registry)?;
            for (opcode, name) in registry.opcode_table(config.opcode_base).iter() {
                println!("{opcode:>6}  {name}");
            }
        }

        Commands::DumpSample => {
            println!("{}", sample_registry()?.to_json()?);
        }

        Commands::Decode {
            file,
            registry,
            config,
            hex,
        } => {
            let config = load_config(config.as_deref())?;
            let registry = load_registry(&registry)?;
            let opcodes = registry.opcode_table(config.opcode_base);
            let buf = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;

            let (packets, trailing) = capture::summarize(&buf, &opcodes);
            for packet in &packets {
                for line in capture::render(packet, hex) {
                    println!("{line}");
                }
            }
            if trailing > 0 {
                warn!(trailing, "stream ends with a partial packet");
            }
            let unknown = packets.iter().filter(|p| p.name.is_none()).count();
            if unknown > 0 {
                anyhow::bail!("{unknown} packet(s) carry an unknown opcode");
            }
        }
    }

    Ok(())
}
