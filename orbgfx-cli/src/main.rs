// CLI application
use std::path::PathBuf;

use clap::Parser;

mod commands;

use commands::{compile_shader, disasm_shader, info_shader};

#[derive(Parser)]
#[command(name = "orbgfx")]
#[command(about = "PSSL shader binary inspector and recompiler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show the embedded binary-info record and input usage slots
    Info {
        /// Path to the shader binary
        shader: PathBuf,
    },
    /// Structurally decode the GCN instruction stream
    Disasm {
        /// Path to the shader binary
        shader: PathBuf,
    },
    /// Recompile to SPIR-V
    Compile {
        /// Path to the shader binary
        shader: PathBuf,

        /// Path to the fetch shader blob, for vertex shaders
        #[arg(short, long)]
        fetch: Option<PathBuf>,

        /// Output path for the SPIR-V module
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write a JSON manifest next to the output
        #[arg(long)]
        manifest: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { shader } => info_shader(&shader)?,
        Commands::Disasm { shader } => disasm_shader(&shader)?,
        Commands::Compile { shader, fetch, output, manifest } => {
            compile_shader(&shader, fetch.as_deref(), output.as_deref(), manifest)?;
        }
    }

    Ok(())
}
