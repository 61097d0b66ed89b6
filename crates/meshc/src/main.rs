//! Mesh compiler CLI.
//!
//! `mesh build <project-dir>` compiles a project to a native binary.
//! Exit codes: 0 = success, 1 = compile error (diagnostics on stderr),
//! 2 = usage error (clap's default).

use clap::{Parser as ClapParser, Subcommand};
use meshc::{BuildOptions, build_project};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "mesh")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mesh compiler - compile Mesh projects to native binaries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a project directory to a native binary
    Build {
        /// Project root containing main.snow
        project_dir: PathBuf,

        /// Keep the intermediate LLVM IR file (.ll)
        #[arg(long)]
        keep_ir: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            project_dir,
            keep_ir,
        } => {
            if !project_dir.is_dir() {
                eprintln!(
                    "error: `{}` is not a directory",
                    project_dir.display()
                );
                process::exit(2);
            }
            let opts = BuildOptions { keep_ir };
            match build_project(&project_dir, &opts) {
                Ok(binary) => {
                    println!("{}", binary.display());
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    process::exit(1);
                }
            }
        }
    }
}
