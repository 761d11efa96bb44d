use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ovf::{JobFileReader, JobFileWriter, OvfFileReader, OvfFileWriter, ReadOperation};

#[derive(Parser)]
#[command(name = "ovf", about = "The .ovf indexed vector-path container CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header and job-shell metadata without materializing the job
    Info {
        input: PathBuf,
    },
    /// List every workplane shell (number, z position, block count)
    Planes {
        input: PathBuf,
    },
    /// Dump the job shell, or one full workplane, as JSON
    Export {
        input: PathBuf,
        /// Workplane index; omit to export the job shell
        #[arg(short, long)]
        plane: Option<usize>,
    },
    /// Read a job completely and rewrite it to a fresh file
    Repack {
        input:  PathBuf,
        output: PathBuf,
        /// Eager-cache threshold in bytes (0 forces streaming reads)
        #[arg(long)]
        threshold: Option<u64>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let mut reader = OvfFileReader::new();
            reader.open(&input)?;
            let shell = reader.get_job_shell()?;
            println!("── .ovf job file ───────────────────────────────────────");
            println!("  Path        {}", input.display());
            println!("  Job name    {}", shell.name);
            println!("  Author      {}", shell.meta.author);
            println!("  Description {}", shell.meta.description);
            println!("  Version     {}", shell.meta.version);
            println!("  Workplanes  {}", shell.num_work_planes);
            println!("  File size   {} B", reader.file_len());
            println!("  Read mode   {}", mode_name(reader.operation()));
        }

        // ── Planes ───────────────────────────────────────────────────────────
        Commands::Planes { input } => {
            let mut reader = OvfFileReader::new();
            reader.open(&input)?;
            println!("{:>6} {:>12} {:>8}", "Plane", "Z (mm)", "Blocks");
            for i in 0..reader.num_work_planes() {
                let shell = reader.get_work_plane_shell(i)?;
                println!(
                    "{:>6} {:>12.4} {:>8}",
                    shell.work_plane_number, shell.z_pos_in_mm, shell.num_blocks
                );
            }
        }

        // ── Export ───────────────────────────────────────────────────────────
        Commands::Export { input, plane } => {
            let mut reader = OvfFileReader::new();
            reader.open(&input)?;
            match plane {
                Some(i) => {
                    let plane = reader.get_work_plane(i)?;
                    println!("{}", serde_json::to_string_pretty(&plane)?);
                }
                None => {
                    let shell = reader.get_job_shell()?;
                    println!("{}", serde_json::to_string_pretty(&shell)?);
                }
            }
        }

        // ── Repack ───────────────────────────────────────────────────────────
        Commands::Repack { input, output, threshold } => {
            let mut reader = OvfFileReader::new();
            if let Some(bytes) = threshold {
                reader.set_cache_threshold(bytes);
            }
            reader.open(&input)?;
            let job = reader.cache_to_memory()?.clone();
            reader.close();

            let mut writer = OvfFileWriter::new();
            writer.set_progress(|done: usize, total: usize| {
                eprintln!("  workplane {done}/{total}");
            });
            writer.write_complete_job(&job, &output)?;
            println!("Repacked → {}", output.display());
        }
    }

    Ok(())
}

fn mode_name(op: ReadOperation) -> &'static str {
    match op {
        ReadOperation::CompleteRead => "complete (eagerly cached)",
        ReadOperation::Streaming    => "streaming (on-demand)",
        ReadOperation::Validating   => "validating",
        ReadOperation::None         => "none",
    }
}
