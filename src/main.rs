use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{self, LevelFilter, debug, error, info};

use fastq_demux::cli::parse;
use fastq_demux::config::defs::RunConfig;
use fastq_demux::pipelines::demux;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n FASTQ Demux\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);
    debug!("{:?}", args);

    let run_config = match RunConfig::from_args(args, &dir) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Run failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
            std::process::exit(1);
        }
    };

    match demux::run(Arc::clone(&run_config)).await {
        Ok(outcome) => demux::print_summary(&outcome.stats, run_config.unknown_top),
        Err(e) => {
            error!("Run failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
            std::process::exit(1);
        }
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}
