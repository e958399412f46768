use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mctally::io::BinaryArray;
use mctally::read_config_file;

#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "check_config", about = "Check a detector configuration file and describe the detectors it asks for")]
struct Cli {
    /// Detector configuration file
    config_file: PathBuf,

    /// Print the configuration back, in canonical form
    #[clap(short, long)]
    echo: bool,
}

fn describe(array: &BinaryArray) -> String {
    let shape = array.data.shape();
    let kind = if array.data.is_complex() { "complex" } else { "real" };
    if shape.is_empty() { format!("{:>14}: {kind} scalar", array.name) }
    else                { format!("{:>14}: {kind} {shape:?}", array.name) }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();
    let config = read_config_file(&args.config_file)?;
    let detectors = config.build()?;

    for detector in &detectors {
        println!("{} ({})", detector.name(), detector.input().kind());
        for array in detector.arrays() {
            println!("{}", describe(&array));
        }
    }
    if args.echo {
        println!("\n{}", toml::to_string(&config)?);
    }
    Ok(())
}
