use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mctally::io::{read_results, LoadedArray};
use mctally::utils::group_digits;

#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "show_tallies", about = "Summarize detector results written by a simulation")]
struct Cli {
    /// Directory containing the detector results
    dir: PathBuf,

    /// Names of the detectors to show
    #[clap(required = true)]
    detectors: Vec<String>,

    /// Also print every element of the arrays
    #[clap(short, long)]
    all: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();
    for name in &args.detectors {
        let results = read_results(&args.dir, name)?;
        let m = &results.metadata;
        println!("{} ({:?}, {} tallies)", m.name, m.phase, group_digits(m.tally_count));
        for (scalar, value) in &m.scalars {
            println!("  {scalar:>14} = {value:e}");
        }
        for (array, data) in &results.arrays {
            match data {
                LoadedArray::Real(h) => {
                    let total: f64 = h.data().iter().sum();
                    let max = h.data().iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    println!("  {array:>14} {:?}: sum {total:e}, max {max:e}", h.shape());
                    if args.all { println!("{:?}", h.data()) }
                }
                LoadedArray::Complex(h) => {
                    let total: num_complex::Complex64 = h.data().iter().sum();
                    println!("  {array:>14} {:?}: sum {total:e} (complex)", h.shape());
                    if args.all { println!("{:?}", h.data()) }
                }
            }
        }
    }
    Ok(())
}
