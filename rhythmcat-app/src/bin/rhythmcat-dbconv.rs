//! Convert a legacy JSON playlist database into the compressed XML library file.

use argh::FromArgs;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(FromArgs)]
/// Convert a JSON playlist database to the RhythmCat library format.
struct Args {
    /// legacy JSON database
    #[argh(positional)]
    input: PathBuf,

    /// library file to write
    #[argh(positional)]
    output: PathBuf,
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Args = argh::from_env();
    match rhythmcat_core::legacy::convert(&args.input, &args.output) {
        Ok(report) => println!(
            "Wrote {} catalog(s) and {} item(s) to {}",
            report.catalogs,
            report.items,
            args.output.display()
        ),
        Err(e) => {
            error!("Conversion failed: {}", e);
            std::process::exit(1);
        }
    }
}
