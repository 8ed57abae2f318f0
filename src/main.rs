mod args;
mod tab;

use clap::Parser;
use log::{error, LevelFilter};

fn main() {
    let args = args::Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    if let Err(e) = tab::run(&args) {
        error!("Error occured {:?}", e);
        tab::report_error(&e);
        std::process::exit(1);
    }
}
