//! # Trackmix
//!
//! A command-line renderer for multi-track mix scenes.

use log::error;

mod cli;
mod decode;
mod error;
mod logging;
mod runner;
mod scene;

fn main() {
    let args = cli::args::build_cli().get_matches();
    logging::init(args.get_flag("quiet"));

    let code = match runner::run(&args) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err.to_string().to_lowercase());
            -1
        }
    };

    std::process::exit(code)
}
