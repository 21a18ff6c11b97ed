//! CLI argument definitions for `trackmix`.

use clap::{value_parser, Arg, ArgAction, Command};

/// Build the CLI argument parser and command definitions.
pub fn build_cli() -> Command {
    Command::new("trackmix")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Adam Howard <adam.thomas.howard@gmail.com>")
        .about("Render multi-track mix scenes")
        .arg_required_else_help(true)
        .arg(
            Arg::new("bench")
                .long("bench")
                .action(ArgAction::SetTrue)
                .help("Run a synthetic mixer benchmark and exit"),
        )
        .arg(
            Arg::new("bench-tracks")
                .long("bench-tracks")
                .value_name("COUNT")
                .value_parser(value_parser!(usize))
                .default_value("8")
                .help("Tracks mixed at the mix rate during the benchmark"),
        )
        .arg(
            Arg::new("bench-resampled")
                .long("bench-resampled")
                .value_name("COUNT")
                .value_parser(value_parser!(usize))
                .default_value("0")
                .help("Additional 44.1 kHz tracks resampled during the benchmark"),
        )
        .arg(
            Arg::new("bench-frames")
                .long("bench-frames")
                .value_name("FRAMES")
                .value_parser(value_parser!(usize))
                .default_value("256")
                .help("Block size for the benchmark"),
        )
        .arg(
            Arg::new("bench-iterations")
                .long("bench-iterations")
                .value_name("COUNT")
                .value_parser(value_parser!(usize))
                .default_value("1000")
                .help("Number of blocks rendered by the benchmark"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Suppress log output"),
        )
        .subcommand(
            Command::new("render")
                .about("Render a scene file to WAV")
                .arg(
                    Arg::new("SCENE")
                        .help("Path to the scene JSON file")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_name("WAV")
                        .required(true)
                        .help("Destination for the main bus"),
                )
                .arg(
                    Arg::new("bus")
                        .long("bus")
                        .value_name("INDEX")
                        .value_parser(value_parser!(usize))
                        .default_value("0")
                        .help("Main bus written to --out"),
                )
                .arg(
                    Arg::new("aux-out")
                        .long("aux-out")
                        .value_name("WAV")
                        .help("Also write aux bus 0 as a mono float WAV"),
                ),
        )
        .subcommand(
            Command::new("create")
                .about("Emit default JSON payloads")
                .subcommand(
                    Command::new("scene-json").about("Print an example scene JSON payload"),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_requires_output_path() {
        let result = build_cli().try_get_matches_from(["trackmix", "render", "scene.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn render_parses_bus_index() {
        let matches = build_cli()
            .try_get_matches_from(["trackmix", "render", "scene.json", "-o", "out.wav", "--bus", "1"])
            .expect("matches");
        let (name, render) = matches.subcommand().expect("subcommand");
        assert_eq!(name, "render");
        assert_eq!(render.get_one::<usize>("bus"), Some(&1));
    }
}
