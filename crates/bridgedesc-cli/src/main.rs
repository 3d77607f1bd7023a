//! `bridgedesc-sanitizer`: run one bridge descriptor sanitization job.

use clap::{App, Arg};
use std::path::Path;

fn main() {
    tracing_subscriber::fmt::init();

    let matches = App::new("bridgedesc-sanitizer")
        .about("Sanitizes bridge network statuses, server descriptors, and extra-info descriptors")
        .arg(
            Arg::with_name("config")
                .long("config")
                .short("c")
                .value_name("FILE")
                .help("Path to the sanitizer's TOML configuration file (default: bridgedesc.toml)")
                .takes_value(true),
        )
        .get_matches();

    let config_path = Path::new(matches.value_of("config").unwrap_or("bridgedesc.toml"));
    bridgedesc_cli::run_sanitizer(config_path);
}
