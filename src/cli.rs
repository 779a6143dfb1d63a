use std::path::PathBuf;
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::core::export::DEFAULT_EXPORT_FILE;

const DEFAULT_INTERVAL_SECS: &str = "2";
const DEFAULT_TTL_SECS: &str = "120";
const MAX_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub refresh_interval: Duration,
    pub dns_ttl: Duration,
    pub resolve_names: bool,
    pub service_names: bool,
    pub output: PathBuf,
    pub export_only: bool,
    pub log_file: Option<PathBuf>,
}

pub fn build_command() -> Command {
    Command::new("connwatch")
        .version("0.1.0")
        .about("Live table of the host's TCP and UDP endpoints")
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .help("Seconds between refreshes")
                .value_name("SECS")
                .value_parser(value_parser!(u64).range(1..))
                .default_value(DEFAULT_INTERVAL_SECS)
        )
        .arg(
            Arg::new("ttl")
                .short('t')
                .long("ttl")
                .help("Seconds a resolved host name stays cached (at most a week)")
                .value_name("SECS")
                .value_parser(value_parser!(u64).range(0..=MAX_TTL_SECS))
                .default_value(DEFAULT_TTL_SECS)
        )
        .arg(
            Arg::new("resolve")
                .short('r')
                .long("resolve")
                .help("Show host names instead of addresses")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("services")
                .short('s')
                .long("services")
                .help("Show service names instead of port numbers")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Export destination")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_EXPORT_FILE)
        )
        .arg(
            Arg::new("export")
                .long("export")
                .help("Take one snapshot, write it to the export destination and exit")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Write logs to this file (interactive mode logs nowhere otherwise)")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
        )
}

pub fn parse_args() -> Settings {
    settings_from(&build_command().get_matches())
}

fn settings_from(matches: &ArgMatches) -> Settings {
    let secs = |id: &str| matches.get_one::<u64>(id).copied().unwrap_or_default();

    Settings {
        refresh_interval: Duration::from_secs(secs("interval")),
        dns_ttl: Duration::from_secs(secs("ttl")),
        resolve_names: matches.get_flag("resolve"),
        service_names: matches.get_flag("services"),
        output: matches
            .get_one::<PathBuf>("output")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_FILE)),
        export_only: matches.get_flag("export"),
        log_file: matches.get_one::<PathBuf>("log-file").cloned(),
    }
}
