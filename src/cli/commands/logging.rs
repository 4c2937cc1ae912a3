use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

pub const ENV_LOG_LEVEL: &str = "KEYGATE_LOG_LEVEL";

/// Level names in `-v` count order; `-v` once is `warn`.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accept a level name (any case) or its count, `0` (`error`) to `4` (`trace`).
fn parse_level(level: &str) -> Result<u8, String> {
    let level = level.trim();
    let index = level.parse::<usize>().ok().or_else(|| {
        LEVELS
            .iter()
            .position(|name| name.eq_ignore_ascii_case(level))
    });

    index
        .filter(|index| *index < LEVELS.len())
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| {
            format!(
                "invalid log level `{level}`, expected one of: {}",
                LEVELS.join(", ")
            )
        })
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_level)
}

/// Global `-v` flag. Logs go to stderr so `rotate` output on stdout stays scriptable.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Log verbosity on stderr: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env(ENV_LOG_LEVEL)
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
