use clap::{Arg, ArgMatches, Command};

pub const ARG_RATE_LIMIT_CAPACITY: &str = "rate-limit-capacity";
pub const ARG_RATE_LIMIT_REFILL_MS: &str = "rate-limit-refill-ms";
pub const ARG_SWEEP_INTERVAL_SECONDS: &str = "sweep-interval-seconds";
pub const ARG_INACTIVE_AFTER_DAYS: &str = "inactive-after-days";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub capacity: u32,
    pub refill_ms: u64,
    pub sweep_interval_seconds: u64,
    pub inactive_after_days: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            capacity: matches
                .get_one::<u32>(ARG_RATE_LIMIT_CAPACITY)
                .copied()
                .unwrap_or(60),
            refill_ms: matches
                .get_one::<u64>(ARG_RATE_LIMIT_REFILL_MS)
                .copied()
                .unwrap_or(1000),
            sweep_interval_seconds: matches
                .get_one::<u64>(ARG_SWEEP_INTERVAL_SECONDS)
                .copied()
                .unwrap_or(3600),
            inactive_after_days: matches
                .get_one::<u64>(ARG_INACTIVE_AFTER_DAYS)
                .copied()
                .unwrap_or(90),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_CAPACITY)
                .long(ARG_RATE_LIMIT_CAPACITY)
                .help("Requests a client may burst before being throttled")
                .env("AUTHGATE_RATE_LIMIT_CAPACITY")
                .default_value("60")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_REFILL_MS)
                .long(ARG_RATE_LIMIT_REFILL_MS)
                .help("Milliseconds for a client bucket to regain one request credit")
                .env("AUTHGATE_RATE_LIMIT_REFILL_MS")
                .default_value("1000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL_SECONDS)
                .long(ARG_SWEEP_INTERVAL_SECONDS)
                .help("Seconds between sweeps of expired revocations, idle buckets and elapsed locks")
                .env("AUTHGATE_SWEEP_INTERVAL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_INACTIVE_AFTER_DAYS)
                .long(ARG_INACTIVE_AFTER_DAYS)
                .help("Days without a login after which the sweep marks an active account inactive")
                .env("AUTHGATE_INACTIVE_AFTER_DAYS")
                .default_value("90")
                .value_parser(clap::value_parser!(u64).range(1..=36_500)),
        )
}
