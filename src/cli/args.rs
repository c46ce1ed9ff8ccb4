use crate::config::EngineConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Merchant ledger back-office tool
#[derive(Parser, Debug)]
#[command(name = "ledger-tool")]
#[command(about = "Merchant balance ledger and payment reconciliation tools", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Log level used when RUST_LOG is not set
    #[arg(long = "log-level", global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,

    /// JSON bank code table replacing the built-in one
    #[arg(long = "bank-table", value_name = "FILE", global = true)]
    pub bank_table: Option<PathBuf>,

    /// Minimum account-name similarity before a disbursement is flagged
    #[arg(long = "name-match-threshold", value_name = "RATIO", global = true)]
    pub name_match_threshold: Option<f64>,

    /// Upper bound for every provider call, in seconds
    #[arg(long = "provider-timeout", value_name = "SECS", global = true)]
    pub provider_timeout_secs: Option<u64>,

    /// Interval of the reconciliation runner, in seconds
    #[arg(long = "poll-interval", value_name = "SECS", global = true)]
    pub poll_interval_secs: Option<u64>,

    /// Fee charged per disbursement, in IDR
    #[arg(long = "disbursement-fee", value_name = "IDR", global = true)]
    pub disbursement_fee: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Rebuild account balances from an operations CSV and print them as CSV
    Replay {
        #[arg(value_name = "INPUT", help = "Path to the operations CSV file")]
        input_file: PathBuf,
    },
    /// Translate an internal bank code to the provider bank id
    BankCode {
        #[arg(value_name = "CODE")]
        code: String,
    },
    /// Print the reconciliation retry schedule
    Backoff,
}

impl CliArgs {
    /// Build the engine configuration from CLI arguments
    ///
    /// Values not given on the command line keep their defaults. Zero
    /// durations are ignored, since a zero timeout or interval is never
    /// meaningful.
    pub fn to_engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();

        if let Some(threshold) = self.name_match_threshold {
            config.name_match_threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(secs) = self.provider_timeout_secs.filter(|s| *s > 0) {
            config.provider_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.poll_interval_secs.filter(|s| *s > 0) {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(fee) = self.disbursement_fee {
            config.disbursement_fee = fee;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::replay(
        &["ledger-tool", "replay", "ops.csv"],
        Command::Replay { input_file: PathBuf::from("ops.csv") }
    )]
    #[case::bank_code(
        &["ledger-tool", "bank-code", "IDR_014"],
        Command::BankCode { code: "IDR_014".to_string() }
    )]
    #[case::backoff(&["ledger-tool", "backoff"], Command::Backoff)]
    #[case::global_after_subcommand(
        &["ledger-tool", "backoff", "--log-level", "debug"],
        Command::Backoff
    )]
    fn test_command_parsing(#[case] args: &[&str], #[case] expected: Command) {
        let parsed = CliArgs::try_parse_from(args).unwrap();

        assert_eq!(parsed.command, expected);
    }

    #[test]
    fn test_defaults() {
        let parsed = CliArgs::try_parse_from(["ledger-tool", "backoff"]).unwrap();
        let config = parsed.to_engine_config();
        let default = EngineConfig::default();

        assert_eq!(parsed.log_level, "info");
        assert!(!parsed.log_json);
        assert_eq!(config.provider_timeout, default.provider_timeout);
        assert_eq!(config.name_match_threshold, default.name_match_threshold);
        assert_eq!(config.disbursement_fee, 0);
    }

    #[rstest]
    #[case::all_custom(
        &["ledger-tool", "--provider-timeout", "5", "--poll-interval", "10",
          "--name-match-threshold", "0.5", "--disbursement-fee", "2500", "backoff"],
        5, 10, 0.5, 2500
    )]
    #[case::zero_durations_fall_back(
        &["ledger-tool", "--provider-timeout", "0", "--poll-interval", "0", "backoff"],
        30, 30, 0.3, 0
    )]
    #[case::threshold_clamped(
        &["ledger-tool", "--name-match-threshold", "1.7", "backoff"],
        30, 30, 1.0, 0
    )]
    fn test_engine_config_conversion(
        #[case] args: &[&str],
        #[case] timeout_secs: u64,
        #[case] poll_secs: u64,
        #[case] threshold: f64,
        #[case] fee: u64,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_engine_config();

        assert_eq!(config.provider_timeout, Duration::from_secs(timeout_secs));
        assert_eq!(config.poll_interval, Duration::from_secs(poll_secs));
        assert!((config.name_match_threshold - threshold).abs() < f64::EPSILON);
        assert_eq!(config.disbursement_fee, fee);
    }

    #[rstest]
    #[case::missing_command(&["ledger-tool"])]
    #[case::missing_input(&["ledger-tool", "replay"])]
    #[case::unknown_command(&["ledger-tool", "settle"])]
    #[case::bad_timeout(&["ledger-tool", "--provider-timeout", "soon", "backoff"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }
}
