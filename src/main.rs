//! Merchant ledger back-office tool
//!
//! # Usage
//!
//! ```bash
//! cargo run -- replay operations.csv > balances.csv
//! cargo run -- bank-code IDR_014
//! cargo run -- --bank-table banks.json bank-code IDR_542
//! cargo run -- backoff
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (unreadable input, unknown bank code, etc.)

use anyhow::Context;
use merchant_ledger::cli::{self, CliArgs, Command};
use merchant_ledger::config::EngineConfig;
use merchant_ledger::core::{BankCodeTranslator, LedgerReplay};
use merchant_ledger::io::{write_accounts_csv, SyncReader};
use merchant_ledger::logging;
use std::fs::File;
use std::process;
use tracing::info;

fn main() {
    let args = cli::parse_args();
    logging::init_logging(&args.log_level, args.log_json);

    if let Err(e) = run(&args) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(args: &CliArgs) -> anyhow::Result<()> {
    let config = args.to_engine_config();

    match &args.command {
        Command::Replay { input_file } => {
            let reader = SyncReader::new(input_file).map_err(anyhow::Error::msg)?;
            let replay = LedgerReplay::new("replay");
            let report = replay.replay(reader);
            info!(
                applied = report.applied,
                rejected = report.rejected,
                unreadable = report.unreadable,
                "Replay finished"
            );

            let mut output = std::io::stdout();
            write_accounts_csv(&replay.accounts(), &mut output).map_err(anyhow::Error::msg)?;
        }
        Command::BankCode { code } => {
            let translator = load_bank_table(args, &config)?;
            let bank = translator.translate(code)?;
            println!("{code} -> {} ({})", bank.provider_id, bank.name);
        }
        Command::Backoff => {
            let retry = &config.retry;
            println!("attempt,delay_minutes");
            for attempt in 1..=retry.max_retries {
                println!("{attempt},{}", retry.delay_for(attempt).num_minutes());
            }
            println!("after {},{}", retry.max_retries, retry.final_increment.num_minutes());
        }
    }

    Ok(())
}

fn load_bank_table(args: &CliArgs, config: &EngineConfig) -> anyhow::Result<BankCodeTranslator> {
    let translator = match &args.bank_table {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open bank table '{}'", path.display()))?;
            BankCodeTranslator::from_json_reader(file)
                .with_context(|| format!("Failed to load bank table '{}'", path.display()))?
        }
        None => BankCodeTranslator::default_table(),
    };
    Ok(translator.with_name_match_threshold(config.name_match_threshold))
}
