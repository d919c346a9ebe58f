use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use std::io::Write;

mod cli;
mod cmd_check;

/// Exit status for a check that ran to completion without findings.
const EXIT_CLEAN: i32 = 0;
/// Exit status for a completed check that found corruption.
const EXIT_CORRUPT: i32 = 3;

fn init_logger() {
    // Уровень из RUST_LOG, иначе warn: stdout занят отчётом, логи идут в stderr.
    Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let _ = std::io::stdout().flush();
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Check { sub } => match sub {
            cli::CheckCmd::Db { path, json } =>
                cmd_check::exec_db(path, json),

            cli::CheckCmd::Page { path, page_id, json } =>
                cmd_check::exec_page(path, page_id, json),
        },
    }
}
