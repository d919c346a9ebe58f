use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Read-only consistency checks for single-file B+tree stores.
#[derive(Parser, Debug)]
#[command(name = "boltcheck", version, about = "boltcheck CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Verify integrity of a store file
    Check {
        #[command(subcommand)]
        sub: CheckCmd,
    },
}

#[derive(Subcommand, Debug)]
pub enum CheckCmd {
    /// Check the whole database: free-list, every bucket tree, unreachable pages
    Db {
        /// Path to the store file
        path: PathBuf,
        /// Print findings as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Check only the subtree rooted at one page
    Page {
        /// Path to the store file
        path: PathBuf,
        /// Root page of the subtree (pages 0 and 1 are meta)
        #[arg(long = "pageId")]
        page_id: u64,
        /// Print findings as JSON lines
        #[arg(long)]
        json: bool,
    },
}
