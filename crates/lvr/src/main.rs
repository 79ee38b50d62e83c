//! lvr - lifecycle-managed client for live JSONL event feeds.
//!
//! Every subcommand is one interactive run: acquire live resources, stream
//! events (pretty or `--json`) until Ctrl-C, then release everything in
//! reverse order under a teardown watchdog.

use clap::Parser;

mod commands;
mod feed;
mod presence_store;
mod sources;

use commands::Cli;

// Current-thread flavor: one event loop, all dispatch as cooperative
// callbacks on it. Blocking file watching runs on the blocking pool and
// feeds back through channels.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    liverun_core::logging::init();

    let cli = Cli::parse();

    if let Err(e) = cli.execute().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
