mod commands;
mod config;
mod persistence;
mod server;
mod world;

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use config::{parse_args, CliAction, USAGE};

fn main() {
    let cli = match parse_args(env::args().skip(1)) {
        Ok(CliAction::Run(cli)) => cli,
        Ok(CliAction::Help) => {
            println!("{USAGE}");
            return;
        }
        Err(err) => {
            eprintln!("{err}");
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {err}");
            std::process::exit(2);
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(config.max_log_level())
        .try_init();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        eprintln!("\nShutdown signal received, saving world...");
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("failed to set Ctrl+C handler: {err}");
        std::process::exit(1);
    }

    if let Err(err) = server::run(config, running) {
        eprintln!("server failed: {err}");
        std::process::exit(1);
    }
}
