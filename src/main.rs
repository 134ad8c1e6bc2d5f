mod args;
mod poll;

use crate::args::Args;
use clap::Parser;
use env_logger::Env;
use log::error;

fn main() {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    if let Err(e) = poll::run(&args) {
        error!("{:?}", e);
        match e.kind() {
            poll::ErrorKind::Validation | poll::ErrorKind::StorageUnavailable => {
                eprintln!("{}", e.respondent_message(&args.command))
            }
            _ => eprintln!("An error occurred: {}", e),
        }
        std::process::exit(e.exit_code());
    }
}
