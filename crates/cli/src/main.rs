//! `ptq`: command-line client for the predictor server

use clap::Parser;
use ptq_cli::cli::{run, Cli};
use ptq_cli::config::Config;
use ptq_cli::output::print_error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            print_error(&format!("{:#}", e));
            std::process::exit(1);
        }
    };
    let api_url = config.api_url(cli.api_url.as_deref());
    let format = config.format(cli.format);

    if let Err(e) = run(cli.command, &api_url, format, cli.verbose).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
