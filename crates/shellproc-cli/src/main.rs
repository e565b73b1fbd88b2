// shellproc CLI entry point

use clap::Parser;
use colored::Colorize;
use shellproc_cli::{dispatch, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            1
        }
    };

    std::process::exit(code);
}
