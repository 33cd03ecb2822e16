use clap::Parser;
use vessel_cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = vessel_cli::run_main(cli).await;
    std::process::exit(code);
}
