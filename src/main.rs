use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = telltale::cli::Cli::parse();
    if let Err(e) = telltale::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
