use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = consul_ingress::cli::Cli::parse();
    if let Err(e) = consul_ingress::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
