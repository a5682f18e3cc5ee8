use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = reachctl::Cli::parse();
    reachctl::init_tracing(cli.debug);
    if let Err(err) = reachctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
