use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = newsreelctl::Cli::parse();
    if let Err(err) = newsreelctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
