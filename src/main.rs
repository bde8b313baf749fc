use tenants::cli;
use tenants::observability::{init_tracing, DEFAULT_FILTER};

#[tokio::main]
async fn main() {
    init_tracing(DEFAULT_FILTER);

    if let Err(e) = cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
