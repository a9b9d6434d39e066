//! Devfolio Backend - binary entry point
//! Delegates to the library for all app logic.

#[tokio::main]
async fn main() {
    if let Err(e) = devfolio_backend::run().await {
        eprintln!("FATAL: {}", e);
        std::process::exit(1);
    }
}
