use clap::Parser;
use log::info;
use server::hub::HubServer;

/// Shared key-value store, intent queue and event channel for the sea processes.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value = "7400")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let hub = HubServer::bind(&address).await?;

    tokio::select! {
        _ = hub.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down hub");
        }
    }

    Ok(())
}
