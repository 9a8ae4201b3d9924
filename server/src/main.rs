use clap::Parser;
use server::network::Server;
use std::time::Duration;

/// Parses command-line arguments, then runs the session server until it is
/// interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "3001")]
        port: u16,
        /// Enemy AI tick rate (updates per second)
        #[clap(short, long, default_value = "10")]
        ai_tick_rate: u32,
    }

    env_logger::init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let ai_tick = Duration::from_secs_f64(1.0 / args.ai_tick_rate as f64);

    let mut server = Server::new(&address, ai_tick).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
            Ok(())
        }
    }
}
