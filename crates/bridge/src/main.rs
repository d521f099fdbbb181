use std::{net::SocketAddr, time::Duration};

use clap::Parser;
use deltabot_bridge::{Link, Relay, SerialOpener};
use deltabot_protocol::Handshake;
use log::LevelFilter;

fn default_port() -> &'static str {
    if cfg!(windows) {
        "COM3"
    } else {
        "/dev/ttyUSB0"
    }
}

#[derive(Parser)]
#[command(version, about = "Relays a local TCP socket to the drawing bot's serial port")]
struct Args {
    /// Serial port the bot is plugged into.
    #[arg(long, default_value = default_port())]
    port: String,
    #[arg(long, default_value_t = 115200)]
    baud: u32,
    /// Address to accept clients on.
    #[arg(long, default_value = "127.0.0.1:65432")]
    listen: SocketAddr,
    /// Reset the bot before accepting clients.
    #[arg(long)]
    reset: bool,
    /// Exit after this many seconds without a client.
    #[arg(long, default_value_t = 3600)]
    idle_timeout: u64,
    #[arg(short, long)]
    verbose: bool,
}

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) => {
            builder.filter_level(if args.verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            });
        }
    }
    builder.init();

    // Bind first, so that a second bridge fails fast instead of fighting over
    // the serial port.
    let listener = std::net::TcpListener::bind(args.listen)?;
    log::info!("listening on {}", args.listen);

    let opener = SerialOpener {
        path: args.port,
        baud: args.baud,
    };
    let mut relay = Relay::new(Link::connect(opener, Handshake::default(), RETRY_INTERVAL));
    if args.reset {
        relay.link().reset();
    }

    relay.run(&listener, Duration::from_secs(args.idle_timeout))?;
    Ok(())
}
