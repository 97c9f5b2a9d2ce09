use anyhow::{Context, Result};
use icmptool::CancelToken;
use icmptool::session::{PingConfig, PingSession};
use std::time::Duration;

struct Args {
    destination: String,
    config: PingConfig,
}

fn parse() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = PingConfig::default();
    let mut destination = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" => {
                let value = args.get(i + 1).context("missing value for -c")?;
                config.count = Some(value.parse().context("invalid value for -c")?);
                i += 1;
            }
            "-i" => {
                let value = args.get(i + 1).context("missing value for -i")?;
                let secs: f64 = value.parse().context("invalid value for -i")?;
                anyhow::ensure!(secs >= 0.0, "invalid value for -i: {secs}");
                config.interval = Duration::from_secs_f64(secs);
                i += 1;
            }
            "-t" => {
                let value = args.get(i + 1).context("missing value for -t")?;
                let secs: u64 = value.parse().context("invalid value for -t")?;
                config.deadline = Some(Duration::from_secs(secs));
                i += 1;
            }
            "-s" => {
                let value = args.get(i + 1).context("missing value for -s")?;
                config.payload_size = value.parse().context("invalid value for -s")?;
                i += 1;
            }
            value => {
                if destination.is_none() {
                    destination = Some(value.to_string());
                }
            }
        }
        i += 1;
    }

    let destination = destination
        .context("usage: ping [-c count] [-i interval] [-t timeout] [-s size] <destination>")?;
    Ok(Args {
        destination,
        config,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = parse()?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to install interrupt handler")?;

    let mut session = PingSession::new(&args.destination, args.config)?;
    session.run(&cancel)?;
    Ok(())
}
