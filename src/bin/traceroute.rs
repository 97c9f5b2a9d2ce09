use anyhow::{Context, Result};
use icmptool::CancelToken;
use icmptool::hop::{HopDiscovery, TraceConfig};

struct Args {
    destination: String,
    config: TraceConfig,
}

fn parse() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = TraceConfig::default();
    let mut destination = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-n" => config.numeric = true,
            "-S" => config.show_loss = true,
            "-q" => {
                let value = args.get(i + 1).context("missing value for -q")?;
                config.queries = value.parse().context("invalid value for -q")?;
                anyhow::ensure!(config.queries >= 1, "invalid probe count: {}", config.queries);
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

    let destination =
        destination.context("usage: traceroute [-n] [-q nqueries] [-S] <destination>")?;
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

    let mut discovery = HopDiscovery::new(&args.destination, args.config)?;
    discovery.run(&cancel)?;
    Ok(())
}
