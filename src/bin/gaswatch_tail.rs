//! gaswatch-tail: follow the gas dashboard push channel from a terminal.
//!
//! Prints every update, reconnects with capped exponential backoff, and after
//! a reconnect backfills the missed window from the REST history endpoint.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use gaswatch_backend::client::{ws_url, Applied, DashboardView, ReconnectPolicy};
use gaswatch_backend::models::{Chain, GasSample, Sample};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gaswatch-tail", about = "Follow live gas prices from a gaswatch server")]
struct Args {
    /// Base HTTP URL of the gaswatch server
    #[arg(long, env = "GASWATCH_SERVER", default_value = "http://127.0.0.1:5000")]
    server: String,

    /// Reconnect attempts before giving up
    #[arg(long, env = "GASWATCH_MAX_RECONNECTS", default_value_t = 5)]
    max_reconnects: u32,

    /// Samples of history kept per chain
    #[arg(long, default_value_t = 1000)]
    history: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gaswatch_tail=info,gaswatch_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let url = ws_url(&args.server);
    let mut policy = ReconnectPolicy::new(
        Duration::from_secs(1),
        Duration::from_secs(30),
        args.max_reconnects,
    );
    let mut view = DashboardView::new(args.history);
    let mut disconnected_at: Option<DateTime<Utc>> = None;

    loop {
        match run_session(&url, &args.server, &http, &mut view, &mut policy, disconnected_at).await {
            Ok(()) => info!("Server closed the connection"),
            Err(e) => warn!("Connection lost: {e:#}"),
        }
        disconnected_at = Some(Utc::now());

        let Some(delay) = policy.next_delay() else {
            bail!(
                "giving up after {} reconnect attempts",
                policy.max_attempts()
            );
        };
        info!(
            attempt = policy.attempts(),
            delay_secs = delay.as_secs(),
            "Reconnecting..."
        );
        tokio::time::sleep(delay).await;
    }
}

async fn run_session(
    url: &str,
    server: &str,
    http: &reqwest::Client,
    view: &mut DashboardView,
    policy: &mut ReconnectPolicy,
    disconnected_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let (socket, _) = connect_async(url)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    info!(url, "Connected");
    policy.reset();

    if let Some(since) = disconnected_at {
        backfill(server, http, view, since).await;
    }

    let (mut write, mut read) = socket.split();
    while let Some(frame) = read.next().await {
        match frame.context("socket error")? {
            Message::Text(text) => match view.apply_text(&text) {
                Ok(applied) => print_update(view, &applied),
                Err(e) => warn!(error = %e, "Bad push message"),
            },
            Message::Ping(payload) => write.send(Message::Pong(payload)).await?,
            Message::Close(_) => return Ok(()),
            _ => {}
        }
    }
    Ok(())
}

/// Pull history covering the disconnect window so charts have no gap.
async fn backfill(server: &str, http: &reqwest::Client, view: &mut DashboardView, since: DateTime<Utc>) {
    let missed = Utc::now() - since;
    let hours = (missed.num_seconds() as f64 / 3600.0).max(1.0 / 60.0);

    for chain in Chain::ALL {
        let url = format!(
            "{}/api/gas-history/{}?hours={hours}",
            server.trim_end_matches('/'),
            chain.as_str()
        );
        match fetch_history(http, &url).await {
            Ok(samples) => {
                let gas: Vec<GasSample> = samples
                    .into_iter()
                    .filter_map(|s| s.as_gas().cloned())
                    .collect();
                let added = view.merge_history(chain, gas);
                debug!(%chain, added, "Backfilled history");
            }
            Err(e) => warn!(%chain, error = %e, "History backfill failed"),
        }
    }
}

async fn fetch_history(http: &reqwest::Client, url: &str) -> reqwest::Result<Vec<Sample>> {
    http.get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<Vec<Sample>>()
        .await
}

fn print_update(view: &DashboardView, applied: &Applied) {
    match applied {
        Applied::Initial { chains } => {
            println!(
                "snapshot: {} chain(s), ETH/USD ${:.2}",
                chains,
                view.quote_price().unwrap_or_default()
            );
            for chain in Chain::ALL {
                print_chain(view, chain);
            }
        }
        Applied::Sample(chain) => print_chain(view, *chain),
        Applied::Price(price) => println!("ETH/USD  ${price:.2}"),
        Applied::Ignored(_) => {}
    }
}

fn print_chain(view: &DashboardView, chain: Chain) {
    let Some(sample) = view.latest(chain) else {
        return;
    };
    let usd = view
        .transfer_cost(chain)
        .map(|c| format!("${:.4}", c.cost_in_quote_currency))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<9} {:>9.3} + {:>7.3} gwei  transfer {}",
        chain.as_str(),
        sample.base_fee,
        sample.priority_fee,
        usd
    );
}
