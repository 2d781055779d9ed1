//! Push-channel client used by the `gaswatch-tail` binary.

pub mod reconnect;
pub mod view;

pub use reconnect::ReconnectPolicy;
pub use view::{Applied, DashboardView};

/// `http://host:port` → `ws://host:port/ws` (https → wss).
pub fn ws_url(http_base: &str) -> String {
    let base = http_base.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{base}")
    };
    format!("{ws}/ws")
}
