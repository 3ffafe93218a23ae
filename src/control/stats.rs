//! Stats reporter: `show stat` over the control socket.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::control::socket::{ControlSocket, SocketError};

/// One CSV row keyed by header field.
pub type StatRecord = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatsReport {
    Available { records: Vec<StatRecord> },
    Unavailable { reason: String },
}

impl StatsReport {
    pub fn is_available(&self) -> bool {
        matches!(self, StatsReport::Available { .. })
    }
}

/// Parse `show stat` output.
///
/// The first non-blank line is the header (the proxy prefixes it with `# `).
/// Empty header columns, including the one produced by the trailing comma, are
/// dropped along with their values.
pub fn parse_stat_csv(raw: &str) -> Vec<StatRecord> {
    let mut lines = raw.lines().map(str::trim).filter(|l| !l.is_empty());

    let header: Vec<&str> = match lines.next() {
        Some(first) => first
            .trim_start_matches('#')
            .trim_start()
            .split(',')
            .map(str::trim)
            .collect(),
        None => return Vec::new(),
    };

    lines
        .map(|line| {
            header
                .iter()
                .zip(line.split(','))
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect()
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct StatsReporter {
    socket: ControlSocket,
}

impl StatsReporter {
    pub fn new(socket: ControlSocket) -> Self {
        Self { socket }
    }

    pub fn socket_available(&self) -> bool {
        self.socket.exists()
    }

    /// Never fails; an unreachable proxy or an oversized reply yields
    /// `Unavailable`, so a partial trailing row is never reported.
    pub async fn report(&self) -> StatsReport {
        match self.socket.send("show stat").await {
            Ok(raw) => StatsReport::Available {
                records: parse_stat_csv(&raw),
            },
            Err(e @ SocketError::Truncated(_)) => {
                tracing::warn!(error = %e, "Stats reply exceeds response_limit_bytes");
                StatsReport::Unavailable {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stats unavailable");
                StatsReport::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }
}
