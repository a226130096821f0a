use configuration::TelegramConfig;
use core_types::CloseReason;
use events::EngineEvent;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::broadcast;

pub mod error;

pub use error::AlerterError;

/// The JSON payload for the Telegram `sendMessage` endpoint.
#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// A client for sending messages to the Telegram Bot API.
pub struct TelegramAlerter {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramAlerter {
    /// Creates a new `TelegramAlerter`.
    ///
    /// Returns `None` if alerting is disabled or the token/chat_id is
    /// missing, allowing the system to gracefully run without alerts.
    pub fn new(config: &TelegramConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        if config.token.is_empty() || config.chat_id.is_empty() {
            tracing::warn!("Telegram alerter is enabled but missing token or chat_id.");
            return None;
        }
        Some(Self {
            client: Client::new(),
            token: config.token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Sends a text message to the configured Telegram chat.
    pub async fn send_message(&self, message: &str) -> Result<(), AlerterError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);

        let payload = SendMessagePayload {
            chat_id: &self.chat_id,
            text: message,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to decode error response".to_string());
            return Err(AlerterError::ApiError(error_text));
        }

        Ok(())
    }
}

/// A long-running service that listens to the engine's broadcast channel and
/// sends Telegram alerts for the events an operator cares about.
///
/// Fire-and-forget: a failed send is logged and dropped, never propagated
/// back toward the engine.
pub async fn run_alerter_service(
    alerter: TelegramAlerter,
    mut event_rx: broadcast::Receiver<EngineEvent>,
) {
    tracing::info!("Alerter service started. Listening for engine events.");

    loop {
        match event_rx.recv().await {
            Ok(event) => {
                if let Some(message) = render_event(&event) {
                    if let Err(e) = alerter.send_message(&message).await {
                        tracing::error!(error = ?e, "Failed to send Telegram alert.");
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Alerter service lagged, skipped {} events.", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Event channel closed. Alerter service shutting down.");
                break;
            }
        }
    }
}

/// Maps an engine event to its alert text; `None` for events that do not
/// warrant a push notification.
fn render_event(event: &EngineEvent) -> Option<String> {
    match event {
        EngineEvent::Started { symbol, mode, .. } => Some(format!(
            "✅ *Meridian started* — {} \\({}\\)",
            escape_markdown(symbol),
            escape_markdown(mode)
        )),
        EngineEvent::Stopped { reason, .. } => {
            Some(format!("🛑 *Meridian stopped*: {}", escape_markdown(reason)))
        }
        EngineEvent::TradeOpened {
            symbol,
            side,
            size,
            price,
            zscore,
            ..
        } => Some(format!(
            "📥 *{} {}* `{}` @ `{}` \\(z\\={}\\)",
            side,
            escape_markdown(symbol),
            size,
            escape_markdown(&format!("{price:.2}")),
            escape_markdown(&format!("{zscore:.2}"))
        )),
        EngineEvent::TradeClosed { symbol, trade } => {
            let icon = if trade.is_win() { "🟢" } else { "🔴" };
            Some(format!(
                "{} *Closed {} {}* @ `{}` P\\&L `{}` \\({}\\)",
                icon,
                trade.side,
                escape_markdown(symbol),
                escape_markdown(&format!("{:.2}", trade.exit_price)),
                escape_markdown(&format!("{:+.2}", trade.realized_pnl)),
                escape_markdown(close_reason_label(trade.close_reason))
            ))
        }
        EngineEvent::BreakerTripped { reason, .. } => Some(format!(
            "🚨 *Circuit breaker*: {}",
            escape_markdown(reason)
        )),
        EngineEvent::BrokerDisconnected => Some("⚠️ *Broker disconnected*".to_string()),
        EngineEvent::BrokerReconnected => Some("✅ *Broker reconnected*".to_string()),
        EngineEvent::SessionClosed(summary) => Some(format!(
            "📊 *Daily summary {}*: {} trades, {}W/{}L, P\\&L `{}`",
            escape_markdown(&summary.date.to_string()),
            summary.trades,
            summary.wins,
            summary.losses,
            escape_markdown(&format!("{:+.2}", summary.pnl))
        )),
        // Suppressions are routine; they stay in the log and the store.
        EngineEvent::SignalSuppressed { .. } => None,
    }
}

fn close_reason_label(reason: CloseReason) -> &'static str {
    match reason {
        CloseReason::ZExit => "reversion exit",
        CloseReason::StopLoss => "stop loss",
        CloseReason::TakeProfit => "take profit",
        CloseReason::DurationCap => "duration cap",
        CloseReason::ForceFlatten => "forced flatten",
        CloseReason::RiskHalt => "risk halt",
    }
}

/// A helper function to escape characters that have special meaning in Telegram's MarkdownV2.
fn escape_markdown(text: &str) -> String {
    let special_chars = r"_*[]()~`>#+-=|{}.!";
    special_chars
        .chars()
        .fold(text.to_string(), |s, c| s.replace(c, &format!("\\{}", c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::{Side, Trade};

    #[test]
    fn disabled_config_builds_no_alerter() {
        let config = TelegramConfig {
            enabled: false,
            token: "t".to_string(),
            chat_id: "c".to_string(),
        };
        assert!(TelegramAlerter::new(&config).is_none());
    }

    #[test]
    fn missing_credentials_build_no_alerter() {
        let config = TelegramConfig {
            enabled: true,
            token: String::new(),
            chat_id: "c".to_string(),
        };
        assert!(TelegramAlerter::new(&config).is_none());
    }

    #[test]
    fn suppressed_signals_do_not_alert() {
        let event = EngineEvent::SignalSuppressed {
            kind: core_types::SignalKind::EnterLong,
            reason: "DAILY_LOSS".to_string(),
            time: Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
        };
        assert!(render_event(&event).is_none());
    }

    #[test]
    fn closed_trade_renders_pnl_and_reason() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
        let event = EngineEvent::TradeClosed {
            symbol: "MES".to_string(),
            trade: Trade {
                open_time: now,
                close_time: now,
                side: Side::Long,
                size: 1,
                entry_price: 4995.0,
                exit_price: 5000.0,
                realized_pnl: 25.0,
                z_on_entry: -2.2,
                z_on_exit: 0.1,
                close_reason: CloseReason::ZExit,
            },
        };
        let text = render_event(&event).unwrap();
        assert!(text.contains("reversion exit"));
        assert!(text.contains("25"));
    }

    #[test]
    fn markdown_special_characters_are_escaped() {
        assert_eq!(escape_markdown("a.b-c"), r"a\.b\-c");
    }
}
