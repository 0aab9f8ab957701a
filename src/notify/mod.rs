//! Telegram notifications
//!
//! Every message is recorded in a bounded in-memory history, delivered or
//! not. Without a token and chat id the notifier only logs.

pub mod commands;

pub use commands::{parse_command, BotCommand, TelegramCommands, HELP_TEXT};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Credentials, TelegramConfig};
use crate::execution::ExecutionMode;
use crate::scoring::Analysis;
use crate::types::{Action, ClosedTrade, TradePlan};

const HISTORY_CAP: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "LOW"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::High => write!(f, "HIGH"),
            Priority::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub timestamp: DateTime<Utc>,
    pub priority: Priority,
    pub text: String,
    pub delivered: bool,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Escape text for Telegram's HTML parse mode
pub fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub struct Notifier {
    http: Client,
    api_url: String,
    token: Option<String>,
    chat_id: Option<String>,
    history: Mutex<VecDeque<Notification>>,
}

impl Notifier {
    pub fn new(config: &TelegramConfig, creds: &Credentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        let (token, chat_id) = if config.enabled {
            (creds.telegram_token.clone(), creds.telegram_chat_id.clone())
        } else {
            (None, None)
        };
        if config.enabled && (token.is_none() || chat_id.is_none()) {
            warn!("⚠️ Telegram sin TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID, notificaciones solo en log");
        }
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            chat_id,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAP)),
        })
    }

    /// Log-only notifier
    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            api_url: String::new(),
            token: None,
            chat_id: None,
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some() && self.chat_id.is_some()
    }

    fn record(&self, priority: Priority, text: &str, delivered: bool) {
        if let Ok(mut history) = self.history.lock() {
            if history.len() == HISTORY_CAP {
                history.pop_front();
            }
            history.push_back(Notification {
                timestamp: Utc::now(),
                priority,
                text: text.to_string(),
                delivered,
            });
        }
    }

    /// Last `n` notifications, oldest first
    pub fn recent(&self, n: usize) -> Vec<Notification> {
        self.history
            .lock()
            .map(|h| h.iter().skip(h.len().saturating_sub(n)).cloned().collect())
            .unwrap_or_default()
    }

    async fn deliver(&self, token: &str, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, token);
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Telegram sendMessage request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage HTTP {}: {}", status, body);
        }
        Ok(())
    }

    /// Send an HTML message. Returns whether Telegram accepted it.
    pub async fn send(&self, text: &str, priority: Priority) -> bool {
        let delivered = match (&self.token, &self.chat_id) {
            (Some(token), Some(chat_id)) => match self.deliver(token, chat_id, text).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, priority = %priority, "⚠️ Telegram notification failed");
                    false
                }
            },
            _ => {
                info!(priority = %priority, "📨 {}", text);
                false
            }
        };
        self.record(priority, text, delivered);
        delivered
    }

    pub async fn trade_opened(&self, symbol: &str, quantity: u64, price: f64, plan: &TradePlan, mode: ExecutionMode) -> bool {
        let text = format!(
            "🟢 <b>COMPRA {}</b> [{}]\n\n\
            Cantidad: <code>{}</code> @ <code>${:.2}</code>\n\
            Total: <code>${:.2}</code>\n\
            Stop: <code>${:.2}</code> | TP: <code>${:.2}</code>\n\
            Score: <code>{}</code> ({})",
            html_escape(symbol),
            mode,
            quantity,
            price,
            price * quantity as f64,
            plan.stop_loss,
            plan.take_profit,
            plan.score,
            html_escape(&plan.supporting_strategies.join(", "))
        );
        self.send(&text, Priority::High).await
    }

    pub async fn trade_closed(&self, trade: &ClosedTrade, mode: ExecutionMode) -> bool {
        let emoji = if trade.is_win() { "✅" } else { "❌" };
        let text = format!(
            "{} <b>VENTA {}</b> [{}] ({})\n\n\
            Cantidad: <code>{}</code>\n\
            Entrada: <code>${:.2}</code> → Salida: <code>${:.2}</code>\n\
            P&amp;L: <code>${:+.2}</code> (<code>{:+.2}%</code>)\n\
            Comisiones: <code>${:.2}</code>",
            emoji,
            html_escape(&trade.symbol),
            mode,
            trade.reason,
            trade.quantity,
            trade.entry_price,
            trade.exit_price,
            trade.pnl,
            trade.pnl_pct * 100.0,
            trade.fees
        );
        self.send(&text, Priority::High).await
    }

    pub async fn signal(&self, analysis: &Analysis) -> bool {
        let factors = if analysis.action == Action::Buy {
            &analysis.buy_factors
        } else {
            &analysis.sell_factors
        };
        let text = format!(
            "📡 <b>Señal {} {}</b> ({})\n\
            Precio: <code>${:.2}</code> | Score: <code>{}</code> | Régimen: {}\n\
            {}",
            analysis.action,
            html_escape(&analysis.symbol),
            analysis.confidence,
            analysis.price,
            analysis.score,
            analysis.regime,
            html_escape(&factors.iter().take(5).cloned().collect::<Vec<_>>().join("\n"))
        );
        self.send(&text, Priority::Medium).await
    }

    pub async fn trailing_activated(&self, symbol: &str, stop: f64) -> bool {
        let text = format!(
            "🎯 <b>Trailing stop activado</b> {}\nStop: <code>${:.2}</code>",
            html_escape(symbol),
            stop
        );
        self.send(&text, Priority::Medium).await
    }

    pub async fn trailing_hit(&self, symbol: &str, stop: f64, price: f64) -> bool {
        let text = format!(
            "🛑 <b>Trailing stop alcanzado</b> {}\nStop: <code>${:.2}</code> | Precio: <code>${:.2}</code>",
            html_escape(symbol),
            stop,
            price
        );
        self.send(&text, Priority::High).await
    }

    pub async fn error(&self, context: &str, message: &str) -> bool {
        let text = format!(
            "🚨 <b>Error: {}</b>\n<code>{}</code>",
            html_escape(context),
            html_escape(message)
        );
        self.send(&text, Priority::Critical).await
    }

    pub async fn daily_summary(&self, body: &str) -> bool {
        let text = format!("📊 <b>Resumen diario</b>\n\n{}", html_escape(body));
        self.send(&text, Priority::Low).await
    }
}
