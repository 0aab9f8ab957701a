//! Telegram command listener
//!
//! Long-polls `getUpdates`, keeps only messages from the configured chat and
//! forwards recognised commands to the trading loop over an mpsc channel.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{Credentials, TelegramConfig};

/// Commands the trading loop understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Status,
    Balance,
    Positions,
    Scores,
    Pause,
    Resume,
    Help,
}

pub const HELP_TEXT: &str = "🤖 <b>Comandos IOL Bot</b>\n\n\
/status - Estado del bot y últimas notificaciones\n\
/balance - Saldo disponible\n\
/positions - Posiciones abiertas\n\
/scores - Últimos scores por símbolo\n\
/pause - Pausar operaciones\n\
/resume - Reanudar operaciones\n\
/help - Esta ayuda";

/// Parse `/cmd@botname args` into a command (Spanish aliases accepted)
pub fn parse_command(text: &str) -> Option<BotCommand> {
    let text = text.trim();
    let body = text.strip_prefix('/')?;
    let word = body.split_whitespace().next()?;
    let cmd = word.split('@').next().unwrap_or(word).to_lowercase();
    match cmd.as_str() {
        "status" | "estado" => Some(BotCommand::Status),
        "balance" | "saldo" => Some(BotCommand::Balance),
        "positions" | "pos" | "posiciones" => Some(BotCommand::Positions),
        "scores" | "puntajes" => Some(BotCommand::Scores),
        "pause" | "pausa" | "pausar" => Some(BotCommand::Pause),
        "resume" | "reanudar" => Some(BotCommand::Resume),
        "start" | "help" | "ayuda" => Some(BotCommand::Help),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

pub struct TelegramCommands {
    http: Client,
    api_url: String,
    token: String,
    chat_id: String,
    poll_timeout_secs: u64,
    offset: i64,
    command_tx: mpsc::Sender<BotCommand>,
}

impl TelegramCommands {
    /// `None` when commands are disabled or credentials are missing
    pub fn new(
        config: &TelegramConfig,
        creds: &Credentials,
        command_tx: mpsc::Sender<BotCommand>,
    ) -> Result<Option<Self>> {
        if !config.enabled || !config.commands_enabled {
            return Ok(None);
        }
        let (Some(token), Some(chat_id)) = (creds.telegram_token.clone(), creds.telegram_chat_id.clone()) else {
            return Ok(None);
        };
        let http = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Some(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            chat_id,
            poll_timeout_secs: config.poll_timeout_secs,
            offset: 0,
            command_tx,
        }))
    }

    async fn poll_updates(&self) -> Result<Vec<TelegramUpdate>> {
        let url = format!("{}/bot{}/getUpdates", self.api_url, self.token);
        let response: GetUpdatesResponse = self
            .http
            .get(&url)
            .query(&[
                ("offset", self.offset.to_string()),
                ("timeout", self.poll_timeout_secs.to_string()),
            ])
            .send()
            .await
            .context("getUpdates request failed")?
            .json()
            .await
            .context("getUpdates decode failed")?;
        if !response.ok {
            anyhow::bail!("getUpdates returned ok=false");
        }
        Ok(response.result)
    }

    /// Commands in `updates` that come from our chat; advances the offset
    fn accept(&mut self, updates: Vec<TelegramUpdate>) -> Vec<BotCommand> {
        let mut commands = Vec::new();
        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);
            let Some(msg) = update.message else { continue };
            if msg.chat.id.to_string() != self.chat_id {
                warn!(chat_id = msg.chat.id, "⚠️ Mensaje de chat no autorizado ignorado");
                continue;
            }
            let Some(text) = msg.text else { continue };
            match parse_command(&text) {
                Some(cmd) => commands.push(cmd),
                None => debug!(text = %text, "Mensaje sin comando"),
            }
        }
        commands
    }

    /// Poll until the receiving side of the channel is dropped
    pub async fn start_polling(mut self) {
        info!("📱 Telegram command listener started");
        loop {
            match self.poll_updates().await {
                Ok(updates) => {
                    for cmd in self.accept(updates) {
                        info!(command = ?cmd, "📱 Comando recibido");
                        if self.command_tx.send(cmd).await.is_err() {
                            info!("📱 Telegram listener stopped");
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to poll Telegram updates");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
            if self.command_tx.is_closed() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(parse_command("/status"), Some(BotCommand::Status));
        assert_eq!(parse_command("/estado"), Some(BotCommand::Status));
        assert_eq!(parse_command("/ayuda"), Some(BotCommand::Help));
        assert_eq!(parse_command("/Pause@iol_bot now"), Some(BotCommand::Pause));
        assert_eq!(parse_command("  /positions "), Some(BotCommand::Positions));
        assert_eq!(parse_command("status"), None);
        assert_eq!(parse_command("/comprar GGAL"), None);
        assert_eq!(parse_command("/"), None);
    }

    #[test]
    fn accepts_only_configured_chat() {
        let (tx, _rx) = mpsc::channel(4);
        let creds = Credentials {
            telegram_token: Some("token".to_string()),
            telegram_chat_id: Some("42".to_string()),
            ..Default::default()
        };
        let mut listener = TelegramCommands::new(&TelegramConfig::default(), &creds, tx)
            .unwrap()
            .unwrap();
        let raw = r#"{"ok":true,"result":[
            {"update_id":10,"message":{"chat":{"id":42},"text":"/balance"}},
            {"update_id":11,"message":{"chat":{"id":7},"text":"/pause"}},
            {"update_id":12,"message":{"chat":{"id":42},"text":"hola"}},
            {"update_id":13}
        ]}"#;
        let response: GetUpdatesResponse = serde_json::from_str(raw).unwrap();
        let cmds = listener.accept(response.result);
        assert_eq!(cmds, vec![BotCommand::Balance]);
        assert_eq!(listener.offset, 14);
    }

    #[test]
    fn disabled_without_credentials() {
        let (tx, _rx) = mpsc::channel(1);
        let listener = TelegramCommands::new(&TelegramConfig::default(), &Credentials::default(), tx).unwrap();
        assert!(listener.is_none());
    }
}
