//! Telegram Bot API transport.
//!
//! [`TelegramTransport`] implements [`Transport`] on top of the Bot API's
//! `sendMessage`, `setMyCommands` and `answerCallbackQuery` methods.
//! [`TelegramPoller`] long-polls `getUpdates` and forwards messages and
//! callback presses as [`InboundEvent`]s.
//!
//! A blocked bot gets error code 403 from `sendMessage`; that is the only
//! error classified as "recipient unreachable".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use metabot_scenario::MenuItem;

use crate::error::{AdapterError, Result};
use crate::traits::{InboundEvent, Sender, Transport};

/// Telegram Bot API base URL.  All method calls are POSTed to
/// `{BASE_URL}{bot_token}/{method}`.
const TELEGRAM_API_BASE: &str = "https://api.telegram.org/bot";

/// Error code Telegram returns when the user blocked the bot or the chat is
/// otherwise forbidden.
const FORBIDDEN: i64 = 403;

/// Delay before polling again after a failed `getUpdates`.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Telegram Bot API client.
pub struct TelegramTransport {
    /// Bot token from [@BotFather](https://t.me/BotFather).
    bot_token: String,
    /// `parse_mode` sent with every message (e.g. `Markdown`).
    parse_mode: Option<String>,
    /// HTTP client for making requests.
    http: reqwest::Client,
}

impl TelegramTransport {
    /// Create a transport for `bot_token`.
    pub fn new(bot_token: impl Into<String>) -> Result<Self> {
        let bot_token = bot_token.into().trim().to_string();
        if bot_token.is_empty() {
            return Err(AdapterError::AuthRequired {
                transport: "telegram".into(),
            });
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("Metabot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AdapterError::Http {
                method: "client".into(),
                source: e,
            })?;

        Ok(Self {
            bot_token,
            parse_mode: Some("Markdown".into()),
            http,
        })
    }

    /// Override the message parse mode; `None` sends plain text.
    pub fn with_parse_mode(mut self, parse_mode: Option<String>) -> Self {
        self.parse_mode = parse_mode;
        self
    }

    /// Build a full Telegram Bot API URL for the given method.
    fn api_url(&self, method: &str) -> String {
        format!("{TELEGRAM_API_BASE}{}/{method}", self.bot_token)
    }

    /// POST `body` to `method` and return the `result` field.
    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| AdapterError::Http {
                method: method.to_string(),
                // The URL embeds the bot token.
                source: e.without_url(),
            })?;

        let json_resp: Value = response.json().await.map_err(|e| AdapterError::InvalidResponse {
            method: method.to_string(),
            reason: e.without_url().to_string(),
        })?;

        parse_telegram_response(&json_resp, method)?;
        Ok(json_resp.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Verify the token and return the bot's username.
    pub async fn get_me(&self) -> Result<String> {
        let me = self.call("getMe", &json!({})).await?;
        me.get("username")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AdapterError::InvalidResponse {
                method: "getMe".into(),
                reason: "missing `username`".into(),
            })
    }

    /// Fetch updates after `offset`, waiting up to `timeout` seconds.
    pub async fn get_updates(&self, offset: i64, timeout: u64) -> Result<Vec<Value>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout,
            "allowed_updates": ["message", "callback_query"],
        });
        match self.call("getUpdates", &body).await? {
            Value::Array(updates) => Ok(updates),
            other => Err(AdapterError::InvalidResponse {
                method: "getUpdates".into(),
                reason: format!("expected an array, got {other}"),
            }),
        }
    }
}

/// Check the `ok` field of a Bot API response.
///
/// Telegram responses follow the format:
/// `{ "ok": true, "result": {...} }` on success, or
/// `{ "ok": false, "error_code": 403, "description": "..." }` on failure.
pub fn parse_telegram_response(response: &Value, method: &str) -> Result<()> {
    let ok = response.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if ok {
        return Ok(());
    }

    let code = response
        .get("error_code")
        .and_then(Value::as_i64)
        .unwrap_or(-1);
    let description = response
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Err(AdapterError::Api {
        method: method.to_string(),
        code,
        description: description.to_string(),
    })
}

/// Build the `sendMessage` request body.
fn message_body(
    chat_id: &str,
    text: &str,
    buttons: Option<&[String]>,
    parse_mode: Option<&str>,
) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": text,
    });
    if let Some(mode) = parse_mode {
        body["parse_mode"] = json!(mode);
    }
    match buttons {
        Some([]) => body["reply_markup"] = json!({ "remove_keyboard": true }),
        Some(labels) => {
            body["reply_markup"] = json!({
                "keyboard": [labels],
                "resize_keyboard": true,
            });
        }
        None => {}
    }
    body
}

/// Convert the scenario menu to Bot API commands.  Telegram wants bare
/// command names without the leading slash.
fn bot_commands(menu: &[MenuItem]) -> Value {
    let commands: Vec<Value> = menu
        .iter()
        .map(|item| {
            json!({
                "command": item.command.trim_start_matches('/'),
                "description": item.description,
            })
        })
        .collect();
    json!({ "commands": commands })
}

#[async_trait]
impl Transport for TelegramTransport {
    fn id(&self) -> &str {
        "telegram"
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        buttons: Option<&[String]>,
    ) -> Result<()> {
        debug!(chat_id, buttons = buttons.map_or(0, <[String]>::len), "sending Telegram message");
        let body = message_body(chat_id, text, buttons, self.parse_mode.as_deref());
        self.call("sendMessage", &body).await?;
        Ok(())
    }

    async fn set_commands(&self, menu: &[MenuItem]) -> Result<()> {
        info!(commands = menu.len(), "registering Telegram command menu");
        self.call("setMyCommands", &bot_commands(menu)).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.call(
            "answerCallbackQuery",
            &json!({ "callback_query_id": callback_id }),
        )
        .await?;
        Ok(())
    }

    fn is_recipient_unreachable(&self, error: &AdapterError) -> bool {
        matches!(error, AdapterError::Api { code, .. } if *code == FORBIDDEN)
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Long-polling loop that turns Telegram updates into [`InboundEvent`]s.
pub struct TelegramPoller {
    transport: Arc<TelegramTransport>,
    timeout: u64,
    offset: i64,
}

impl TelegramPoller {
    /// Create a poller with the given long-poll timeout in seconds.
    pub fn new(transport: Arc<TelegramTransport>, timeout: u64) -> Self {
        Self {
            transport,
            timeout,
            offset: 0,
        }
    }

    /// Run the loop in a background task until the receiver is dropped or
    /// the task is aborted.
    pub fn spawn(mut self, tx: mpsc::Sender<InboundEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(timeout = self.timeout, "Telegram poller started");
            loop {
                let updates = match self.transport.get_updates(self.offset, self.timeout).await {
                    Ok(updates) => updates,
                    Err(e) => {
                        warn!(error = %e, "Telegram poll failed, retrying");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                for update in &updates {
                    if let Some(id) = update.get("update_id").and_then(Value::as_i64) {
                        self.offset = self.offset.max(id + 1);
                    }
                    let Some(event) = parse_update(update) else {
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        info!("event receiver closed, Telegram poller stopping");
                        return;
                    }
                }
            }
        })
    }
}

/// Extract an [`InboundEvent`] from a raw update.  Updates without text
/// (stickers, photos, joins) are ignored.
pub fn parse_update(update: &Value) -> Option<InboundEvent> {
    if let Some(cb) = update.get("callback_query") {
        let chat_id = cb.pointer("/message/chat/id").and_then(Value::as_i64)?;
        return Some(InboundEvent::Callback {
            chat_id: chat_id.to_string(),
            callback_id: cb.get("id").and_then(Value::as_str)?.to_string(),
            data: cb.get("data").and_then(Value::as_str).unwrap_or("").to_string(),
            sender: parse_sender(cb.get("from")),
        });
    }

    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;
    let chat_id = message.pointer("/chat/id").and_then(Value::as_i64)?;
    Some(InboundEvent::Message {
        chat_id: chat_id.to_string(),
        text: text.to_string(),
        sender: parse_sender(message.get("from")),
    })
}

fn parse_sender(from: Option<&Value>) -> Sender {
    from.and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> TelegramTransport {
        TelegramTransport::new("123456:ABC-DEF").unwrap()
    }

    #[test]
    fn empty_token_requires_auth() {
        let err = TelegramTransport::new("  ").err().unwrap();
        assert!(matches!(err, AdapterError::AuthRequired { .. }));
    }

    #[test]
    fn api_url_constructs_correct_url() {
        assert_eq!(
            transport().api_url("sendMessage"),
            "https://api.telegram.org/bot123456:ABC-DEF/sendMessage"
        );
    }

    #[test]
    fn parse_telegram_response_succeeds_on_ok_true() {
        let resp = json!({ "ok": true, "result": { "message_id": 42 } });
        assert!(parse_telegram_response(&resp, "sendMessage").is_ok());
    }

    #[test]
    fn parse_telegram_response_fails_on_ok_false() {
        let resp = json!({ "ok": false, "error_code": 401, "description": "Unauthorized" });
        let err = parse_telegram_response(&resp, "sendMessage").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("Unauthorized"));
    }

    #[test]
    fn parse_telegram_response_fails_on_missing_ok() {
        assert!(parse_telegram_response(&json!({}), "getMe").is_err());
    }

    #[test]
    fn forbidden_is_unreachable() {
        let t = transport();
        let blocked = AdapterError::Api {
            method: "sendMessage".into(),
            code: 403,
            description: "Forbidden: bot was blocked by the user".into(),
        };
        let flood = AdapterError::Api {
            method: "sendMessage".into(),
            code: 429,
            description: "Too Many Requests".into(),
        };
        assert!(t.is_recipient_unreachable(&blocked));
        assert!(!t.is_recipient_unreachable(&flood));
    }

    #[test]
    fn message_body_with_buttons() {
        let buttons = vec!["Yes".to_string(), "No".to_string()];
        let body = message_body("42", "Hi", Some(&buttons), Some("Markdown"));
        assert_eq!(body["parse_mode"], "Markdown");
        assert_eq!(body["reply_markup"]["keyboard"], json!([["Yes", "No"]]));
        assert_eq!(body["reply_markup"]["resize_keyboard"], true);
    }

    #[test]
    fn message_body_without_buttons() {
        let body = message_body("42", "Hi", None, None);
        assert!(body.get("reply_markup").is_none());
        assert!(body.get("parse_mode").is_none());

        let cleared = message_body("42", "Hi", Some(&[]), None);
        assert_eq!(cleared["reply_markup"]["remove_keyboard"], true);
    }

    #[test]
    fn bot_commands_strip_slash() {
        let menu = vec![MenuItem {
            command: "/restart".into(),
            description: "Start over".into(),
        }];
        let body = bot_commands(&menu);
        assert_eq!(body["commands"][0]["command"], "restart");
        assert_eq!(body["commands"][0]["description"], "Start over");
    }

    #[test]
    fn parse_text_message_update() {
        let update = json!({
            "update_id": 10,
            "message": {
                "text": "/start promo",
                "chat": { "id": 555 },
                "from": { "id": 7, "is_bot": false, "first_name": "Ann", "language_code": "en" }
            }
        });
        match parse_update(&update).unwrap() {
            InboundEvent::Message { chat_id, text, sender } => {
                assert_eq!(chat_id, "555");
                assert_eq!(text, "/start promo");
                assert_eq!(sender.id, 7);
                assert_eq!(sender.first_name, "Ann");
                assert_eq!(sender.language_code.as_deref(), Some("en"));
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn parse_callback_update() {
        let update = json!({
            "update_id": 11,
            "callback_query": {
                "id": "cb-1",
                "data": "Yes",
                "from": { "id": 7, "first_name": "Ann" },
                "message": { "chat": { "id": -100 } }
            }
        });
        let event = parse_update(&update).unwrap();
        assert_eq!(event.chat_id(), "-100");
        assert!(matches!(event, InboundEvent::Callback { ref data, .. } if data == "Yes"));
    }

    #[test]
    fn non_text_updates_are_ignored() {
        let update = json!({
            "update_id": 12,
            "message": { "chat": { "id": 1 }, "sticker": {} }
        });
        assert!(parse_update(&update).is_none());
    }
}
