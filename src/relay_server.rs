//! Local relay service
//!
//! Small HTTP front for the caregiver transports. It forwards Telegram
//! messages, places Twilio calls and texts, sends mail over SMTP, and serves
//! the notification journal.
//!
//! Every request the relay answers on a delivery route is journaled here, so
//! sessions do not journal the results their relay answered.

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use colored::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};

use crate::core::catalog::Catalog;
use crate::core::errors::ChannelError;
use crate::core::state::SettingsHandle;
use crate::io::channel::{ChannelId, ChannelResult};
use crate::io::journal::{Journal, JournalRecord};
use crate::io::telegram::TelegramChannel;
use crate::io::email::EmailRequest;
use crate::io::sms::SmsRequest;
use crate::io::smtp::{Mailer, SmtpMailer};
use crate::io::twilio::{call_script, test_script, TwilioClient, TEST_REQUEST};
use crate::io::voice::{is_e164, CallRequest, RelayAck};

pub struct RelayState {
    pub settings: SettingsHandle,
    pub catalog: Catalog,
    pub telegram: TelegramChannel,
    pub twilio: TwilioClient,
    pub mailer: Arc<dyn Mailer>,
    pub journal: Arc<Journal>,
}

impl RelayState {
    pub fn new(client: Client, settings: SettingsHandle, journal: Arc<Journal>) -> Self {
        Self {
            catalog: Catalog::standard(),
            telegram: TelegramChannel::new(client.clone(), settings.clone()),
            twilio: TwilioClient::new(client),
            mailer: Arc::new(SmtpMailer),
            settings,
            journal,
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    async fn record(&self, result: &ChannelResult, message: &str) {
        let record = JournalRecord::from_result(result, message, Utc::now());
        if let Err(e) = self.journal.append_all(vec![record]).await {
            eprintln!("⚠️ Relay journal write failed: {:#}", e);
        }
    }
}

/// Status code for a provider outcome.
fn status_for(result: &Result<String, ChannelError>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::OK,
        Err(ChannelError::Rejected(_)) => StatusCode::BAD_GATEWAY,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub type SharedState = Arc<RelayState>;

#[derive(Debug, Deserialize)]
pub struct SendTelegramRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub records: Vec<JournalRecord>,
}

// --- Handlers ---

async fn health_check() -> &'static str {
    "EyesTalk relay is running and healthy."
}

async fn send_telegram(
    State(state): State<SharedState>,
    Json(request): Json<SendTelegramRequest>,
) -> impl IntoResponse {
    let Some(message) = request.message.filter(|m| !m.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "Message is required" })),
        );
    };

    let started = Instant::now();
    let sent = state.telegram.send_text(&message).await;
    let result = ChannelResult::from_send(ChannelId::Telegram, sent, started.elapsed());
    state.record(&result, &message).await;

    if result.success {
        println!("{} /send-telegram delivered ({})", "📨".green(), result.detail);
        (StatusCode::OK, Json(json!({ "success": true, "detail": result.detail })))
    } else {
        eprintln!("{} /send-telegram failed: {}", "❌".red(), result.detail);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": result.detail })),
        )
    }
}

/// Refuses a request before any provider is involved, and journals it.
async fn refuse(
    state: &RelayState,
    channel: ChannelId,
    reason: String,
    message: &str,
) -> (StatusCode, Json<RelayAck>) {
    let result = ChannelResult::from_send(channel, Err(ChannelError::Rejected(reason.clone())), Duration::ZERO);
    state.record(&result, message).await;
    eprintln!("{} [{}] refused: {}", "❌".red(), channel, reason);
    (StatusCode::BAD_REQUEST, Json(RelayAck::failed(reason)))
}

fn invalid_phone(to: &str) -> String {
    format!("Invalid phone number {:?}: use E.164 with country code, e.g. +14155552671", to)
}

async fn make_call(State(state): State<SharedState>, Json(request): Json<CallRequest>) -> impl IntoResponse {
    let kind = request.request_type.as_str();
    let summary = format!("call {} ({})", kind, request.language);
    if !is_e164(&request.to) {
        return refuse(&state, ChannelId::Voice, invalid_phone(&request.to), &summary).await;
    }
    let twiml = if kind == TEST_REQUEST {
        test_script()
    } else {
        match state.catalog.find(kind) {
            Some(entry) => call_script(entry, request.language),
            None => return refuse(&state, ChannelId::Voice, format!("Unknown request type: {}", kind), &summary).await,
        }
    };

    let settings = state.settings.current();
    let started = Instant::now();
    let placed = state.twilio.place_call(&settings.relay, &request.to, &twiml).await;
    let status = status_for(&placed);
    let result = ChannelResult::from_send(ChannelId::Voice, placed, started.elapsed());
    state.record(&result, &summary).await;

    if result.success {
        println!("{} /make-call {} -> {}", "📞".green(), kind, result.detail);
        (status, Json(RelayAck::ok_call(result.detail)))
    } else {
        eprintln!("{} /make-call {} failed: {}", "❌".red(), kind, result.detail);
        (status, Json(RelayAck::failed(result.detail)))
    }
}

async fn send_sms(State(state): State<SharedState>, Json(request): Json<SmsRequest>) -> impl IntoResponse {
    if request.message.trim().is_empty() {
        return refuse(&state, ChannelId::Sms, "Message is required".to_string(), "").await;
    }
    if !is_e164(&request.to) {
        return refuse(&state, ChannelId::Sms, invalid_phone(&request.to), &request.message).await;
    }

    let settings = state.settings.current();
    let started = Instant::now();
    let sent = state.twilio.send_sms(&settings.relay, &request.to, &request.message).await;
    let status = status_for(&sent);
    let result = ChannelResult::from_send(ChannelId::Sms, sent, started.elapsed());
    state.record(&result, &request.message).await;

    if result.success {
        println!("{} /send-sms -> {}", "💬".green(), result.detail);
        (status, Json(RelayAck::ok_id(result.detail)))
    } else {
        eprintln!("{} /send-sms failed: {}", "❌".red(), result.detail);
        (status, Json(RelayAck::failed(result.detail)))
    }
}

async fn send_email(State(state): State<SharedState>, Json(request): Json<EmailRequest>) -> impl IntoResponse {
    if !request.to.contains('@') {
        let reason = format!("Invalid recipient {:?}", request.to);
        return refuse(&state, ChannelId::Email, reason, &request.text).await;
    }

    let settings = state.settings.current();
    let started = Instant::now();
    let sent = state.mailer.deliver(&settings.relay, &request).await;
    let status = status_for(&sent);
    let result = ChannelResult::from_send(ChannelId::Email, sent, started.elapsed());
    state.record(&result, &request.text).await;

    if result.success {
        println!("{} /send-email to {} ({})", "📧".green(), request.to, result.detail);
        (status, Json(RelayAck::ok_id(result.detail)))
    } else {
        eprintln!("{} /send-email failed: {}", "❌".red(), result.detail);
        (status, Json(RelayAck::failed(result.detail)))
    }
}

async fn get_logs(State(state): State<SharedState>, Query(query): Query<LogsQuery>) -> impl IntoResponse {
    let today = Utc::now().date_naive();
    let parse = |raw: Option<&str>| -> Result<NaiveDate> {
        match raw {
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("Invalid date: {}", raw)),
            None => Ok(today),
        }
    };
    let range = parse(query.from.as_deref()).and_then(|from| Ok((from, parse(query.to.as_deref())?)));
    let result = match range {
        Ok((from, to)) => state.journal.query_async(from, to).await.map(|records| (from, to, records)),
        Err(e) => Err(e),
    };

    match result {
        Ok((from, to, records)) => (
            StatusCode::OK,
            Json(serde_json::to_value(LogsResponse { from, to, records }).unwrap_or_default()),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": format!("{:#}", e) })),
        ),
    }
}

/// Build the relay router
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health_check))
        .route("/send-telegram", post(send_telegram))
        .route("/make-call", post(make_call))
        .route("/send-sms", post(send_sms))
        .route("/send-email", post(send_email))
        .route("/logs", get(get_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the relay server
pub async fn start_server(state: RelayState, port: u16) -> Result<()> {
    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind relay port {}", port))?;
    println!("🌐 EyesTalk relay listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}
