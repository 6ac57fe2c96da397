use eyestalk::core::catalog::Catalog;
use eyestalk::core::dispatcher::Dispatcher;
use eyestalk::core::feedback::Presenter;
use eyestalk::core::navigation::NavigationContext;
use eyestalk::core::session::{session_loop, Session};
use eyestalk::core::state::{Settings, SettingsHandle, SettingsStore, EYESTALK_DIR};
use eyestalk::io::channel::{build_channels, ChannelId};
use eyestalk::io::console::ConsolePresenter;
use eyestalk::io::input::{spawn_keyboard_reader, RawModeGuard};
use eyestalk::io::journal::{Journal, RecordStatus};
use eyestalk::io::speech::Speech;
use eyestalk::io::twilio::TEST_REQUEST;
use eyestalk::io::voice::{is_e164, VoiceRelayChannel};
use eyestalk::io::watcher::watch_settings;
use eyestalk::relay_server::{start_server, RelayState};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use colored::*;
use notify::RecommendedWatcher;
use reqwest::Client;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::from_filename(".env").ok();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => run_session().await,
        Some("init") => init_workspace(),
        Some("relay") => run_relay(args.get(1)).await,
        Some("logs") => print_logs(args.get(1)),
        Some("test-call") => test_call().await,
        Some("help" | "--help" | "-h") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("Unknown command: {}", other)
        }
    }
}

fn print_usage() {
    println!("{}", "EyesTalk: single-switch caregiver alerts".bold());
    println!("  eyestalk              interactive session");
    println!("  eyestalk init         create {}/config.toml", EYESTALK_DIR);
    println!("  eyestalk relay [port] run the local relay (default 3001)");
    println!("  eyestalk logs [days]  show recent notifications");
    println!("  eyestalk test-call    place a test call through the voice relay");
}

fn http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")
}

/// Settings plus a live store fed by the file watcher when there is a file.
fn live_settings() -> Result<(SettingsStore, Option<RecommendedWatcher>)> {
    let path = Settings::default_path();
    let store = SettingsStore::new(Settings::load(&path)?);
    let watcher = if path.exists() {
        match watch_settings(&path, store.clone()) {
            Ok(w) => Some(w),
            Err(e) => {
                eprintln!("{} Settings will not reload live: {:#}", "⚠️".yellow(), e);
                None
            }
        }
    } else {
        None
    };
    Ok((store, watcher))
}

fn open_journal(settings: &Settings) -> Result<Arc<Journal>> {
    let journal = Journal::open(&settings.journal_dir)?;
    match journal.prune(settings.retention_days, Utc::now().date_naive()) {
        Ok(0) => {}
        Ok(n) => println!("{} Pruned {} old journal day(s)", "🧹".blue(), n),
        Err(e) => eprintln!("{} Journal prune failed: {:#}", "⚠️".yellow(), e),
    }
    Ok(Arc::new(journal))
}

fn configuration_banner(missing: &[ChannelId]) {
    if missing.is_empty() {
        return;
    }
    let names: Vec<&str> = missing.iter().map(|c| c.as_str()).collect();
    println!(
        "{} {} {}",
        "⚙️".yellow(),
        "Configuration needed for:".yellow().bold(),
        names.join(", ")
    );
    println!(
        "   Edit {}/config.toml or set TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, CAREGIVER_PHONE, CAREGIVER_EMAIL.",
        EYESTALK_DIR
    );
}

async fn run_session() -> Result<()> {
    let (store, _watcher) = live_settings()?;
    let handle = store.subscribe();
    let settings = store.current();
    configuration_banner(&settings.missing_credentials());

    let journal = open_journal(&settings)?;
    let client = http_client()?;
    let channels = build_channels(&settings.channels, &client, &handle, Some(journal.clone()));

    let presenter: Arc<dyn Presenter> = Arc::new(ConsolePresenter::new(handle.clone(), Speech::detect()));
    let dispatcher = Dispatcher::new(
        channels,
        settings.policy,
        settings.timing(),
        presenter.clone(),
        handle.clone(),
        Some(journal),
    );
    let nav = NavigationContext::new(Arc::new(Catalog::standard()), settings.flow);
    let session = Session::new(nav, dispatcher, presenter, handle);

    println!(
        "{} flow={:?} policy={:?} channels={:?} locale={}",
        "🚀".green(),
        settings.flow,
        settings.policy,
        settings.channels,
        settings.locale
    );
    println!("   ↓ next   space/enter select   esc back   q quit");

    // Capacity one: the loop drains immediately, and anything beyond that is dropped.
    let (tx, rx) = mpsc::channel(1);
    let _raw = RawModeGuard::enable()?;
    let _reader = spawn_keyboard_reader(tx);
    session_loop(rx, session).await;
    Ok(())
}

fn init_workspace() -> Result<()> {
    let dir = Path::new(EYESTALK_DIR);
    let config_path = Settings::default_path();
    if config_path.exists() {
        println!("{}", "✅ EyesTalk is already set up in this directory.".green());
        return Ok(());
    }
    let settings = Settings::default();
    fs::create_dir_all(dir.join("journal"))?;
    settings.save(&config_path)?;

    let gitignore_path = Path::new(".gitignore");
    let mut gitignore = if gitignore_path.exists() {
        fs::read_to_string(gitignore_path)?
    } else {
        String::new()
    };
    if !gitignore.contains(EYESTALK_DIR) {
        gitignore.push_str(&format!("\n# EyesTalk settings and journal\n{}/\n", EYESTALK_DIR));
        fs::write(gitignore_path, gitignore)?;
    }
    println!("{} Wrote {}", "🧬".green(), config_path.display());
    configuration_banner(&settings.missing_credentials());
    Ok(())
}

async fn run_relay(port_arg: Option<&String>) -> Result<()> {
    let (store, _watcher) = live_settings()?;
    let settings = store.current();
    let port = match port_arg {
        Some(raw) => raw.parse().with_context(|| format!("Invalid port: {}", raw))?,
        None => settings.relay.port,
    };
    if settings.relay.twilio_account_sid.is_empty() {
        println!("{} Twilio is not configured; /make-call and /send-sms will fail.", "⚙️".yellow());
    }
    if settings.relay.smtp_username.is_empty() || settings.relay.smtp_password.is_empty() {
        println!("{} SMTP is not configured; /send-email will fail.", "⚙️".yellow());
    }
    let journal = open_journal(&settings)?;
    let state = RelayState::new(http_client()?, store.subscribe(), journal);
    start_server(state, port).await
}

fn print_logs(days_arg: Option<&String>) -> Result<()> {
    let days: u32 = match days_arg {
        Some(raw) => raw.parse().with_context(|| format!("Invalid day count: {}", raw))?,
        None => 1,
    };
    let settings = Settings::load(&Settings::default_path())?;
    let journal = Journal::open(&settings.journal_dir)?;
    let records = journal.recent(days)?;
    if records.is_empty() {
        println!("{} No notifications in the last {} day(s).", "📭".yellow(), days);
        return Ok(());
    }

    let offset = settings.utc_offset();
    for r in records {
        let status = match r.status {
            RecordStatus::Delivered => "delivered".green(),
            RecordStatus::Failed => "failed".red(),
        };
        let headline = r.message.lines().next().unwrap_or_default();
        println!(
            "{} [{}] {} {} ({})",
            r.timestamp.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S"),
            r.channel.bold(),
            status,
            headline,
            r.detail.dimmed()
        );
    }
    Ok(())
}

async fn test_call() -> Result<()> {
    let settings = Settings::load(&Settings::default_path())?;
    let phone = settings.voice.caregiver_phone.trim().to_string();
    if !is_e164(&phone) {
        bail!(
            "Caregiver phone {:?} is not in E.164 format. It must start with + and the country code, e.g. +14155552671",
            phone
        );
    }
    let locale = settings.locale;
    let channel = VoiceRelayChannel::new(http_client()?, SettingsHandle::fixed(settings));
    println!("{} Calling {} through the relay...", "📞".cyan(), phone);
    match channel.call(TEST_REQUEST, locale).await {
        Ok(sid) => {
            println!("{} Test call placed ({})", "✅".green(), sid);
            Ok(())
        }
        Err(e) => bail!("Test call failed: {}", e),
    }
}
