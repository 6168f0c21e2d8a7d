//! xpulse - rate-limit aware X client
//!
//! Every subcommand prints JSON (lookups, listings, metrics) or a short
//! status line (actions) on stdout. Logs and errors go to stderr.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use libxpulse::logging::{LogFormat, LoggingConfig};
use libxpulse::schedule_time::parse_schedule_time;
use libxpulse::{
    client, AuthMode, Config, ScheduleRequest, ScheduledStatus, SchedulerClient, XpulseClient,
    XpulseError,
};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "xpulse")]
#[command(version)]
#[command(about = "Rate-limit aware X client: post, read, measure and schedule")]
#[command(long_about = "\
xpulse - rate-limit aware X client

DESCRIPTION:
    xpulse reads and writes X posts through the v2 API. Calls that hit a
    rate limit are retried with backoff (or until the server's reset time),
    and endpoints known to be exhausted are waited out before calling again.

CREDENTIALS:
    X_ACCESS_TOKEN      OAuth 2.0 user-context token (reads and writes)
    X_BEARER_TOKEN      App-only bearer token (reads only)

    A .env file in the working directory is loaded if present.

SCHEDULING:
    XPULSE_SCHEDULER_URL        Base URL of the scheduling service
    XPULSE_SCHEDULER_API_KEY    API key for the scheduling service

CONFIGURATION:
    Configuration file: ~/.config/xpulse/config.toml (or $XPULSE_CONFIG)

    [rate_limit]
    max_retries = 3
    base_delay_ms = 15000

EXIT CODES:
    0 - Success
    1 - API or runtime error
    2 - Configuration or authentication error
    3 - Invalid input
    130 - Interrupted (Ctrl-C) or a rate-limit wait was cancelled
")]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the authenticated account
    Profile,

    /// Look up a user by username
    User { username: String },

    /// Look up a single post
    Tweet { id: String },

    /// Recent posts of a user
    Timeline {
        username: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Recent posts of a list
    List {
        list_id: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Search posts from the last seven days
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Maximum number of result pages to fetch
        #[arg(short, long, default_value_t = 1)]
        pages: usize,
    },

    /// Publish a post
    Post { text: String },

    /// Reply to a post
    Reply { id: String, text: String },

    /// Publish a thread, one argument per post
    Thread {
        #[arg(required = true)]
        texts: Vec<String>,
        /// Pause between posts (overrides config)
        #[arg(long, value_name = "MS")]
        delay_ms: Option<u64>,
    },

    /// Delete one of your posts
    Delete { id: String },

    Like { id: String },
    Unlike { id: String },
    Repost { id: String },
    Unrepost { id: String },
    Follow { username: String },
    Unfollow { username: String },

    /// Bookmark rate and rating of a post
    Metrics { id: String },

    /// Bookmark-rate pulse check over recent posts
    Pulse {
        /// Account to check (default: the authenticated account)
        username: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        count: usize,
    },

    /// Hand posts to the scheduling service
    Schedule {
        #[arg(required = true)]
        texts: Vec<String>,
        /// When to publish: "2h", "tomorrow 9am", or an RFC 3339 time
        #[arg(long)]
        at: String,
        /// Publish the posts as a single thread
        #[arg(long)]
        thread: bool,
    },

    /// List posts held by the scheduling service
    Scheduled {
        /// Filter: pending, posted, failed or cancelled
        #[arg(long)]
        status: Option<String>,
    },

    /// Cancel a scheduled post
    CancelScheduled { id: String },

    /// Check credentials and connectivity
    Selftest,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    let cancel = CancellationToken::new();
    let outcome = match setup_signal_handlers(cancel.clone()) {
        Ok(()) => {
            tokio::select! {
                biased;
                result = run(cli, cancel.clone()) => result,
                _ = cancel.cancelled() => {
                    eprintln!("Interrupted");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        }
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        let code = e
            .downcast_ref::<XpulseError>()
            .map(XpulseError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

/// Same code a cancelled rate-limit wait reports
const INTERRUPTED_EXIT_CODE: i32 = 130;

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let config = Config::load()?;

    let x_client = || -> Result<XpulseClient> {
        Ok(XpulseClient::from_config(&config)?.with_cancellation(cancel.clone()))
    };

    match cli.command {
        Command::Profile => print_json(&x_client()?.me().await?),
        Command::User { username } => print_json(&x_client()?.user(&username).await?),
        Command::Tweet { id } => print_json(&x_client()?.tweet(&id).await?),
        Command::Timeline { username, limit } => {
            print_json(&x_client()?.timeline(&username, limit).await?)
        }
        Command::List { list_id, limit } => {
            print_json(&x_client()?.list_tweets(&list_id, limit).await?)
        }
        Command::Search {
            query,
            limit,
            pages,
        } => print_json(&x_client()?.search(&query, limit, pages).await?),
        Command::Post { text } => {
            let posted = x_client()?.post(&text).await?;
            println!("Posted {}", posted.id);
            Ok(())
        }
        Command::Reply { id, text } => {
            let posted = x_client()?.reply(&id, &text).await?;
            println!("Replied {} -> {}", posted.id, id);
            Ok(())
        }
        Command::Thread { texts, delay_ms } => {
            let mut client = x_client()?;
            if let Some(ms) = delay_ms {
                client = client.with_thread_delay(Duration::from_millis(ms));
            }
            for tweet in client.post_thread(&texts).await? {
                println!("{}", tweet.id);
            }
            Ok(())
        }
        Command::Delete { id } => {
            let done = x_client()?.delete(&id).await?;
            status_line(done, "Deleted", "Not deleted", &id)
        }
        Command::Like { id } => {
            let done = x_client()?.like(&id).await?;
            status_line(done, "Liked", "Not liked", &id)
        }
        Command::Unlike { id } => {
            let done = x_client()?.unlike(&id).await?;
            status_line(done, "Unliked", "Still liked", &id)
        }
        Command::Repost { id } => {
            let done = x_client()?.repost(&id).await?;
            status_line(done, "Reposted", "Not reposted", &id)
        }
        Command::Unrepost { id } => {
            let done = x_client()?.unrepost(&id).await?;
            status_line(done, "Unreposted", "Still reposted", &id)
        }
        Command::Follow { username } => {
            let done = x_client()?.follow(&username).await?;
            status_line(done, "Following", "Not following", &username)
        }
        Command::Unfollow { username } => {
            let done = x_client()?.unfollow(&username).await?;
            status_line(done, "Unfollowed", "Still following", &username)
        }
        Command::Metrics { id } => print_json(&x_client()?.metrics(&id).await?),
        Command::Pulse { username, count } => {
            print_json(&x_client()?.pulse(username.as_deref(), count).await?)
        }
        Command::Schedule { texts, at, thread } => schedule(&config, &texts, &at, thread).await,
        Command::Scheduled { status } => {
            let status = status
                .map(|s| s.parse::<ScheduledStatus>())
                .transpose()?;
            let posts = SchedulerClient::from_config(&config)?
                .list_posts(status)
                .await?;
            print_json(&posts)
        }
        Command::CancelScheduled { id } => {
            let result = SchedulerClient::from_config(&config)?.cancel(&id).await?;
            print_json(&result)
        }
        Command::Selftest => selftest(&config, cancel.clone()).await,
    }
}

async fn schedule(config: &Config, texts: &[String], at: &str, thread: bool) -> Result<()> {
    let scheduled_at = parse_schedule_time(at, Utc::now())?;
    for text in texts {
        client::validate_text(text)?;
    }
    let scheduler = SchedulerClient::from_config(config)?;
    debug!(posts = texts.len(), thread, at = %scheduled_at, "Scheduling");

    let posts = if thread {
        scheduler.schedule_thread(texts, scheduled_at).await?
    } else if let [text] = texts {
        vec![
            scheduler
                .schedule(&ScheduleRequest {
                    text: text.clone(),
                    scheduled_at,
                    reply_to: None,
                })
                .await?,
        ]
    } else {
        let requests: Vec<ScheduleRequest> = texts
            .iter()
            .map(|text| ScheduleRequest {
                text: text.clone(),
                scheduled_at,
                reply_to: None,
            })
            .collect();
        scheduler.schedule_batch(&requests).await?
    };

    print_json(&posts)
}

#[derive(Debug, Serialize)]
struct SelftestReport {
    auth_mode: AuthMode,
    x_api: String,
    scheduler: String,
}

/// Probe the X API (and the scheduler when configured); fails if any probe fails
async fn selftest(config: &Config, cancel: CancellationToken) -> Result<()> {
    let client = XpulseClient::from_config(config)?.with_cancellation(cancel);

    let probe = match client.auth_mode() {
        AuthMode::User => client.me().await.map(|me| format!("ok (@{})", me.username)),
        AuthMode::AppOnly => client.user("X").await.map(|_| "ok (app-only)".to_string()),
    };
    let mut failed = probe.is_err();
    let x_api = probe.unwrap_or_else(|e| format!("error: {}", e));

    let scheduler = if config.scheduler.url.is_some() {
        match SchedulerClient::from_config(config) {
            Ok(scheduler) => match scheduler.health().await {
                Ok(_) => "ok".to_string(),
                Err(e) => {
                    failed = true;
                    format!("error: {}", e)
                }
            },
            Err(e) => {
                failed = true;
                format!("error: {}", e)
            }
        }
    } else {
        "not configured".to_string()
    };

    print_json(&SelftestReport {
        auth_mode: client.auth_mode(),
        x_api,
        scheduler,
    })?;

    if failed {
        anyhow::bail!("selftest failed");
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status_line(done: bool, yes: &str, no: &str, subject: &str) -> Result<()> {
    if done {
        println!("{} {}", yes, subject);
    } else {
        println!("{} {}", no, subject);
    }
    Ok(())
}

/// First SIGINT/SIGTERM cancels the run; a second one exits immediately
#[cfg(unix)]
fn setup_signal_handlers(cancel: CancellationToken) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        for signal in signals.forever() {
            if cancel.is_cancelled() {
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            info!(signal, "Received shutdown signal, cancelling");
            cancel.cancel();
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_cancel: CancellationToken) -> Result<()> {
    Ok(())
}
