use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use uuid::Uuid;

use sharebook_sync::{
    tasks, telemetry, AppContext, Config, FeedSynchronizer, LoadOutcome, Respond,
    SubscriptionScope,
};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn load_more(feed: &FeedSynchronizer) {
    let response = feed.load_next_page().await.respond(tasks::GET_POSTS);
    let total = feed.len().await;
    match response.data {
        Some(LoadOutcome::Loaded {
            page,
            appended,
            end_of_data,
            ..
        }) => info!(page, appended, total, end_of_data, "{}", response.message),
        Some(LoadOutcome::Exhausted) => info!(total, "No more posts"),
        Some(other) => info!(outcome = ?other, total, "{}", response.message),
        None => warn!(retryable = ?response.error_kind, "{}", response.message),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    telemetry::init_tracing(&config.app)?;

    info!(env = %config.app.env, backend = %config.backend.url, "Starting sharebook-sync");

    let email = std::env::var("SHAREBOOK_EMAIL").context("SHAREBOOK_EMAIL environment variable not set")?;
    let password =
        std::env::var("SHAREBOOK_PASSWORD").context("SHAREBOOK_PASSWORD environment variable not set")?;
    let owner = match std::env::var("SHAREBOOK_FEED_OWNER") {
        Ok(raw) => Some(Uuid::parse_str(raw.trim()).context("SHAREBOOK_FEED_OWNER must be a user id")?),
        Err(_) => None,
    };

    let ctx = AppContext::new(config)?;
    ctx.auth
        .sign_in_with_password(&email, &password)
        .await
        .context("Sign in failed")?;
    let session_refresh = ctx.start_session_refresh();

    let feed = ctx.feed(owner);
    load_more(&feed).await;

    let posts_live = feed.run_live(ctx.subscribe(SubscriptionScope::Posts).await?);

    let inbox = ctx.inbox()?;
    let receiver = inbox.receiver().await;
    let counted = inbox.refresh_count().await.respond(tasks::GET_NOTIFICATIONS);
    match counted.data {
        Some(unseen) => info!(unseen, "{}", counted.message),
        None => warn!(retryable = ?counted.error_kind, "{}", counted.message),
    }
    let notifications_live = match ctx
        .subscribe(SubscriptionScope::Notifications { receiver })
        .await
    {
        Ok(subscription) => Some(inbox.run_live(subscription)),
        Err(e) => {
            error!(error = %e, "Notification subscription failed");
            None
        }
    };

    info!("Type 'n' and Enter to load more posts, Ctrl+C to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim() == "n" => load_more(&feed).await,
                Ok(Some(_)) => {}
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                }
            },
        }
    }

    posts_live.stop();
    if let Some(handle) = notifications_live {
        handle.stop();
    }
    info!(
        posts = feed.len().await,
        unseen = inbox.unseen_count().await,
        "Unsubscribed from live changes"
    );

    session_refresh.stop();
    if let Err(e) = ctx.auth.sign_out().await {
        warn!(error = %e, "Sign out failed");
    }
    info!("sharebook-sync stopped");
    Ok(())
}
