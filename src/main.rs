use std::{path::PathBuf, process::ExitCode, str::FromStr, sync::Arc};

use clap::Parser;
use feedview::{
    config::Config,
    feed::{FeedController, FeedItem, Interaction},
    XrpcClient,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to configuration file.
    #[arg(long, default_value = ".feedview.yml")]
    config: PathBuf,

    /// Number of extra pages to load after the first one.
    #[arg(long, default_value_t = 0)]
    pages: usize,

    /// Refresh counters of everything loaded before printing.
    #[arg(long)]
    update: bool,

    /// Toggle like on the item at this position.
    #[arg(long, value_name = "INDEX")]
    like: Option<usize>,

    /// Toggle repost on the item at this position.
    #[arg(long, value_name = "INDEX")]
    repost: Option<usize>,

    /// Print items as JSON lines.
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    let env = std::env::var("FEEDVIEW_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::from_str(&env).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn print_item(item: &FeedItem, json: bool) {
    let state = item.snapshot();
    if json {
        let line = serde_json::json!({
            "key": item.key().to_string(),
            "uri": item.uri(),
            "indexedAt": item.indexed_at(),
            "author": item.author(),
            "repostedBy": item.reposted_by(),
            "record": state.record,
            "embed": state.embed.as_ref().map(|e| e.tag()),
            "replyCount": state.reply_count,
            "repostCount": state.repost_count,
            "likeCount": state.like_count,
            "myState": state.viewer,
        });
        println!("{line}");
        return;
    }

    let by = item
        .reposted_by()
        .map(|u| format!(" (reposted by {})", u.name))
        .unwrap_or_default();
    println!(
        "{:>9}  {}  {}{}  replies {} reposts {}{} likes {}{}",
        item.key().to_string(),
        item.indexed_at(),
        item.author().name,
        by,
        state.reply_count,
        state.repost_count,
        if state.viewer.has_reposted { "*" } else { "" },
        state.like_count,
        if state.viewer.has_liked { "*" } else { "" },
    );
}

async fn toggle(feed: &FeedController, index: usize, interaction: Interaction) -> bool {
    let Some(item) = feed.get(index) else {
        error!(index, "no item at this position");
        return false;
    };
    match item.toggle(interaction).await {
        Ok(()) => {
            info!(key = %item.key(), ?interaction, "toggled");
            true
        }
        Err(e) => {
            error!(key = %item.key(), ?interaction, "Failed to toggle: {e}");
            false
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let Args {
        config,
        pages,
        update,
        like,
        repost,
        json,
    } = Args::parse();

    let cfg = match Config::load(&config) {
        Ok(v) => v,
        Err(e) => {
            error!(path = %config.display(), "{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut client = XrpcClient::new(cfg.service, cfg.token);
    if let Some(method) = cfg.view_method {
        client = client.with_view_method(method);
    }
    let feed = FeedController::new(Arc::new(client), cfg.actor, cfg.feed, cfg.page_cap);

    feed.setup(false).await;
    for _ in 0..pages {
        if feed.has_error() {
            break;
        }
        let before = feed.len();
        feed.load_more().await;
        if feed.len() == before {
            break;
        }
    }
    if update && !feed.has_error() {
        feed.update().await;
    }

    if let Some(err) = feed.status().error {
        error!("{err}");
        return ExitCode::FAILURE;
    }

    let mut ok = true;
    if let Some(index) = like {
        ok &= toggle(&feed, index, Interaction::Like).await;
    }
    if let Some(index) = repost {
        ok &= toggle(&feed, index, Interaction::Repost).await;
    }

    if feed.is_empty() {
        info!("feed is empty");
    }
    for item in feed.items() {
        print_item(&item, json);
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
