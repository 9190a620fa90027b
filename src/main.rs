use std::path::PathBuf;
use std::sync::Arc;

use cachebound::cache::SqliteStorage;
use cachebound::claims::{
  Claim, ClaimRequest, ClaimsClient, ClaimsRepository, LoginRequest, PostClaimRequest,
};
use cachebound::config::Config;
use cachebound::{logging, RemoteOutcome, Resource};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use futures::StreamExt;

#[derive(Parser, Debug)]
#[command(name = "cachebound")]
#[command(about = "Browse fact-check claims with an offline cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/cachebound/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List claims, refreshing the cache from the API when needed
  Claims {
    /// Only claims matching this keyword
    #[arg(short, long)]
    keyword: Option<String>,
    /// Keep printing updates until interrupted
    #[arg(short, long)]
    follow: bool,
  },
  /// Delete every locally cached claim
  Clear,
  /// Upvote a claim
  Upvote { id: i64 },
  /// Downvote a claim
  Downvote { id: i64 },
  /// Log in and print an API key (password read from CACHEBOUND_PASSWORD)
  Login { username: String },
  /// Submit a new claim
  Post {
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: String,
    /// Mark the claim as fake
    #[arg(long)]
    fake: bool,
    /// Attachment URL (repeatable)
    #[arg(long)]
    attachment: Vec<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging)?;

  let client = ClaimsClient::new(&config.api, Config::get_api_key())?;
  let storage = match &config.cache.path {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open()?,
  };
  let repository = ClaimsRepository::new(client, Arc::new(storage), config.cache.fetch_policy);

  match args.command {
    Command::Claims { keyword, follow } => {
      let request = ClaimRequest { keyword };
      if follow {
        tokio::select! {
          result = list_claims(&repository, request, true) => result?,
          _ = tokio::signal::ctrl_c() => {}
        }
      } else {
        list_claims(&repository, request, false).await?;
      }
    }
    Command::Clear => {
      let removed = repository.delete_local_claims()?;
      println!("Removed {} cached claims", removed);
    }
    Command::Upvote { id } => {
      let response = settle(repository.upvote_claim(id).await, "Upvote")?;
      println!("{}", message_or(response.and_then(|r| r.message), "Upvoted"));
    }
    Command::Downvote { id } => {
      let response = settle(repository.downvote_claim(id).await, "Downvote")?;
      println!("{}", message_or(response.and_then(|r| r.message), "Downvoted"));
    }
    Command::Login { username } => {
      let request = LoginRequest {
        username,
        password: Config::get_password()?,
      };
      let response = settle(repository.login(&request).await, "Login")?;
      let data = response
        .and_then(|r| r.data)
        .ok_or_else(|| eyre!("Login response did not include an API key"))?;
      println!("export CACHEBOUND_API_KEY={}", data.api_key);
    }
    Command::Post {
      title,
      description,
      fake,
      attachment,
    } => {
      let request = PostClaimRequest {
        title,
        description,
        fake,
        attachment,
      };
      let response = settle(repository.post_claim(&request).await, "Post")?;
      println!("{}", message_or(response.and_then(|r| r.message), "Claim posted"));
    }
  }

  Ok(())
}

/// Print resource states until the listing settles (or forever with `follow`).
async fn list_claims(repository: &ClaimsRepository, request: ClaimRequest, follow: bool) -> Result<()> {
  let mut states = repository.get_all_claims(request);

  while let Some(state) = states.next().await {
    match state {
      Resource::Loading(cached) => {
        println!("Refreshing claims...");
        if let Some(claims) = cached {
          print_claims(&claims);
        }
      }
      Resource::Success(claims) => {
        print_claims(&claims);
        if !follow {
          break;
        }
      }
      Resource::Error { message, data } => {
        if let Some(claims) = data {
          println!("Showing cached claims:");
          print_claims(&claims);
        }
        return Err(eyre!("Failed to refresh claims: {}", message));
      }
    }
  }

  Ok(())
}

fn print_claims(claims: &[Claim]) {
  if claims.is_empty() {
    println!("No claims.");
    return;
  }

  for claim in claims {
    println!(
      "{:>6}  +{:<4} -{:<4} {}{}  ({}, {})",
      claim.id,
      claim.upvote,
      claim.downvote,
      if claim.fake { "[FAKE] " } else { "" },
      claim.title,
      claim.author_username,
      claim.date_created.format("%Y-%m-%d"),
    );
  }
}

fn settle<R>(outcome: RemoteOutcome<R>, action: &str) -> Result<Option<R>> {
  outcome
    .into_result()
    .map_err(|failure| eyre!("{} failed: {}", action, failure))
}

fn message_or(message: Option<String>, fallback: &str) -> String {
  message.unwrap_or_else(|| fallback.to_string())
}
