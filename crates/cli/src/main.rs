//! Stride command-line trigger.
//!
//! Usage:
//!   stride --user u1 briefing
//!   stride --user u1 --tz Europe/London chat "how should today's run feel?"
//!   stride --user u1 activity --date 2026-03-05 --force
//!   stride --config stride.toml --user u1 weekly
//!
//! Each command runs one pipeline and prints its result as JSON.
//!
//! # Environment Variables
//!
//! - `ANTHROPIC_API_KEY` - conversation service key (unless set in config)
//! - `STRIDE_DEVICE_TOKEN` - device API token; without it, sync stages are skipped
//! - `RUST_LOG` - log filter (default: `info,stride=debug`)

use std::io::Write;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use chrono_tz::Tz;
use stride_common::Logger;
use stride_coordinator::{Coordinator, StrideConfig};
use stride_skills::SyncOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default)]
struct Args {
    config_path: Option<String>,
    user_id: Option<String>,
    timezone: Option<String>,
    date: Option<NaiveDate>,
    force: bool,
    stream: bool,
    command: Option<String>,
    message: Vec<String>,
}

fn parse_args(raw: &[String]) -> anyhow::Result<Option<Args>> {
    let mut args = Args::default();
    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "--config" | "-c" => {
                args.config_path = Some(value(raw, i, "--config")?);
                i += 1;
            }
            "--user" | "-u" => {
                args.user_id = Some(value(raw, i, "--user")?);
                i += 1;
            }
            "--tz" => {
                args.timezone = Some(value(raw, i, "--tz")?);
                i += 1;
            }
            "--date" | "-d" => {
                let raw_date = value(raw, i, "--date")?;
                args.date = Some(
                    raw_date
                        .parse()
                        .with_context(|| format!("Invalid date '{raw_date}', expected YYYY-MM-DD"))?,
                );
                i += 1;
            }
            "--force" => args.force = true,
            "--stream" => args.stream = true,
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            other if args.command.is_none() => args.command = Some(other.to_string()),
            other => args.message.push(other.to_string()),
        }
        i += 1;
    }
    Ok(Some(args))
}

fn value(raw: &[String], i: usize, flag: &str) -> anyhow::Result<String> {
    raw.get(i + 1)
        .cloned()
        .with_context(|| format!("{flag} needs a value"))
}

fn print_help() {
    println!("Stride");
    println!();
    println!("Usage: stride [OPTIONS] <COMMAND> [MESSAGE]");
    println!();
    println!("Commands:");
    println!("  briefing                 Morning readiness check and daily briefing");
    println!("  chat <MESSAGE>           Route a message to one agent and reply");
    println!("  activity                 Sync the day's activity and analyse it");
    println!("  weekly                   Weekly summary and plan review");
    println!();
    println!("Options:");
    println!("  -c, --config <FILE>      Path to stride.toml");
    println!("  -u, --user <ID>          User id (required)");
    println!("      --tz <ZONE>          IANA timezone (default: UTC)");
    println!("  -d, --date <YYYY-MM-DD>  Target date (default: today in --tz)");
    println!("      --force              Re-merge an already synced activity");
    println!("      --stream             Print chat reply text as it arrives");
    println!("  -h, --help               Show this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,stride=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let Some(args) = parse_args(&raw)? else {
        return Ok(());
    };

    let user_id = args.user_id.context("--user is required")?;
    let timezone: Tz = match args.timezone.as_deref() {
        Some(name) => name
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown timezone '{name}'"))?,
        None => Tz::UTC,
    };

    let config = if let Some(path) = &args.config_path {
        tracing::info!(path = %path, "Loading configuration");
        StrideConfig::from_file(path)?
    } else {
        tracing::info!("Using default configuration");
        StrideConfig::default()
    };

    let coordinator = Coordinator::from_config(&config, Logger::new("stride"))
        .context("Failed to initialize coordinator")?;

    let result = match args.command.as_deref() {
        Some("briefing") => {
            coordinator
                .morning_briefing(&user_id, timezone, args.date)
                .await
        }
        Some("chat") => {
            let message = args.message.join(" ");
            if message.trim().is_empty() {
                bail!("chat needs a message");
            }
            if args.stream {
                let mut stdout = std::io::stdout();
                let mut print = |text: &str| -> stride_common::Result<()> {
                    // A closed stdout is not worth failing the reply over.
                    let _ = stdout.write_all(text.as_bytes());
                    let _ = stdout.flush();
                    Ok(())
                };
                let result = coordinator
                    .chat_reply(&user_id, timezone, &message, &[], Some(&mut print))
                    .await;
                println!();
                result
            } else {
                coordinator
                    .chat_reply(&user_id, timezone, &message, &[], None)
                    .await
            }
        }
        Some("activity") => {
            let options = SyncOptions {
                date: args.date,
                force_resync: args.force,
                ..Default::default()
            };
            coordinator.post_activity(&user_id, timezone, options).await
        }
        Some("weekly") => coordinator.weekly_review(&user_id, timezone, args.date).await,
        Some(other) => bail!("Unknown command '{other}', see --help"),
        None => bail!("No command given, see --help"),
    };

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_chat_with_flags() {
        let args = parse_args(&strings(&[
            "--user", "u1", "--tz", "Europe/London", "chat", "how", "was", "Thursday?",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(args.user_id.as_deref(), Some("u1"));
        assert_eq!(args.timezone.as_deref(), Some("Europe/London"));
        assert_eq!(args.command.as_deref(), Some("chat"));
        assert_eq!(args.message.join(" "), "how was Thursday?");
    }

    #[test]
    fn test_parse_activity_options() {
        let args = parse_args(&strings(&["-u", "u1", "activity", "--date", "2026-03-05", "--force"]))
            .unwrap()
            .unwrap();
        assert_eq!(args.date, NaiveDate::from_ymd_opt(2026, 3, 5));
        assert!(args.force);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_args(&strings(&["--date", "March 5th"])).is_err());
        assert!(parse_args(&strings(&["weekly", "--user"])).is_err());
    }

    #[test]
    fn test_help_stops_parsing() {
        assert!(parse_args(&strings(&["--help"])).unwrap().is_none());
    }
}
