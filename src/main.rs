use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::info;

use event_reminder::compose::LlmComposer;
use event_reminder::config::AppConfig;
use event_reminder::db::Store;
use event_reminder::dispatch::{LogDispatcher, MailchimpDispatcher};
use event_reminder::pipeline::{Pipeline, RunReport};
use event_reminder::{due_today, http_collector, normalizer, venue_today};

#[derive(Parser)]
#[command(name = "event-reminder", version, about = "Mail reminders ahead of listed events")]
struct Cli {
    /// Config file (defaults to the data directory's config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape, schedule, draft and send today's reminders
    Run {
        /// Treat this date (YYYY-MM-DD) as today
        #[arg(long)]
        today: Option<NaiveDate>,
        /// Log what would be sent without sending or recording anything
        #[arg(long)]
        dry_run: bool,
    },
    /// List the event links on the listing page
    Discover,
    /// Scrape events and print the reminders due today, without sending
    Due {
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Parse a date line the way event pages are parsed
    ParseDate { text: String },
}

fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    match cli.command {
        Command::Run { today, dry_run } => {
            let today = match today {
                Some(date) => date,
                None => venue_today(&config)?,
            };
            let report = run(&config, today, dry_run)?;
            report.log_summary();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Discover => {
            let mut collector = http_collector(&config)?;
            let refs = collector.discover()?;
            if refs.is_empty() {
                info!("no events listed at {}", config.listing_url);
            }
            for reference in refs {
                println!("{}\t{}", reference.id, reference.url);
            }
        }
        Command::Due { today } => {
            let today = match today {
                Some(date) => date,
                None => venue_today(&config)?,
            };
            let mut collector = http_collector(&config)?;
            let mut report = RunReport::default();
            let events = collector.collect(&mut report)?;
            let offsets = config.offsets();
            let due = due_today(today, &events, &offsets);
            if due.is_empty() {
                info!("no reminders due on {today}");
            }
            for reminder in due {
                println!(
                    "{}\t{}d\t{}\t{}",
                    reminder.event.event_date(),
                    reminder.offset_days,
                    reminder.event.title,
                    reminder.event.url
                );
            }
            report.log_summary();
        }
        Command::ParseDate { text } => {
            let instant = normalizer(&config)?.parse(&text)?;
            println!("{}", instant.to_rfc3339());
        }
    }

    Ok(())
}

fn run(config: &AppConfig, today: NaiveDate, dry_run: bool) -> Result<RunReport> {
    info!("running reminders for {today}{}", if dry_run { " (dry run)" } else { "" });

    let collector = http_collector(config)?;
    let generator = LlmComposer::from_config(config)?;
    let store = Store::open(&config.database_path())
        .with_context(|| format!("unable to open {:?}", config.database_path()))?;

    if dry_run {
        Pipeline::new(
            collector,
            generator,
            LogDispatcher::default(),
            store,
            config.offsets(),
            config.organization_name.clone(),
        )
        .dry_run(true)
        .run(today)
    } else {
        let dispatcher =
            MailchimpDispatcher::connect(config).context("mailchimp connection failed")?;
        Pipeline::new(
            collector,
            generator,
            dispatcher,
            store,
            config.offsets(),
            config.organization_name.clone(),
        )
        .run(today)
    }
}
