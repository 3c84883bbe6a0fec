use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};

use mailstate::config::{load_config, resolve_db_path};
use mailstate::domain::MessageSummary;
use mailstate::mail::{MailFetcher, RecencyPolicy};
use mailstate::pipeline::{self, RunOptions};
use mailstate::store::{MailStore, SqliteStore, with_retry};

#[derive(Parser)]
#[command(name = "mailstate")]
#[command(about = "Fetch recent mailbox envelopes and keep them in SQLite", long_about = None)]
struct Cli {
    /// Settings file (defaults to the per-user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch recent summaries and print them
    Fetch {
        /// Take the trailing N messages instead of today's
        #[arg(long)]
        last: Option<u32>,

        /// Persist the fetched summaries
        #[arg(long)]
        store: bool,

        /// Give up when the remote makes no progress for this many seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// List stored mail records
    List,
}

fn print_summary(s: &MessageSummary) {
    println!("--------");
    println!("Subject: {}", s.subject);
    match &s.sender {
        Some(addr) => println!("From:    {}", addr),
        None => println!("From:    (none)"),
    }
    match s.date {
        Some(d) => println!("Date:    {}", d.with_timezone(&Local)),
        None => println!("Date:    (unknown)"),
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Fetch {
            last,
            store,
            timeout,
        } => {
            let policy = match last {
                Some(n) => RecencyPolicy::LastN(n),
                None => cfg.policy()?,
            };
            let fetcher = MailFetcher::new(&cfg.server, &cfg.username, &cfg.password);

            if store {
                let db_path = resolve_db_path(&cfg)?;
                let repo = SqliteStore::open(&db_path)?;
                let records = pipeline::run(
                    fetcher,
                    &repo,
                    &RunOptions {
                        folder: cfg.folder.clone(),
                        policy,
                        idle_timeout: Duration::from_secs(timeout),
                    },
                )?;
                println!("stored {} record(s) in {}", records.len(), db_path.display());
            } else {
                let summaries = fetcher.fetch_recent(&cfg.folder, &policy)?;
                if summaries.is_empty() {
                    println!("no messages");
                } else {
                    for s in &summaries {
                        print_summary(s);
                    }
                }
            }
            Ok(())
        }

        Command::List => {
            let db_path = resolve_db_path(&cfg)?;
            let repo = SqliteStore::open(&db_path)?;
            let records = with_retry(|| repo.find_all())?;
            if records.is_empty() {
                println!("no records");
            }
            for r in &records {
                println!(
                    "{}\t{}\t{}\t{}",
                    r.id,
                    r.subject,
                    r.address,
                    r.send_time.with_timezone(&Local)
                );
            }
            Ok(())
        }
    }
}
