pub mod config;
pub mod dashboard;
pub mod export;
pub mod geocode;
pub mod identity;
pub mod merge;
pub mod models;
pub mod review;
pub mod sources;
pub mod store;
pub mod utils;

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::ConfigStore;
use dashboard::EventFilter;
use geocode::{Geocoder, Nominatim};
use merge::Priority;
use models::{Event, EventDate, Location, Source};
use review::{Curator, EventEdit};
use utils::StorePaths;

#[derive(Parser)]
#[command(
    name = "cycle-events",
    version,
    about = "Collects Finnish cycling events from several sources into one curated list"
)]
struct Cli {
    /// Directory holding the stores, inputs and config.
    #[arg(long, env = "CYCLE_EVENTS_DATA", global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh every source, then merge and export.
    Run {
        /// Leave the bikeland.fi store as it is.
        #[arg(long)]
        skip_scrape: bool,
    },
    /// Rebuild the canonical list from the stores on disk.
    Merge,
    /// Report exact, similar and same-place duplicates.
    Duplicates {
        #[arg(long)]
        threshold: Option<f64>,
        /// Show every entry instead of the first five per section.
        #[arg(long)]
        verbose: bool,
        /// Check all source records instead of the published list.
        #[arg(long)]
        raw: bool,
    },
    /// Maintain the list of hidden event keys.
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },
    /// Correct a published event, identified by its `Title_YYYY-MM-DD` key.
    Edit {
        key: String,
        #[command(flatten)]
        fields: EditFields,
    },
    /// Add an event by hand.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long = "type")]
        kind: String,
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
        #[arg(long)]
        location: String,
        #[arg(long, default_value = "")]
        organizer: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        link: String,
    },
    /// Query the published events.
    List(ListArgs),
    /// Look up coordinates for every published location.
    Geocode,
    /// Show or change settings.
    Config {
        #[arg(long)]
        threshold: Option<f64>,
        /// Source precedence, strongest first, e.g. `manual_edit,manual,csv,bikeland`.
        #[arg(long, value_delimiter = ',')]
        priority: Option<Vec<Source>>,
    },
}

#[derive(Subcommand)]
enum BlacklistAction {
    Add {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    Remove {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Replace the whole list.
    Replace { keys: Vec<String> },
    /// Add keys from a file, one per line.
    Import { file: PathBuf },
    /// Write keys one per line, to stdout without a file.
    Export { file: Option<PathBuf> },
    List,
}

#[derive(Args)]
struct EditFields {
    #[arg(long)]
    title: Option<String>,
    #[arg(long = "type")]
    kind: Option<String>,
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    organizer: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    link: Option<String>,
}

impl From<EditFields> for EventEdit {
    fn from(fields: EditFields) -> Self {
        EventEdit {
            title: fields.title,
            kind: fields.kind,
            date: fields.date,
            location: fields.location,
            organizer: fields.organizer,
            description: fields.description,
            link: fields.link,
        }
    }
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    search: Option<String>,
    /// `YYYY-MM`
    #[arg(long, value_parser = parse_month)]
    month: Option<(i32, u32)>,
    #[arg(long = "type")]
    kind: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    source: Option<Source>,
    #[arg(long)]
    include_blacklisted: bool,
    /// Only events added in the last N days.
    #[arg(long)]
    recent: Option<i64>,
    /// Print the available filter values instead of events.
    #[arg(long)]
    facets: bool,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d.%m.%Y"))
        .map_err(|_| format!("expected YYYY-MM-DD or DD.MM.YYYY, got {raw:?}"))
}

fn parse_month(raw: &str) -> Result<(i32, u32), String> {
    let invalid = || format!("expected YYYY-MM, got {raw:?}");
    let (year, month) = raw.split_once('-').ok_or_else(invalid)?;
    let year = year.parse::<i32>().map_err(|_| invalid())?;
    let month = month.parse::<u32>().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cycle_events_lib=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

pub fn run() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<()> {
    let paths = StorePaths::new(cli.data_dir.unwrap_or_else(utils::default_data_root));
    let mut config_store = ConfigStore::load(paths.config());
    let config = config_store.read().clone();
    tracing::debug!("data root {:?}", paths.root());

    match cli.command {
        Commands::Run { skip_scrape } => {
            let adapters = sources::active_adapters(&paths, &config, !skip_scrape);
            let run = merge::run_pipeline(&paths, &config.priority, &adapters)?;
            for report in &run.refreshed {
                match &report.error {
                    Some(err) => println!("{}: failed ({err})", report.source),
                    None => println!(
                        "{}: {} new, {} already stored, {} skipped",
                        report.source, report.new, report.existing, report.skipped
                    ),
                }
                for issue in &report.issues {
                    println!("  {issue}");
                }
            }
            print_merge(&run.merged.report);
        }
        Commands::Merge => {
            let outcome = merge::publish(&paths, &config.priority)?;
            print_merge(&outcome.report);
        }
        Commands::Duplicates {
            threshold,
            verbose,
            raw,
        } => {
            let events = if raw {
                merge::load_inputs(&paths).all()
            } else {
                store::load_events_or_empty(&paths.canonical(), "canonical")
            };
            let threshold = threshold.unwrap_or(config.similarity_threshold);
            let report = review::duplicate_report(&events, threshold)?;
            println!("Checked {} events", events.len());
            print!("{}", report.render(verbose));
        }
        Commands::Blacklist { action } => {
            let curator = Curator::new(paths.clone(), config.priority.clone());
            blacklist_command(&curator, action)?;
        }
        Commands::Edit { key, fields } => {
            let curator = Curator::new(paths, config.priority.clone());
            let outcome = curator.edit(&key, fields.into())?;
            if let Some(new_key) = outcome.key.filter(|new_key| *new_key != key) {
                println!("Saved edit; {key} is now {new_key}");
            } else {
                println!("Saved edit for {key}");
            }
            print_merge(&outcome.merged);
        }
        Commands::Add {
            title,
            kind,
            date,
            location,
            organizer,
            description,
            link,
        } => {
            let mut event = Event::new(&title, EventDate::on(date), Source::ManualEdit);
            event.kind = kind;
            event.location = Location::new(&location);
            event.organizer = organizer;
            event.description = description;
            event.link = link;
            let curator = Curator::new(paths, config.priority.clone());
            let outcome = curator.add(event)?;
            println!("Added {}", outcome.key.unwrap_or(title));
            print_merge(&outcome.merged);
        }
        Commands::List(args) => list_command(&paths, &config.priority, args),
        Commands::Geocode => geocode_command(&paths, &config)?,
        Commands::Config {
            threshold,
            priority,
        } => {
            if threshold.is_some() || priority.is_some() {
                if let Some(value) = threshold {
                    review::validate_threshold(value)?;
                }
                config_store.update(|config| {
                    if let Some(value) = threshold {
                        config.similarity_threshold = value;
                    }
                    if let Some(order) = priority {
                        config.priority = Priority::new(order);
                    }
                })?;
            }
            let current = config_store.read();
            println!("{}", serde_json::to_string_pretty(current)?);
        }
    }
    Ok(())
}

fn print_merge(report: &merge::MergeReport) {
    println!(
        "Merged {} candidates into {} events ({} blacklisted, {} without title or date, {} collisions)",
        report.candidates,
        report.total,
        report.blacklisted,
        report.missing_key,
        report.replaced + report.superseded
    );
}

fn blacklist_command(curator: &Curator, action: BlacklistAction) -> anyhow::Result<()> {
    let outcome = match action {
        BlacklistAction::Add { keys } => curator.blacklist_add(&keys)?,
        BlacklistAction::Remove { keys } => curator.blacklist_remove(&keys)?,
        BlacklistAction::Replace { keys } => curator.blacklist_replace(&keys)?,
        BlacklistAction::Import { file } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("unable to read {}", file.display()))?;
            curator.blacklist_import(&text)?
        }
        BlacklistAction::Export { file } => {
            let text = curator.blacklist_export()?;
            match file {
                Some(file) => {
                    fs::write(&file, text)
                        .with_context(|| format!("unable to write {}", file.display()))?;
                }
                None => print!("{text}"),
            }
            return Ok(());
        }
        BlacklistAction::List => {
            let blacklist = curator.blacklist()?;
            for key in blacklist.iter() {
                println!("{key}");
            }
            println!("{} blacklisted", blacklist.len());
            return Ok(());
        }
    };
    println!(
        "Blacklist changed by {}; {} events published",
        outcome.changed, outcome.merged.total
    );
    Ok(())
}

fn list_command(paths: &StorePaths, priority: &Priority, args: ListArgs) {
    let rows = dashboard::load_rows(paths, priority, args.include_blacklisted);
    if args.facets {
        let facets = dashboard::facets(&rows);
        let months: Vec<&str> = facets.months.iter().map(|(_, label)| label.as_str()).collect();
        let sources: Vec<&str> = facets.sources.iter().map(Source::as_str).collect();
        println!("Kuukaudet: {}", months.join(", "));
        println!("Lajit: {}", facets.kinds.join(", "));
        println!("Paikkakunnat: {}", facets.locations.join(", "));
        println!("Lähteet: {}", sources.join(", "));
        return;
    }

    let filter = EventFilter {
        search: args.search,
        month: args.month,
        kind: args.kind,
        location: args.location,
        source: args.source,
        include_blacklisted: args.include_blacklisted,
        added_within_days: args.recent,
    };
    let shown = dashboard::filter_rows(&rows, &filter, utils::now_local());
    for row in &shown {
        let event = &row.event;
        println!(
            "{}  {} ({})  {}  [{}]{}",
            event.datetime_label(),
            event.title,
            event.kind,
            event.location,
            event.source,
            if row.blacklisted { "  BLACKLISTED" } else { "" }
        );
    }
    println!("Näytetään {} tapahtumaa {} tapahtumasta", shown.len(), rows.len());
}

fn geocode_command(paths: &StorePaths, config: &config::AppConfig) -> anyhow::Result<()> {
    if config.geocode_user_agent.trim().is_empty() {
        bail!("geocode_user_agent must be set in {}", paths.config().display());
    }
    let rows = dashboard::load_rows(paths, &config.priority, false);
    let locations: BTreeSet<String> = rows
        .iter()
        .filter_map(|row| row.event.location.known())
        .map(str::to_string)
        .collect();

    let lookup = Nominatim::new(
        &config.geocode_user_agent,
        Duration::from_millis(config.geocode_min_interval_ms),
    )?;
    let mut geocoder = Geocoder::open(
        lookup,
        paths.geocode_cache(),
        &config.geocode_country_suffix,
    );
    let mut found = 0;
    for location in &locations {
        match geocoder.locate(&Location::new(location)) {
            Some(coords) => {
                found += 1;
                println!("{location}: {:.5}, {:.5}", coords.lat, coords.lon);
            }
            None => println!("{location}: not found"),
        }
    }
    geocoder.save()?;
    println!("Located {found} of {} places", locations.len());
    Ok(())
}
