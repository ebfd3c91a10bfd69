use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Instant;
use tabled::{settings::Style, Table, Tabled};

use ufitness::config::AppConfig;
use ufitness::gaps::{GapFinder, OverlapPolicy};
use ufitness::import::{self, ImportManager};
use ufitness::logging::{self, DiagnosticReport, LogConfig};
use ufitness::models::{format_duration, QualityTier, ScheduleItem, StatsSnapshot};
use ufitness::schedule::{current_gap, day_summary, items_for_day, next_gap};
use ufitness::state::{AppState, UserDocument};
use ufitness::units::UnitPreferences;

/// UFitness - workout gap finder and activity tracker
///
/// Finds free-time windows between calendar events and keeps workout, hydration
/// and step statistics derived from an append-only history.
#[derive(Parser)]
#[command(name = "ufitness")]
#[command(version)]
#[command(about = "Workout gap finder and activity tracker", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// User document to read and update (defaults to the configured data dir)
    #[arg(short, long, value_name = "FILE", global = true)]
    document: Option<PathBuf>,

    /// Evaluate as of this instant (RFC 3339) instead of the current time
    #[arg(long, value_name = "TIMESTAMP", global = true)]
    now: Option<DateTime<Utc>>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Save a diagnostic report of skipped records
    #[arg(long, global = true)]
    report: bool,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OverlapArg {
    Merge,
    StartOrdered,
}

impl From<OverlapArg> for OverlapPolicy {
    fn from(arg: OverlapArg) -> Self {
        match arg {
            OverlapArg::Merge => OverlapPolicy::Merge,
            OverlapArg::StartOrdered => OverlapPolicy::StartOrdered,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Find free-time gaps around busy intervals read from files
    Gaps {
        /// Busy interval files (JSON or CSV)
        #[arg(short, long, required = true, num_args = 1..)]
        busy: Vec<PathBuf>,

        /// First day to scan (YYYY-MM-DD, default today)
        #[arg(short, long)]
        from: Option<NaiveDate>,

        /// Number of days to scan
        #[arg(long, default_value = "7")]
        days: u32,

        /// Minimum gap length in minutes (default from config)
        #[arg(short, long)]
        min_gap: Option<u32>,

        /// How overlapping busy intervals are treated
        #[arg(long, value_enum)]
        overlap: Option<OverlapArg>,
    },

    /// Sync the schedule and show one day of it
    Schedule {
        /// Device calendar snapshot (JSON array of events)
        #[arg(short = 'e', long)]
        device_events: Option<PathBuf>,

        /// Day to show (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Recompute and show the statistics snapshot
    Stats {
        /// Read history from this file instead of the user document
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Archive the previous day if the date changed and reset daily counters
    Rollover,

    /// Record a completed workout
    Workout {
        /// Minutes of activity
        #[arg(long)]
        duration: u32,

        /// Kilocalories burned
        #[arg(long, default_value = "0")]
        calories: u32,
    },

    /// Log one serving of water
    Water,

    /// Record body measurements in kilograms and centimeters
    Body {
        #[arg(long)]
        weight: Option<Decimal>,

        #[arg(long)]
        height: Option<Decimal>,
    },

    /// Change daily targets
    Goals {
        #[arg(long)]
        steps: Option<u32>,

        /// Milliliters
        #[arg(long)]
        hydration: Option<u32>,
    },

    /// Manage custom busy events
    Event {
        #[command(subcommand)]
        action: EventAction,
    },

    /// Clear history, custom events and all derived statistics
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Configure application settings
    Config {
        /// List all configuration options
        #[arg(short, long)]
        list: bool,

        /// Set a configuration value (key=value)
        #[arg(short, long)]
        set: Option<String>,

        /// Get a configuration value
        #[arg(short, long)]
        get: Option<String>,
    },
}

#[derive(Subcommand)]
enum EventAction {
    /// Add an event at a local time
    Add {
        #[arg(long, default_value = "Workout")]
        title: String,

        /// YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,

        /// HH:MM
        #[arg(long)]
        time: String,

        /// Minutes
        #[arg(long, default_value = "60")]
        duration: u32,
    },

    /// Delete an event by id
    Delete {
        #[arg(long)]
        id: String,
    },

    /// List custom events
    List,
}

#[derive(Tabled)]
struct GapRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Window")]
    window: String,
    #[tabled(rename = "Length")]
    length: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Suggestion")]
    suggestion: String,
}

#[derive(Tabled)]
struct ScheduleRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Length")]
    length: String,
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

struct CliContext {
    config: AppConfig,
    config_path: PathBuf,
    document_path: PathBuf,
    now: DateTime<Utc>,
    json: bool,
}

impl CliContext {
    fn load_state(&self) -> Result<AppState> {
        let document = if self.document_path.exists() {
            import::load_document(&self.document_path)
                .with_context(|| format!("Failed to load {}", self.document_path.display()))?
        } else {
            tracing::info!(path = %self.document_path.display(), "Starting a new user document");
            self.config.new_document()
        };
        self.config.app_state(document)
    }

    fn save_state(&self, state: &AppState) -> Result<()> {
        import::save_document(&self.document_path, state.document())
            .with_context(|| format!("Failed to save {}", self.document_path.display()))
    }

    fn units(&self, document: &UserDocument) -> UnitPreferences {
        document.preferences.units
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(&LogConfig::from_verbosity(cli.verbose))?;

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_config_path);
    let config = if config_path.exists() {
        AppConfig::load_from_file(&config_path)?
    } else {
        AppConfig::load_or_default()
    };
    let document_path = cli.document.clone().unwrap_or_else(|| config.document_path());

    let ctx = CliContext {
        config,
        config_path,
        document_path,
        now: cli.now.unwrap_or_else(Utc::now),
        json: cli.json,
    };

    let started = Instant::now();
    let mut report = DiagnosticReport::new(command_name(&cli.command));
    let result = run(&ctx, cli.command, &mut report);

    if cli.report {
        report.set_duration(started.elapsed());
        report.set_success(result.is_ok());
        if let Err(e) = &result {
            report.add_error(&**e);
        }
        let path = report.save_default()?;
        eprintln!("{}", format!("Diagnostic report: {}", path.display()).dimmed());
    }

    result
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Gaps { .. } => "gaps",
        Commands::Schedule { .. } => "schedule",
        Commands::Stats { .. } => "stats",
        Commands::Rollover => "rollover",
        Commands::Workout { .. } => "workout",
        Commands::Water => "water",
        Commands::Body { .. } => "body",
        Commands::Goals { .. } => "goals",
        Commands::Event { .. } => "event",
        Commands::Reset { .. } => "reset",
        Commands::Config { .. } => "config",
    }
}

fn run(ctx: &CliContext, command: Commands, report: &mut DiagnosticReport) -> Result<()> {
    match command {
        Commands::Gaps {
            busy,
            from,
            days,
            min_gap,
            overlap,
        } => {
            let zone = ctx.config.local_zone()?;
            let mut gap_config = ctx.config.schedule.clone();
            if let Some(minutes) = min_gap {
                gap_config.min_gap_minutes = minutes.max(1);
            }
            if let Some(policy) = overlap {
                gap_config.overlap_policy = policy.into();
            }

            let intervals = ImportManager::new(zone).import_all(&busy)?;
            let scan_start = from.unwrap_or_else(|| zone.date_of(ctx.now));
            let finder = GapFinder::with_config(gap_config, zone);
            let result = finder.find_gaps(&intervals, scan_start, days);

            report.add_context("busy_intervals", intervals.len().to_string());
            report.add_context("days", days.to_string());
            report.add_diagnostics(&result.diagnostics);

            if ctx.json {
                println!("{}", serde_json::to_string_pretty(&result.gaps)?);
            } else {
                let rows: Vec<GapRow> = result
                    .gaps
                    .iter()
                    .map(|gap| GapRow {
                        date: gap.date_key.format("%a %Y-%m-%d").to_string(),
                        window: format!(
                            "{}-{}",
                            zone.to_local(gap.start).format("%H:%M"),
                            zone.to_local(gap.end).format("%H:%M")
                        ),
                        length: gap.duration.clone(),
                        tier: paint_tier(gap.quality),
                        title: gap.title.clone(),
                        suggestion: gap.suggestion.clone(),
                    })
                    .collect();
                println!("{}", Table::new(rows).with(Style::rounded()));
                println!(
                    "{}",
                    format!("{} gaps over {} days", result.gaps.len(), days).green().bold()
                );
            }
            warn_skipped(result.diagnostics.len());
        }

        Commands::Schedule {
            device_events,
            date,
        } => {
            let mut state = ctx.load_state()?;
            let events = match &device_events {
                Some(path) => import::load_device_events(path)?,
                None => Vec::new(),
            };
            let outcome = state.sync_schedule(events, ctx.now);
            report.add_diagnostics(&outcome.diagnostics);
            ctx.save_state(&state)?;

            let zone = state.zone();
            let day = date.unwrap_or_else(|| state.today(ctx.now));
            let items = items_for_day(state.schedule(), day);

            if ctx.json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                let rows: Vec<ScheduleRow> = items
                    .iter()
                    .map(|item| ScheduleRow {
                        time: format!(
                            "{}-{}",
                            zone.to_local(item.start()).format("%H:%M"),
                            zone.to_local(item.end()).format("%H:%M")
                        ),
                        kind: match item {
                            ScheduleItem::Gap(gap) => paint_tier(gap.quality),
                            ScheduleItem::Busy(busy) => format!("{:?}", busy.kind).to_lowercase(),
                        },
                        title: item.title().to_string(),
                        length: match item {
                            ScheduleItem::Gap(gap) => gap.duration.clone(),
                            ScheduleItem::Busy(busy) => format_duration(busy.duration_minutes()),
                        },
                    })
                    .collect();

                println!("{}", format!("Schedule for {}", day.format("%A %Y-%m-%d")).cyan().bold());
                println!("{}", Table::new(rows).with(Style::rounded()));

                let summary = day_summary(state.schedule(), day);
                println!(
                    "{} classes, {} workouts, {} gaps",
                    summary.classes, summary.workouts, summary.gaps
                );
                if let Some(gap) = current_gap(state.schedule(), day, ctx.now) {
                    println!("{} {} ({})", "Now:".green().bold(), gap.title, gap.suggestion);
                } else if let Some(gap) = next_gap(state.schedule(), day, ctx.now) {
                    println!(
                        "{} {} at {}",
                        "Next:".yellow().bold(),
                        gap.title,
                        zone.to_local(gap.start).format("%H:%M")
                    );
                }
            }
            warn_skipped(outcome.diagnostics.len());
        }

        Commands::Stats { history } => {
            let mut state = ctx.load_state()?;
            let today = state.today(ctx.now);

            let (stats, weekly, problems) = match history {
                Some(path) => {
                    let entries = import::load_history(&path)?;
                    let aggregator = ctx.config.stats_aggregator()?;
                    let stats = aggregator.recompute(&entries, state.stats(), today);
                    let weekly = aggregator.weekly_calories(&entries, today);
                    (stats, weekly, aggregator.audit(&entries))
                }
                None => {
                    let stats = state.refresh_stats(today).clone();
                    let aggregator = ctx.config.stats_aggregator()?;
                    let weekly = aggregator.weekly_calories(state.history(), today);
                    let problems = aggregator.audit(state.history());
                    ctx.save_state(&state)?;
                    (stats, weekly, problems)
                }
            };
            report.add_diagnostics(&problems);

            if ctx.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "stats": stats,
                        "weeklyCalories": weekly,
                    }))?
                );
            } else {
                print_stats(&stats, &weekly, ctx.units(state.document()));
            }
            warn_skipped(problems.len());
        }

        Commands::Rollover => {
            let mut state = ctx.load_state()?;
            let rollover = state.on_foreground(ctx.now);
            ctx.save_state(&state)?;

            if ctx.json {
                println!("{}", serde_json::to_string_pretty(&rollover)?);
            } else if rollover.rolled_over {
                println!(
                    "{}",
                    format!(
                        "New day {}: archived {} record(s), daily counters reset",
                        rollover.last_active_date,
                        rollover.archive_entries.len()
                    )
                    .green()
                );
            } else {
                println!("{}", "Same day, nothing to roll over".dimmed());
            }
        }

        Commands::Workout { duration, calories } => {
            let mut state = ctx.load_state()?;
            let stats = state.complete_workout(duration, calories, ctx.now).clone();
            ctx.save_state(&state)?;
            println!(
                "{}",
                format!(
                    "✓ Workout logged. Streak: {} day(s), this week {}/{}",
                    stats.streak_days, stats.weekly_goal_current, stats.weekly_goal_target
                )
                .green()
            );
        }

        Commands::Water => {
            let mut state = ctx.load_state()?;
            let units = ctx.units(state.document());
            let stats = state.add_water(ctx.now).clone();
            ctx.save_state(&state)?;
            println!(
                "{}",
                format!(
                    "✓ Water logged: {} of {}",
                    units.display_volume(Some(stats.hydration_today)),
                    units.display_volume(Some(u64::from(stats.hydration_goal_ml)))
                )
                .blue()
            );
        }

        Commands::Body { weight, height } => {
            if weight.is_none() && height.is_none() {
                bail!("Give --weight and/or --height");
            }
            let mut state = ctx.load_state()?;
            state.update_body_stats(weight, height, ctx.now)?;
            ctx.save_state(&state)?;
            let units = ctx.units(state.document());
            let profile = &state.document().profile;
            println!(
                "✓ Weight {}, height {}",
                units.display_weight(profile.weight),
                units.display_height(profile.height)
            );
        }

        Commands::Goals { steps, hydration } => {
            let mut state = ctx.load_state()?;
            let stats = state.update_daily_goals(steps, hydration, ctx.now).clone();
            ctx.save_state(&state)?;
            println!(
                "✓ Goals: {} steps, {} mL",
                stats.step_goal, stats.hydration_goal_ml
            );
        }

        Commands::Event { action } => {
            let mut state = ctx.load_state()?;
            match action {
                EventAction::Add {
                    title,
                    date,
                    time,
                    duration,
                } => {
                    let event = state.add_custom_event(&title, date, &time, duration, ctx.now)?;
                    println!(
                        "{}",
                        format!("✓ Added {} ({}) as {}", event.title, event.duration_label(), event.id).green()
                    );
                }
                EventAction::Delete { id } => {
                    let removed = state.delete_custom_event(&id, ctx.now)?;
                    println!("{}", format!("✓ Deleted {}", removed.title).yellow());
                }
                EventAction::List => {
                    if ctx.json {
                        println!("{}", serde_json::to_string_pretty(state.custom_events())?);
                    } else {
                        for event in state.custom_events() {
                            println!(
                                "{}  {} {}  {} ({})",
                                event.id.dimmed(),
                                event.date_key,
                                event.start_time,
                                event.title,
                                event.duration_label()
                            );
                        }
                    }
                    return Ok(());
                }
            }
            ctx.save_state(&state)?;
        }

        Commands::Reset { yes } => {
            if !yes {
                bail!("Reset clears all history; pass --yes to confirm");
            }
            let mut state = ctx.load_state()?;
            state.reset_progress(ctx.now);
            ctx.save_state(&state)?;
            println!("{}", "✓ Progress reset".yellow());
        }

        Commands::Config { list, set, get } => {
            let mut config = ctx.config.clone();
            if list {
                for (key, value) in config.list()? {
                    println!("{} = {}", key.cyan(), value);
                }
            } else if let Some(key_value) = set {
                let Some((key, value)) = key_value.split_once('=') else {
                    bail!("Expected key=value, got: {}", key_value);
                };
                config.set(key.trim(), value)?;
                config.save_to_file(&ctx.config_path)?;
                println!("{}", format!("✓ {} = {}", key.trim(), value.trim()).green());
            } else if let Some(key) = get {
                match config.get(&key)? {
                    Some(value) => println!("{}", value),
                    None => bail!("Unknown configuration key: {}", key),
                }
            } else {
                println!("{}", ctx.config_path.display());
            }
        }
    }

    Ok(())
}

fn paint_tier(tier: QualityTier) -> String {
    let label = tier.to_string();
    match tier {
        QualityTier::Diamond => label.blue().bold().to_string(),
        QualityTier::Gold => label.green().to_string(),
        QualityTier::Silver => label.red().to_string(),
        QualityTier::Bronze => label.yellow().to_string(),
    }
}

fn print_stats(stats: &StatsSnapshot, weekly: &[u64; 7], units: UnitPreferences) {
    let rows = vec![
        StatRow {
            metric: "Streak",
            value: format!("{} day(s) (best {})", stats.streak_days, stats.best_streak_days),
        },
        StatRow {
            metric: "Workouts",
            value: format!("{} today, {} total", stats.workouts_today, stats.workouts_total),
        },
        StatRow {
            metric: "Calories",
            value: format!(
                "{} today, {} total",
                units.display_energy(Some(stats.calories_today)),
                units.display_energy(Some(stats.calories_total))
            ),
        },
        StatRow {
            metric: "Active minutes",
            value: stats.active_minutes_total.to_string(),
        },
        StatRow {
            metric: "Hydration",
            value: format!(
                "{} / {}",
                units.display_volume(Some(stats.hydration_today)),
                units.display_volume(Some(u64::from(stats.hydration_goal_ml)))
            ),
        },
        StatRow {
            metric: "Steps",
            value: format!("{} / {}", stats.steps, stats.step_goal),
        },
        StatRow {
            metric: "Weekly goal",
            value: format!("{} / {}", stats.weekly_goal_current, stats.weekly_goal_target),
        },
    ];
    println!("{}", Table::new(rows).with(Style::rounded()));

    let days = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    let chart: Vec<String> = days
        .iter()
        .zip(weekly.iter())
        .map(|(day, calories)| format!("{} {}", day.dimmed(), calories))
        .collect();
    println!("{}", chart.join("  "));
}

fn warn_skipped(count: usize) {
    if count > 0 {
        eprintln!(
            "{}",
            format!("⚠ {} record(s) skipped, run with -v or --report for details", count).yellow()
        );
    }
}
