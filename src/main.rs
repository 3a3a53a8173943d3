use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};

use modfeed::actions::{ActionSource, FlowOutcome};
use modfeed::app::App;
use modfeed::config::loader;
use modfeed::config::types::AppConfig;
use modfeed::engine::{Engine, Event, HttpEngine};
use modfeed::export::ExportFormat;
use modfeed::feed::notify::Level;
use modfeed::feed::{FeedSession, NameCache, NameKind, RecencyWindow, SearchResults, SessionSettings};
use modfeed::filter::{Family, FilterState, name_reference};
use modfeed::prefs::{self, PrefStore, Prefs, presets};
use modfeed::types::ModAction;
use modfeed::util;

#[derive(Parser)]
#[command(name = "modfeed", version, about = "Live moderation event feed")]
struct Cli {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging to debug.log.
    #[arg(long)]
    debug: bool,

    /// Guild to watch (overrides `feed.guild_id`).
    #[arg(long, value_name = "ID")]
    guild: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the feed in the terminal.
    Tail(FilterArgs),
    /// Write a snapshot of the current feed.
    Export {
        #[arg(long, value_enum)]
        format: ExportFormat,
        /// Output file (defaults to stdout).
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show a single log event.
    Event {
        log_id: String,
    },
    /// Show moderation counters for a time window.
    Summary {
        #[arg(long, value_name = "1h|24h|7d")]
        window: Option<RecencyWindow>,
    },
    /// Run a moderation action, previewing it first unless told otherwise.
    Action {
        action: String,
        #[arg(long = "param", value_name = "K=V", value_parser = parse_param)]
        params: Vec<(String, String)>,
        #[arg(long)]
        apply_without_dry_run: bool,
    },
    /// Find members or channels by name.
    Search {
        #[arg(value_enum)]
        target: SearchTarget,
        query: String,
    },
    /// Manage saved filter presets.
    #[command(subcommand)]
    Preset(PresetCommand),
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchTarget {
    Members,
    Channels,
}

impl From<SearchTarget> for NameKind {
    fn from(target: SearchTarget) -> Self {
        match target {
            SearchTarget::Members => Self::Member,
            SearchTarget::Channels => Self::Channel,
        }
    }
}

#[derive(Subcommand)]
enum PresetCommand {
    List,
    Save { name: String },
    Apply { name: String },
    Delete {
        name: String,
        /// Confirm deleting the active preset.
        #[arg(long)]
        yes: bool,
    },
    /// Add a preset from a JSON filter file.
    Import { name: String, file: PathBuf },
}

/// Filter flags shared by `tail` and `export`. Given flags are persisted.
#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Poll for new events automatically.
    #[arg(long)]
    stream: bool,
    /// Group cards by moderator.
    #[arg(long)]
    group: bool,
    /// Oldest events first.
    #[arg(long)]
    asc: bool,
    #[arg(long = "family", value_name = "F")]
    families: Vec<Family>,
    #[arg(long)]
    query: Option<String>,
    #[arg(long, value_name = "TS")]
    from: Option<String>,
    #[arg(long, value_name = "TS")]
    to: Option<String>,
    /// Member id, or `@name` to look it up.
    #[arg(long, value_name = "ID")]
    user: Option<String>,
    /// Moderator id, or `@name` to look it up.
    #[arg(long, value_name = "ID")]
    moderator: Option<String>,
    /// Channel id, or `#name` to look it up.
    #[arg(long, value_name = "ID")]
    channel: Option<String>,
}

impl FilterArgs {
    fn apply(&self, f: &mut FilterState) {
        if self.stream {
            f.stream = true;
        }
        if self.group {
            f.group_by_mod = true;
        }
        if self.asc {
            f.order_desc = false;
        }
        if !self.families.is_empty() {
            f.set_families(self.families.iter().copied());
        }
        let text_fields = [
            (&self.query, &mut f.q),
            (&self.from, &mut f.from),
            (&self.to, &mut f.to),
            (&self.user, &mut f.user_id),
            (&self.moderator, &mut f.moderator_id),
            (&self.channel, &mut f.channel_id),
        ];
        for (arg, field) in text_fields {
            if let Some(value) = arg {
                value.trim().clone_into(field);
            }
        }
        f.normalize();
    }
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    Ok((key.trim().to_owned(), value.to_owned()))
}

// ---------------------------------------------------------------------------
// Session plumbing
// ---------------------------------------------------------------------------

fn open_prefs() -> PrefStore {
    match prefs::default_path() {
        Some(path) => PrefStore::open_or_default(path),
        None => {
            tracing::warn!("prefs: no home directory; preferences will not persist");
            PrefStore::in_memory(Prefs::default())
        }
    }
}

fn guild_id(cli_guild: Option<String>, config: &AppConfig) -> Result<String> {
    cli_guild
        .or_else(|| config.feed.guild_id.clone())
        .context("no guild selected: pass --guild or set feed.guild_id in the config")
}

fn start_session(
    config: &AppConfig,
    guild: String,
    store: PrefStore,
) -> Result<(FeedSession, Receiver<Event>)> {
    // Dropping the session drops the engine handle, which stops the engine.
    let engine = HttpEngine::new(config)
        .context("failed to build the HTTP client")?
        .start();
    let (reply_tx, events) = mpsc::channel();
    let session = FeedSession::new(
        engine,
        reply_tx,
        guild,
        SessionSettings::from_config(config),
        NameCache::new(),
        store,
    );
    Ok((session, events))
}

/// How long one-shot commands wait for the backend.
fn cli_timeout(config: &AppConfig) -> Duration {
    Duration::from_secs(config.api.timeout_secs.saturating_mul(3).max(5))
}

fn first_error(session: &FeedSession) -> Option<String> {
    session
        .toasts()
        .iter()
        .find(|t| t.level == Level::Error)
        .map(|t| t.text.clone())
}

/// Feed engine events into the session until `done` holds.
fn pump(
    session: &mut FeedSession,
    events: &Receiver<Event>,
    timeout: Duration,
    mut done: impl FnMut(&mut FeedSession) -> bool,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if done(session) {
            return Ok(());
        }
        session.tick(util::now_ms());
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            bail!("timed out waiting for the backend");
        }
        match events.recv_timeout(left.min(Duration::from_millis(100))) {
            Ok(event) => {
                session.handle_event(event, util::now_ms());
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => bail!("engine stopped unexpectedly"),
        }
    }
}

fn ask(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Send one search and wait for its answer.
fn search_names(
    session: &mut FeedSession,
    events: &Receiver<Event>,
    timeout: Duration,
    kind: NameKind,
    q: &str,
) -> Result<SearchResults> {
    session.search(kind, q);
    pump(session, events, timeout, |s| {
        s.search_results().is_some_and(|r| r.kind == kind && r.q == q) || first_error(s).is_some()
    })?;
    match session.search_results() {
        Some(results) if results.kind == kind && results.q == q => Ok(results.clone()),
        _ => bail!(first_error(session).unwrap_or_default()),
    }
}

/// Replace `@name` and `#name` filter values with the ids they name.
fn resolve_filter_names(
    session: &mut FeedSession,
    events: &Receiver<Event>,
    timeout: Duration,
    args: &mut FilterArgs,
) -> Result<()> {
    let fields = [
        ("--user", NameKind::Member, &mut args.user),
        ("--moderator", NameKind::Member, &mut args.moderator),
        ("--channel", NameKind::Channel, &mut args.channel),
    ];
    for (flag, kind, field) in fields {
        let Some(q) = field.as_deref().and_then(name_reference).map(str::to_owned) else {
            continue;
        };
        let results = search_names(session, events, timeout, kind, &q)?;
        let Some(hit) = results.unique_match() else {
            let candidates: Vec<String> =
                results.hits.iter().map(|h| h.label(kind)).collect();
            if candidates.is_empty() {
                bail!("{flag} {q}: no match");
            }
            bail!("{flag} {q} is ambiguous: {}", candidates.join(", "));
        };
        tracing::debug!("cli: {flag} {q} -> {}", hit.id);
        *field = Some(hit.id.clone());
    }
    Ok(())
}

/// Start a throwaway session when any filter flag names someone by name.
fn resolve_filter_args(config: &AppConfig, guild: &str, args: &mut FilterArgs) -> Result<()> {
    let named = [&args.user, &args.moderator, &args.channel]
        .into_iter()
        .flatten()
        .any(|v| name_reference(v).is_some());
    if !named {
        return Ok(());
    }
    let store = PrefStore::in_memory(Prefs::default());
    let (mut session, events) = start_session(config, guild.to_owned(), store)?;
    resolve_filter_names(&mut session, &events, cli_timeout(config), args)
}

fn persist_filter(store: &mut PrefStore, args: &FilterArgs) {
    let mut filter = store.prefs().filter.clone();
    args.apply(&mut filter);
    if let Err(e) = store.set_filter(&filter) {
        tracing::warn!("prefs: {e}");
    }
}

fn run_export(
    config: &AppConfig,
    guild: String,
    store: PrefStore,
    format: ExportFormat,
    out: Option<PathBuf>,
) -> Result<()> {
    let (mut session, events) = start_session(config, guild, store)?;
    session.reload(util::now_ms());
    pump(&mut session, &events, cli_timeout(config), |s| {
        !s.is_loading() && s.names().is_idle()
    })?;
    if let Some(err) = first_error(&session) {
        bail!(err);
    }
    let body = session
        .export(format, None, util::now_ms())
        .context("nothing to export")?
        .context("failed to serialize the snapshot")?;
    match out {
        Some(path) => {
            std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => print!("{body}"),
    }
    Ok(())
}

fn run_event(config: &AppConfig, guild: String, store: PrefStore, log_id: &str) -> Result<()> {
    let (mut session, events) = start_session(config, guild, store)?;
    session.fetch_event(log_id);
    pump(&mut session, &events, cli_timeout(config), |s| {
        s.detail().is_some() || first_error(s).is_some()
    })?;
    let Some(event) = session.detail() else {
        bail!(first_error(&session).unwrap_or_default());
    };
    println!("{}", serde_json::to_string_pretty(event)?);
    Ok(())
}

fn run_summary(
    config: &AppConfig,
    guild: String,
    store: PrefStore,
    window: Option<RecencyWindow>,
) -> Result<()> {
    let (mut session, events) = start_session(config, guild, store)?;
    match window {
        Some(window) => session.set_recency_window(window, util::now_ms()),
        None => session.fetch_summary(),
    }
    pump(&mut session, &events, cli_timeout(config), |s| {
        s.summary().is_some() || first_error(s).is_some()
    })?;
    let Some(summary) = session.summary() else {
        bail!(first_error(&session).unwrap_or_default());
    };
    println!("window {}", session.recency().as_str());
    for (name, value) in &summary.metrics {
        println!("  {name}: {value}");
    }
    Ok(())
}

fn run_action(
    config: &AppConfig,
    guild: String,
    store: PrefStore,
    name: &str,
    params: &[(String, String)],
    apply_without_dry_run: bool,
) -> Result<()> {
    let action = ModAction::from_params(name, params)
        .with_context(|| format!("invalid parameters for action `{name}`"))?;
    // The override applies to this invocation only.
    let store = if apply_without_dry_run {
        PrefStore::in_memory(Prefs {
            always_dry_run: false,
            ..store.prefs().clone()
        })
    } else {
        store
    };
    let (mut session, events) = start_session(config, guild, store)?;
    session.begin_action(action, ActionSource::Modal)?;

    loop {
        let mut outcome = None;
        pump(&mut session, &events, cli_timeout(config), |s| {
            outcome = s.take_outcome();
            outcome.is_some()
        })?;
        match outcome {
            Some(FlowOutcome::Planned(plan)) => {
                println!("plan: {}", plan.describe());
                for risk in &plan.risks {
                    println!("  ! {risk}");
                }
                let yes = ask("Apply?")?;
                session.confirm_action(yes)?;
            }
            Some(FlowOutcome::Applied(action)) => {
                println!("{} applied", action.label());
                return Ok(());
            }
            Some(FlowOutcome::Cancelled) | None => {
                println!("cancelled");
                return Ok(());
            }
            Some(FlowOutcome::Failed(message)) => bail!(message),
        }
    }
}

fn run_search(config: &AppConfig, guild: String, kind: NameKind, query: &str) -> Result<()> {
    let store = PrefStore::in_memory(Prefs::default());
    let (mut session, events) = start_session(config, guild, store)?;
    let q = name_reference(query).unwrap_or(query.trim());
    let results = search_names(&mut session, &events, cli_timeout(config), kind, q)?;
    if results.hits.is_empty() {
        eprintln!("no matches for {q}");
    }
    for hit in &results.hits {
        println!("{}\t{}", hit.id, hit.label(kind));
    }
    Ok(())
}

fn run_preset(store: &mut PrefStore, cmd: PresetCommand) -> Result<()> {
    match cmd {
        PresetCommand::List => {
            let active = store.prefs().active_preset.as_deref();
            for name in presets::list(store.prefs()) {
                let mark = if active == Some(name) { '*' } else { ' ' };
                println!("{mark} {name}");
            }
        }
        PresetCommand::Save { name } => {
            store.update(|p| {
                let filter = p.filter.clone();
                presets::save(p, &name, &filter)
            })?;
            println!("saved {name}");
        }
        PresetCommand::Apply { name } => {
            store.update(|p| presets::apply(p, &name))?;
            println!("applied {name}");
        }
        PresetCommand::Delete { name, yes } => {
            store.update(|p| presets::delete(p, &name, yes))?;
            println!("deleted {name}");
        }
        PresetCommand::Import { name, file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            store.update(|p| presets::import(p, &name, &json))?;
            println!("imported {name}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Install a panic hook that writes to a file, since the fullscreen view
    // swallows stderr.
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        let msg = format!("{info}\n\n{backtrace}");
        let _ = std::fs::write("panic.log", &msg);
        eprintln!("{msg}");
    }));

    let cli = Cli::parse();

    // Set up tracing.
    if cli.debug {
        let file = std::fs::File::create("debug.log")?;
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
    }

    // Load config.
    let config = loader::load_config(cli.config.as_deref())?;
    let mut store = open_prefs();
    tracing::info!("modfeed starting");

    match cli.command {
        Commands::Preset(cmd) => run_preset(&mut store, cmd),
        Commands::Tail(mut args) => {
            let guild = guild_id(cli.guild, &config)?;
            resolve_filter_args(&config, &guild, &mut args)?;
            persist_filter(&mut store, &args);
            let (session, events) = start_session(&config, guild, store)?;
            let dir = std::env::current_dir().context("no current directory")?;
            App::new(session, events, dir).run()
        }
        Commands::Export {
            format,
            out,
            mut filter,
        } => {
            let guild = guild_id(cli.guild, &config)?;
            resolve_filter_args(&config, &guild, &mut filter)?;
            persist_filter(&mut store, &filter);
            run_export(&config, guild, store, format, out)
        }
        Commands::Event { log_id } => {
            let guild = guild_id(cli.guild, &config)?;
            run_event(&config, guild, store, &log_id)
        }
        Commands::Search { target, query } => {
            let guild = guild_id(cli.guild, &config)?;
            run_search(&config, guild, target.into(), &query)
        }
        Commands::Summary { window } => {
            let guild = guild_id(cli.guild, &config)?;
            run_summary(&config, guild, store, window)
        }
        Commands::Action {
            action,
            params,
            apply_without_dry_run,
        } => {
            let guild = guild_id(cli.guild, &config)?;
            run_action(&config, guild, store, &action, &params, apply_without_dry_run)
        }
    }
}
