use std::process;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use clipstack::config::{AppPaths, Settings};
use clipstack::daemon;
use clipstack::device::{write_item, SystemClipboard};
use clipstack::errors::{ClipError, Result};
use clipstack::history::HistoryManager;
use clipstack::item::{ClipKind, ClipboardItem};
use clipstack::queue::PasteQueue;
use clipstack::search::SearchCriteria;
use clipstack::store::SnapshotStore;

#[derive(Parser)]
#[command(name = "clipstack", version, about = "A local clipboard-history engine")]
struct Cli {
    /// Output results as JSON
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List history entries in canonical order
    List {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Filter by kind: text, url, rtf, html, image, files
        #[arg(short = 't', long)]
        r#type: Option<String>,

        /// Show only pinned entries
        #[arg(short, long)]
        pinned: bool,
    },

    /// Search history (supports type:, from:, to:, today, yesterday, ...)
    Search {
        /// Search query
        query: String,

        /// Maximum results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show a single item in full
    Get {
        /// Item id (a unique prefix is enough)
        id: String,
    },

    /// Write an item back to the system clipboard
    Copy {
        /// Item id (a unique prefix is enough)
        id: String,
    },

    /// Delete an item
    Delete {
        /// Item id (a unique prefix is enough)
        id: String,
    },

    /// Pin or unpin an item
    Pin {
        /// Item id (a unique prefix is enough)
        id: String,
    },

    /// Renumber pinned items into the given order
    ReorderPinned {
        /// Item ids, first becomes pin position 0
        ids: Vec<String>,
    },

    /// Remove unpinned entries (or everything with --all)
    Clear {
        /// Also clear pinned items, subject to the keep-pinned setting
        #[arg(long)]
        all: bool,
    },

    /// Apply the retention policy now
    Prune,

    /// Show history statistics
    Stats,

    /// Manage the paste queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Read or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Manage the clipboard watcher daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Queue a history item for later pasting
    Add {
        /// History item id (a unique prefix is enough)
        id: String,
    },
    /// List queued entries front to back
    List,
    /// Move entries to a new position
    Move {
        /// Source positions, 0-based
        #[arg(long, required = true, num_args = 1..)]
        from: Vec<usize>,
        /// Target position, 0-based
        #[arg(long)]
        to: usize,
    },
    /// Remove a queued entry
    Remove {
        /// Queue entry id (a unique prefix is enough)
        id: String,
    },
    /// Write the front entry to the clipboard
    PasteNext,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings
    Get,
    /// Change a setting: max-items, retention-days, keep-pinned-on-clear,
    /// auto-remove-after-paste
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start the clipboard watcher
    Start,
    /// Stop the clipboard watcher
    Stop,
    /// Check daemon status
    Status,
    /// Run watcher in foreground (used internally)
    #[command(hide = true)]
    Run,
}

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed: Option<usize>,
}

fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli) {
        if json {
            eprintln!("{}", serde_json::json!({"error": e.to_string()}));
        } else {
            eprintln!("error: {}", e);
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::new();
    let json = cli.json;

    match cli.command {
        None => cmd_list(&paths, 10, None, false, json),
        Some(Commands::List { limit, r#type, pinned }) => {
            let kind = match r#type.as_deref() {
                Some(name) => Some(
                    ClipKind::parse(name)
                        .ok_or_else(|| ClipError::InvalidInput(format!("unknown kind: {}", name)))?,
                ),
                None => None,
            };
            cmd_list(&paths, limit, kind, pinned, json)
        }
        Some(Commands::Search { query, limit }) => cmd_search(&paths, &query, limit, json),
        Some(Commands::Get { id }) => cmd_get(&paths, &id, json),
        Some(Commands::Copy { id }) => cmd_copy(&paths, &id, json),
        Some(Commands::Delete { id }) => cmd_delete(&paths, &id, json),
        Some(Commands::Pin { id }) => cmd_pin(&paths, &id, json),
        Some(Commands::ReorderPinned { ids }) => cmd_reorder_pinned(&paths, &ids, json),
        Some(Commands::Clear { all }) => cmd_clear(&paths, all, json),
        Some(Commands::Prune) => cmd_prune(&paths, json),
        Some(Commands::Stats) => cmd_stats(&paths, json),
        Some(Commands::Queue { action }) => cmd_queue(&paths, action, json),
        Some(Commands::Settings { action }) => cmd_settings(&paths, action, json),
        Some(Commands::Daemon { action }) => cmd_daemon(&paths, action, json),
    }
}

fn open_history(paths: &AppPaths) -> HistoryManager {
    let settings = Settings::load(&paths.settings_path);
    HistoryManager::open(
        SnapshotStore::new(paths.history_path.clone()),
        settings.max_items_limit,
        settings.retention_days,
    )
}

fn open_queue(paths: &AppPaths) -> PasteQueue {
    PasteQueue::open(SnapshotStore::new(paths.queue_path.clone()))
}

/// Resolve a full id or a unique id prefix against a set of ids.
fn resolve_id<'a, I>(ids: I, given: &str) -> Result<Uuid>
where
    I: Iterator<Item = &'a Uuid>,
{
    let needle = given.to_ascii_lowercase();
    let matches: Vec<Uuid> = ids
        .filter(|id| id.to_string().starts_with(&needle))
        .copied()
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(ClipError::NotFound(format!("item {}", given))),
        _ => Err(ClipError::InvalidInput(format!(
            "ambiguous id prefix: {}",
            given
        ))),
    }
}

fn resolve_item_id(history: &HistoryManager, given: &str) -> Result<Uuid> {
    resolve_id(history.items().iter().map(|item| &item.id), given)
}

fn print_status(message: String, removed: Option<usize>, success: bool, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string(&StatusResponse {
                success,
                message,
                removed,
            })
            .unwrap()
        );
    } else {
        println!("{}", message);
    }
}

fn cmd_list(
    paths: &AppPaths,
    limit: usize,
    kind: Option<ClipKind>,
    pinned_only: bool,
    json: bool,
) -> Result<()> {
    let history = open_history(paths);
    let items: Vec<&ClipboardItem> = history
        .items()
        .iter()
        .filter(|item| kind.map_or(true, |k| item.kind == k))
        .filter(|item| !pinned_only || item.is_pinned)
        .take(limit)
        .collect();

    if json {
        println!("{}", serde_json::to_string(&items).unwrap());
        return Ok(());
    }

    if items.is_empty() {
        println!("No items found.");
        return Ok(());
    }

    for item in items {
        print_item_row(item);
    }
    Ok(())
}

fn cmd_search(paths: &AppPaths, query: &str, limit: usize, json: bool) -> Result<()> {
    let history = open_history(paths);
    let criteria = SearchCriteria::parse(query);
    let hits: Vec<&ClipboardItem> = history.search(&criteria).into_iter().take(limit).collect();

    if json {
        println!("{}", serde_json::to_string(&hits).unwrap());
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results for \"{}\".", query);
        return Ok(());
    }

    for item in hits {
        print_item_row(item);
    }
    Ok(())
}

fn cmd_get(paths: &AppPaths, id: &str, json: bool) -> Result<()> {
    let history = open_history(paths);
    let id = resolve_item_id(&history, id)?;
    let item = history
        .get(id)
        .ok_or_else(|| ClipError::NotFound(format!("item {}", id)))?;

    if json {
        println!("{}", serde_json::to_string(item).unwrap());
        return Ok(());
    }

    print_item_detail(item);
    Ok(())
}

fn cmd_copy(paths: &AppPaths, id: &str, json: bool) -> Result<()> {
    let mut history = open_history(paths);
    let id = resolve_item_id(&history, id)?;
    let item = history
        .get(id)
        .ok_or_else(|| ClipError::NotFound(format!("item {}", id)))?
        .clone();

    let mut device = SystemClipboard::new()?;
    let written = write_item(&mut device, &item)?;
    let message = if written {
        // A re-copy counts as a fresh observation of the same content.
        history.insert_or_refresh(item.clone());
        format!("Copied {} item {} to clipboard.", item.kind.as_str(), short_id(&id))
    } else {
        format!("Item {} has no usable payload.", short_id(&id))
    };

    print_status(message, None, written, json);
    Ok(())
}

fn cmd_delete(paths: &AppPaths, id: &str, json: bool) -> Result<()> {
    let mut history = open_history(paths);
    let id = resolve_item_id(&history, id)?;
    let found = history.remove(id);
    let message = if found {
        format!("Deleted item {}.", short_id(&id))
    } else {
        format!("Item {} not found.", short_id(&id))
    };
    print_status(message, None, found, json);
    Ok(())
}

fn cmd_pin(paths: &AppPaths, id: &str, json: bool) -> Result<()> {
    let mut history = open_history(paths);
    let id = resolve_item_id(&history, id)?;
    let pinned = history.toggle_pin(id)?;
    let message = if pinned {
        format!("Pinned item {}.", short_id(&id))
    } else {
        format!("Unpinned item {}.", short_id(&id))
    };
    print_status(message, None, true, json);
    Ok(())
}

fn cmd_reorder_pinned(paths: &AppPaths, ids: &[String], json: bool) -> Result<()> {
    let mut history = open_history(paths);
    let resolved: Vec<Uuid> = ids
        .iter()
        .map(|given| resolve_item_id(&history, given))
        .collect::<Result<_>>()?;
    history.reorder_pinned(&resolved);
    print_status(format!("Reordered {} pinned item(s).", resolved.len()), None, true, json);
    Ok(())
}

fn cmd_clear(paths: &AppPaths, all: bool, json: bool) -> Result<()> {
    let settings = Settings::load(&paths.settings_path);
    let mut history = open_history(paths);
    let removed = if all {
        history.clear_all(settings.keep_pinned_on_clear)
    } else {
        history.clear_unpinned()
    };
    print_status(format!("Removed {} item(s).", removed), Some(removed), true, json);
    Ok(())
}

fn cmd_prune(paths: &AppPaths, json: bool) -> Result<()> {
    let settings = Settings::load(&paths.settings_path);
    let mut history = open_history(paths);
    let before = history.len();
    history.apply_retention_policy();
    let removed = before - history.len();
    let message = if settings.retention_days == 0 {
        "Retention is disabled.".to_string()
    } else {
        format!(
            "Removed {} item(s) older than {} days.",
            removed, settings.retention_days
        )
    };
    print_status(message, Some(removed), true, json);
    Ok(())
}

fn cmd_stats(paths: &AppPaths, json: bool) -> Result<()> {
    let history = open_history(paths);
    let stats = history.stats();
    let daemon_pid = daemon::daemon_status(paths).ok().flatten();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "total_items": history.len(),
                "copied_last_week": stats.copied_last_week,
                "most_copied_kind": stats.most_copied_kind.map(|(k, _)| k.as_str()),
                "most_copied_percentage": stats.most_copied_kind.map(|(_, p)| p),
                "oldest_item_age_days": stats.oldest_item_age_days,
                "daemon_running": daemon_pid.is_some(),
                "daemon_pid": daemon_pid,
            })
        );
        return Ok(());
    }

    println!("Clipboard Statistics");
    println!("────────────────────");
    println!("Total items:     {}", history.len());
    println!("Copied this week: {}", stats.copied_last_week);
    match stats.most_copied_kind {
        Some((kind, pct)) => println!("Most copied:     {} ({}%)", kind.display_name(), pct),
        None => println!("Most copied:     no data yet"),
    }
    match stats.oldest_item_age_days {
        Some(days) => println!("Oldest item:     {} day(s) ago", days),
        None => println!("Oldest item:     no data yet"),
    }
    match daemon_pid {
        Some(pid) => println!("Daemon:          running (pid {})", pid),
        None => println!("Daemon:          not running"),
    }
    Ok(())
}

fn cmd_queue(paths: &AppPaths, action: QueueAction, json: bool) -> Result<()> {
    match action {
        QueueAction::Add { id } => {
            let history = open_history(paths);
            let id = resolve_item_id(&history, &id)?;
            let item = history
                .get(id)
                .ok_or_else(|| ClipError::NotFound(format!("item {}", id)))?
                .clone();
            let mut queue = open_queue(paths);
            queue.enqueue(item, Some(id));
            print_status(
                format!("Queued item {} (position {}).", short_id(&id), queue.len() - 1),
                None,
                true,
                json,
            );
            Ok(())
        }
        QueueAction::List => {
            let queue = open_queue(paths);
            if json {
                println!("{}", serde_json::to_string(queue.entries()).unwrap());
                return Ok(());
            }
            if queue.is_empty() {
                println!("Paste queue is empty.");
                return Ok(());
            }
            for (position, entry) in queue.entries().iter().enumerate() {
                println!(
                    "{:>3} {} {:>6}  {}",
                    position,
                    short_id(&entry.id),
                    format_age(entry.added_at),
                    entry.item.preview_text()
                );
            }
            Ok(())
        }
        QueueAction::Move { from, to } => {
            let mut queue = open_queue(paths);
            queue.move_items(&from, to);
            print_status(format!("Moved {} entr(ies).", from.len()), None, true, json);
            Ok(())
        }
        QueueAction::Remove { id } => {
            let mut queue = open_queue(paths);
            let id = resolve_id(queue.entries().iter().map(|e| &e.id), &id)?;
            let removed = queue.remove_entry(id);
            print_status(
                format!("Removed queue entry {}.", short_id(&id)),
                None,
                removed,
                json,
            );
            Ok(())
        }
        QueueAction::PasteNext => {
            let settings = Settings::load(&paths.settings_path);
            let mut queue = open_queue(paths);
            let mut device = SystemClipboard::new()?;
            match queue.paste_next(&mut device, settings.auto_remove_after_paste)? {
                Some(entry) => {
                    print_status(
                        format!("Pasted \"{}\".", entry.item.preview_text()),
                        None,
                        true,
                        json,
                    );
                }
                None => print_status("Paste queue is empty.".into(), None, false, json),
            }
            Ok(())
        }
    }
}

fn cmd_settings(paths: &AppPaths, action: SettingsAction, json: bool) -> Result<()> {
    match action {
        SettingsAction::Get => {
            let settings = Settings::load(&paths.settings_path);
            if json {
                println!("{}", serde_json::to_string(&settings).unwrap());
                return Ok(());
            }
            println!("max-items:              {}", settings.max_items_limit);
            println!("retention-days:         {}", settings.retention_days);
            println!("keep-pinned-on-clear:   {}", settings.keep_pinned_on_clear);
            println!("auto-remove-after-paste: {}", settings.auto_remove_after_paste);
            Ok(())
        }
        SettingsAction::Set { key, value } => {
            let mut settings = Settings::load(&paths.settings_path);
            match key.as_str() {
                "max-items" => {
                    let parsed: u32 = value
                        .parse()
                        .map_err(|_| ClipError::InvalidInput(format!("not a number: {}", value)))?;
                    settings.set_max_items(parsed);
                }
                "retention-days" => {
                    let parsed: u32 = value
                        .parse()
                        .map_err(|_| ClipError::InvalidInput(format!("not a number: {}", value)))?;
                    settings.set_retention_days(parsed);
                }
                "keep-pinned-on-clear" => {
                    settings.keep_pinned_on_clear = parse_bool(&value)?;
                }
                "auto-remove-after-paste" => {
                    settings.auto_remove_after_paste = parse_bool(&value)?;
                }
                other => {
                    return Err(ClipError::InvalidInput(format!("unknown setting: {}", other)))
                }
            }
            settings.save(&paths.settings_path);
            print_status(format!("Set {} = {}.", key, value), None, true, json);
            Ok(())
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => Err(ClipError::InvalidInput(format!("not a boolean: {}", other))),
    }
}

fn cmd_daemon(paths: &AppPaths, action: DaemonAction, json: bool) -> Result<()> {
    match action {
        DaemonAction::Start => {
            if let Ok(Some(pid)) = daemon::daemon_status(paths) {
                print_status(format!("Daemon already running (pid {}).", pid), None, true, json);
                return Ok(());
            }

            let exe =
                std::env::current_exe().map_err(|e| ClipError::Daemon(e.to_string()))?;
            std::fs::create_dir_all(&paths.base_dir)
                .map_err(|e| ClipError::Daemon(e.to_string()))?;
            let log_file = std::fs::File::create(&paths.log_file)
                .map_err(|e| ClipError::Daemon(e.to_string()))?;

            let child = std::process::Command::new(exe)
                .args(["daemon", "run"])
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::from(log_file))
                .spawn()
                .map_err(|e| ClipError::Daemon(e.to_string()))?;

            print_status(
                format!("Started clipboard watcher (pid {}).", child.id()),
                None,
                true,
                json,
            );
            Ok(())
        }
        DaemonAction::Stop => {
            let stopped = daemon::stop_daemon(paths)?;
            let message = if stopped {
                "Stopped clipboard watcher."
            } else {
                "Daemon is not running."
            };
            print_status(message.into(), None, stopped, json);
            Ok(())
        }
        DaemonAction::Status => {
            let pid = daemon::daemon_status(paths)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({"running": pid.is_some(), "pid": pid})
                );
            } else {
                match pid {
                    Some(pid) => println!("Daemon running (pid {}).", pid),
                    None => println!("Daemon is not running."),
                }
            }
            Ok(())
        }
        DaemonAction::Run => daemon::run_watcher(paths),
    }
}

fn short_id(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn print_item_row(item: &ClipboardItem) {
    let kind_icon = match item.kind {
        ClipKind::Text => "T",
        ClipKind::Url => "U",
        ClipKind::Rtf => "R",
        ClipKind::Html => "H",
        ClipKind::Image => "I",
        ClipKind::Files => "F",
    };
    let pin = if item.is_pinned { "*" } else { " " };

    let preview = {
        let oneline = item.preview_text().replace('\n', "\\n");
        if oneline.len() > 60 {
            let cut: String = oneline.chars().take(57).collect();
            format!("{}...", cut)
        } else {
            oneline
        }
    };

    println!(
        "{} {}{} {:>6}  {}",
        short_id(&item.id),
        kind_icon,
        pin,
        format_age(item.copied_at),
        preview
    );
}

fn print_item_detail(item: &ClipboardItem) {
    println!("ID:      {}", item.id);
    println!("Kind:    {}", item.kind.display_name());
    println!("Pinned:  {}", item.is_pinned);
    if let Some(order) = item.pinned_order {
        println!("Order:   {}", order);
    }
    println!("Copied:  {}", item.copied_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(title) = &item.url_title {
        println!("Title:   {}", title);
    }
    if let Some(thumb) = &item.url_thumbnail {
        println!("Thumb:   {} bytes", thumb.len());
    }
    if let Some(data) = &item.raw_data {
        println!("Payload: {}", format_bytes(data.len()));
    }
    println!("─────────────────────────");
    match &item.file_paths {
        Some(paths) => {
            for path in paths {
                println!("{}", path);
            }
        }
        None => println!("{}", item.display_text),
    }
}

fn format_age(dt: chrono::DateTime<Utc>) -> String {
    let dur = Utc::now() - dt;
    if dur.num_seconds() < 60 {
        "now".to_string()
    } else if dur.num_minutes() < 60 {
        format!("{}m", dur.num_minutes())
    } else if dur.num_hours() < 24 {
        format!("{}h", dur.num_hours())
    } else {
        format!("{}d", dur.num_days())
    }
}

fn format_bytes(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
