use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app::{shutdown_signal, App};
use crate::clipboard::{create_adapter, ClipboardAdapter};
use crate::config::Config;
use crate::history::{ClipboardHistory, ClipboardRecord, ContentType, SearchQuery};
use crate::monitor::copy_to_clipboard;
use crate::ocr::{create_recognizer, OcrAdapter};

#[derive(Parser)]
#[command(name = "cliptrail")]
#[command(about = "Clipboard history service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Watch the clipboard and record history")]
    Run,

    #[command(about = "Stop the running monitor")]
    Stop,

    #[command(about = "Show clipboard history")]
    History {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    #[command(about = "Search clipboard history")]
    Search {
        keyword: String,

        #[arg(short = 't', long = "type")]
        content_type: Option<ContentType>,

        #[arg(short, long)]
        favorites: bool,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    #[command(about = "Show one history record")]
    Show { id: String },

    #[command(about = "Delete one history record")]
    Delete { id: String },

    #[command(about = "Toggle the favorite flag of a record")]
    Favorite { id: String },

    #[command(about = "Clear non-favorite history")]
    Clear {
        #[arg(long, conflicts_with = "all")]
        older_than: Option<u32>,

        #[arg(long)]
        all: bool,
    },

    #[command(about = "Show history statistics")]
    Stats,

    #[command(about = "Put a history record back on the clipboard")]
    Copy { id: String },

    #[command(about = "Manage user scripts")]
    Scripts {
        #[command(subcommand)]
        action: ScriptAction,
    },

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ScriptAction {
    #[command(about = "List scripts in run order")]
    List,

    #[command(about = "Enable a script")]
    Enable { id: String },

    #[command(about = "Disable a script")]
    Disable { id: String },

    #[command(about = "Remove a script")]
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Generate example configuration")]
    Init {
        #[arg(long)]
        force: bool,
    },
}

pub struct CliHandler {
    config: Config,
    config_path: Option<PathBuf>,
    history: Option<Arc<ClipboardHistory>>,
}

impl CliHandler {
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
            history: None,
        }
    }

    /// Lazily open the history database when needed
    async fn ensure_history(&mut self) -> Result<Arc<ClipboardHistory>> {
        if let Some(history) = &self.history {
            return Ok(Arc::clone(history));
        }

        info!("Opening history database");
        let history = Arc::new(
            ClipboardHistory::new(&self.config.storage.database)
                .await
                .with_context(|| {
                    format!("Failed to open {:?}", self.config.storage.database)
                })?,
        );
        self.history = Some(Arc::clone(&history));
        Ok(history)
    }

    pub async fn handle_command(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Run => self.run().await,
            Commands::Stop => self.stop(),
            Commands::History { limit } => self.show_history(limit).await,
            Commands::Search {
                keyword,
                content_type,
                favorites,
                limit,
            } => {
                let mut query = SearchQuery::keyword(keyword).limit(limit);
                if let Some(content_type) = content_type {
                    query = query.with_type(content_type);
                }
                if favorites {
                    query = query.favorites_only();
                }
                self.search(query).await
            }
            Commands::Show { id } => self.show_record(&id).await,
            Commands::Delete { id } => {
                self.ensure_history().await?.delete_record(&id).await?;
                println!("Deleted {}", id);
                Ok(())
            }
            Commands::Favorite { id } => {
                let favorite = self.ensure_history().await?.toggle_favorite(&id).await?;
                println!(
                    "{} {}",
                    id,
                    if favorite { "marked as favorite" } else { "no longer a favorite" }
                );
                Ok(())
            }
            Commands::Clear { older_than, all } => self.clear(older_than, all).await,
            Commands::Stats => self.show_stats().await,
            Commands::Copy { id } => self.copy(&id).await,
            Commands::Scripts { action } => self.handle_script_action(action).await,
            Commands::Config { action } => self.handle_config_action(action),
        }
    }

    async fn run(&mut self) -> Result<()> {
        info!("Starting ClipTrail v{}", crate::VERSION);

        #[cfg(unix)]
        let _pidfile = crate::daemon::PidFile::acquire(crate::daemon::get_pidfile_path()?)?;

        let adapter: Arc<dyn ClipboardAdapter> = Arc::from(create_adapter()?);
        let recognizer: Arc<dyn OcrAdapter> = Arc::from(create_recognizer(&self.config.ocr));
        info!(
            "Using {} clipboard and {} recognizer",
            adapter.name(),
            recognizer.name()
        );

        let app = App::new(self.config.clone(), adapter, recognizer).await?;

        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal_token.cancel();
        });

        app.run(shutdown).await?;
        info!("ClipTrail stopped");
        Ok(())
    }

    #[cfg(unix)]
    fn stop(&self) -> Result<()> {
        let path = crate::daemon::get_pidfile_path()?;
        if crate::daemon::stop_running(&path)? {
            println!("ClipTrail stopped");
        } else {
            println!("ClipTrail is not running");
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn stop(&self) -> Result<()> {
        Err(anyhow!("Stopping a running monitor is only supported on unix"))
    }

    async fn show_history(&mut self, limit: usize) -> Result<()> {
        let records = self.ensure_history().await?.get_records(limit).await?;

        if records.is_empty() {
            println!("No clipboard history found");
            return Ok(());
        }

        println!("Clipboard History (showing {} entries):", records.len());
        print_records(&records);
        Ok(())
    }

    async fn search(&mut self, query: SearchQuery) -> Result<()> {
        let records = self.ensure_history().await?.search(&query).await?;

        if records.is_empty() {
            println!("No matches for \"{}\"", query.keyword);
            return Ok(());
        }

        println!("Found {} entries:", records.len());
        print_records(&records);
        Ok(())
    }

    async fn show_record(&mut self, id: &str) -> Result<()> {
        let history = self.ensure_history().await?;
        let record = history.get_record(id).await?;

        println!("ID:        {}", record.id);
        println!("Type:      {}", record.content_type);
        println!("Copied:    {}", local_time(&record));
        println!("Source:    {}", record.source);
        println!("Favorite:  {}", if record.is_favorite { "yes" } else { "no" });

        match record.content_type {
            ContentType::Image => {
                println!("Image:     {}", record.content);
                if let Some(png) = &record.image_data {
                    println!("PNG bytes: {}", png.len());
                }
            }
            ContentType::File => {
                println!("Files:     {}", record.content);
                for info in history.file_info(id).await? {
                    let marker = if info.exists { "" } else { " (missing)" };
                    println!("  {}{}", info.path, marker);
                }
            }
            _ => {
                println!("Chars:     {}", record.char_count);
                println!("Words:     {}", record.word_count);
                println!();
                println!("{}", record.content);
            }
        }

        if !record.ocr_text.is_empty() {
            println!();
            println!("Recognized text:");
            println!("{}", record.ocr_text);
        }

        Ok(())
    }

    async fn clear(&mut self, older_than: Option<u32>, all: bool) -> Result<()> {
        let history = self.ensure_history().await?;

        let removed = match (older_than, all) {
            (Some(days), _) => history.clear_older_than(days).await?,
            (None, true) => history.clear_all().await?,
            (None, false) => {
                return Err(anyhow!("Pass --older-than <DAYS> or --all"));
            }
        };

        println!("Removed {} records (favorites kept)", removed);
        Ok(())
    }

    async fn show_stats(&mut self) -> Result<()> {
        let stats = self.ensure_history().await?.statistics().await?;

        println!("ClipTrail Statistics:");
        println!("  Total records: {}", stats.total_count);
        println!("  Copied today:  {}", stats.today_count);
        for (content_type, count) in &stats.type_counts {
            println!("  {:<13} {}", format!("{}:", content_type), count);
        }
        Ok(())
    }

    async fn copy(&mut self, id: &str) -> Result<()> {
        let history = self.ensure_history().await?;
        let adapter = create_adapter()?;
        let content_type = copy_to_clipboard(&history, adapter.as_ref(), id).await?;
        println!("Copied {} record to clipboard", content_type);
        Ok(())
    }

    async fn handle_script_action(&mut self, action: ScriptAction) -> Result<()> {
        let history = self.ensure_history().await?;

        match action {
            ScriptAction::List => {
                let scripts = history.scripts().await?;
                if scripts.is_empty() {
                    println!("No scripts installed");
                }
                for script in scripts {
                    println!(
                        "[{}] {} {} ({}) {}",
                        if script.enabled { "x" } else { " " },
                        script.id,
                        script.name,
                        script.trigger,
                        script.description
                    );
                }
            }
            ScriptAction::Enable { id } => {
                set_script_enabled(&history, &id, true).await?;
                println!("Enabled {}", id);
            }
            ScriptAction::Disable { id } => {
                set_script_enabled(&history, &id, false).await?;
                println!("Disabled {}", id);
            }
            ScriptAction::Remove { id } => {
                history.delete_script(&id).await?;
                println!("Removed {}", id);
            }
        }
        Ok(())
    }

    fn handle_config_action(&self, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                println!("Current Configuration:");
                println!(
                    "{}",
                    toml::to_string_pretty(&self.config).context("Failed to render config")?
                );
            }
            ConfigAction::Init { force } => {
                let path = self
                    .config_path
                    .clone()
                    .or_else(Config::default_path)
                    .ok_or_else(|| anyhow!("Could not determine config directory"))?;
                Config::write_example(&path, force)?;
                println!("Example configuration written to {}", path.display());
            }
        }
        Ok(())
    }
}

async fn set_script_enabled(history: &ClipboardHistory, id: &str, enabled: bool) -> Result<()> {
    let mut script = history.get_script(id).await?;
    script.enabled = enabled;
    history.save_script(&mut script).await?;
    Ok(())
}

fn print_records(records: &[ClipboardRecord]) {
    for (i, record) in records.iter().enumerate() {
        println!(
            "{}. {} [{}] {:<6} {}{}",
            i + 1,
            record.id,
            local_time(record),
            record.content_type.as_str(),
            if record.is_favorite { "* " } else { "" },
            preview(&record.content, 50)
        );
    }
}

fn local_time(record: &ClipboardRecord) -> String {
    record
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// First line of `content`, cut to `max` characters
fn preview(content: &str, max: usize) -> String {
    let line = content.lines().next().unwrap_or_default();
    if line.chars().count() > max || line.len() < content.trim_end().len() {
        let cut: String = line.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
