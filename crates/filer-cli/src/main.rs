//! filer — a headless driver for the filer window controller.
//!
//! Opens windows on directories, pumps their change batches and the
//! thumbnail queue, and prints what each window would show.

mod args;
mod listing;
mod watcher;

use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use filer_core::window::{SelectionTarget, SessionId, SessionState};
use filer_core::{Config, FilerContext, ScanMode, WindowManager};
use tracing_subscriber::EnvFilter;

use crate::args::{Cli, Command, GroupCommand};
use crate::watcher::{DirWatcher, WatchMessage};

/// Returns the default config file (~/.config/filer/config.toml).
fn default_config_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
        .join(".config")
        .join("filer")
        .join("config.toml")
}

/// Loads `path` if given, else the default file if it exists, else the
/// built-in defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let default = default_config_path();
            if default.exists() {
                Config::load(&default)
                    .with_context(|| format!("failed to load config from {}", default.display()))
            } else {
                Ok(Config::default())
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Ls {
            dirs,
            show_hidden,
            show_thumbs,
        } => list_dirs(config, &dirs, show_hidden, show_thumbs),
        Command::Watch { dir, show_hidden } => watch_dir(config, &dir, show_hidden).await,
        Command::Group { action } => match action {
            GroupCommand::Save { name, dir, leaves } => save_group(config, &name, &dir, &leaves),
            GroupCommand::Restore { name } => restore_group(config, &name),
        },
    }
}

/// Opens a window on `dir` and waits for its first scan.
fn open(wm: &mut WindowManager, dir: &str) -> anyhow::Result<SessionId> {
    let id = wm
        .open_dir(dir, None)
        .with_context(|| format!("cannot open {dir}"))?;
    wm.pump(id)?;
    Ok(id)
}

/// Generates every queued thumbnail for `id`.
fn drain_thumbnails(wm: &mut WindowManager, id: SessionId) -> anyhow::Result<()> {
    while let Some(progress) = wm.next_thumb(id)? {
        tracing::debug!(
            "thumbnails {}/{} ({:.0}%)",
            progress.done,
            progress.total,
            progress.fraction() * 100.0
        );
    }
    wm.pump(id)?;
    Ok(())
}

fn print_window(wm: &WindowManager, id: SessionId) -> anyhow::Result<()> {
    let title = wm.title(id)?;
    let items = wm.visible_items(id)?;
    print!("{}", listing::render(&title, &items));
    Ok(())
}

fn list_dirs(
    config: Config,
    dirs: &[String],
    show_hidden: bool,
    show_thumbs: bool,
) -> anyhow::Result<()> {
    let ctx = FilerContext::from_config(config, ScanMode::Inline)?;
    let mut wm = ctx.window_manager();

    for (i, dir) in dirs.iter().enumerate() {
        let Ok(id) = open(&mut wm, dir) else {
            continue;
        };
        wm.set_show_hidden(id, show_hidden)?;
        wm.set_show_thumbs(id, show_thumbs)?;
        drain_thumbnails(&mut wm, id)?;
        if i > 0 {
            println!();
        }
        print_window(&wm, id)?;
    }
    Ok(())
}

async fn watch_dir(config: Config, dir: &str, show_hidden: bool) -> anyhow::Result<()> {
    let mode = ScanMode::Background(tokio::runtime::Handle::current());
    let ctx = FilerContext::from_config(config, mode)?;
    let mut wm = ctx.window_manager();
    let id = wm
        .open_dir(dir, None)
        .with_context(|| format!("cannot open {dir}"))?;
    wm.set_show_hidden(id, show_hidden)?;

    let (tx, rx) = std_mpsc::channel();
    let mut watcher = DirWatcher::new(tx)?;
    let real = wm
        .session(id)
        .map(|s| s.real_path().to_path_buf())
        .context("window closed")?;
    watcher.watch(&real)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut tick = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = tick.tick() => {
                while let Ok(msg) = rx.try_recv() {
                    match msg {
                        WatchMessage::Changed(dirs) => {
                            tracing::debug!("changed: {dirs:?}");
                            if !wm.update_dir(id, true)? {
                                return Ok(());
                            }
                        }
                        WatchMessage::Error(e) => tracing::warn!("watch error: {e}"),
                    }
                }

                let idle = |wm: &WindowManager| {
                    wm.session(id).is_some_and(|s| s.state() == SessionState::Idle)
                };
                if wm.pump(id)? > 0 && idle(&wm) {
                    drain_thumbnails(&mut wm, id)?;
                    print_window(&wm, id)?;
                    println!();
                }
            }
        }
    }

    watcher.unwatch(&real);
    wm.close(id)?;
    Ok(())
}

fn save_group(config: Config, name: &str, dir: &str, leaves: &[String]) -> anyhow::Result<()> {
    let ctx = FilerContext::from_config(config, ScanMode::Inline)?;
    let mut wm = ctx.window_manager();
    let id = open(&mut wm, dir)?;

    for leaf in leaves {
        if !wm.select(id, leaf)? {
            tracing::warn!("{leaf} is not in {dir}");
        }
    }
    wm.group_save(id, name)?;
    println!("{}", wm.selection_text(id, SelectionTarget::Text)?);
    Ok(())
}

fn restore_group(config: Config, name: &str) -> anyhow::Result<()> {
    let ctx = FilerContext::from_config(config, ScanMode::Inline)?;
    let mut wm = ctx.window_manager();
    let directory = wm
        .groups()
        .get(name)
        .map(|g| g.directory.clone())
        .with_context(|| format!("group {name} is not set"))?;

    let id = open(&mut wm, &directory)?;
    wm.group_restore(id, name)?;
    wm.pump(id)?;
    for path in wm.selected_paths(id)? {
        println!("{}", path.display());
    }
    Ok(())
}
