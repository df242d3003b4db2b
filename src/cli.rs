use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{NaiveDate, NaiveTime};
use clap::{ArgAction, Args, Parser, Subcommand};

use crate::autosave::{AutoSaver, AUTO_SAVE_QUIET_PERIOD};
use crate::clock::{Clock, SystemClock, UuidIds};
use crate::commands::{self, CommandCtx, CommandResult};
use crate::events::{Notice, NoticeLevel, Notifier, StatePayload, EVENT_STATE_UPDATED};
use crate::format::{format_due, format_relative, priority_label};
use crate::models::{iso, Category, Priority, Profile, Task, TaskDraft, TaskPatch};
use crate::query::{is_overdue, SortMode, StatusFilter};
use crate::state::AppState;
use crate::storage::{write_atomic, FileStore, Persistence};
use crate::{config, logging};

#[derive(Parser, Debug)]
#[command(name = "todo-list", version, about = "Local-first task list")]
pub struct Cli {
    /// Directory holding tasks, profile and logs.
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a task.
    Add(AddArgs),
    /// Change fields of an existing task.
    Edit(EditArgs),
    /// Flip a task between pending and completed.
    Toggle { id: String },
    /// Delete a task.
    Rm { id: String },
    /// Copy a task as a new pending task.
    Dup { id: String },
    /// Show the filtered and sorted list.
    List(ListArgs),
    /// Show totals over all tasks.
    Stats,
    /// Write every task to a dated JSON file.
    Export {
        #[arg(long = "out", default_value = ".")]
        out: PathBuf,
    },
    /// Merge tasks from an exported JSON file.
    Import { file: PathBuf },
    /// Write the collection now instead of waiting for auto-save.
    Save,
    /// Show, update or clear the profile.
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub name: String,
    #[arg(short, long, default_value_t = Priority::Medium)]
    pub priority: Priority,
    #[arg(short, long, default_value_t = Category::Personal)]
    pub category: Category,
    /// YYYY-MM-DD
    #[arg(long, value_parser = parse_date)]
    pub due: Option<NaiveDate>,
    /// HH:MM, only kept together with --due
    #[arg(long, value_parser = parse_time)]
    pub time: Option<NaiveTime>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(short, long)]
    pub priority: Option<Priority>,
    #[arg(short, long)]
    pub category: Option<Category>,
    #[arg(long, value_parser = parse_date, conflicts_with = "clear_due")]
    pub due: Option<NaiveDate>,
    #[arg(long, value_parser = parse_time, conflicts_with = "clear_due")]
    pub time: Option<NaiveTime>,
    /// Remove the due date and time.
    #[arg(long)]
    pub clear_due: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(short, long)]
    pub filter: Option<StatusFilter>,
    #[arg(short, long)]
    pub sort: Option<SortMode>,
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    Show,
    Set(ProfileArgs),
    Clear,
}

#[derive(Args, Debug)]
pub struct ProfileArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub avatar: Option<String>,
    #[arg(long)]
    pub theme: Option<String>,
    #[arg(long)]
    pub show_welcome: Option<bool>,
    #[arg(long)]
    pub sound_notifications: Option<bool>,
    #[arg(long)]
    pub auto_save: Option<bool>,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    iso::parse_date(raw.trim()).map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    iso::parse_time(raw.trim()).map_err(|err| format!("expected HH:MM: {err}"))
}

/// Prints notices to stderr so stdout stays machine-friendly.
struct ConsoleCtx;

impl Notifier for ConsoleCtx {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
            NoticeLevel::Success | NoticeLevel::Info => eprintln!("{}", notice.message),
        }
    }
}

impl CommandCtx for ConsoleCtx {
    fn emit_state_updated(&self, payload: StatePayload) {
        log::debug!(
            "cli: {EVENT_STATE_UPDATED} visible={} total={}",
            payload.tasks.len(),
            payload.stats.total
        );
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = config::resolve_data_dir(cli.data_dir.as_deref())?;
    logging::init_logging(&data_dir, cli.verbose).context("failed to initialize logging")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(execute(cli.command, data_dir))
}

async fn execute(command: Command, data_dir: PathBuf) -> anyhow::Result<()> {
    let files = FileStore::new(data_dir);
    files.ensure_dirs()?;
    log::info!("cli: data_dir={}", files.root().display());

    let ctx = Arc::new(ConsoleCtx);
    let persistence = Arc::new(Persistence::new(Box::new(files), ctx.clone()));
    let writer = persistence.clone();
    let saver = AutoSaver::spawn(AUTO_SAVE_QUIET_PERIOD, true, move |tasks: &[Task]| {
        writer.save_tasks(tasks)
    });
    let state = AppState::open(
        persistence,
        saver.handle(),
        Arc::new(SystemClock),
        Box::new(UuidIds),
    );

    let outcome = dispatch(ctx.as_ref(), &state, command);
    saver.shutdown().await;
    outcome
}

fn dispatch(ctx: &ConsoleCtx, state: &AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Add(args) => {
            let mut draft = TaskDraft::new(args.name)
                .priority(args.priority)
                .category(args.category);
            if let Some(due) = args.due {
                draft = draft.due(due, args.time);
            }
            let task = into_result(commands::create_task(ctx, state, draft))?;
            println!("{}", task.id);
        }
        Command::Edit(args) => {
            let patch = edit_patch(&args);
            if patch.is_empty() {
                return Err(anyhow!("nothing to change"));
            }
            let task = into_result(commands::update_task(ctx, state, args.id, patch))?;
            print_task(&task);
        }
        Command::Toggle { id } => {
            let task = into_result(commands::toggle_task(ctx, state, id))?;
            print_task(&task);
        }
        Command::Rm { id } => {
            into_result(commands::delete_task(ctx, state, id))?;
        }
        Command::Dup { id } => {
            let task = into_result(commands::duplicate_task(ctx, state, id))?;
            println!("{}", task.id);
        }
        Command::List(args) => {
            if let Some(search) = args.search {
                into_result(commands::set_search(ctx, state, search))?;
            }
            if let Some(filter) = args.filter {
                into_result(commands::set_filter(ctx, state, filter))?;
            }
            if let Some(sort) = args.sort {
                into_result(commands::set_sort(ctx, state, sort))?;
            }
            let payload = into_result(commands::load_state(ctx, state))?;
            for task in &payload.tasks {
                print_task(task);
            }
            println!("{}", payload.task_count);
        }
        Command::Stats => {
            let stats = into_result(commands::query_state(state))?.stats;
            println!("total:           {}", stats.total);
            println!("completed:       {}", stats.completed);
            println!("pending:         {}", stats.pending);
            println!("overdue:         {}", stats.overdue);
            println!("completion rate: {}%", stats.completion_rate);
            println!("days active:     {}", stats.days_active);
        }
        Command::Export { out } => {
            let file = into_result(commands::export_tasks(ctx, state))?;
            let path = out.join(&file.filename);
            write_export(&path, &file.contents)?;
            println!("{}", path.display());
        }
        Command::Import { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let report = into_result(commands::import_tasks(ctx, state, contents))?;
            println!(
                "added={} skipped={} rejected={}",
                report.added, report.skipped, report.rejected
            );
        }
        Command::Save => {
            let count = into_result(commands::save_now(state))?;
            println!("saved {count} tasks");
        }
        Command::Profile(ProfileCommand::Show) => {
            let profile = into_result(commands::load_profile(state))?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Profile(ProfileCommand::Set(args)) => {
            let profile = apply_profile_args(into_result(commands::load_profile(state))?, args);
            into_result(commands::save_profile(ctx, state, profile))?;
        }
        Command::Profile(ProfileCommand::Clear) => {
            into_result(commands::clear_profile(ctx, state))?;
        }
    }
    Ok(())
}

fn into_result<T>(result: CommandResult<T>) -> anyhow::Result<T> {
    match (result.ok, result.data) {
        (true, Some(data)) => Ok(data),
        _ => Err(anyhow!(result
            .error
            .unwrap_or_else(|| "command failed".to_string()))),
    }
}

fn edit_patch(args: &EditArgs) -> TaskPatch {
    let (due_date, due_time) = if args.clear_due {
        (Some(None), Some(None))
    } else {
        (args.due.map(Some), args.time.map(Some))
    };
    TaskPatch {
        name: args.name.clone(),
        priority: args.priority,
        category: args.category,
        due_date,
        due_time,
    }
}

fn apply_profile_args(mut profile: Profile, args: ProfileArgs) -> Profile {
    if let Some(name) = args.name {
        profile.name = name;
    }
    if let Some(email) = args.email {
        profile.email = email;
    }
    if let Some(avatar) = args.avatar {
        profile.avatar = avatar;
    }
    if let Some(theme) = args.theme {
        profile.theme = theme;
    }
    if let Some(show_welcome) = args.show_welcome {
        profile.show_welcome = show_welcome;
    }
    if let Some(sound) = args.sound_notifications {
        profile.sound_notifications = sound;
    }
    if let Some(auto_save) = args.auto_save {
        profile.auto_save = auto_save;
    }
    profile
}

fn write_export(path: &Path, contents: &str) -> anyhow::Result<()> {
    write_atomic(path, contents.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))
}

fn print_task(task: &Task) {
    let clock = SystemClock;
    let mark = if task.completed {
        "x"
    } else if is_overdue(task, clock.local_now()) {
        "!"
    } else {
        " "
    };
    let due = task
        .due_date
        .map(|date| format!("  due {}", format_due(date, task.due_time)))
        .unwrap_or_default();
    println!(
        "[{mark}] {}  {}  {}  {}{due}  ({})",
        task.id,
        task.name,
        priority_label(task.priority),
        task.category,
        format_relative(task.created_at, clock.now())
    );
}
