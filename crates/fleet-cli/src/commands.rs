//! Command implementations.

use std::io::Write;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use fleet_models::{Document, ProjectConfig, TaskId, TaskList, WorkerBoard};
use fleet_store::{DocumentStore, LockId, LockState, ReadSource};

use crate::cli::{Cli, Commands, ProjectCommand, TaskCommand, WorkerCommand};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// First pause between retries; doubles on each further attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Longest pause between two retries.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub store: DocumentStore,
    pub owner: String,
    /// Age after which a lock may be reclaimed.
    pub timeout: Duration,
    /// Extra attempts after a contention failure.
    pub retries: u32,
}

impl Context {
    pub fn new(store: DocumentStore, owner: impl Into<String>) -> Self {
        let timeout = store.config().lock_timeout;
        Self {
            store,
            owner: owner.into(),
            timeout,
            retries: 0,
        }
    }

    pub fn from_cli(cli: &Cli) -> Self {
        let store = DocumentStore::new(cli.store_config());
        let mut ctx = Self::new(store, cli.owner());
        ctx.retries = cli.retries;
        ctx
    }

    /// Runs `op`, retrying on lock contention with exponential backoff.
    fn with_retries<T>(
        &self,
        mut op: impl FnMut() -> fleet_store::Result<T>,
    ) -> fleet_store::Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = retry_delay(attempt);
                    debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Document busy, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Typed read-modify-write as this context's owner, with retries.
    fn modify<D, R, F>(&self, mut mutate: F) -> fleet_store::Result<R>
    where
        D: Document,
        F: FnMut(&mut D) -> R,
    {
        self.with_retries(|| {
            self.store
                .modify::<D, _, _>(&self.owner, self.timeout, |doc| mutate(doc))
        })
    }
}

/// Pause before retry number `attempt + 1`.
fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY
        .checked_mul(2u32.saturating_pow(attempt))
        .map_or(RETRY_MAX_DELAY, |delay| delay.min(RETRY_MAX_DELAY))
}

/// Executes a CLI command, printing to stdout.
pub fn execute(command: Commands, ctx: &Context) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(command, ctx, &mut out)
}

/// Executes a CLI command, printing to `out`.
pub fn run(command: Commands, ctx: &Context, out: &mut dyn Write) -> Result<()> {
    match command {
        Commands::Get { name, source } => cmd_get(ctx, out, &name, source),
        Commands::Set { name, json } => cmd_set(ctx, out, &name, &json),
        Commands::Patch { name, key, json } => cmd_patch(ctx, out, &name, &key, &json),
        Commands::Lock { name } => cmd_lock(ctx, out, &name),
        Commands::Unlock { name, lock_id } => cmd_unlock(ctx, out, &name, &lock_id),
        Commands::LockStatus { name } => cmd_lock_status(ctx, out, &name),
        Commands::Backups { name } => cmd_backups(ctx, out, &name),
        Commands::Task(command) => cmd_task(ctx, out, command),
        Commands::Worker(command) => cmd_worker(ctx, out, command),
        Commands::Project(command) => cmd_project(ctx, out, command),
    }
}

fn cmd_get(ctx: &Context, out: &mut dyn Write, name: &str, show_source: bool) -> Result<()> {
    let outcome = ctx.store.safe_read(name)?;
    writeln!(out, "{}", serde_json::to_string_pretty(&outcome.value)?)?;
    if show_source {
        writeln!(out, "source: {}", describe_source(&outcome.source))?;
    }
    Ok(())
}

fn describe_source(source: &ReadSource) -> String {
    match source {
        ReadSource::Disk => "disk".to_string(),
        ReadSource::Missing => "missing (default)".to_string(),
        ReadSource::Repaired { fixes } => {
            let fixes: Vec<String> = fixes.iter().map(|f| f.to_string()).collect();
            format!("repaired ({})", fixes.join(", "))
        }
        ReadSource::Backup { path } => format!("restored from {}", path.display()),
        ReadSource::Default => "unrecoverable, default returned".to_string(),
    }
}

fn cmd_set(ctx: &Context, out: &mut dyn Write, name: &str, json: &str) -> Result<()> {
    let value: Value = serde_json::from_str(json)?;
    ctx.with_retries(|| {
        let lock_id = ctx.store.acquire(name, &ctx.owner, ctx.timeout)?;
        ctx.store.write(name, &value, &lock_id)
    })?;
    writeln!(out, "Wrote {}", name)?;
    Ok(())
}

fn cmd_patch(ctx: &Context, out: &mut dyn Write, name: &str, key: &str, json: &str) -> Result<()> {
    let patch: Value = serde_json::from_str(json)?;
    let patched = ctx.with_retries(|| {
        ctx.store.update_if(
            name,
            |mut current| {
                current.as_object_mut()?.insert(key.to_string(), patch.clone());
                Some(current)
            },
            &ctx.owner,
            ctx.timeout,
        )
    })?;
    if patched.is_none() {
        return Err(format!("{} is not a JSON object; use `set` instead", name).into());
    }
    writeln!(out, "Set {}.{}", name, key)?;
    Ok(())
}

fn cmd_lock(ctx: &Context, out: &mut dyn Write, name: &str) -> Result<()> {
    let lock_id = ctx.with_retries(|| ctx.store.acquire(name, &ctx.owner, ctx.timeout))?;
    writeln!(out, "{}", lock_id)?;
    Ok(())
}

fn cmd_unlock(ctx: &Context, out: &mut dyn Write, name: &str, lock_id: &str) -> Result<()> {
    if ctx.store.release(name, &LockId::from(lock_id))? {
        writeln!(out, "Released {}", name)?;
        Ok(())
    } else {
        Err(format!("{} is not the current lock on {}", lock_id, name).into())
    }
}

fn cmd_lock_status(ctx: &Context, out: &mut dyn Write, name: &str) -> Result<()> {
    match ctx.store.lock_status(name)? {
        None => writeln!(out, "{}: unlocked", name)?,
        Some(state) => {
            let stale = if state.age() >= ctx.timeout { " (stale)" } else { "" };
            match state {
                LockState::Held(record) => {
                    writeln!(out, "{}: locked by {}{}", name, record.owner_id, stale)?;
                    writeln!(out, "  Lock: {}", record.lock_id)?;
                    writeln!(out, "  PID: {}", record.pid)?;
                    writeln!(out, "  Acquired: {}", record.acquired_at.to_rfc3339())?;
                    writeln!(out, "  Age: {}ms", record.age().as_millis())?;
                }
                LockState::Unreadable { age } => {
                    writeln!(out, "{}: unreadable lock file{}", name, stale)?;
                    writeln!(out, "  Age: {}ms", age.as_millis())?;
                }
            }
        }
    }
    Ok(())
}

fn cmd_backups(ctx: &Context, out: &mut dyn Write, name: &str) -> Result<()> {
    let backups = ctx.store.backups(name)?;
    if backups.is_empty() {
        writeln!(out, "No backups of {}.", name)?;
        return Ok(());
    }
    for backup in &backups {
        let taken = DateTime::<Utc>::from_timestamp_micros(backup.timestamp)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| backup.timestamp.to_string());
        writeln!(out, "{}\t{}", taken, backup.path.display())?;
    }
    Ok(())
}

fn cmd_task(ctx: &Context, out: &mut dyn Write, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::Add { title } => {
            let id = ctx.modify(|tasks: &mut TaskList| tasks.add(title.clone()))?;
            writeln!(out, "{}", id)?;
        }
        TaskCommand::List { pending } => {
            let tasks: TaskList = ctx.store.load()?;
            let shown: Vec<_> = if pending {
                tasks.pending().collect()
            } else {
                tasks.tasks.iter().collect()
            };
            if shown.is_empty() {
                writeln!(out, "No tasks found.")?;
            }
            for task in shown {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    task.id,
                    task.status,
                    task.assignee.as_deref().unwrap_or("-"),
                    task.title
                )?;
            }
        }
        TaskCommand::Claim { id, worker } => {
            let worker = worker.unwrap_or_else(|| ctx.owner.clone());
            let claimed = ctx.modify(|tasks: &mut TaskList| tasks.claim(&id, &worker))?;
            if !claimed {
                return Err(format!("no pending task matches '{}'", id).into());
            }
            writeln!(out, "Claimed {} for {}", id, worker)?;
        }
        TaskCommand::Done { id } => {
            let done = ctx.modify(|tasks: &mut TaskList| tasks.complete(&id))?;
            if !done {
                return Err(format!("no task matches '{}'", id).into());
            }
            writeln!(out, "Completed {}", id)?;
        }
    }
    Ok(())
}

fn cmd_worker(ctx: &Context, out: &mut dyn Write, command: WorkerCommand) -> Result<()> {
    match command {
        WorkerCommand::Set {
            worker,
            state,
            task,
            message,
        } => {
            let task = task.map(TaskId::from);
            ctx.modify(|board: &mut WorkerBoard| {
                board.report(worker.clone(), state, task.clone(), message.clone())
            })?;
            writeln!(out, "{} is {}", worker, state)?;
        }
        WorkerCommand::Show => {
            let board: WorkerBoard = ctx.store.load()?;
            if board.workers.is_empty() {
                writeln!(out, "No workers reported.")?;
            }
            for (worker, status) in &board.workers {
                write!(out, "{}\t{}", worker, status.state)?;
                if let Some(task) = &status.task {
                    write!(out, "\t{}", task)?;
                }
                if let Some(message) = &status.message {
                    write!(out, "\t{}", message)?;
                }
                writeln!(out)?;
            }
        }
        WorkerCommand::Remove { worker } => {
            let removed = ctx.modify(|board: &mut WorkerBoard| board.remove(&worker))?;
            if !removed {
                return Err(format!("unknown worker '{}'", worker).into());
            }
            writeln!(out, "Removed {}", worker)?;
        }
    }
    Ok(())
}

fn cmd_project(ctx: &Context, out: &mut dyn Write, command: ProjectCommand) -> Result<()> {
    match command {
        ProjectCommand::Show => {
            let project: ProjectConfig = ctx.store.load()?;
            writeln!(out, "{}", serde_json::to_string_pretty(&project)?)?;
        }
        ProjectCommand::Set { key, value } => {
            let value = parse_lenient(&value);
            ctx.modify(|project: &mut ProjectConfig| project.set(key.clone(), value.clone()))?;
            writeln!(out, "Set {}", key)?;
        }
        ProjectCommand::Unset { key } => {
            let previous = ctx.modify(|project: &mut ProjectConfig| project.unset(&key))?;
            if previous.is_none() {
                return Err(format!("no setting named '{}'", key).into());
            }
            writeln!(out, "Unset {}", key)?;
        }
    }
    Ok(())
}

/// Parses `raw` as JSON, falling back to a plain string.
fn parse_lenient(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
