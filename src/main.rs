use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::Arc;
use tempo::domain::{format_time_display, format_time_label, now_ms, today, Priority, Task};
use tempo::{ticker, AlarmScheduler, Controller, NoopWidget, TaskStore};

#[derive(Parser)]
#[command(name = "tempo")]
#[command(about = "A personal task focus timer with priorities, alarms, and productivity statistics", long_about = None)]
struct Cli {
    /// Data directory override (defaults to ~/.tempo)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new task
    Add {
        name: String,
        /// Priority: high, medium, or low
        #[arg(short, long, default_value = "low")]
        priority: String,
    },
    /// List tasks for a date (defaults to today)
    List {
        /// Date to show (YYYY-MM-DD format)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Start a task's stopwatch
    Start { id: i64 },
    /// Pause a task's stopwatch
    Pause { id: i64 },
    /// Toggle a task complete/incomplete
    Done { id: i64 },
    /// Rename a task
    Rename { id: i64, name: String },
    /// Set a task's target time in minutes (0 = no limit)
    SetTime { id: i64, minutes: i64 },
    /// Set a task's priority
    SetPriority { id: i64, priority: String },
    /// Clear a task's stopwatch progress
    Reset { id: i64 },
    /// Delete a task
    Delete { id: i64 },
    /// Delete every task
    DeleteAll,
    /// Restore all completed tasks back to incomplete
    RestoreAll,
    /// Zero all stopwatch state app-wide
    ResetTimers,
    /// Show productivity statistics
    Stats,
    /// Run a task's stopwatch interactively until its target time is up
    Focus {
        id: i64,
        /// Disable the voice announcement
        #[arg(long)]
        mute: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
            .context("Could not determine home directory")?
            .join(".tempo"),
    };
    let store = Arc::new(TaskStore::open(data_dir.join("tasks.json"))?);

    let (alarm_tx, alarm_rx) = channel();
    let scheduler = AlarmScheduler::new(alarm_tx);
    let mut controller = Controller::new(Arc::clone(&store), scheduler, Box::new(NoopWidget));

    match cli.command {
        Commands::Add { name, priority } => {
            let priority = parse_priority(&priority)?;
            controller.set_new_task_text(&name);
            controller.set_new_task_priority(priority);
            match controller.add_task() {
                Some(task) => println!("Added #{} [{}] {}", task.id, task.priority.to_tag(), task.name),
                None => println!("Nothing added (blank name)"),
            }
        }
        Commands::List { date } => {
            if let Some(date_str) = date {
                let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                    .map_err(|e| anyhow::anyhow!("Invalid date format. Use YYYY-MM-DD: {}", e))?;
                controller.set_selected_date(date);
            }
            print_list(&controller);
        }
        Commands::Start { id } => {
            controller.start_task(id);
            print_list(&controller);
        }
        Commands::Pause { id } => {
            controller.pause_task(id);
            print_list(&controller);
        }
        Commands::Done { id } => {
            controller.toggle_complete(id);
            print_list(&controller);
        }
        Commands::Rename { id, name } => {
            controller.rename_task(id, &name);
            print_list(&controller);
        }
        Commands::SetTime { id, minutes } => {
            controller.set_task_target_time(id, minutes * 60_000);
            print_list(&controller);
        }
        Commands::SetPriority { id, priority } => {
            let priority = parse_priority(&priority)?;
            controller.set_task_priority(id, priority);
            print_list(&controller);
        }
        Commands::Reset { id } => {
            controller.reset_task_progress(id);
            print_list(&controller);
        }
        Commands::Delete { id } => {
            controller.delete_task(id);
            print_list(&controller);
        }
        Commands::DeleteAll => {
            controller.delete_all();
            println!("All tasks deleted");
        }
        Commands::RestoreAll => {
            controller.restore_all();
            print_list(&controller);
        }
        Commands::ResetTimers => {
            controller.reset_all_timers();
            print_list(&controller);
        }
        Commands::Stats => print_stats(&store),
        Commands::Focus { id, mute } => {
            if mute {
                controller.toggle_voice();
            }
            run_focus(&mut controller, &store, &alarm_rx, id)?;
        }
    }

    Ok(())
}

fn parse_priority(tag: &str) -> Result<Priority> {
    Priority::from_tag(tag)
        .ok_or_else(|| anyhow::anyhow!("Unknown priority '{}'. Use high, medium, or low", tag))
}

fn print_list(controller: &Controller) {
    let state = controller.ui_state();
    if state.tasks.is_empty() {
        println!("No tasks for {}", state.selected_date);
        return;
    }
    println!(
        "Tasks for {} ({}/{} done)",
        state.selected_date, state.completed_count, state.total_count
    );
    let now = now_ms();
    for task in &state.tasks {
        println!("  {}", render_task_line(task, now));
    }
}

fn render_task_line(task: &Task, now: i64) -> String {
    let mark = if task.is_completed {
        "[x]"
    } else if task.is_running {
        "[>]"
    } else {
        "[ ]"
    };
    let mut line = format!(
        "{} #{:<3} [{:<6}] {}  {}",
        mark,
        task.id,
        task.priority.to_tag(),
        task.name,
        format_time_display(task.live_elapsed(now))
    );
    if task.total_time > 0 {
        line.push_str(&format!(" / {}", format_time_display(task.total_time)));
    }
    line
}

fn print_stats(store: &TaskStore) {
    let stats = tempo::load_productivity_stats(store, today());

    println!("Total focused time: {}", format_time_label(stats.total_focused_ms));
    println!();
    println!("By priority:");
    for priority in Priority::all() {
        let ms = stats.time_by_priority.get(priority).copied().unwrap_or(0);
        println!("  {:<6} {}", priority.to_tag(), format_time_label(ms));
    }
    println!();
    println!("Completions, last 7 days:");
    for entry in &stats.completed_by_day {
        println!("  {}  {:>3}", entry.date, entry.count);
    }
}

/// Interactive stopwatch loop: redraws the live elapsed time once a second,
/// drains alarm deliveries, and stops when the target is reached or the user
/// quits. `q`/Esc pauses and exits; `c` completes the task.
fn run_focus(
    controller: &mut Controller,
    store: &TaskStore,
    alarms: &std::sync::mpsc::Receiver<tempo::AlarmEvent>,
    id: i64,
) -> Result<()> {
    let Some(task) = store.find(id) else {
        println!("No task with id {}", id);
        return Ok(());
    };
    if task.is_completed {
        println!("'{}' is already completed", task.name);
        return Ok(());
    }

    controller.start_task(id);
    println!("Focusing on '{}'  (q to pause and quit, c to complete)", task.name);

    enable_raw_mode()?;
    let result = focus_loop(controller, store, alarms, id);
    disable_raw_mode()?;
    println!();

    if let Some(finished) = controller.take_finished() {
        println!(
            "Time's up! '{}' reached {}",
            finished.name,
            format_time_label(finished.accumulated_time)
        );
        if let Some(next) = controller.find_next_incomplete(finished.id) {
            println!("Next up: #{} {}", next.id, next.name);
        }
    }
    result
}

fn focus_loop(
    controller: &mut Controller,
    store: &TaskStore,
    alarms: &std::sync::mpsc::Receiver<tempo::AlarmEvent>,
    id: i64,
) -> Result<()> {
    let tick_rate = ticker::tick_duration();

    loop {
        let Some(task) = store.find(id) else { return Ok(()) };
        let now = now_ms();

        let mut line = format!("\r  {} ", format_time_display(task.live_elapsed(now)));
        if task.total_time > 0 {
            line.push_str(&format!("/ {} ", format_time_display(task.total_time)));
        }
        let mut stdout = io::stdout();
        stdout.write_all(line.as_bytes())?;
        stdout.flush()?;

        // In-app countdown reaching the target
        if task.is_over_target(now) {
            controller.on_timer_expired(id);
            return Ok(());
        }

        // Alarm deliveries reconstruct expiry even if the countdown missed it
        while let Ok(event) = alarms.try_recv() {
            controller.on_alarm_delivered(&event);
        }
        if !store.find(id).map(|t| t.is_running).unwrap_or(false) {
            return Ok(());
        }

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        controller.pause_task(id);
                        return Ok(());
                    }
                    KeyCode::Char('c') => {
                        controller.toggle_complete(id);
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }
    }
}
