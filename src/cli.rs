use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use teamcal::{
    api::{HttpTeamApi, Query, TeamApi},
    chat::{ChatEntry, ChatRoom},
    model::{ChatMessage, EntityId, Event, NewTask, Priority, Project, Task},
    storage::config::Config,
    storage::session::{FileSessionStorage, SessionStorage},
    store::{Navigation, Notification, NotificationLevel, Store, UiHooks},
};

#[derive(Parser)]
#[command(name = "teamcal")]
#[command(about = "Team calendar, tasks and projects from the command line")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        department: Option<String>,
    },
    /// Print the OAuth sign-in URL
    OauthUrl,
    /// Finish OAuth sign-in with the token returned by the provider redirect
    OauthCallback {
        token: String,
        email: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List events
    Events {
        #[arg(short, long)]
        project: Option<EntityId>,
    },
    /// List tasks
    Tasks {
        #[arg(short, long)]
        project: Option<EntityId>,
        /// Only open tasks
        #[arg(long)]
        open: bool,
    },
    /// List projects
    Projects,
    /// Create a task
    TaskAdd {
        title: String,
        #[arg(long, value_parser = parse_priority, default_value = "medium")]
        priority: Priority,
        /// Due date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        due: Option<NaiveDate>,
        #[arg(short, long)]
        project: Option<EntityId>,
    },
    /// Toggle a task between open and completed
    TaskToggle { id: EntityId },
    /// Delete an event
    EventDelete { id: EntityId },
    /// Show team chat
    Chat {
        /// Keep polling for new messages until interrupted
        #[arg(short, long)]
        watch: bool,
    },
    /// Send a chat message
    ChatSend { message: String },
}

/// Prints notifications to the terminal; navigation becomes a hint.
struct ConsoleHooks;

impl UiHooks for ConsoleHooks {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => println!("{}", notification.message),
            NotificationLevel::Error => eprintln!("{}", notification.message),
        }
    }

    fn navigate(&self, to: Navigation) {
        match to {
            Navigation::Login => {
                eprintln!("Session expired. Run `teamcal login` to sign in again.")
            }
            Navigation::External(url) => {
                println!("Open this URL in your browser to sign in:\n\n{}\n", url)
            }
        }
    }
}

struct App {
    config: Config,
    api: Arc<dyn TeamApi>,
    store: Store,
}

impl App {
    fn build() -> Result<Self> {
        let config = Config::load_or_create().context("Failed to load config")?;
        let storage: Arc<dyn SessionStorage> =
            Arc::new(FileSessionStorage::open(config.session.path.clone()));
        let api: Arc<dyn TeamApi> =
            Arc::new(HttpTeamApi::new(config.api.base_url.clone(), storage.clone()));
        let store = Store::new(api.clone(), storage, Arc::new(ConsoleHooks));
        Ok(Self { config, api, store })
    }

    fn chat_room(&self) -> ChatRoom {
        let team = self.config.chat.team().map(str::to_string);
        ChatRoom::new(self.api.clone(), Arc::new(ConsoleHooks), team)
    }

    async fn require_session(&self) -> Result<()> {
        match self.store.restore().await? {
            Some(_) => Ok(()),
            None => bail!("Not logged in. Run `teamcal login` first."),
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let ctx = App::build()?;

    match cli.command {
        Commands::Login { email, password } => {
            let user = ctx.store.login(&email, &password).await?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        Commands::Register {
            email,
            password,
            name,
            department,
        } => {
            let user = ctx
                .store
                .register(&email, &password, &name, department.as_deref())
                .await?;
            println!("Welcome, {}!", user.name);
        }
        Commands::OauthUrl => {
            ctx.store.login_with_oauth().await?;
        }
        Commands::OauthCallback { token, email } => {
            let user = ctx.store.handle_oauth_callback(&token, &email).await?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        Commands::Logout => {
            ctx.store.logout();
            println!("Signed out.");
        }
        Commands::Whoami => {
            ctx.require_session().await?;
            let user = ctx.store.refresh_user().await?;
            println!("{} <{}> ({})", user.name, user.email, user.role);
            if let Some(department) = &user.department {
                println!("Department: {}", department);
            }
        }
        Commands::Events { project } => {
            ctx.require_session().await?;
            if let Some(project_id) = project {
                ctx.store
                    .load_events(&Query::new().with("project_id", project_id))
                    .await;
            }
            print_lines("No events.", ctx.store.events().iter().map(format_event_line));
        }
        Commands::Tasks { project, open } => {
            ctx.require_session().await?;
            let mut query = Query::new();
            if let Some(project_id) = project {
                query = query.with("project_id", project_id);
            }
            if open {
                query = query.with("completed", false);
            }
            if !query.is_empty() {
                ctx.store.load_tasks(&query).await;
            }
            print_lines("No tasks.", ctx.store.tasks().iter().map(format_task_line));
        }
        Commands::Projects => {
            ctx.require_session().await?;
            print_lines("No projects.", ctx.store.projects().iter().map(format_project_line));
        }
        Commands::TaskAdd {
            title,
            priority,
            due,
            project,
        } => {
            ctx.require_session().await?;
            let mut task = NewTask::titled(title);
            task.priority = priority;
            task.project_id = project;
            task.due_date = due
                .and_then(|date| date.and_hms_opt(23, 59, 0))
                .map(|dt| dt.and_utc());
            let created = ctx.store.create_task(&task).await?;
            println!("{}", format_task_line(&created));
        }
        Commands::TaskToggle { id } => {
            ctx.require_session().await?;
            ctx.store.toggle_task(id).await?;
            let task = ctx
                .store
                .tasks()
                .into_iter()
                .find(|t| t.id == id)
                .ok_or_else(|| anyhow!("Task {} not found after reload", id))?;
            println!("{}", format_task_line(&task));
        }
        Commands::EventDelete { id } => {
            ctx.require_session().await?;
            ctx.store.delete_event(id).await?;
        }
        Commands::Chat { watch } => {
            ctx.require_session().await?;
            let room = ctx.chat_room();
            if watch {
                let shutdown = async {
                    let _ = tokio::signal::ctrl_c().await;
                };
                room.run(ctx.config.chat.poll_interval(), shutdown, |messages| {
                    for message in messages {
                        println!("{}", format_message_line(message));
                    }
                })
                .await;
            } else {
                room.poll_once().await?;
                let entries = room.entries();
                let lines = entries.iter().filter_map(|entry| match entry {
                    ChatEntry::Delivered(message) => Some(format_message_line(message)),
                    ChatEntry::Pending { .. } => None,
                });
                print_lines("No messages.", lines);
            }
        }
        Commands::ChatSend { message } => {
            ctx.require_session().await?;
            let room = ctx.chat_room();
            let sent = room.send(&message).await?;
            println!("{}", format_message_line(&sent));
        }
    }

    Ok(())
}

fn parse_priority(value: &str) -> Result<Priority, String> {
    match value.to_ascii_lowercase().as_str() {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        _ => Err(format!("Invalid priority '{}'. Use low, medium or high.", value)),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}'. Use YYYY-MM-DD.", value))
}

fn print_lines(empty: &str, lines: impl Iterator<Item = String>) {
    let mut printed = false;
    for line in lines {
        println!("{}", line);
        printed = true;
    }
    if !printed {
        println!("{}", empty);
    }
}

fn format_event_line(event: &Event) -> String {
    let start = event.start_time.with_timezone(&Local);
    let when = if event.all_day {
        format!("{} All Day", start.format("%Y-%m-%d"))
    } else {
        let end = event.end_time.with_timezone(&Local);
        format!("{} {}-{}", start.format("%Y-%m-%d"), start.format("%H:%M"), end.format("%H:%M"))
    };

    let mut line = format!("#{:<5} {:<22} {}", event.id, when, event.title);
    if let Some(location) = &event.location
        && !location.is_empty()
    {
        line.push_str(&format!(" @ {}", location));
    }
    if let Some(project) = &event.project {
        line.push_str(&format!(" [{}]", project.name));
    }
    line
}

fn format_task_line(task: &Task) -> String {
    let check = if task.completed { "x" } else { " " };
    let priority = match task.priority {
        Priority::Low => "low",
        Priority::Medium => "med",
        Priority::High => "HIGH",
    };

    let mut line = format!("#{:<5} [{}] {:<4} {}", task.id, check, priority, task.title);
    if let Some(due) = task.due_date {
        line.push_str(&format!(" (due {})", due.with_timezone(&Local).format("%Y-%m-%d")));
    }
    let assignees: Vec<&str> = task.all_assignees().iter().map(|a| a.name.as_str()).collect();
    if !assignees.is_empty() {
        line.push_str(&format!(" -> {}", assignees.join(", ")));
    }
    line
}

fn format_project_line(project: &Project) -> String {
    format!(
        "#{:<5} {} ({:?}) members:{} tasks:{} events:{}",
        project.id,
        project.name,
        project.status,
        project.member_count,
        project.task_count,
        project.event_count
    )
}

fn format_message_line(message: &ChatMessage) -> String {
    let mut line = format!(
        "[{}] {}: {}",
        message.created_at.with_timezone(&Local).format("%H:%M"),
        message.sender.name,
        message.content
    );
    if let Some(url) = &message.attachment_url {
        line.push_str(&format!(" <{}>", url));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_priority_case_insensitively() {
        assert_eq!(parse_priority("HIGH"), Ok(Priority::High));
        assert!(parse_priority("urgent").is_err());
    }

    #[test]
    fn rejects_malformed_due_date() {
        assert!(parse_date("2025/03/01").is_err());
        assert_eq!(
            parse_date("2025-03-01"),
            NaiveDate::from_ymd_opt(2025, 3, 1).ok_or(String::new())
        );
    }

    #[test]
    fn task_line_marks_completion_and_assignees() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "id": 4,
            "title": "Ship release",
            "completed": true,
            "priority": "high",
            "assignees": [{"id": 1, "name": "Ada"}]
        }))
        .unwrap();

        assert_eq!(format_task_line(&task), "#4     [x] HIGH Ship release -> Ada");
    }

    #[test]
    fn cli_parses_task_add() {
        let cli = Cli::try_parse_from([
            "teamcal",
            "task-add",
            "Write docs",
            "--priority",
            "low",
            "--due",
            "2025-05-01",
        ])
        .unwrap();

        match cli.command {
            Commands::TaskAdd { title, priority, due, .. } => {
                assert_eq!(title, "Write docs");
                assert_eq!(priority, Priority::Low);
                assert_eq!(due, NaiveDate::from_ymd_opt(2025, 5, 1));
            }
            _ => panic!("expected task-add"),
        }
    }
}
