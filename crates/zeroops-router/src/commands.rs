//! Slash-command handlers. Each returns the reply text; the router sends it.

use zeroops_core::{CommandInvocation, JobPayload, RelayError, RepoMeta};
use zeroops_notes::MAX_RECENT_DAYS;
use zeroops_scheduler::ScheduleDef;

use crate::mention::category_label;
use crate::router::EventRouter;

/// Blocking workflow commands: name → (success fallback, failure prefix).
const WORKFLOW_COMMANDS: &[(&str, &str, &str)] = &[
    ("check-health", "Health check completed", "Health check failed"),
    ("infra", "Infra workflow triggered", "Infra workflow failed"),
];

const DEFAULT_RECENT_DAYS: u32 = 7;

impl EventRouter {
    /// Run a slash command and produce its reply.
    pub async fn command_reply(&self, cmd: &CommandInvocation) -> String {
        match cmd.name.as_str() {
            "note" => self.note_command(cmd).await,
            "schedule" => self.schedule_command(cmd).await,
            "repo" => self.repo_command(cmd).await,
            name => match WORKFLOW_COMMANDS.iter().find(|(n, _, _)| *n == name) {
                Some(&(_, done, failed)) => self.workflow_command(cmd, done, failed).await,
                None => format!("Unknown command: /{name}"),
            },
        }
    }

    // ── /note ────────────────────────────────────────────

    async fn note_command(&self, cmd: &CommandInvocation) -> String {
        let Some(notes) = &self.notes else {
            return "Notes are not enabled".to_string();
        };

        match cmd.subcommand.as_deref() {
            Some("add") => {
                let text = cmd.option("text").unwrap_or("");
                let category = cmd.option("category").unwrap_or("");
                match notes.add(text, category).await {
                    Ok(()) => format!("Noted in **{}**: {}", category_label(category), text),
                    Err(e) => format!("Failed to add note: {e}"),
                }
            }
            Some("today") => match notes.get_today().await {
                Ok(doc) if doc.is_empty() => "No notes for today".to_string(),
                Ok(doc) => doc,
                Err(e) => format!("Failed to read notes: {e}"),
            },
            Some("list") => {
                if let Some(category) = cmd.option("category") {
                    return match notes.get_by_category(category).await {
                        Ok(doc) if doc.is_empty() => {
                            format!("No notes in category **{category}**")
                        }
                        Ok(doc) => doc,
                        Err(e) => format!("Failed to read category: {e}"),
                    };
                }
                let date = cmd
                    .option("date")
                    .map(str::to_string)
                    .unwrap_or_else(zeroops_notes::today);
                match notes.get_by_date(&date).await {
                    Ok(doc) if doc.is_empty() => format!("No notes for {date}"),
                    Ok(doc) => doc,
                    Err(e) => format!("Failed to read notes: {e}"),
                }
            }
            Some("recent") => {
                let days = match cmd.option("days") {
                    None => DEFAULT_RECENT_DAYS,
                    Some(raw) => match raw.trim().parse::<u32>() {
                        Ok(days) if days > MAX_RECENT_DAYS => {
                            return format!("At most {MAX_RECENT_DAYS} days can be listed");
                        }
                        Ok(days) if days > 0 => days,
                        _ => return format!("Invalid number of days: {raw}"),
                    },
                };
                match notes.get_recent(days).await {
                    Ok(doc) if doc.is_empty() => format!("No notes in the last {days} days"),
                    Ok(doc) => doc,
                    Err(e) => format!("Failed to read notes: {e}"),
                }
            }
            Some("categories") => match notes.list_categories().await {
                Ok(categories) if categories.is_empty() => "No categories yet".to_string(),
                Ok(categories) => format!("**Categories:** {}", categories.join(", ")),
                Err(e) => format!("Failed to list categories: {e}"),
            },
            Some("remove") => {
                let index = match cmd.option("index").map(|raw| raw.trim().parse::<usize>()) {
                    Some(Ok(index)) if index > 0 => index,
                    _ => {
                        return "Failed to remove note: index must be a positive number".to_string();
                    }
                };
                let date = cmd
                    .option("date")
                    .map(str::to_string)
                    .unwrap_or_else(zeroops_notes::today);
                match notes.remove(&date, index).await {
                    Ok(()) => format!("Removed note #{index} from {date}"),
                    Err(e) if e.is_not_found() => format!("No note #{index} on {date}"),
                    Err(e) => format!("Failed to remove note: {e}"),
                }
            }
            Some("search") => {
                let query = cmd.option("query").unwrap_or("");
                match notes.search(query).await {
                    Ok(results) if results.is_empty() => format!("No notes matching **{query}**"),
                    Ok(results) => {
                        let mut out = format!("**Search results for \"{query}\":**\n");
                        for line in results {
                            out.push_str(&line);
                            out.push('\n');
                        }
                        out
                    }
                    Err(e) => format!("Search failed: {e}"),
                }
            }
            other => subcommand_error(other),
        }
    }

    // ── /schedule ────────────────────────────────────────

    async fn schedule_command(&self, cmd: &CommandInvocation) -> String {
        match cmd.subcommand.as_deref() {
            Some("list") => self.schedule_list().await,
            Some("add") => {
                let def = ScheduleDef::new(
                    cmd.option("name").unwrap_or(""),
                    cmd.option("cron").unwrap_or(""),
                    cmd.option("channel").unwrap_or(&cmd.channel_id),
                    cmd.option("command").unwrap_or(""),
                )
                .with_prompt(cmd.option("prompt").unwrap_or(""))
                .with_notes(flag(cmd.option("include_notes")))
                .with_repos(flag(cmd.option("include_repos")));

                let summary = format!("**{}** (`{}` → `{}`)", def.name, def.cron, def.command);
                match self.metadata.add_schedule(def).await {
                    Ok(replaced) => {
                        self.reload_schedules().await;
                        let verb = if replaced { "Updated" } else { "Added" };
                        format!("{verb} schedule {summary}")
                    }
                    Err(e) => format!("Failed to add schedule: {e}"),
                }
            }
            Some("remove") => {
                let name = cmd.option("name").unwrap_or("");
                match self.metadata.remove_schedule(name).await {
                    Ok(true) => {
                        self.reload_schedules().await;
                        format!("Removed schedule **{name}**")
                    }
                    Ok(false) => format!("Schedule **{name}** not found"),
                    Err(e) => format!("Failed to remove schedule: {e}"),
                }
            }
            other => subcommand_error(other),
        }
    }

    async fn schedule_list(&self) -> String {
        let schedules = self.metadata.list_schedules().await;
        if schedules.is_empty() {
            return "No schedules configured".to_string();
        }

        let upcoming = match &self.scheduler {
            Some(scheduler) => scheduler.upcoming().await,
            None => Vec::new(),
        };

        let mut out = String::from("**Schedules:**\n");
        for s in &schedules {
            let mut flags = String::new();
            if s.include_notes {
                flags.push_str(" [notes]");
            }
            if s.include_repos {
                flags.push_str(" [repos]");
            }
            out.push_str(&format!("- **{}** `{}` → `{}`{}", s.name, s.cron, s.command, flags));
            if let Some((_, Some(next))) = upcoming.iter().find(|(name, _)| *name == s.name) {
                out.push_str(&format!(" (next: {})", next.format("%Y-%m-%d %H:%M UTC")));
            }
            out.push('\n');
        }
        out
    }

    async fn reload_schedules(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.reload().await;
        }
    }

    // ── /repo ────────────────────────────────────────────

    async fn repo_command(&self, cmd: &CommandInvocation) -> String {
        match cmd.subcommand.as_deref() {
            Some("add") => {
                let repo = RepoMeta {
                    name: cmd.option("name").unwrap_or("").trim().to_string(),
                    description: cmd.option("description").unwrap_or("").to_string(),
                    path: cmd.option("path").unwrap_or("").to_string(),
                };
                let name = repo.name.clone();
                match self.metadata.add_repo(repo).await {
                    Ok(true) => format!("Updated repo **{name}**"),
                    Ok(false) => format!("Added repo **{name}**"),
                    Err(e) => format!("Failed to add repo: {e}"),
                }
            }
            Some("list") => {
                let repos = self.metadata.list_repos().await;
                if repos.is_empty() {
                    return "No repositories configured".to_string();
                }
                let mut out = String::from("**Repositories:**\n");
                for repo in &repos {
                    out.push_str(&repo.render_line());
                    out.push('\n');
                }
                out
            }
            Some("remove") => {
                let name = cmd.option("name").unwrap_or("");
                match self.metadata.remove_repo(name).await {
                    Ok(true) => format!("Removed repo **{name}**"),
                    Ok(false) => format!("Repo **{name}** not found"),
                    Err(e) => format!("Failed to remove repo: {e}"),
                }
            }
            other => subcommand_error(other),
        }
    }

    // ── /check-health, /infra ────────────────────────────

    async fn workflow_command(&self, cmd: &CommandInvocation, done: &str, failed: &str) -> String {
        let payload = JobPayload::new("command", &cmd.channel_id)
            .with_command(&cmd.name)
            .with_user(&cmd.user_id, &cmd.user_name);

        match self
            .dispatcher
            .dispatch(payload, self.config.command_timeout)
            .await
        {
            Ok(response) if response.has_message() => response.message,
            Ok(_) => done.to_string(),
            Err(e) => workflow_error(failed, &e),
        }
    }
}

fn workflow_error(prefix: &str, err: &RelayError) -> String {
    tracing::warn!("⚠️ {}: {}", prefix, err);
    format!("{prefix}: {err}")
}

fn subcommand_error(sub: Option<&str>) -> String {
    match sub {
        None => "No subcommand provided".to_string(),
        Some(other) => format!("Unknown subcommand: {other}"),
    }
}

/// Option flags arrive as strings.
fn flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "yes" | "1" | "on")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::Harness;
    use std::collections::BTreeMap;

    fn command(name: &str, sub: Option<&str>, options: &[(&str, &str)]) -> CommandInvocation {
        CommandInvocation {
            name: name.into(),
            subcommand: sub.map(str::to_string),
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            user_id: "u1".into(),
            user_name: "alice".into(),
            channel_id: "ops".into(),
        }
    }

    #[tokio::test]
    async fn test_note_add_and_today() {
        let h = Harness::with_notes().await;
        let router = h.router();

        let reply = router
            .command_reply(&command("note", Some("add"), &[("text", "Water the plants")]))
            .await;
        assert_eq!(reply, "Noted in **daily**: Water the plants");

        let today = router.command_reply(&command("note", Some("today"), &[])).await;
        assert!(today.lines().any(|l| l.ends_with("| Water the plants")));

        let found = router
            .command_reply(&command("note", Some("search"), &[("query", "water")]))
            .await;
        assert!(found.starts_with("**Search results for \"water\":**\n"));
        assert!(found.contains("Water the plants"));
    }

    #[tokio::test]
    async fn test_note_empty_states() {
        let h = Harness::with_notes().await;
        let router = h.router();

        assert_eq!(
            router.command_reply(&command("note", Some("today"), &[])).await,
            "No notes for today"
        );
        assert_eq!(
            router
                .command_reply(&command("note", Some("list"), &[("category", "ideas")]))
                .await,
            "No notes in category **ideas**"
        );
        assert_eq!(
            router
                .command_reply(&command("note", Some("list"), &[("date", "2020-01-01")]))
                .await,
            "No notes for 2020-01-01"
        );
        assert_eq!(
            router
                .command_reply(&command("note", Some("search"), &[("query", "zzz")]))
                .await,
            "No notes matching **zzz**"
        );
        assert_eq!(
            router.command_reply(&command("note", Some("categories"), &[])).await,
            "No categories yet"
        );
    }

    #[tokio::test]
    async fn test_note_remove_renumbers() {
        let h = Harness::with_notes().await;
        let router = h.router();
        for text in ["one", "two", "three"] {
            router
                .command_reply(&command("note", Some("add"), &[("text", text)]))
                .await;
        }

        let today = zeroops_notes::today();
        let reply = router
            .command_reply(&command("note", Some("remove"), &[("index", "2")]))
            .await;
        assert_eq!(reply, format!("Removed note #2 from {today}"));

        let doc = router.command_reply(&command("note", Some("today"), &[])).await;
        assert!(doc.contains("| one"));
        assert!(!doc.contains("| two"));
        assert!(doc.contains("| three"));

        let reply = router
            .command_reply(&command("note", Some("remove"), &[("index", "5")]))
            .await;
        assert_eq!(reply, format!("No note #5 on {today}"));

        let reply = router
            .command_reply(&command("note", Some("remove"), &[("index", "zero")]))
            .await;
        assert_eq!(reply, "Failed to remove note: index must be a positive number");
    }

    #[tokio::test]
    async fn test_note_category_and_recent() {
        let h = Harness::with_notes().await;
        let router = h.router();

        let reply = router
            .command_reply(&command(
                "note",
                Some("add"),
                &[("text", "rotate keys"), ("category", "security")],
            ))
            .await;
        assert_eq!(reply, "Noted in **security**: rotate keys");
        router
            .command_reply(&command("note", Some("add"), &[("text", "standup at 10")]))
            .await;

        let listed = router
            .command_reply(&command("note", Some("list"), &[("category", "security")]))
            .await;
        assert!(listed.starts_with("# security"));
        assert_eq!(
            router.command_reply(&command("note", Some("categories"), &[])).await,
            "**Categories:** security"
        );

        let recent = router
            .command_reply(&command("note", Some("recent"), &[("days", "3")]))
            .await;
        assert!(recent.contains("standup at 10"));
        assert!(!recent.contains("rotate keys"));

        assert_eq!(
            router
                .command_reply(&command("note", Some("recent"), &[("days", "-1")]))
                .await,
            "Invalid number of days: -1"
        );
        assert_eq!(
            router
                .command_reply(&command("note", Some("recent"), &[("days", "1000000")]))
                .await,
            "At most 365 days can be listed"
        );
    }

    #[tokio::test]
    async fn test_note_add_rejects_empty_text() {
        let h = Harness::with_notes().await;
        let reply = h
            .router()
            .command_reply(&command("note", Some("add"), &[("text", "  ")]))
            .await;
        assert!(reply.starts_with("Failed to add note: "));
    }

    #[tokio::test]
    async fn test_notes_disabled() {
        let h = Harness::new();
        assert_eq!(
            h.router().command_reply(&command("note", Some("today"), &[])).await,
            "Notes are not enabled"
        );
    }

    #[tokio::test]
    async fn test_schedule_add_reloads_scheduler() {
        let h = Harness::new();
        let scheduler = h.scheduler();
        let router = h.router().with_scheduler(scheduler.clone());

        let reply = router
            .command_reply(&command(
                "schedule",
                Some("add"),
                &[
                    ("name", "morning"),
                    ("cron", "30 7 * * 1-5"),
                    ("command", "infra"),
                    ("include_repos", "true"),
                ],
            ))
            .await;
        assert_eq!(reply, "Added schedule **morning** (`30 7 * * 1-5` → `infra`)");
        assert_eq!(scheduler.job_names().await, vec!["morning"]);

        let stored = h.metadata.list_schedules().await;
        assert_eq!(stored[0].channel_id, "ops");
        assert!(stored[0].include_repos);
        assert!(!stored[0].include_notes);

        let listed = router.command_reply(&command("schedule", Some("list"), &[])).await;
        assert!(listed.starts_with("**Schedules:**\n- **morning** `30 7 * * 1-5` → `infra` [repos] (next: "));

        let again = router
            .command_reply(&command(
                "schedule",
                Some("add"),
                &[("name", "morning"), ("cron", "0 8 * * *"), ("command", "infra")],
            ))
            .await;
        assert!(again.starts_with("Updated schedule **morning**"));
        assert_eq!(scheduler.job_count().await, 1);

        let removed = router
            .command_reply(&command("schedule", Some("remove"), &[("name", "morning")]))
            .await;
        assert_eq!(removed, "Removed schedule **morning**");
        assert_eq!(scheduler.job_count().await, 0);

        let missing = router
            .command_reply(&command("schedule", Some("remove"), &[("name", "morning")]))
            .await;
        assert_eq!(missing, "Schedule **morning** not found");
    }

    #[tokio::test]
    async fn test_schedule_add_rejects_bad_cron() {
        let h = Harness::new();
        let reply = h
            .router()
            .command_reply(&command(
                "schedule",
                Some("add"),
                &[("name", "x"), ("cron", "every day"), ("command", "infra")],
            ))
            .await;
        assert!(reply.starts_with("Failed to add schedule: Invalid schedule: "));
        assert!(h.metadata.list_schedules().await.is_empty());
        assert_eq!(
            h.router().command_reply(&command("schedule", Some("list"), &[])).await,
            "No schedules configured"
        );
    }

    #[tokio::test]
    async fn test_repo_commands() {
        let h = Harness::new();
        let router = h.router();

        let reply = router
            .command_reply(&command(
                "repo",
                Some("add"),
                &[("name", "api"), ("description", "backend"), ("path", "/srv/api")],
            ))
            .await;
        assert_eq!(reply, "Added repo **api**");

        let listed = router.command_reply(&command("repo", Some("list"), &[])).await;
        assert_eq!(listed, "**Repositories:**\n- api (/srv/api): backend\n");

        let updated = router
            .command_reply(&command(
                "repo",
                Some("add"),
                &[("name", "api"), ("description", "core backend")],
            ))
            .await;
        assert_eq!(updated, "Updated repo **api**");

        assert_eq!(
            router
                .command_reply(&command("repo", Some("remove"), &[("name", "api")]))
                .await,
            "Removed repo **api**"
        );
        assert_eq!(
            router
                .command_reply(&command("repo", Some("remove"), &[("name", "api")]))
                .await,
            "Repo **api** not found"
        );
        assert!(
            router
                .command_reply(&command("repo", Some("add"), &[("description", "nameless")]))
                .await
                .starts_with("Failed to add repo: ")
        );
    }

    #[tokio::test]
    async fn test_check_health_replies() {
        let h = Harness::new();
        h.dispatcher
            .reply_text("all green")
            .reply_text("")
            .fail(RelayError::Timeout("webhook call exceeded 30s".into()));
        let router = h.router();
        let cmd = command("check-health", None, &[]);

        assert_eq!(router.command_reply(&cmd).await, "all green");
        assert_eq!(router.command_reply(&cmd).await, "Health check completed");
        assert_eq!(
            router.command_reply(&cmd).await,
            "Health check failed: Timed out: webhook call exceeded 30s"
        );

        let job = &h.dispatcher.jobs()[0];
        assert_eq!(job.kind, "command");
        assert_eq!(job.command, "check-health");
        assert_eq!(job.user_id, "u1");
        assert_eq!(job.channel_id, "ops");
    }

    #[tokio::test]
    async fn test_infra_fallback_and_unknown_commands() {
        let h = Harness::new();
        let router = h.router();
        assert_eq!(
            router.command_reply(&command("infra", None, &[])).await,
            "Infra workflow triggered"
        );
        assert_eq!(
            router.command_reply(&command("deploy", None, &[])).await,
            "Unknown command: /deploy"
        );
        assert_eq!(
            router.command_reply(&command("repo", None, &[])).await,
            "No subcommand provided"
        );
        assert_eq!(
            router.command_reply(&command("repo", Some("rename"), &[])).await,
            "Unknown subcommand: rename"
        );
    }

    #[test]
    fn test_flag_parsing() {
        assert!(flag(Some("true")));
        assert!(flag(Some(" Yes ")));
        assert!(!flag(Some("false")));
        assert!(!flag(None));
    }
}
