//! Scheduler Engine — cron-triggered webhook jobs with hot reload.
//!
//! A single dispatch loop owns the timetable for the current job set and
//! sleeps until the earliest next fire (capped, so wall-clock jumps are
//! noticed). Each fire runs on its own task, tracked so `stop` can wait for
//! it. Reload swaps the whole job set: the old loop is halted and awaited,
//! a new one is spawned, and runs already in flight keep going.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use zeroops_core::{
    ChatTransport, Dispatcher, JobPayload, RepoMeta, Result, WorkTracker, send_chunked,
};
use zeroops_notes::NotesStore;

use crate::cron::{CronExpr, Zone};
use crate::metadata::{MetadataStore, ScheduleDef};

/// Bound on a single scheduled run's webhook call.
pub const SCHEDULE_JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Longest the loop sleeps before re-reading the clock.
const MAX_IDLE_SLEEP: Duration = Duration::from_secs(60);

/// Extra time `stop` allows beyond the job timeout for a run to finish
/// sending its reply.
const STOP_GRACE: Duration = Duration::from_secs(30);

/// Everything one scheduled run needs. Cheap to clone into run tasks.
#[derive(Clone)]
pub struct JobRunner {
    dispatcher: Arc<dyn Dispatcher>,
    transport: Arc<dyn ChatTransport>,
    metadata: Arc<MetadataStore>,
    notes: Option<Arc<NotesStore>>,
    timeout: Duration,
}

impl JobRunner {
    /// Assemble the content sent for `def` from the current metadata.
    pub async fn job_content(&self, def: &ScheduleDef) -> (String, Vec<RepoMeta>) {
        let repos = if def.include_repos {
            self.metadata.list_repos().await
        } else {
            Vec::new()
        };
        let notes = match (&self.notes, def.include_notes) {
            (Some(store), true) => Some(NotesPointer {
                base_dir: store.base_dir().display().to_string(),
                today: store.daily_path(&zeroops_notes::today()).display().to_string(),
            }),
            _ => None,
        };
        (render_job_content(def, &repos, notes.as_ref()), repos)
    }

    /// Run `def` once: dispatch, then post any reply to the schedule's
    /// channel. Returns the number of chunks sent.
    pub async fn run(&self, def: &ScheduleDef) -> Result<usize> {
        let (content, repos) = self.job_content(def).await;
        let payload = JobPayload::new("schedule", &def.channel_id)
            .with_command(&def.command)
            .with_content(&content)
            .with_repos(repos);

        let response = self.dispatcher.dispatch(payload, self.timeout).await?;
        if !response.has_message() {
            tracing::debug!("Schedule '{}' finished with no reply", def.name);
            return Ok(0);
        }
        send_chunked(self.transport.as_ref(), &def.channel_id, &response.message).await
    }
}

/// Where the automation engine should look for notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesPointer {
    pub base_dir: String,
    pub today: String,
}

/// Prompt, then optional repository list, then optional notes pointer.
pub fn render_job_content(
    def: &ScheduleDef,
    repos: &[RepoMeta],
    notes: Option<&NotesPointer>,
) -> String {
    let mut content = def.prompt.clone();

    if def.include_repos && !repos.is_empty() {
        content.push_str("\n\n## Registered Repositories\n");
        let lines: Vec<String> = repos.iter().map(RepoMeta::render_line).collect();
        content.push_str(&lines.join("\n"));
    }

    if let Some(notes) = notes {
        content.push_str(&format!(
            "\n\n## Notes\nNotes directory: {}\nToday's notes: {}",
            notes.base_dir, notes.today
        ));
    }

    content.trim_start().to_string()
}

#[derive(Clone)]
struct ScheduledJob {
    def: Arc<ScheduleDef>,
    expr: Arc<CronExpr>,
}

impl ScheduledJob {
    fn new(def: ScheduleDef) -> Result<Self> {
        let expr = def.validate()?;
        Ok(Self {
            def: Arc::new(def),
            expr: Arc::new(expr),
        })
    }
}

/// Next fire instant per job.
struct Timetable {
    slots: Vec<(ScheduledJob, Option<DateTime<Utc>>)>,
}

impl Timetable {
    fn new(jobs: Vec<ScheduledJob>, zone: &Zone, now: DateTime<Utc>) -> Self {
        let slots = jobs
            .into_iter()
            .map(|job| {
                let next = job.expr.next_after(now, zone);
                if next.is_none() {
                    tracing::warn!("⚠️ Schedule '{}' ({}) never fires", job.def.name, job.expr);
                }
                (job, next)
            })
            .collect();
        Self { slots }
    }

    /// Jobs due at `now`; each is advanced to its next fire after `now`.
    /// Fires missed while asleep collapse into one.
    fn take_due(&mut self, zone: &Zone, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        let mut due = Vec::new();
        for (job, next) in &mut self.slots {
            if matches!(next, Some(at) if *at <= now) {
                due.push(job.clone());
                *next = job.expr.next_after(now, zone);
            }
        }
        due
    }

    fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.slots.iter().filter_map(|(_, next)| *next).min()
    }

    fn upcoming(&self) -> Vec<(String, Option<DateTime<Utc>>)> {
        self.slots
            .iter()
            .map(|(job, next)| (job.def.name.clone(), *next))
            .collect()
    }
}

struct DispatchLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DispatchLoop {
    fn spawn(
        jobs: Vec<ScheduledJob>,
        zone: Zone,
        runner: JobRunner,
        runs: Arc<WorkTracker>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(dispatch_loop(jobs, zone, runner, runs, stop_rx));
        Self { stop_tx, handle }
    }

    /// Signal the loop and wait for it to exit.
    async fn halt(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!("⚠️ Scheduler loop ended abnormally: {e}");
        }
    }
}

async fn dispatch_loop(
    jobs: Vec<ScheduledJob>,
    zone: Zone,
    runner: JobRunner,
    runs: Arc<WorkTracker>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut timetable = Timetable::new(jobs, &zone, Utc::now());

    loop {
        for job in timetable.take_due(&zone, Utc::now()) {
            spawn_run(job, runner.clone(), &runs);
        }

        let sleep_for = timetable
            .next_wake()
            .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(MAX_IDLE_SLEEP)
            .min(MAX_IDLE_SLEEP);

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Scheduler loop exited");
}

fn spawn_run(job: ScheduledJob, runner: JobRunner, runs: &Arc<WorkTracker>) {
    let guard = runs.enter();
    tokio::spawn(async move {
        let _guard = guard;
        let def = job.def;
        tracing::info!("🔔 Schedule triggered: '{}'", def.name);
        match runner.run(&def).await {
            Ok(chunks) => {
                tracing::info!("✅ Schedule '{}' done ({} message(s) sent)", def.name, chunks)
            }
            Err(e) => tracing::warn!("⚠️ Schedule '{}' failed: {}", def.name, e),
        }
    });
}

struct State {
    jobs: Vec<ScheduledJob>,
    active: Option<DispatchLoop>,
}

/// Cron scheduler: Stopped → Running → Stopped.
pub struct Scheduler {
    runner: JobRunner,
    zone: Zone,
    state: Mutex<State>,
    runs: Arc<WorkTracker>,
}

impl Scheduler {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        transport: Arc<dyn ChatTransport>,
        metadata: Arc<MetadataStore>,
        zone: Zone,
    ) -> Self {
        Self {
            runner: JobRunner {
                dispatcher,
                transport,
                metadata,
                notes: None,
                timeout: SCHEDULE_JOB_TIMEOUT,
            },
            zone,
            state: Mutex::new(State {
                jobs: Vec::new(),
                active: None,
            }),
            runs: WorkTracker::new(),
        }
    }

    /// Point `include_notes` schedules at this store.
    pub fn with_notes(mut self, notes: Arc<NotesStore>) -> Self {
        self.runner.notes = Some(notes);
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.runner.timeout = timeout;
        self
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Add a job. Duplicate names are not checked here.
    pub async fn register(&self, def: ScheduleDef) -> Result<()> {
        let job = ScheduledJob::new(def)?;
        tracing::info!("📅 Schedule registered: '{}' ({})", job.def.name, job.expr);

        let mut state = self.state.lock().await;
        state.jobs.push(job);
        if let Some(active) = state.active.take() {
            active.halt().await;
            state.active = Some(self.spawn_loop(state.jobs.clone()));
        }
        Ok(())
    }

    /// Begin evaluating triggers. No-op if already running.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.active.is_some() {
            return;
        }
        state.active = Some(self.spawn_loop(state.jobs.clone()));
        tracing::info!(
            "⏰ Scheduler started with {} jobs ({})",
            state.jobs.len(),
            self.zone.name()
        );
    }

    /// Halt trigger evaluation, then wait (bounded) for runs in flight.
    pub async fn stop(&self) {
        let active = self.state.lock().await.active.take();
        let Some(active) = active else {
            return;
        };
        active.halt().await;

        if let Err(e) = self
            .runs
            .wait_idle_timeout(self.runner.timeout + STOP_GRACE)
            .await
        {
            tracing::warn!("⚠️ Scheduler stopped with runs still in flight: {e}");
        } else {
            tracing::info!("⏹️ Scheduler stopped");
        }
    }

    /// Replace the job set with the schedules in metadata. Invalid entries
    /// are logged and skipped. Returns the number of jobs now registered.
    ///
    /// The running state is preserved: a running scheduler keeps running on
    /// the new set; a stopped one stays stopped.
    pub async fn reload(&self) -> usize {
        let schedules = self.runner.metadata.list_schedules().await;
        let mut jobs = Vec::with_capacity(schedules.len());
        for def in schedules {
            let name = def.name.clone();
            match ScheduledJob::new(def) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!("⚠️ Skipping schedule '{}': {}", name, e),
            }
        }

        let mut state = self.state.lock().await;
        let was_running = match state.active.take() {
            Some(active) => {
                active.halt().await;
                true
            }
            None => false,
        };
        state.jobs = jobs;
        if was_running {
            state.active = Some(self.spawn_loop(state.jobs.clone()));
        }

        tracing::info!("🔄 Scheduler reloaded: {} jobs", state.jobs.len());
        state.jobs.len()
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.active.is_some()
    }

    pub async fn job_names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.jobs.iter().map(|j| j.def.name.clone()).collect()
    }

    pub async fn job_count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    /// Each job with its next fire instant from now.
    pub async fn upcoming(&self) -> Vec<(String, Option<DateTime<Utc>>)> {
        let jobs = self.state.lock().await.jobs.clone();
        Timetable::new(jobs, &self.zone, Utc::now()).upcoming()
    }

    /// Scheduled runs currently executing.
    pub fn in_flight(&self) -> usize {
        self.runs.outstanding()
    }

    fn spawn_loop(&self, jobs: Vec<ScheduledJob>) -> DispatchLoop {
        DispatchLoop::spawn(jobs, self.zone, self.runner.clone(), Arc::clone(&self.runs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use chrono::TimeZone;
    use zeroops_core::RelayError;
    use zeroops_core::testing::{RecordingTransport, ScriptedDispatcher};

    struct Fixture {
        dispatcher: Arc<ScriptedDispatcher>,
        transport: Arc<RecordingTransport>,
        metadata: Arc<MetadataStore>,
    }

    impl Fixture {
        fn new(metadata: Metadata) -> Self {
            Self {
                dispatcher: Arc::new(ScriptedDispatcher::new()),
                transport: Arc::new(RecordingTransport::new()),
                metadata: Arc::new(MetadataStore::in_memory(metadata)),
            }
        }

        fn scheduler(&self) -> Scheduler {
            Scheduler::new(
                self.dispatcher.clone(),
                self.transport.clone(),
                self.metadata.clone(),
                Zone::Named(chrono_tz::UTC),
            )
        }
    }

    fn api_repo() -> RepoMeta {
        RepoMeta {
            name: "api".into(),
            description: "backend".into(),
            path: "/srv/api".into(),
        }
    }

    fn morning() -> ScheduleDef {
        ScheduleDef::new("morning", "30 7 * * 1-5", "ops", "infra")
            .with_prompt("Summarize overnight alerts.")
            .with_repos(true)
    }

    #[tokio::test]
    async fn test_run_includes_registered_repos() {
        let fx = Fixture::new(Metadata {
            repos: vec![api_repo()],
            ..Metadata::default()
        });
        let scheduler = fx.scheduler();

        scheduler.runner().run(&morning()).await.unwrap();

        let jobs = fx.dispatcher.jobs();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.kind, "schedule");
        assert_eq!(job.command, "infra");
        assert_eq!(job.channel_id, "ops");
        assert!(job.content.starts_with("Summarize overnight alerts."));
        assert!(job.content.lines().any(|l| l == "- api (/srv/api): backend"));
        assert_eq!(job.repos, vec![api_repo()]);
    }

    #[tokio::test]
    async fn test_run_omits_repos_unless_requested() {
        let fx = Fixture::new(Metadata {
            repos: vec![api_repo()],
            ..Metadata::default()
        });
        let scheduler = fx.scheduler();

        let def = morning().with_repos(false);
        scheduler.runner().run(&def).await.unwrap();

        let job = &fx.dispatcher.jobs()[0];
        assert_eq!(job.content, "Summarize overnight alerts.");
        assert!(job.repos.is_empty());
    }

    #[tokio::test]
    async fn test_run_points_at_notes() {
        let dir = tempfile::tempdir().unwrap();
        let notes = Arc::new(NotesStore::open(dir.path()).await.unwrap());
        let fx = Fixture::new(Metadata::default());
        let scheduler = fx.scheduler().with_notes(notes.clone());

        let def = ScheduleDef::new("review", "0 18 * * *", "ops", "chat").with_notes(true);
        scheduler.runner().run(&def).await.unwrap();

        let content = &fx.dispatcher.jobs()[0].content;
        let today = notes.daily_path(&zeroops_notes::today());
        assert!(content.starts_with("## Notes"));
        assert!(content.contains(&format!("Notes directory: {}", dir.path().display())));
        assert!(content.contains(&today.display().to_string()));
    }

    #[tokio::test]
    async fn test_reply_is_chunked_to_channel() {
        let fx = Fixture::new(Metadata::default());
        fx.dispatcher.reply_text(&"r".repeat(4000));
        let scheduler = fx.scheduler();

        let sent = scheduler.runner().run(&morning()).await.unwrap();
        assert_eq!(sent, 3);
        let msgs = fx.transport.sent_to("ops");
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs.iter().map(|m| m.len()).sum::<usize>(), 4000);
    }

    #[tokio::test]
    async fn test_empty_reply_sends_nothing() {
        let fx = Fixture::new(Metadata::default());
        let scheduler = fx.scheduler();
        assert_eq!(scheduler.runner().run(&morning()).await.unwrap(), 0);
        assert!(fx.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_aborts_remaining_chunks() {
        let mut fx = Fixture::new(Metadata::default());
        fx.transport = Arc::new(RecordingTransport::failing_after(1));
        fx.dispatcher.reply_text(&"r".repeat(4000));
        let scheduler = fx.scheduler();

        assert!(scheduler.runner().run(&morning()).await.is_err());
        assert_eq!(fx.transport.sent_to("ops").len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_returned() {
        let fx = Fixture::new(Metadata::default());
        fx.dispatcher.fail(RelayError::UpstreamStatus {
            status: 500,
            body: String::new(),
        });
        let scheduler = fx.scheduler();

        let err = scheduler.runner().run(&morning()).await.unwrap_err();
        assert!(err.is_upstream());
        assert!(fx.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_register_validates_cron() {
        let fx = Fixture::new(Metadata::default());
        let scheduler = fx.scheduler();

        let err = scheduler
            .register(ScheduleDef::new("bad", "every morning", "ops", "infra"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidSchedule(_)));

        scheduler.register(morning()).await.unwrap();
        scheduler.register(morning()).await.unwrap();
        assert_eq!(scheduler.job_count().await, 2);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let fx = Fixture::new(Metadata::default());
        let scheduler = fx.scheduler();
        scheduler.register(morning()).await.unwrap();

        assert!(!scheduler.is_running().await);
        scheduler.start().await;
        scheduler.start().await;
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
        // Stopping twice is harmless.
        scheduler.stop().await;
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_reload_replaces_job_set_and_skips_invalid() {
        let fx = Fixture::new(Metadata {
            schedules: vec![
                morning(),
                ScheduleDef::new("broken", "61 * * * *", "ops", "infra"),
                ScheduleDef::new("evening", "0 18 * * *", "ops", "chat"),
            ],
            ..Metadata::default()
        });
        let scheduler = fx.scheduler();
        scheduler
            .register(ScheduleDef::new("stale", "0 0 * * *", "ops", "chat"))
            .await
            .unwrap();

        assert_eq!(scheduler.reload().await, 2);
        assert_eq!(scheduler.job_names().await, vec!["morning", "evening"]);
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_reload_keeps_running_scheduler_running() {
        let fx = Fixture::new(Metadata::default());
        let scheduler = fx.scheduler();
        scheduler.start().await;

        fx.metadata.add_schedule(morning()).await.unwrap();
        assert_eq!(scheduler.reload().await, 1);
        assert!(scheduler.is_running().await);
        assert_eq!(scheduler.upcoming().await[0].0, "morning");

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_waits_for_run_in_flight() {
        let fx = Fixture::new(Metadata::default());
        fx.dispatcher
            .delay(Duration::from_millis(300))
            .reply_text("overnight: quiet");
        let scheduler = fx.scheduler();
        scheduler.start().await;

        let job = ScheduledJob::new(morning()).unwrap();
        spawn_run(job, scheduler.runner().clone(), &scheduler.runs);
        assert_eq!(scheduler.in_flight(), 1);

        fx.metadata.add_schedule(morning()).await.unwrap();
        assert_eq!(scheduler.reload().await, 1);
        assert!(scheduler.is_running().await);
        assert_eq!(scheduler.in_flight(), 1);
        assert!(fx.dispatcher.jobs().is_empty());

        scheduler.stop().await;
        assert_eq!(scheduler.in_flight(), 0);
        assert_eq!(fx.dispatcher.jobs().len(), 1);
        assert_eq!(fx.transport.sent_to("ops"), vec!["overnight: quiet".to_string()]);
    }

    #[test]
    fn test_timetable_fires_due_jobs_once() {
        let zone = Zone::Named(chrono_tz::UTC);
        let def = ScheduleDef::new("hourly", "0 * * * *", "ops", "chat");
        let job = ScheduledJob::new(def).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap();
        let mut table = Timetable::new(vec![job], &zone, start);

        let eleven = Utc.with_ymd_and_hms(2026, 2, 22, 11, 0, 0).unwrap();
        assert_eq!(table.next_wake(), Some(eleven));
        assert!(table.take_due(&zone, start).is_empty());

        let due = table.take_due(&zone, eleven);
        assert_eq!(due.len(), 1);
        assert!(table.take_due(&zone, eleven).is_empty());
        assert_eq!(
            table.next_wake(),
            Some(Utc.with_ymd_and_hms(2026, 2, 22, 12, 0, 0).unwrap())
        );

        // Three missed hours collapse into one fire.
        let late = Utc.with_ymd_and_hms(2026, 2, 22, 15, 5, 0).unwrap();
        assert_eq!(table.take_due(&zone, late).len(), 1);
        assert_eq!(
            table.next_wake(),
            Some(Utc.with_ymd_and_hms(2026, 2, 22, 16, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_render_without_prompt_starts_with_section() {
        let def = ScheduleDef::new("r", "0 9 * * *", "ops", "chat").with_repos(true);
        let content = render_job_content(&def, &[api_repo()], None);
        assert_eq!(
            content,
            "## Registered Repositories\n- api (/srv/api): backend"
        );
    }
}
