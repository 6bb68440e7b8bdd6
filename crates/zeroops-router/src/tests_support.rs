//! Shared fixture for router tests.

use std::sync::Arc;

use tempfile::TempDir;

use zeroops_core::testing::{RecordingTransport, ScriptedDispatcher};
use zeroops_notes::NotesStore;
use zeroops_scheduler::{Metadata, MetadataStore, Scheduler, Zone};

use crate::router::{EventRouter, RouterConfig};

pub(crate) struct Harness {
    pub dispatcher: Arc<ScriptedDispatcher>,
    pub transport: Arc<RecordingTransport>,
    pub metadata: Arc<MetadataStore>,
    pub notes: Option<Arc<NotesStore>>,
    _notes_dir: Option<TempDir>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dispatcher: Arc::new(ScriptedDispatcher::new()),
            transport: Arc::new(RecordingTransport::new()),
            metadata: Arc::new(MetadataStore::in_memory(Metadata::default())),
            notes: None,
            _notes_dir: None,
        }
    }

    pub async fn with_notes() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let notes = Arc::new(NotesStore::open(dir.path()).await.unwrap());
        Self {
            notes: Some(notes),
            _notes_dir: Some(dir),
            ..Self::new()
        }
    }

    pub fn config(&self) -> RouterConfig {
        RouterConfig {
            bot_id: "bot-1".into(),
            bot_name: "zeroops".into(),
            ..RouterConfig::default()
        }
    }

    pub fn router(&self) -> EventRouter {
        self.router_with(self.config())
    }

    pub fn router_with(&self, config: RouterConfig) -> EventRouter {
        let router = EventRouter::new(
            self.dispatcher.clone(),
            self.transport.clone(),
            self.metadata.clone(),
            config,
        );
        match &self.notes {
            Some(notes) => router.with_notes(notes.clone()),
            None => router,
        }
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(
            self.dispatcher.clone(),
            self.transport.clone(),
            self.metadata.clone(),
            Zone::Local,
        ))
    }
}
