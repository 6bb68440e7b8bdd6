//! File-backed notes store.
//!
//! Layout under the base directory:
//! - `daily/<YYYY-MM-DD>.md` — one document per day
//! - `categories/<name>.md` — one document per category, sectioned by date
//!
//! One writer lock covers both partitions. Readers share it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use tokio::sync::RwLock;
use zeroops_core::error::{RelayError, Result};

use crate::document;

/// Category name that routes a note to the day partition.
pub const DAILY_CATEGORY: &str = "daily";

/// Longest window [`NotesStore::get_recent`] accepts.
pub const MAX_RECENT_DAYS: u32 = 365;

const DAILY_DIR: &str = "daily";
const CATEGORIES_DIR: &str = "categories";
const EXTENSION: &str = "md";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

pub struct NotesStore {
    base_dir: PathBuf,
    lock: RwLock<()>,
}

impl NotesStore {
    /// Open a store rooted at `base_dir`, creating `daily/` and `categories/`.
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            base_dir: base_dir.into(),
            lock: RwLock::new(()),
        };
        store.ensure_dirs().await?;
        tracing::info!("📝 Notes store at {}", store.base_dir.display());
        Ok(store)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of a day partition, whether or not it exists yet.
    pub fn daily_path(&self, date: &str) -> PathBuf {
        self.base_dir
            .join(DAILY_DIR)
            .join(format!("{date}.{EXTENSION}"))
    }

    pub fn category_path(&self, category: &str) -> PathBuf {
        self.base_dir
            .join(CATEGORIES_DIR)
            .join(format!("{category}.{EXTENSION}"))
    }

    /// Add a note stamped with the current local time.
    ///
    /// `category` of `""` or `"daily"` goes to today's day partition; any
    /// other value goes to that category, under today's date section.
    pub async fn add(&self, text: &str, category: &str) -> Result<()> {
        self.add_at(text, category, Local::now().naive_local()).await
    }

    /// [`add`](Self::add) with an explicit timestamp.
    pub async fn add_at(&self, text: &str, category: &str, now: NaiveDateTime) -> Result<()> {
        let text = document::normalize_text(text);
        if text.is_empty() {
            return Err(RelayError::Validation("note text is empty".into()));
        }
        let category = category.trim();
        let is_daily = category.is_empty() || category == DAILY_CATEGORY;
        if !is_daily {
            validate_category(category)?;
        }

        let date = now.format(DATE_FORMAT).to_string();
        let entry = document::render_entry(&now.format(TIME_FORMAT).to_string(), &text);

        let _guard = self.lock.write().await;
        self.ensure_dirs().await?;

        if is_daily {
            let path = self.daily_path(&date);
            let doc = match read_optional(&path).await? {
                Some(existing) => document::append_to_day(existing, &entry),
                None => document::new_day_document(&date, &entry),
            };
            write(&path, &doc).await?;
        } else {
            let path = self.category_path(category);
            let doc = match read_optional(&path).await? {
                Some(existing) => document::insert_into_category(&existing, &date, &entry),
                None => document::new_category_document(category, &date, &entry),
            };
            write(&path, &doc).await?;
        }

        tracing::debug!(
            "📝 Note added to {}",
            if is_daily { DAILY_CATEGORY } else { category }
        );
        Ok(())
    }

    pub async fn get_today(&self) -> Result<String> {
        self.get_by_date(&today()).await
    }

    /// Raw day document, or `""` if there are no notes that day.
    pub async fn get_by_date(&self, date: &str) -> Result<String> {
        validate_date(date)?;
        let _guard = self.lock.read().await;
        Ok(read_optional(&self.daily_path(date)).await?.unwrap_or_default())
    }

    /// Raw category document, or `""` if the category does not exist.
    pub async fn get_by_category(&self, category: &str) -> Result<String> {
        let category = category.trim();
        validate_category(category)?;
        let _guard = self.lock.read().await;
        Ok(read_optional(&self.category_path(category))
            .await?
            .unwrap_or_default())
    }

    /// The last `days` day documents ending today, newest first, separated
    /// by a blank line. Missing days are skipped. `days` is capped at
    /// [`MAX_RECENT_DAYS`].
    pub async fn get_recent(&self, days: u32) -> Result<String> {
        self.get_recent_from(days, Local::now().date_naive()).await
    }

    pub async fn get_recent_from(&self, days: u32, today: NaiveDate) -> Result<String> {
        if days > MAX_RECENT_DAYS {
            return Err(RelayError::Validation(format!(
                "at most {MAX_RECENT_DAYS} days of notes can be listed"
            )));
        }

        let _guard = self.lock.read().await;
        let mut docs = Vec::new();

        for offset in 0..u64::from(days) {
            let Some(day) = today.checked_sub_days(Days::new(offset)) else {
                break;
            };
            let date = day.format(DATE_FORMAT).to_string();
            if let Some(doc) = read_optional(&self.daily_path(&date)).await? {
                let mut doc = doc.trim_end().to_string();
                doc.push('\n');
                docs.push(doc);
            }
        }

        Ok(docs.join("\n"))
    }

    /// Names of existing categories, sorted.
    pub async fn list_categories(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read().await;
        list_documents(&self.base_dir.join(CATEGORIES_DIR)).await
    }

    /// Remove the `index`-th (1-based) note of a day.
    ///
    /// Indexes shift after a removal: removing #2 makes the old #3 the new #2.
    pub async fn remove(&self, date: &str, index: usize) -> Result<()> {
        validate_date(date)?;
        if index == 0 {
            return Err(RelayError::Validation("note index starts at 1".into()));
        }

        let _guard = self.lock.write().await;
        let path = self.daily_path(date);
        let doc = read_optional(&path)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("no notes for {date}")))?;

        let updated = document::remove_entry(&doc, index)
            .ok_or_else(|| RelayError::NotFound(format!("note #{index} not found on {date}")))?;
        write(&path, &updated).await?;

        tracing::info!("🗑️ Removed note #{} from {}", index, date);
        Ok(())
    }

    /// Case-insensitive substring search over every note line. A blank
    /// query matches every note.
    ///
    /// Results look like `[2024-06-01] - 09:00 | bought milk`: day partitions
    /// first, then categories, each in name order, lines in file order.
    pub async fn search(&self, query: &str) -> Result<Vec<String>> {
        let needle = query.trim().to_lowercase();
        let _guard = self.lock.read().await;
        let mut results = Vec::new();

        for dir in [DAILY_DIR, CATEGORIES_DIR] {
            let dir = self.base_dir.join(dir);
            for name in list_documents(&dir).await? {
                let path = dir.join(format!("{name}.{EXTENSION}"));
                let Some(doc) = read_optional(&path).await? else {
                    continue;
                };
                results.extend(
                    document::matching_entries(&doc, &needle)
                        .into_iter()
                        .map(|line| format!("[{name}] {line}")),
                );
            }
        }

        Ok(results)
    }

    async fn ensure_dirs(&self) -> Result<()> {
        for dir in [DAILY_DIR, CATEGORIES_DIR] {
            let path = self.base_dir.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| RelayError::io("create dir", &path, e))?;
        }
        Ok(())
    }
}

/// Today's date in the store's date format.
pub fn today() -> String {
    Local::now().format(DATE_FORMAT).to_string()
}

/// Accept only `YYYY-MM-DD` calendar dates.
pub fn validate_date(date: &str) -> Result<()> {
    let valid = date.len() == 10 && NaiveDate::parse_from_str(date, DATE_FORMAT).is_ok();
    if valid {
        Ok(())
    } else {
        Err(RelayError::Validation(format!(
            "invalid date '{date}', expected YYYY-MM-DD"
        )))
    }
}

/// Category names become file names; keep them to a single safe component.
fn validate_category(category: &str) -> Result<()> {
    let bad = category.is_empty()
        || category.starts_with('.')
        || category.contains(['/', '\\'])
        || category.contains("..");
    if bad {
        Err(RelayError::Validation(format!(
            "invalid category name '{category}'"
        )))
    } else {
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RelayError::io("read", path, e)),
    }
}

async fn write(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| RelayError::io("write", path, e))
}

/// Stems of `*.md` files in `dir`, sorted. A missing directory is empty.
async fn list_documents(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RelayError::io("list", dir, e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RelayError::io("list", dir, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if let (true, Some(stem)) = (is_file, path.file_stem().and_then(|s| s.to_str())) {
            names.push(stem.to_string());
        }
    }

    names.sort();
    Ok(names)
}
