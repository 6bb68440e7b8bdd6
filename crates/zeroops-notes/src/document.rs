//! Text-level operations on note documents.
//!
//! Day document:
//! ```text
//! # 2024-06-01
//!
//! - 09:00 | bought milk
//! - 13:30 | call plumber
//! ```
//!
//! Category document:
//! ```text
//! # groceries
//!
//! ## 2024-06-01
//! - 09:00 | milk
//!
//! ## 2024-06-02
//! - 08:15 | eggs
//! ```

/// Every note line starts with this; nothing else does.
pub const ENTRY_PREFIX: &str = "- ";

pub fn is_entry(line: &str) -> bool {
    line.starts_with(ENTRY_PREFIX)
}

/// Render one note line (no trailing newline).
pub fn render_entry(time: &str, text: &str) -> String {
    format!("{ENTRY_PREFIX}{time} | {text}")
}

/// Collapse line breaks so a note always stays on one line.
pub fn normalize_text(text: &str) -> String {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn new_day_document(date: &str, entry: &str) -> String {
    format!("# {date}\n\n{entry}\n")
}

/// Append an entry to an existing day document.
pub fn append_to_day(mut doc: String, entry: &str) -> String {
    if !doc.is_empty() && !doc.ends_with('\n') {
        doc.push('\n');
    }
    doc.push_str(entry);
    doc.push('\n');
    doc
}

pub fn new_category_document(category: &str, date: &str, entry: &str) -> String {
    format!("# {category}\n\n## {date}\n{entry}\n")
}

/// Add an entry under `## date` in a category document.
///
/// An existing date section gets the entry after its last note, so a day's
/// notes stay together in insertion order. A missing section is appended at
/// the end of the document.
pub fn insert_into_category(doc: &str, date: &str, entry: &str) -> String {
    let heading = format!("## {date}");
    let mut lines: Vec<&str> = doc.lines().collect();

    let Some(heading_idx) = lines.iter().position(|l| l.trim_end() == heading) else {
        let mut out = doc.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("\n{heading}\n{entry}\n"));
        return out;
    };

    let mut insert_at = heading_idx + 1;
    for (offset, line) in lines[heading_idx + 1..].iter().enumerate() {
        if line.starts_with('#') {
            break;
        }
        if is_entry(line) {
            insert_at = heading_idx + 1 + offset + 1;
        }
    }

    lines.insert(insert_at, entry);
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Count note lines.
pub fn entry_count(doc: &str) -> usize {
    doc.lines().filter(|l| is_entry(l)).count()
}

/// Drop the `index`-th (1-based) note line, leaving every other line as is.
///
/// Returns `None` when there is no such note.
pub fn remove_entry(doc: &str, index: usize) -> Option<String> {
    if index == 0 {
        return None;
    }

    let mut seen = 0;
    let mut removed = false;
    let kept: Vec<&str> = doc
        .split('\n')
        .filter(|line| {
            if !removed && is_entry(line) {
                seen += 1;
                if seen == index {
                    removed = true;
                    return false;
                }
            }
            true
        })
        .collect();

    removed.then(|| kept.join("\n"))
}

/// Note lines containing `needle` (already lower-cased), in file order.
pub fn matching_entries<'a>(doc: &'a str, needle: &str) -> Vec<&'a str> {
    doc.lines()
        .filter(|l| is_entry(l) && l.to_lowercase().contains(needle))
        .collect()
}
