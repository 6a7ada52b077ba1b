//! File timestamp formatting (UTC).

use anyhow::{Context, Result};
use std::path::Path;
use std::time::SystemTime;
use time::macros::format_description;
use time::OffsetDateTime;

/// `YYYY-MM-DD`
pub fn format_date(when: SystemTime) -> Result<String> {
    OffsetDateTime::from(when)
        .format(format_description!("[year]-[month]-[day]"))
        .context("formatting date")
}

/// `YYYY-MM-DD HH:MM:SS`
pub fn format_datetime(when: SystemTime) -> Result<String> {
    OffsetDateTime::from(when)
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .context("formatting timestamp")
}

pub fn modified(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|md| md.modified())
        .with_context(|| format!("reading modification time of {}", path.display()))
}
