//! Append-only daily logs.
//!
//! One markdown file per local date (`YYYY-MM-DD.md`), each starting with a
//! `# YYYY-MM-DD` heading followed by `- HH:MM:SS entry` lines.

use crate::error::{PacerError, Result};
use chrono::{DateTime, Local, NaiveDate};
use std::io::Write;
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Directory of date-named append-only log files.
#[derive(Debug, Clone)]
pub struct DailyLog {
    dir: PathBuf,
}

impl DailyLog {
    /// Log files live directly under `dir`, which is created on first append.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the log files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for `date`.
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.md", date.format(DATE_FORMAT)))
    }

    /// Append `entry` to today's log. Returns the file written.
    pub fn append(&self, entry: &str) -> Result<PathBuf> {
        self.append_at(Local::now(), entry)
    }

    /// Append `entry` to the log for the date of `at`.
    pub fn append_at(&self, at: DateTime<Local>, entry: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| PacerError::Log(format!("cannot create log dir: {e}")))?;

        let date = at.date_naive();
        let path = self.path_for(date);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PacerError::Log(format!("cannot open {}: {e}", path.display())))?;

        let is_new = file
            .metadata()
            .map_err(|e| PacerError::Log(format!("cannot stat {}: {e}", path.display())))?
            .len()
            == 0;
        let mut line = String::new();
        if is_new {
            line.push_str(&format!("# {}\n\n", date.format(DATE_FORMAT)));
        }
        // Keep one entry per line.
        let entry = entry.trim_end().replace('\n', " ");
        line.push_str(&format!("- {} {entry}\n", at.format("%H:%M:%S")));

        file.write_all(line.as_bytes())
            .map_err(|e| PacerError::Log(format!("cannot append to {}: {e}", path.display())))?;
        Ok(path)
    }

    /// Contents of the log for `date`, if one exists.
    pub fn read(&self, date: NaiveDate) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(date)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PacerError::Log(format!("cannot read log for {date}: {e}"))),
        }
    }

    /// Entry texts logged on `date`, without the heading or timestamps.
    pub fn entries(&self, date: NaiveDate) -> Result<Vec<String>> {
        let Some(contents) = self.read(date)? else {
            return Ok(Vec::new());
        };
        Ok(contents
            .lines()
            .filter_map(|line| line.strip_prefix("- "))
            .map(|line| match line.split_once(' ') {
                Some((_time, entry)) => entry.to_owned(),
                None => String::new(),
            })
            .collect())
    }

    /// Dates that have a log file, oldest first.
    pub fn dates(&self) -> Result<Vec<NaiveDate>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PacerError::Log(format!("cannot list logs: {e}"))),
        };

        let mut dates: Vec<NaiveDate> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let stem = name.to_str()?.strip_suffix(".md")?;
                NaiveDate::parse_from_str(stem, DATE_FORMAT).ok()
            })
            .collect();
        dates.sort_unstable();
        Ok(dates)
    }

    /// The newest `days` logs with their contents, oldest first.
    pub fn recent(&self, days: usize) -> Result<Vec<(NaiveDate, String)>> {
        let dates = self.dates()?;
        let skip = dates.len().saturating_sub(days);
        let mut logs = Vec::with_capacity(dates.len() - skip);
        for date in dates.into_iter().skip(skip) {
            if let Some(contents) = self.read(date)? {
                logs.push((date, contents));
            }
        }
        Ok(logs)
    }
}
