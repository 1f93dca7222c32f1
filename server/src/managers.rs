use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::io::AsyncWriteExt;

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIT LOG
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub log: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub category: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub trait LogManager: Send + Sync + Clone {
    fn log_entry(
        &self,
        log: String,
        category: &'static str,
    ) -> impl std::future::Future<Output = Result<LogEntry, LogError>> + Send;
}

/// Appends `id|date|category|message` lines to a file.
#[derive(Clone)]
pub struct TextLogManager {
    file_path: PathBuf,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl TextLogManager {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn parse_line(line: &str) -> Option<LogEntry> {
        let parts: Vec<&str> = line.splitn(4, '|').collect();
        if parts.len() != 4 {
            return None;
        }

        let date = OffsetDateTime::parse(parts[1], &Rfc3339).ok()?;

        Some(LogEntry {
            id: parts[0].to_string(),
            date,
            category: parts[2].to_string(),
            log: parts[3].replace("\\n", "\n"),
        })
    }

    fn format_entry(entry: &LogEntry) -> String {
        let date_str = entry.date.format(&Rfc3339).unwrap_or_default();
        format!(
            "{}|{}|{}|{}",
            entry.id,
            date_str,
            entry.category,
            entry.log.replace('\n', "\\n")
        )
    }
}

impl LogManager for TextLogManager {
    async fn log_entry(&self, log: String, category: &'static str) -> Result<LogEntry, LogError> {
        let entry = LogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            log,
            date: OffsetDateTime::now_utc(),
            category: category.to_string(),
        };

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await?;

        let line = format!("{}\n", Self::format_entry(&entry));
        file.write_all(line.as_bytes()).await?;

        Ok(entry)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOGIN LOCKOUT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct LockoutAttempt {
    pub attempts: u32,
    pub last_attempt: Instant,
    pub locked_until: Option<Instant>,
}

pub trait LockoutManager: Send + Sync + Clone {
    fn record_failed_attempt(&self, identifier: &str);

    fn record_successful_login(&self, identifier: &str);

    /// Remaining lockout in seconds, if locked.
    fn is_locked_out(&self, identifier: &str) -> Option<u64>;
}

#[derive(Clone)]
pub struct DefaultLockoutManager {
    attempts: Arc<Mutex<HashMap<String, LockoutAttempt>>>,
    max_attempts: u32,
    lockout_duration: Duration,
    attempt_window: Duration,
}

impl DefaultLockoutManager {
    pub fn new(max_attempts: u32, lockout_duration: Duration, attempt_window: Duration) -> Self {
        Self {
            attempts: Arc::new(Mutex::new(HashMap::new())),
            max_attempts,
            lockout_duration,
            attempt_window,
        }
    }

    fn key(identifier: &str) -> String {
        identifier.trim().to_lowercase()
    }

    /// Neither counting toward a lockout nor locked.
    fn is_stale(&self, entry: &LockoutAttempt, now: Instant) -> bool {
        let locked = entry.locked_until.is_some_and(|until| now < until);
        !locked && now.duration_since(entry.last_attempt) > self.attempt_window
    }
}

impl Default for DefaultLockoutManager {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(15 * 60), Duration::from_secs(5 * 60))
    }
}

impl LockoutManager for DefaultLockoutManager {
    fn record_failed_attempt(&self, identifier: &str) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        attempts.retain(|_, entry| !self.is_stale(entry, now));

        let entry = attempts
            .entry(Self::key(identifier))
            .or_insert(LockoutAttempt {
                attempts: 0,
                last_attempt: now,
                locked_until: None,
            });

        if let Some(locked_until) = entry.locked_until {
            if now < locked_until {
                return;
            }
            entry.attempts = 0;
            entry.locked_until = None;
        }

        if now.duration_since(entry.last_attempt) > self.attempt_window {
            entry.attempts = 0;
        }

        entry.attempts += 1;
        entry.last_attempt = now;

        if entry.attempts >= self.max_attempts {
            entry.locked_until = Some(now + self.lockout_duration);
        }
    }

    fn record_successful_login(&self, identifier: &str) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.remove(&Self::key(identifier));
    }

    fn is_locked_out(&self, identifier: &str) -> Option<u64> {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let entry = attempts.get_mut(&Self::key(identifier))?;
        match entry.locked_until {
            Some(locked_until) if now < locked_until => {
                Some(locked_until.duration_since(now).as_secs().max(1))
            }
            Some(_) => {
                entry.attempts = 0;
                entry.locked_until = None;
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lockout_after_max_attempts() {
        let manager = DefaultLockoutManager::new(
            3,
            Duration::from_secs(60),
            Duration::from_secs(60),
        );

        manager.record_failed_attempt("Demo-lition");
        manager.record_failed_attempt("demo-lition");
        assert!(manager.is_locked_out("demo-lition").is_none());

        manager.record_failed_attempt("DEMO-LITION");
        assert!(manager.is_locked_out("demo-lition").is_some());

        manager.record_successful_login("demo-lition");
        assert!(manager.is_locked_out("demo-lition").is_none());
    }

    #[test]
    fn expired_attempts_are_evicted() {
        let manager = DefaultLockoutManager::new(
            3,
            Duration::from_millis(200),
            Duration::from_millis(200),
        );

        for i in 0..50 {
            manager.record_failed_attempt(&format!("guess-{}", i));
        }
        for _ in 0..3 {
            manager.record_failed_attempt("locked");
        }
        assert_eq!(manager.attempts.lock().unwrap().len(), 51);

        std::thread::sleep(Duration::from_millis(300));
        manager.record_failed_attempt("fresh");

        let attempts = manager.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(attempts.contains_key("fresh"));
    }

    #[test]
    fn active_lockouts_survive_pruning() {
        let manager = DefaultLockoutManager::new(
            2,
            Duration::from_secs(60),
            Duration::from_millis(10),
        );

        manager.record_failed_attempt("demo-lition");
        manager.record_failed_attempt("demo-lition");
        std::thread::sleep(Duration::from_millis(30));
        manager.record_failed_attempt("someone-else");

        assert!(manager.is_locked_out("demo-lition").is_some());
    }

    #[test]
    fn audit_lines_round_trip() {
        let entry = LogEntry {
            id: "abc".to_string(),
            log: "Group created:\ngroup_id=1".to_string(),
            date: OffsetDateTime::UNIX_EPOCH,
            category: "group".to_string(),
        };

        let line = TextLogManager::format_entry(&entry);
        assert!(!line.contains('\n'));
        assert_eq!(TextLogManager::parse_line(&line), Some(entry));
    }

    #[tokio::test]
    async fn text_log_manager_appends_lines() {
        let path = std::env::temp_dir()
            .join(format!("meetup-audit-{}", uuid::Uuid::new_v4()))
            .join("audit.log");
        let manager = TextLogManager::new(&path);

        manager
            .log_entry("first".to_string(), "group")
            .await
            .unwrap();
        manager
            .log_entry("second".to_string(), "event")
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let entries: Vec<LogEntry> = contents
            .lines()
            .filter_map(TextLogManager::parse_line)
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].category, "event");

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }
}
