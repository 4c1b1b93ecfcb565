//! Rolling file logs for the repository layer.
//!
//! Events are single-line `key=value` records (`event=… module=… status=…`).
//! Query events carry SQL text and row counts, never bound values.
//!
//! # Invariants
//! - One logger per process. A second init with the same level and directory
//!   is a no-op; any other combination is rejected.
//! - Initialization reports failures as `Err` and never panics.

use crate::config::LoggingSettings;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_BASENAME: &str = "datarepo";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_FILES: usize = 5;
const PANIC_MESSAGE_LIMIT: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Validated level and directory.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogTarget {
    level: &'static str,
    dir: PathBuf,
}

impl LogTarget {
    fn resolve(level: &str, dir: &str) -> Result<Self, String> {
        Ok(Self {
            level: parse_level(level)?,
            dir: parse_dir(dir)?,
        })
    }

    /// Err unless `requested` is exactly this target.
    fn accept(&self, requested: &LogTarget) -> Result<(), String> {
        if self.dir != requested.dir {
            return Err(format!(
                "logging already writes to `{}`; cannot move it to `{}`",
                self.dir.display(),
                requested.dir.display()
            ));
        }
        if self.level != requested.level {
            return Err(format!(
                "logging already runs at `{}`; cannot change it to `{}`",
                self.level, requested.level
            ));
        }
        Ok(())
    }

    fn start(&self) -> Result<LoggerHandle, String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|err| format!("cannot create log directory `{}`: {err}", self.dir.display()))?;
        Logger::try_with_str(self.level)
            .map_err(|err| format!("log level `{}` rejected: {err}", self.level))?
            .log_to_file(
                FileSpec::default()
                    .directory(self.dir.as_path())
                    .basename(LOG_BASENAME),
            )
            .rotate(
                Criterion::Size(ROTATE_AT_BYTES),
                Naming::Numbers,
                Cleanup::KeepLogFiles(KEEP_FILES),
            )
            .write_mode(WriteMode::BufferAndFlush)
            .append()
            .format_for_files(flexi_logger::detailed_format)
            .start()
            .map_err(|err| format!("logger backend failed to start: {err}"))
    }
}

struct ActiveLogger {
    target: LogTarget,
    _handle: LoggerHandle,
}

/// Starts file logging at `level` under the absolute directory `log_dir`.
///
/// # Errors
/// - Unknown level, blank or relative directory, or an unwritable directory.
/// - Logging is already active with a different level or directory.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let requested = LogTarget::resolve(level, log_dir)?;
    if let Some(active) = ACTIVE.get() {
        return active.target.accept(&requested);
    }

    let active = ACTIVE.get_or_try_init(|| {
        let handle = requested.start()?;
        install_panic_hook();
        info!(
            "event=logging_init module=logging status=ok os={} build={} version={} level={} dir={}",
            std::env::consts::OS,
            if cfg!(debug_assertions) { "debug" } else { "release" },
            env!("CARGO_PKG_VERSION"),
            requested.level,
            requested.dir.display()
        );
        Ok::<_, String>(ActiveLogger {
            target: requested.clone(),
            _handle: handle,
        })
    })?;
    // Another thread may have won the race with other settings.
    active.target.accept(&requested)
}

/// Starts logging when `settings.dir` is set.
///
/// Returns whether file logging is active afterwards.
pub fn init_logging_from(settings: &LoggingSettings) -> Result<bool, String> {
    let Some(dir) = settings.dir.as_deref() else {
        return Ok(false);
    };
    init_logging(&settings.level, dir)?;
    Ok(true)
}

/// Active `(level, log_dir)`, or `None` before initialization.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.target.level, active.target.dir.clone()))
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn parse_level(level: &str) -> Result<&'static str, String> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    let lowered = level.trim().to_ascii_lowercase();
    let lowered = if lowered == "warning" { "warn".to_string() } else { lowered };
    LEVELS
        .into_iter()
        .find(|known| *known == lowered)
        .ok_or_else(|| format!("unknown log level `{lowered}` (use {})", LEVELS.join("|")))
}

fn parse_dir(dir: &str) -> Result<PathBuf, String> {
    let path = Path::new(dir.trim());
    if path.as_os_str().is_empty() {
        return Err("log directory is blank".to_string());
    }
    if !path.is_absolute() {
        return Err(format!("log directory must be absolute, got `{}`", path.display()));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map_or_else(|| "unknown".to_string(), |at| format!("{}:{}", at.file(), at.line()));
            let payload = info
                .payload()
                .downcast_ref::<&str>()
                .map(|text| (*text).to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(
                "event=panic module=logging status=error location={} payload={}",
                location,
                one_line(&payload, PANIC_MESSAGE_LIMIT)
            );
            previous(info);
        }));
    });
}

/// Joins lines and caps `text` at `limit` chars.
fn one_line(text: &str, limit: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() <= limit {
        return flat;
    }
    let mut capped: String = flat.chars().take(limit).collect();
    capped.push_str("...");
    capped
}

#[cfg(test)]
mod tests {
    use super::{init_logging, init_logging_from, logging_status, one_line, parse_dir, parse_level};
    use crate::config::LoggingSettings;
    use std::path::PathBuf;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "datarepo-log-{tag}-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ))
    }

    #[test]
    fn levels_are_case_insensitive() {
        assert_eq!(parse_level("INFO").unwrap(), "info");
        assert_eq!(parse_level(" Warning ").unwrap(), "warn");
        assert!(parse_level("verbose").unwrap_err().contains("unknown log level"));
    }

    #[test]
    fn relative_and_blank_dirs_are_rejected() {
        assert!(parse_dir("logs/dev").unwrap_err().contains("absolute"));
        assert!(parse_dir("   ").unwrap_err().contains("blank"));
    }

    #[test]
    fn panic_text_is_flattened_and_capped() {
        let text = one_line("line1\nline2\rline3", 8);
        assert!(!text.contains('\n'));
        assert!(!text.contains('\r'));
        assert_eq!(text, "line1 li...");
        assert_eq!(one_line("short", 8), "short");
    }

    #[test]
    fn second_init_must_match_the_first() {
        let dir = scratch_dir("active");
        let dir_text = dir.to_str().unwrap().to_string();
        let other = scratch_dir("other");

        init_logging("info", &dir_text).unwrap();
        init_logging("INFO", &dir_text).unwrap();
        assert!(init_logging("debug", &dir_text)
            .unwrap_err()
            .contains("cannot change"));
        assert!(init_logging("info", other.to_str().unwrap())
            .unwrap_err()
            .contains("cannot move"));
        assert_eq!(logging_status(), Some(("info", dir)));

        let settings = LoggingSettings {
            level: "info".to_string(),
            dir: Some(dir_text),
        };
        assert_eq!(init_logging_from(&settings), Ok(true));
    }

    #[test]
    fn settings_without_dir_leave_logging_off() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            dir: None,
        };
        assert_eq!(init_logging_from(&settings), Ok(false));
    }
}
