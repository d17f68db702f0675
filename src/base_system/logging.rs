use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::{io, panic};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024; // 10MB
const LATEST_LOG: &str = "latest.log";

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Debug)]
pub struct LogOptions {
    /// 控制台输出 DEBUG 级别
    pub debug: bool,
    /// 控制台输出 INFO 级别（否则只输出 WARN 及以上）
    pub verbose: bool,
    pub use_color: bool,
    /// 日志目录的上级目录，默认当前目录
    pub base_dir: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            verbose: false,
            use_color: true,
            base_dir: None,
        }
    }
}

/// 持有文件日志的写线程；drop 时刷新缓冲。
pub struct LogSystem {
    guard: Arc<Mutex<Option<WorkerGuard>>>,
    logs_dir: PathBuf,
}

impl LogSystem {
    pub fn init(options: LogOptions) -> Result<Self, LogError> {
        let logs_dir = options
            .base_dir
            .as_deref()
            .map(|b| b.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));
        fs::create_dir_all(&logs_dir)?;
        archive_if_large(&logs_dir.join(LATEST_LOG), &logs_dir)?;

        let file_appender = rolling::never(&logs_dir, LATEST_LOG);
        let (file_writer, guard) = non_blocking::NonBlockingBuilder::default()
            .lossy(false)
            .finish(file_appender);

        let console_level = if options.debug {
            LevelFilter::DEBUG
        } else if options.verbose {
            LevelFilter::INFO
        } else {
            LevelFilter::WARN
        };

        // stdout 留给进度输出，日志走 stderr
        let console_layer = fmt::layer()
            .with_target(false)
            .with_level(true)
            .with_ansi(options.use_color)
            .with_writer(io::stderr)
            .with_filter(console_level);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(LevelFilter::DEBUG);

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("global subscriber") || msg.contains("already") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;

        let system = Self {
            guard: Arc::new(Mutex::new(Some(guard))),
            logs_dir,
        };
        system.install_panic_hook();
        system.install_signal_handler();
        Ok(system)
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    fn install_panic_hook(&self) {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            match info.location() {
                Some(location) => {
                    error!("panic at {}:{}: {}", location.file(), location.line(), info)
                }
                None => error!("panic: {info}"),
            }
            previous(info);
        }));
    }

    fn install_signal_handler(&self) {
        let guard = Arc::clone(&self.guard);
        let _ = ctrlc::set_handler(move || {
            info!("收到中断信号，退出");
            flush_guard(&guard);
            std::process::exit(130);
        });
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        flush_guard(&self.guard);
    }
}

fn flush_guard(guard: &Mutex<Option<WorkerGuard>>) {
    if let Ok(mut guard) = guard.lock() {
        guard.take();
    }
}

fn archive_if_large(latest_log: &Path, logs_dir: &Path) -> Result<Option<PathBuf>, LogError> {
    match fs::metadata(latest_log) {
        Ok(meta) if meta.len() >= MAX_LOG_BYTES => archive_log_file(latest_log, logs_dir),
        _ => Ok(None),
    }
}

/// 把 latest.log 压缩成 `log_<时间戳>.zip` 并删除原文件。
fn archive_log_file(latest_log: &Path, logs_dir: &Path) -> Result<Option<PathBuf>, LogError> {
    let timestamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let archive_path = logs_dir.join(format!("log_{timestamp}.zip"));

    let mut zip = zip::ZipWriter::new(File::create(&archive_path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(format!("{timestamp}.log"), options)?;
    let mut source = File::open(latest_log)?;
    io::copy(&mut source, &mut zip)?;
    zip.finish()?;
    drop(source);

    fs::remove_file(latest_log)?;
    Ok(Some(archive_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_log_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let latest = dir.path().join(LATEST_LOG);
        fs::write(&latest, "line\n").unwrap();

        assert!(archive_if_large(&latest, dir.path()).unwrap().is_none());
        assert!(latest.exists());
    }

    #[test]
    fn archive_replaces_latest_with_zip() {
        let dir = tempfile::tempdir().unwrap();
        let latest = dir.path().join(LATEST_LOG);
        fs::write(&latest, "old run\n").unwrap();

        let archive = archive_log_file(&latest, dir.path()).unwrap().unwrap();
        assert!(archive.exists());
        assert!(!latest.exists());
        assert_eq!(archive.extension().and_then(|e| e.to_str()), Some("zip"));
    }
}
