use std::path::Path;

pub const LOG_FILE_BASENAME: &str = "todo-list";
pub const LOG_FILE_SUFFIX: &str = "log";
pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_ROTATE_KEEP_FILES: usize = 7;

/// Log files sit next to the persisted collection.
pub fn log_directory(data_dir: &Path) -> &Path {
    data_dir
}

pub fn init_logging(data_dir: &Path, verbose: u8) -> Result<(), flexi_logger::FlexiLoggerError> {
    use flexi_logger::{
        detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming, WriteMode,
    };

    std::fs::create_dir_all(data_dir)?;
    let spec = crate::config::log_spec(verbose);

    Logger::try_with_str(&spec)?
        .log_to_file(
            FileSpec::default()
                .directory(log_directory(data_dir))
                .basename(LOG_FILE_BASENAME)
                .suffix(LOG_FILE_SUFFIX),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(LOG_ROTATE_KEEP_FILES),
        )
        // stdout carries command output, so echo to stderr and only when asked.
        .duplicate_to_stderr(if verbose > 0 {
            Duplicate::Debug
        } else {
            Duplicate::None
        })
        .start()?;

    install_panic_hook();

    log::info!(
        "logging: initialized dir={} spec={spec} rotate_size_bytes={} keep_files={}",
        log_directory(data_dir).display(),
        LOG_ROTATE_SIZE_BYTES,
        LOG_ROTATE_KEEP_FILES
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info: &std::panic::PanicHookInfo<'_>| {
        let line = panic_line(info.payload(), info.location());
        let backtrace = std::backtrace::Backtrace::force_capture();
        log::error!("{line}\n{backtrace}");
        default_hook(info);
    }));
}

/// `logging: panic message=.. at=file:line` with the thread name when it has one.
fn panic_line(
    payload: &(dyn std::any::Any + Send),
    location: Option<&std::panic::Location<'_>>,
) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("?");
    let at = location.map_or_else(
        || "?".to_string(),
        |loc| format!("{}:{}", loc.file(), loc.line()),
    );
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => format!("logging: panic thread={name} at={at} message={message:?}"),
        None => format!("logging: panic at={at} message={message:?}"),
    }
}
