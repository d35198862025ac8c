//! Discovery files under the runtime directory.
//!
//! Each file holds one base URL (or, for the pid file, one process id) with
//! no trailing newline. Sibling processes poll for them at startup.
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

pub const MANAGEMENT_URL_FILENAME: &str = "management.url";
pub const STATIC_URL_FILENAME: &str = "static.url";
pub const GATEWAY_URL_FILENAME: &str = "gateway.url";
pub const PID_FILENAME: &str = "gateway.pid";

/// Fixed spacing between [`await_address`] polls.
pub const AWAIT_INTERVAL: Duration = Duration::from_secs(1);

/// Create `runtime_path` if needed and check it accepts writes.
pub async fn ensure_runtime_dir(runtime_path: &Path) -> io::Result<()> {
    tokio::fs::create_dir_all(runtime_path).await?;
    let metadata = tokio::fs::metadata(runtime_path).await?;
    if metadata.permissions().readonly() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("runtime path {} is read-only", runtime_path.display()),
        ));
    }
    Ok(())
}

/// Write `url` to `runtime_path/name`, creating the directory first.
pub async fn publish_address(runtime_path: &Path, name: &str, url: &str) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(runtime_path).await?;
    let file = runtime_path.join(name);
    tokio::fs::write(&file, url).await?;
    tracing::info!(file = %file.display(), url, "Published address");
    Ok(file)
}

/// Poll for `runtime_path/name` up to `max_retries` times and return its contents.
pub async fn await_address(
    runtime_path: &Path,
    name: &str,
    max_retries: u32,
) -> io::Result<String> {
    await_address_with_interval(runtime_path, name, max_retries, AWAIT_INTERVAL).await
}

pub async fn await_address_with_interval(
    runtime_path: &Path,
    name: &str,
    max_retries: u32,
    interval: Duration,
) -> io::Result<String> {
    let file = runtime_path.join(name);
    for attempt in 0..=max_retries {
        match tokio::fs::read_to_string(&file).await {
            Ok(contents) => return Ok(contents.trim().to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(file = %file.display(), attempt, "Address file not there yet");
            }
            Err(e) => return Err(e),
        }
        if attempt < max_retries {
            tokio::time::sleep(interval).await;
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!(
            "{} did not appear after {max_retries} retries",
            file.display()
        ),
    ))
}

/// Record the current process id as `runtime_path/gateway.pid`.
pub async fn write_pid_file(runtime_path: &Path) -> io::Result<PathBuf> {
    let file = runtime_path.join(PID_FILENAME);
    tokio::fs::write(&file, std::process::id().to_string()).await?;
    Ok(file)
}

/// Remove published files. Failures are logged, never returned.
pub async fn cleanup_files(files: &[PathBuf]) {
    for file in files {
        match tokio::fs::remove_file(file).await {
            Ok(()) => tracing::debug!(file = %file.display(), "Removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(file = %file.display(), error = %e, "Failed to remove file"),
        }
    }
}
