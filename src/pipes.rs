//! Queue files shared with the local mail agent.
//!
//! Both queues are named pipes. The inbound queue is read by a task that forwards lines over a
//! channel; the outbound queue is written by a task that opens, writes, flushes and closes the
//! pipe once per message, so a slow consumer only ever stalls that task.
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::error::BridgeError;
use crate::format::InboundMailLine;
use crate::logutil::escape_log;

/// Delay before reopening the inbound pipe after its writer went away.
const REOPEN_DELAY: Duration = Duration::from_millis(100);

/// Check that `path` is a FIFO, creating it when missing and `create_missing` is set.
pub async fn ensure_fifo(path: &Path, create_missing: bool) -> Result<(), BridgeError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.file_type().is_fifo() => Ok(()),
        Ok(_) => Err(BridgeError::pipe(path, "exists but is not a FIFO")),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if !create_missing {
                return Err(BridgeError::pipe(path, "missing FIFO"));
            }
            warn!("Missing FIFO {}, creating it", path.display());
            create_fifo(path).await
        }
        Err(e) => Err(BridgeError::pipe(path, e.to_string())),
    }
}

async fn create_fifo(path: &Path) -> Result<(), BridgeError> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || mkfifo(&target, Mode::from_bits_truncate(0o666)))
        .await
        .map_err(|e| BridgeError::pipe(path, format!("mkfifo task failed: {}", e)))?
        .map_err(|errno| BridgeError::pipe(path, format!("mkfifo failed: {}", errno)))?;
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| BridgeError::pipe(path, e.to_string()))?;
    if !meta.file_type().is_fifo() {
        return Err(BridgeError::pipe(path, "mkfifo did not produce a FIFO"));
    }
    Ok(())
}

/// Forward newline-terminated lines from `reader` until EOF. Only the trailing `\n` is
/// removed; empty lines are skipped. Returns how many lines were forwarded.
pub async fn forward_lines<R>(reader: R, tx: &UnboundedSender<String>) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    let mut forwarded = 0usize;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(forwarded);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.is_empty() {
            continue;
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        debug!("Queue line in: '{}'", escape_log(&line));
        if tx.send(line).is_err() {
            return Ok(forwarded);
        }
        forwarded += 1;
    }
}

fn open_fifo_reader(path: &Path) -> io::Result<pipe::Receiver> {
    let mut opts = pipe::OpenOptions::new();
    // holding a write end keeps the pipe from reporting EOF between writers
    #[cfg(target_os = "linux")]
    opts.read_write(true);
    opts.open_receiver(path)
}

/// Read the inbound pipe on a background task. The channel closes when the pipe can no
/// longer be opened.
pub fn spawn_inbound_reader(path: PathBuf) -> (UnboundedReceiver<String>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        info!("Reading queue lines from {}", path.display());
        loop {
            let receiver = match open_fifo_reader(&path) {
                Ok(r) => r,
                Err(e) => {
                    error!("Cannot open {}: {}", path.display(), e);
                    break;
                }
            };
            match forward_lines(receiver, &tx).await {
                Ok(n) => debug!("{} closed after {} lines", path.display(), n),
                Err(e) => warn!("Read error on {}: {}", path.display(), e),
            }
            if tx.is_closed() {
                break;
            }
            tokio::time::sleep(REOPEN_DELAY).await;
        }
    });
    (rx, handle)
}

/// Deliver one line: open (truncating regular files), write, flush, close.
pub async fn write_queue_line(path: &Path, line: &InboundMailLine) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Writer task for the outbound pipe. It ends when the sender is dropped (returning the
/// number of lines written) or on the first write failure.
pub fn spawn_queue_writer(
    path: PathBuf,
) -> (
    UnboundedSender<InboundMailLine>,
    JoinHandle<Result<usize, BridgeError>>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<InboundMailLine>();
    let handle = tokio::spawn(async move {
        let mut written = 0usize;
        while let Some(line) = rx.recv().await {
            if let Err(e) = write_queue_line(&path, &line).await {
                error!("Writing {} failed: {}", path.display(), e);
                return Err(BridgeError::pipe(&path, e.to_string()));
            }
            written += 1;
            debug!("Queue line out: '{}'", escape_log(line.as_str()));
        }
        Ok(written)
    });
    (tx, handle)
}

/// Publish our bare hex station id for the mail agent.
pub async fn write_station_address(path: &Path, token: &str) -> Result<(), BridgeError> {
    tokio::fs::write(path, token)
        .await
        .map_err(|e| BridgeError::pipe(path, e.to_string()))?;
    info!("Station address {} written to {}", token, path.display());
    Ok(())
}
