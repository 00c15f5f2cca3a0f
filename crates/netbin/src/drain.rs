//! Diagnostic drain: forwards a child's stderr into the log.
//!
//! Each read is capped at [`MAX_LINE_LEN`] bytes so a child that writes an
//! endless unterminated run cannot make us buffer without bound. A capped
//! chunk is logged as-is and reading continues with the rest of the run.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{info, warn};

/// Upper bound on a single diagnostic chunk.
pub const MAX_LINE_LEN: usize = 4096;

/// Logs every diagnostic chunk of one child, tagged with its pid.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticDrain {
    pid: u32,
}

impl DiagnosticDrain {
    pub const fn new(pid: u32) -> Self {
        Self { pid }
    }

    /// Consume `reader` until end-of-stream or a read error.
    pub async fn run<R>(self, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let pid = self.pid;
        let result = drain_lines(reader, |line| info!("child pid={pid}: {line}")).await;
        if let Err(e) = result {
            warn!("child pid={pid}: diagnostic read failed: {e}");
        }
    }
}

/// Read `reader` in `\n`-terminated chunks of at most [`MAX_LINE_LEN`] bytes
/// and hand every chunk to `emit`. Only the trailing `\n` is removed, since
/// the log formatter ends each event with its own newline.
///
/// Returns `Ok(())` on end-of-stream.
pub async fn drain_lines<R, F>(reader: R, mut emit: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(MAX_LINE_LEN);

    loop {
        buf.clear();
        let n = (&mut reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(());
        }

        let chunk = buf.strip_suffix(b"\n").unwrap_or(&buf);
        emit(&String::from_utf8_lossy(chunk));
    }
}
