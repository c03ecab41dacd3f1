//! The operator's keyboard.
//!
//! [`tokio::io::stdin`] reads on the blocking pool, and a read in flight
//! there holds up runtime shutdown until the terminal produces a line. The
//! debugger can go away while the operator types nothing, so input is read
//! on a plain thread instead and handed over a channel. The thread is left
//! behind when the runbook returns.

use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};
use tokio::sync::mpsc;

const READ_CHUNK: usize = 4096;
const CHANNEL_DEPTH: usize = 16;

/// Operator input read on a dedicated thread.
#[derive(Debug)]
pub struct OperatorInput {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl OperatorInput {
    /// Read the process's stdin.
    pub fn stdin() -> io::Result<Self> {
        Self::spawn(io::stdin())
    }

    /// Read `reader` on a new thread.
    pub fn spawn<R: Read + Send + 'static>(mut reader: R) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        std::thread::Builder::new()
            .name("operator-input".into())
            .spawn(move || {
                let mut buf = vec![0u8; READ_CHUNK];
                loop {
                    let chunk = match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => Ok(buf[..n].to_vec()),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => Err(e),
                    };
                    let failed = chunk.is_err();
                    if tx.blocking_send(chunk).is_err() || failed {
                        break;
                    }
                }
                tracing::debug!("operator input closed");
            })?;

        Ok(Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
        })
    }
}

impl AsyncBufRead for OperatorInput {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        let this = self.get_mut();
        if this.pos >= this.chunk.len() {
            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => {
                    this.chunk = chunk;
                    this.pos = 0;
                }
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => return Poll::Ready(Ok(&[])),
            }
        }
        Poll::Ready(Ok(&this.chunk[this.pos..]))
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        let this = self.get_mut();
        this.pos = (this.pos + amt).min(this.chunk.len());
    }
}

impl AsyncRead for OperatorInput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let n = {
            let data = ready!(self.as_mut().poll_fill_buf(cx))?;
            let n = data.len().min(buf.remaining());
            buf.put_slice(&data[..n]);
            n
        };
        self.consume(n);
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::time::{Duration, Instant};

    use runbook::interact::{InteractEnd, InteractOptions};
    use runbook::mock::MockTransport;
    use runbook::{ProcessExitStatus, Session, SessionConfig};
    use tokio::io::AsyncBufReadExt;

    use super::*;

    #[tokio::test]
    async fn lines_arrive_until_the_terminal_closes() {
        let (mut terminal, keyboard) = UnixStream::pair().unwrap();
        let mut lines = OperatorInput::spawn(keyboard).unwrap().lines();

        terminal.write_all(b"bt\nfr").unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("bt"));
        terminal.write_all(b"ame variable\n").unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("frame variable")
        );

        drop(terminal);
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[test]
    fn idle_keyboard_does_not_hold_up_shutdown() {
        let (_terminal, keyboard) = UnixStream::pair().unwrap();
        let started = Instant::now();

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let end = runtime.block_on(async {
            let (transport, handle) = MockTransport::new();
            let mut lldb = Session::new(transport, SessionConfig::new("lldb"));
            handle.queue_output("Process 4242 exited with status = 0\n");
            handle.exit(ProcessExitStatus::Exited(0));

            let input = OperatorInput::spawn(keyboard).unwrap();
            lldb.interact(input, tokio::io::sink(), &InteractOptions::default())
                .await
        });
        drop(runtime);

        assert_eq!(end.unwrap(), InteractEnd::ChildEof);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
