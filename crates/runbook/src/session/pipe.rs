//! Merged stdout/stderr stream for pipe-mode children.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Reads from two streams as one, in arrival order as far as polling can
/// tell.
///
/// Sources are polled alternately so a chatty stdout cannot starve stderr.
/// The merged stream ends only once both sources have ended.
#[derive(Debug)]
pub struct MergedOutput<A, B> {
    first: Option<A>,
    second: Option<B>,
    prefer_second: bool,
}

enum Polled {
    Data,
    Ended,
}

impl<A, B> MergedOutput<A, B>
where
    A: AsyncRead + Unpin,
    B: AsyncRead + Unpin,
{
    /// Merge `first` and `second`. A missing source counts as ended.
    pub const fn new(first: Option<A>, second: Option<B>) -> Self {
        Self {
            first,
            second,
            prefer_second: false,
        }
    }

    /// Whether both sources have ended.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.first.is_none() && self.second.is_none()
    }

    fn poll_source<R: AsyncRead + Unpin>(
        source: &mut Option<R>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<Polled>> {
        let Some(reader) = source.as_mut() else {
            return Poll::Ready(Ok(Polled::Ended));
        };

        let before = buf.filled().len();
        match Pin::new(reader).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if buf.filled().len() > before => Poll::Ready(Ok(Polled::Data)),
            Poll::Ready(Ok(())) => {
                *source = None;
                Poll::Ready(Ok(Polled::Ended))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<A, B> AsyncRead for MergedOutput<A, B>
where
    A: AsyncRead + Unpin,
    B: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let second_first = this.prefer_second;
        this.prefer_second = !this.prefer_second;

        for turn in 0..2 {
            let polled = if (turn == 0) == second_first {
                Self::poll_source(&mut this.second, cx, buf)
            } else {
                Self::poll_source(&mut this.first, cx, buf)
            };
            match polled {
                Poll::Ready(Ok(Polled::Data)) => return Poll::Ready(Ok(())),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(Polled::Ended)) | Poll::Pending => {}
            }
        }

        if this.is_finished() {
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }
}
