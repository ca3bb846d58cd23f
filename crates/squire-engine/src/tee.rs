use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::AsyncWrite;

/// Forwards writes to `inner` and keeps a copy of everything written
pub(crate) struct Tee<'a, W: ?Sized> {
    inner: &'a mut W,
    copy: &'a mut Vec<u8>,
}

impl<'a, W: ?Sized> Tee<'a, W> {
    pub(crate) fn new(inner: &'a mut W, copy: &'a mut Vec<u8>) -> Self {
        Self { inner, copy }
    }
}

impl<W: AsyncWrite + Unpin + ?Sized> AsyncWrite for Tee<'_, W> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = ready!(Pin::new(&mut *this.inner).poll_write(cx, buf))?;
        this.copy.extend_from_slice(&buf[..written]);
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn copies_what_it_forwards() {
        let mut out = Vec::new();
        let mut copy = Vec::new();
        let mut tee = Tee::new(&mut out, &mut copy);
        tee.write_all(b"ALTER TABLE a ADD b int;\n").await.unwrap();
        tee.flush().await.unwrap();

        assert_eq!(out, b"ALTER TABLE a ADD b int;\n");
        assert_eq!(copy, out);
    }
}
