// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The single outbound connection shared by every sampler task.
//!
//! Writers take an exclusive lock for the whole line, so lines from different tasks
//! never interleave. The connection is opened once and never reopened: a write
//! failure is returned to the caller.

use crate::errors::SinkError;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

pub struct Sink<W> {
    writer: Arc<Mutex<W>>,
}

// Manual impl: cloning only clones the Arc, W itself need not be Clone.
impl<W> Clone for Sink<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl Sink<TcpStream> {
    /// Opens the TCP connection to the collector at `host:port`.
    pub async fn connect(host: &str, port: u16) -> Result<Self, SinkError> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| SinkError::Connect {
                addr: addr.clone(),
                source,
            })?;
        // Lines are small and written one at a time; don't hold them back.
        stream
            .set_nodelay(true)
            .map_err(|source| SinkError::Connect {
                addr: addr.clone(),
                source,
            })?;
        debug!("Connected to collector at {addr}");
        Ok(Self::new(stream))
    }
}

impl<W> Sink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Writes one complete line while holding the lock.
    pub async fn send(&self, line: &[u8]) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line).await.map_err(SinkError::Write)?;
        writer.flush().await.map_err(SinkError::Write)?;
        trace!("Sent {} bytes", line.len());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::AsyncReadExt;

    /// Writer that accepts at most `chunk` bytes per poll and yields in between,
    /// so an unlocked writer would interleave concurrent lines.
    struct ChoppyWriter {
        buf: Vec<u8>,
        chunk: usize,
        ready: bool,
    }

    impl AsyncWrite for ChoppyWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            data: &[u8],
        ) -> Poll<io::Result<usize>> {
            if !self.ready {
                self.ready = true;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            self.ready = false;
            let n = data.len().min(self.chunk);
            self.buf.extend_from_slice(&data[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _data: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_never_interleave() {
        const WRITERS: usize = 8;
        const LINES_PER_WRITER: usize = 50;

        let writer = Arc::new(Mutex::new(ChoppyWriter {
            buf: Vec::new(),
            chunk: 3,
            ready: false,
        }));
        let sink = Sink {
            writer: Arc::clone(&writer),
        };

        let mut expected = HashSet::new();
        let mut tasks = Vec::new();
        for w in 0..WRITERS {
            let line = format!("writer{w}.metric {w}{w}{w}{w} 1700000000\n");
            expected.insert(line.clone());
            let sink = sink.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..LINES_PER_WRITER {
                    sink.send(line.as_bytes()).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let written = String::from_utf8(writer.lock().await.buf.clone()).unwrap();
        let lines: Vec<&str> = written.split_inclusive('\n').collect();
        assert_eq!(lines.len(), WRITERS * LINES_PER_WRITER);
        for line in lines {
            assert!(expected.contains(line), "interleaved line: {line:?}");
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_returned() {
        let sink = Sink::new(BrokenWriter);
        let err = sink.send(b"a.b 1 2\n").await.unwrap_err();
        assert!(matches!(err, SinkError::Write(ref e) if e.kind() == io::ErrorKind::BrokenPipe));

        // The lock is released on the error path.
        let err = sink.send(b"a.b 1 2\n").await.unwrap_err();
        assert!(matches!(err, SinkError::Write(_)));
    }

    #[tokio::test]
    async fn test_connect_and_send_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let sink = Sink::connect("127.0.0.1", port).await.unwrap();
        let (mut conn, _) = listener.accept().await.unwrap();

        sink.send(b"cg2gr.h.services.s.cpuacct.usage 42 1700000000\n")
            .await
            .unwrap();
        drop(sink);

        let mut received = String::new();
        conn.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "cg2gr.h.services.s.cpuacct.usage 42 1700000000\n");
    }

    #[tokio::test]
    async fn test_connect_failure() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Sink::connect("127.0.0.1", port).await.err().unwrap();
        assert!(matches!(err, SinkError::Connect { .. }));
        assert!(err.to_string().starts_with(&format!("failed to connect to 127.0.0.1:{port}")));
    }
}
