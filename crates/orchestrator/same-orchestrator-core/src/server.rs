//! Sequential TCP front end: one connection, one request, one reply.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;

use crate::context::RetargetContext;
use crate::state::{RequestState, StateTracker};

pub struct RetargetServer {
    context: Arc<RetargetContext>,
    shutdown: Arc<AtomicBool>,
}

impl RetargetServer {
    pub fn new(context: RetargetContext) -> Self {
        Self {
            context: Arc::new(context),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting this flag stops the accept loop after the current accept wait.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn context(&self) -> &Arc<RetargetContext> {
        &self.context
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = self
            .context
            .config()
            .listen_addr
            .parse()
            .context("invalid listen_addr")?;
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("cannot listen for ctrl-c ({err}); stop via the shutdown flag");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accept and handle connections one at a time until `interrupt` resolves
    /// or the shutdown flag is set.
    pub async fn serve(&self, listener: TcpListener, interrupt: impl Future<Output = ()>) -> Result<()> {
        let accept_timeout = self.context.config().accept_timeout();
        tokio::pin!(interrupt);
        let mut tracker = StateTracker::new();
        info!("listening on {}", listener.local_addr()?);

        while !self.shutdown.load(Ordering::SeqCst) {
            tracker.reset_history();
            tracker.transition(RequestState::AwaitingConnection);
            tokio::select! {
                _ = &mut interrupt => {
                    info!("interrupt received, shutting down");
                    self.shutdown.store(true, Ordering::SeqCst);
                    tracker.transition(RequestState::Idle);
                }
                accepted = time::timeout(accept_timeout, listener.accept()) => match accepted {
                    // timed out; loop to re-check the shutdown flag
                    Err(_) => tracker.transition(RequestState::Idle),
                    Ok(Err(err)) => {
                        warn!("accept failed: {err}");
                        tracker.transition(RequestState::Idle);
                    }
                    Ok(Ok((stream, peer))) => {
                        debug!("connection from {peer}");
                        if let Err(err) = self.serve_connection(stream, &mut tracker).await {
                            warn!("connection from {peer} dropped: {err:#}");
                        }
                        if tracker.current() != RequestState::Idle {
                            tracker.transition(RequestState::Idle);
                        }
                    }
                },
            }
        }
        info!(
            "server stopped after {} requests",
            self.context.requests_served()
        );
        Ok(())
    }

    async fn serve_connection(&self, mut stream: TcpStream, tracker: &mut StateTracker) -> Result<()> {
        let config = self.context.config();
        let mut buf = vec![0u8; config.recv_buffer_bytes];
        let n = match time::timeout(config.accept_timeout(), stream.read(&mut buf)).await {
            Ok(read) => read.context("read failed")?,
            Err(_) => {
                debug!("peer sent nothing within {:?}", config.accept_timeout());
                return Ok(());
            }
        };
        if n == 0 {
            debug!("peer closed without sending a request");
            return Ok(());
        }
        let text = String::from_utf8_lossy(&buf[..n]);

        tracker.transition(RequestState::ParsingRequest);
        let handled = self.context.handle_request(&text);
        for state in handled.states.iter().skip(1) {
            tracker.transition(*state);
        }
        debug!(
            "request handled in {:.1} ms",
            handled.timings_ms.get("total_ms").copied().unwrap_or_default()
        );

        stream
            .write_all(handled.reply.as_bytes())
            .await
            .context("write failed")?;
        stream.shutdown().await.context("shutdown failed")?;
        Ok(())
    }
}
