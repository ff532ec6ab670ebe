//! Agent listener.
//!
//! A line-oriented TCP endpoint for HAProxy agent checks: the load balancer
//! connects, sends a service name terminated by `\n`, and gets back
//! `ready\n` or `maint\n` depending on the spool. Anything after the first
//! `/` in the line is agent detail and is ignored.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use crate::spool::SpoolStore;

pub struct AgentServer {
    spool: Arc<SpoolStore>,
}

impl AgentServer {
    pub fn new(spool: Arc<SpoolStore>) -> Self {
        Self { spool }
    }

    /// Accept agent connections until the shutdown channel fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "agent listener starting");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let spool = self.spool.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_agent(stream, &spool).await {
                                    tracing::debug!(peer = %peer, error = %e, "agent connection failed");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "agent accept failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!(address = %addr, "agent listener stopped");
                    return Ok(());
                }
            }
        }
    }
}

/// One agent exchange: read the service name line, answer ready or maint.
async fn handle_agent(stream: TcpStream, spool: &SpoolStore) -> std::io::Result<()> {
    let mut stream = BufReader::new(stream);
    let mut line = String::new();
    stream.read_line(&mut line).await?;

    let trimmed = line.trim_end();
    let service = trimmed.split_once('/').map_or(trimmed, |(name, _)| name);

    let reply = match spool.is_up(service, None) {
        Ok((true, _)) => "ready\n",
        Ok((false, _)) => "maint\n",
        Err(e) => {
            // Fail towards maintenance.
            tracing::warn!(service, error = %e, "spool read failed");
            "maint\n"
        }
    };
    stream.get_mut().write_all(reply.as_bytes()).await?;
    stream.get_mut().shutdown().await?;
    Ok(())
}
