//! Data forwarding module
//!
//! This module relays a classified connection. Client bytes keep flowing
//! through the pipeline (which by now only holds the forward stage) and out
//! of the route's bounded ingress queue; backend bytes are copied straight
//! back. The client is only read while the queue has room.

use bytes::Bytes;
use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::common::Result;
use crate::pipeline::Pipeline;

/// Relay between the client and its backend
///
/// Returns once the backend has closed, or once the client has closed and
/// the backend has answered everything it was sent.
pub async fn relay(
    mut client_reader: OwnedReadHalf,
    mut client_writer: OwnedWriteHalf,
    mut pipeline: Pipeline,
    mut ingress: mpsc::Receiver<Bytes>,
    capacity: mpsc::WeakSender<Bytes>,
    backend_stream: TcpStream,
    buffer_size: usize,
) -> Result<()> {
    let (mut backend_reader, mut backend_writer) = backend_stream.into_split();

    // Pipeline output to backend
    let mut client_to_backend = tokio::spawn(async move {
        let mut total_bytes = 0;

        while let Some(chunk) = ingress.recv().await {
            total_bytes += chunk.len();
            if backend_writer.write_all(&chunk).await.is_err() {
                break;
            }
        }

        let _ = backend_writer.shutdown().await;
        debug!("Client to backend transferred {} bytes total", total_bytes);
    });

    // Backend to client
    let mut backend_to_client = tokio::spawn(async move {
        let mut buffer = vec![0u8; buffer_size];
        let mut total_bytes = 0;

        loop {
            match backend_reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    total_bytes += n;
                    if client_writer.write_all(&buffer[..n]).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        let _ = client_writer.shutdown().await;
        debug!("Backend to client transferred {} bytes total", total_bytes);
    });

    // Client socket into the pipeline
    let feed = async move {
        let mut buffer = vec![0u8; buffer_size];

        loop {
            // Wait for a free slot; the forward stage is the only producer.
            let Some(tx) = capacity.upgrade() else {
                break;
            };
            match tx.reserve().await {
                Ok(permit) => drop(permit),
                Err(_) => break,
            }
            drop(tx);

            match client_reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    trace!("Client sent {} bytes", n);
                    if let Err(e) = pipeline.fire_read(Bytes::copy_from_slice(&buffer[..n])) {
                        debug!("Pipeline stopped accepting client bytes: {}", e);
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        // Drops the forward stage, which ends the ingress channel.
        pipeline.close();
    };
    tokio::pin!(feed);

    tokio::select! {
        _ = &mut feed => {
            debug!("Client connection closed");
            let _ = (&mut client_to_backend).await;
            let _ = (&mut backend_to_client).await;
        }
        _ = &mut backend_to_client => {
            debug!("Backend connection closed");
            client_to_backend.abort();
        }
    }

    Ok(())
}
