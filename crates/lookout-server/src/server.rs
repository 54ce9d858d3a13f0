//! TCP front end for a [`CdpHandler`].
//!
//! One client at a time: inbound bytes are split into Content-Length
//! frames and handed to the adapter, and every outbound message the
//! adapter produces goes through an unbounded channel to a writer task.

use lookout_adapter::CdpHandler;
use lookout_protocol::{encode_message, FrameDecoder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::error::ServerError;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Accept clients on `listener` one after another, forever.
///
/// A failing client is logged and dropped; only listener errors end the
/// loop.
///
/// # Errors
///
/// Returns [`ServerError::Io`] when accepting a connection fails.
pub async fn serve(listener: TcpListener, handler: &CdpHandler) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, title = handler.title(), "waiting for a debugger client");
    }
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "client connected");
        let (reader, writer) = stream.into_split();
        match serve_connection(reader, writer, handler).await {
            Ok(()) => tracing::info!(%peer, "client disconnected"),
            Err(e) => tracing::warn!(%peer, error = %e, "client connection failed"),
        }
    }
}

/// Drive one client connection until it closes.
///
/// # Errors
///
/// [`ServerError::AlreadyConnected`] if another client holds the
/// handler; I/O and framing errors from the inbound stream.
pub async fn serve_connection<R, W>(
    mut reader: R,
    mut writer: W,
    handler: &CdpHandler,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let registered = handler.register_callbacks(
        Box::new(move |message| {
            // The writer is gone once the client disconnects.
            let _ = tx.send(message);
        }),
        None,
    );
    if !registered {
        return Err(ServerError::AlreadyConnected);
    }

    let writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let frame = encode_message(&message);
            if let Err(e) = writer.write_all(&frame).await {
                tracing::debug!(error = %e, "client write failed");
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });

    let result = read_frames(&mut reader, handler).await;

    // Dropping the callback closes the channel and ends the writer.
    handler.unregister_callbacks();
    if writer_task.await.is_err() {
        tracing::error!("client writer task panicked");
    }
    result
}

async fn read_frames<R>(reader: &mut R, handler: &CdpHandler) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            if decoder.pending() > 0 {
                tracing::debug!(bytes = decoder.pending(), "discarding partial frame");
            }
            return Ok(());
        }
        decoder.push(&buf[..n]);
        while let Some(frame) = decoder.next_frame()? {
            tracing::trace!(len = frame.len(), "inbound frame");
            handler.handle(&frame);
        }
    }
}
