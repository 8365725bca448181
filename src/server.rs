//! TCP front end: one client at a time, frames in, reports out.

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use futures::{Sink, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{self, ClientMessage, ServerMessage};
use crate::worker::{WorkerHandle, WorkerInput, WorkerStopped};

/// Retry interval while the worker queue is full of frames.
const CONTROL_RETRY: Duration = Duration::from_millis(1);

/// Accept clients forever. Reports from the worker are relayed to whichever
/// client is connected; anything left over from a previous client is
/// discarded and all hand slots are reset between clients.
pub async fn serve(
    listener: TcpListener,
    worker: WorkerHandle,
    mut out_rx: mpsc::Receiver<ServerMessage>,
) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        stream.set_nodelay(true)?;
        info!(%addr, "client connected");

        // 前の接続の取り残しは捨てる
        while out_rx.try_recv().is_ok() {}

        let dropped_before = worker.dropped_frames();
        if let Err(e) = tcp_receive_loop(stream, &worker, &mut out_rx).await {
            warn!(%addr, "connection error: {:#}", e);
        }

        let dropped = worker.dropped_frames() - dropped_before;
        info!(%addr, dropped, "client disconnected, waiting for next connection...");
        reset_between_clients(&worker, &mut out_rx).await?;
    }
}

pub async fn tcp_receive_loop(
    stream: TcpStream,
    worker: &WorkerHandle,
    out_rx: &mut mpsc::Receiver<ServerMessage>,
) -> Result<()> {
    let framed = protocol::message_stream(stream);
    let (mut sink, mut reader) = framed.split();

    let ready = ServerMessage::Ready {
        version: env!("GIT_VERSION").to_string(),
    };
    protocol::send_to_sink(&mut sink, &ready).await?;

    loop {
        tokio::select! {
            result = reader.next() => {
                let bytes = match result {
                    Some(Ok(b)) => b,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                };
                match protocol::decode::<ClientMessage>(&bytes)? {
                    ClientMessage::Frame(frame) => {
                        let timestamp_ms = frame.timestamp_ms;
                        if !worker.submit_frame(frame)? {
                            debug!(timestamp_ms, "frame dropped");
                        }
                    }
                    ClientMessage::Setting { section, key, value } => {
                        let input = WorkerInput::Setting { section, key, value };
                        submit_control(worker, input, &mut sink, out_rx).await?;
                    }
                    ClientMessage::ResetSlot { slot } => {
                        submit_control(worker, WorkerInput::ResetSlot(slot), &mut sink, out_rx).await?;
                    }
                }
            }
            Some(out_msg) = out_rx.recv() => {
                protocol::send_to_sink(&mut sink, &out_msg).await?;
            }
        }
    }
}

/// Queue a setting or reset behind the frames already read from this
/// client. The worker may be blocked on a full output queue, so reports keep
/// flowing to the client while the input waits for room.
async fn submit_control<S>(
    worker: &WorkerHandle,
    mut input: WorkerInput,
    sink: &mut S,
    out_rx: &mut mpsc::Receiver<ServerMessage>,
) -> Result<()>
where
    S: Sink<Bytes, Error = std::io::Error> + Unpin,
{
    while let Some(pending) = worker.try_submit(input)? {
        input = pending;
        tokio::select! {
            Some(out_msg) = out_rx.recv() => {
                protocol::send_to_sink(sink, &out_msg).await?;
            }
            _ = tokio::time::sleep(CONTROL_RETRY) => {}
        }
    }
    Ok(())
}

/// Same as `submit_control` with nobody left to read the output.
async fn reset_between_clients(
    worker: &WorkerHandle,
    out_rx: &mut mpsc::Receiver<ServerMessage>,
) -> Result<(), WorkerStopped> {
    let mut input = WorkerInput::ResetAll;
    while let Some(pending) = worker.try_submit(input)? {
        input = pending;
        while out_rx.try_recv().is_ok() {}
        tokio::time::sleep(CONTROL_RETRY).await;
    }
    Ok(())
}
