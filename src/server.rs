//! TCP listener that terminates the PROXY protocol and hands connections to applications.
//!
//! Each accepted connection is owned by one task for its whole lifetime. The task feeds socket
//! reads, application frames and timer expirations into a [`StreamPair`] and carries out the
//! actions it produces.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::sleep_until;
use tracing::{debug, error, info, trace, warn, Instrument};

use crate::config::Config;
use crate::model::Envelope;
use crate::relay::{Action, EndpointState, Frame, RouteResolver, StreamPair};

/// A decoded connection delivered to an application.
#[derive(Debug)]
pub struct Accepted {
    pub id: u64,
    /// The address of the proxy that opened the connection.
    pub peer: SocketAddr,
    pub envelope: Envelope,
    /// Frames from the network.
    pub frames: mpsc::Receiver<Frame>,
    /// Frames for the network.
    pub replies: mpsc::Sender<Frame>,
}

/// The handle a route resolves to: where accepted connections are sent.
pub type Application = mpsc::Sender<Accepted>;

/// A TCP listener that decodes PROXY protocol headers.
pub struct Listener<R> {
    config: Config,
    listener: TcpListener,
    resolver: Arc<R>,
    /// Connection semaphore for limiting concurrent connections.
    conn_semaphore: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl<R> Listener<R>
where
    R: RouteResolver<Target = Application> + Send + Sync + 'static,
{
    pub async fn bind(bind_addr: SocketAddr, config: Config, resolver: Arc<R>) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", bind_addr))?;
        let local_addr = listener.local_addr()?;

        info!(
            bind_addr = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Listener {
            conn_semaphore: Arc::new(Semaphore::new(config.max_connections)),
            config,
            listener,
            resolver,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` becomes `true` or its sender is dropped.
    /// Live connections are aborted when that happens.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(bind_addr = %local_addr, "Listener started");

        loop {
            tokio::select! {
                _ = shutdown_signalled(&mut shutdown) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let permit = match self.conn_semaphore.clone().try_acquire_owned() {
                            Ok(permit) => permit,
                            Err(_) => {
                                warn!(peer = %peer, "Connection rejected: max connections reached");
                                continue;
                            }
                        };

                        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                        let listener = Arc::clone(&self);
                        let shutdown = shutdown.clone();

                        tokio::spawn(
                            async move {
                                if let Err(e) = listener.serve(stream, peer, id, shutdown).await {
                                    debug!(error = %e, "Connection error");
                                }

                                drop(permit);
                            }
                            .instrument(tracing::info_span!("connection", id, peer = %peer)),
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "Accept error");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        info!(bind_addr = %local_addr, "Listener stopped");

        Ok(())
    }

    async fn serve(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        id: u64,
        shutdown: watch::Receiver<bool>,
    ) -> io::Result<()> {
        let resolver = self.resolver.as_ref();
        let (mut reader, writer) = stream.into_split();
        let mut connection = Connection {
            id,
            peer,
            pair: StreamPair::accept(id, &self.config, std::time::Instant::now()),
            writer,
            to_application: None,
            from_application: None,
            read_credit: 0,
            capacity: self.config.channel_capacity,
            shutdown,
        };
        let mut buffer = vec![0u8; self.config.read_buffer_size];
        let mut read_open = true;

        connection
            .pair
            .receive_network(Frame::Window(self.config.network_window), resolver);

        loop {
            connection.perform(resolver).await;

            if connection.pair.is_terminal() {
                break;
            }

            let decoding = connection.pair.is_decoding();
            let limit = if decoding {
                buffer.len()
            } else {
                connection.read_credit.min(buffer.len() as u64) as usize
            };
            let deadline = connection
                .pair
                .deadline()
                .map(tokio::time::Instant::from_std);

            tokio::select! {
                _ = shutdown_signalled(&mut connection.shutdown) => connection.pair.shutdown(),
                _ = sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now)), if deadline.is_some() => {
                    connection.pair.handle_timeout(std::time::Instant::now());
                }
                result = reader.read(&mut buffer[..limit]), if read_open && limit > 0 => match result {
                    Ok(0) => {
                        read_open = false;
                        connection.pair.receive_network(Frame::Close, resolver);
                    }
                    Ok(n) => {
                        if !decoding {
                            connection.read_credit -= n as u64;
                        }

                        let chunk = Bytes::copy_from_slice(&buffer[..n]);
                        connection.pair.receive_network(Frame::Data(chunk), resolver);
                    }
                    Err(e) => {
                        read_open = false;
                        debug!(error = %e, "Read failed");
                        connection.pair.receive_network(Frame::Abort, resolver);
                    }
                },
                frame = recv(&mut connection.from_application), if connection.from_application.is_some() => match frame {
                    Some(frame) => connection.pair.receive_application(frame),
                    None => {
                        connection.from_application = None;
                        connection.application_gone();
                    }
                },
            }
        }

        connection.finish(reader)
    }
}

/// Resolves once shutdown is requested or the sender is dropped.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Runs `io` to completion unless shutdown is requested first.
async fn interruptible<F>(shutdown: &mut watch::Receiver<bool>, io: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        output = io => Some(output),
        _ = shutdown_signalled(shutdown) => None,
    }
}

async fn recv(receiver: &mut Option<mpsc::Receiver<Frame>>) -> Option<Frame> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// The socket and application channels of one connection.
struct Connection {
    id: u64,
    peer: SocketAddr,
    pair: StreamPair<Application>,
    writer: OwnedWriteHalf,
    to_application: Option<mpsc::Sender<Frame>>,
    from_application: Option<mpsc::Receiver<Frame>>,
    /// Bytes the application has granted the network side.
    read_credit: u64,
    capacity: usize,
    shutdown: watch::Receiver<bool>,
}

impl Connection {
    /// Carries out every action the pair has produced, including those caused by doing so.
    async fn perform<R>(&mut self, resolver: &R)
    where
        R: RouteResolver<Target = Application> + ?Sized,
    {
        while let Some(action) = self.pair.poll_action() {
            match action {
                Action::Open { target, envelope } => self.open(target, envelope).await,
                Action::Application(frame) => self.deliver(frame).await,
                Action::Network(frame) => self.write(frame, resolver).await,
            }
        }
    }

    async fn open(&mut self, application: Application, envelope: Envelope) {
        let (to_application, frames) = mpsc::channel(self.capacity);
        let (replies, from_application) = mpsc::channel(self.capacity);
        let accepted = Accepted {
            id: self.id,
            peer: self.peer,
            envelope,
            frames,
            replies,
        };

        match interruptible(&mut self.shutdown, application.send(accepted)).await {
            Some(Ok(())) => (),
            Some(Err(_)) => {
                warn!("Application unavailable");
                self.pair.receive_application(Frame::Reset);
                return;
            }
            None => {
                self.pair.shutdown();
                return;
            }
        }

        self.to_application = Some(to_application);
        self.from_application = Some(from_application);
    }

    async fn deliver(&mut self, frame: Frame) {
        let Some(to_application) = self.to_application.clone() else {
            trace!(frame = %frame, "No application for frame");
            return;
        };

        match interruptible(&mut self.shutdown, to_application.reserve()).await {
            Some(Ok(permit)) => permit.send(frame),
            Some(Err(_)) => {
                self.to_application = None;
                self.application_gone();
            }
            None => {
                let _ = to_application.try_send(frame);
                self.pair.shutdown();
            }
        };
    }

    async fn write<R>(&mut self, frame: Frame, resolver: &R)
    where
        R: RouteResolver<Target = Application> + ?Sized,
    {
        match frame {
            Frame::Data(bytes) => {
                let written = interruptible(&mut self.shutdown, self.writer.write_all(&bytes)).await;

                match written {
                    Some(Ok(())) => {
                        let credit = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
                        self.pair.receive_network(Frame::Window(credit), resolver);
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "Write failed");
                        self.pair.receive_network(Frame::Abort, resolver);
                    }
                    None => self.pair.shutdown(),
                }
            }
            Frame::Window(credit) => self.read_credit += credit as u64,
            Frame::Flush => match interruptible(&mut self.shutdown, self.writer.flush()).await {
                Some(Ok(())) => (),
                Some(Err(e)) => {
                    debug!(error = %e, "Flush failed");
                    self.pair.receive_network(Frame::Abort, resolver);
                }
                None => self.pair.shutdown(),
            },
            Frame::Close => match interruptible(&mut self.shutdown, self.writer.shutdown()).await {
                Some(Ok(())) => (),
                Some(Err(e)) => debug!(error = %e, "Shutdown failed"),
                None => self.pair.shutdown(),
            },
            frame @ (Frame::Challenge(..) | Frame::Abort | Frame::Reset) => {
                trace!(frame = %frame, "Signal has no stream representation");
            }
        }
    }

    /// The application stopped receiving or sending. The network side is reset unless the
    /// connection has already ended.
    fn application_gone(&mut self) {
        if !self.pair.is_terminal() {
            debug!("Application went away");
            self.pair.receive_application(Frame::Reset);
        }
    }

    /// Releases the socket, resetting it unless the network side closed gracefully.
    fn finish(self, reader: OwnedReadHalf) -> io::Result<()> {
        let state = self.pair.network().state();

        debug!(
            state = ?state,
            forwarded = self.pair.network().forwarded(),
            rejection = ?self.pair.rejection().map(|r| r.kind()),
            "Connection finished"
        );

        if matches!(state, EndpointState::Aborted | EndpointState::Reset) {
            let stream = reader
                .reunite(self.writer)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

            #[allow(deprecated)]
            stream.set_linger(Some(Duration::ZERO))?;
        }

        Ok(())
    }
}
