use anyhow::{Context, Result};
use async_h1::server::ConnectionStatus;
use async_std::{
    channel::{self, Receiver, Sender},
    future,
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    task,
};
use futures::future::{select, Either};
use std::{
    fmt,
    future::Future,
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tide::log::{error, info, warn};

/// How long in-flight requests get to finish once shutdown starts.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Starting => "starting",
            Phase::Serving => "serving",
            Phase::ShuttingDown => "shutting down",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How the server came to a stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stopped {
    /// Every in-flight request finished.
    Drained,
    /// Requests were still running when the timeout elapsed.
    TimedOut { in_flight: usize },
}

/// Counts dispatched requests and wakes the drainer when the count reaches zero.
struct InFlight {
    count: AtomicUsize,
    idle: Sender<()>,
    idle_events: Receiver<()>,
}

impl Default for InFlight {
    fn default() -> Self {
        let (idle, idle_events) = channel::bounded(1);
        InFlight {
            count: AtomicUsize::new(0),
            idle,
            idle_events,
        }
    }
}

impl InFlight {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn leave(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            // a pending wake-up already covers this one
            let _ = self.idle.try_send(());
        }
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn drained(&self) {
        // wake-ups can be stale, so the count is checked again after each
        while self.count() > 0 {
            if self.idle_events.recv().await.is_err() {
                break;
            }
        }
    }
}

pub struct Server {
    listener: TcpListener,
    shutdown_timeout: Duration,
    phase: Phase,
}

impl Server {
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Server> {
        info!("lifecycle: {}", Phase::Starting);
        let listener = TcpListener::bind(addr).await?;
        let mut server = Server {
            listener,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            phase: Phase::Starting,
        };
        server.enter(Phase::Serving);
        Ok(server)
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        match phase {
            Phase::Serving => match self.local_addr() {
                Ok(addr) => info!("lifecycle: {} on {}", phase, addr),
                Err(_) => info!("lifecycle: {}", phase),
            },
            _ => info!("lifecycle: {}", phase),
        }
    }

    /// Serves `app` until `shutdown` resolves, then waits for in-flight
    /// requests up to the shutdown timeout.
    ///
    /// A listener failure ends serving at once and is returned as an error.
    pub async fn run<S>(
        mut self,
        app: tide::Server<S>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<Stopped>
    where
        S: Clone + Send + Sync + 'static,
    {
        let in_flight = Arc::new(InFlight::default());
        let (closing, closed) = channel::bounded::<()>(1);
        let mut shutdown = Box::pin(shutdown);

        loop {
            let accept = Box::pin(self.listener.accept());
            match select(shutdown, accept).await {
                Either::Left(((), _)) => break,
                Either::Right((accepted, pending)) => {
                    shutdown = pending;
                    match accepted {
                        Ok((stream, _)) => {
                            serve(stream, app.clone(), in_flight.clone(), closed.clone())
                        }
                        Err(e) if is_transient(&e) => warn!("dropped connection: {}", e),
                        Err(e) => {
                            error!("listener failed: {}", e);
                            return Err(e).context("listener failed");
                        }
                    }
                }
            }
        }

        self.enter(Phase::ShuttingDown);
        drop(self.listener);
        closing.close();

        let stopped = match future::timeout(self.shutdown_timeout, in_flight.drained()).await {
            Ok(()) => Stopped::Drained,
            Err(_) => {
                let remaining = in_flight.count();
                warn!(
                    "shutdown timed out after {:?} with {} requests in flight",
                    self.shutdown_timeout, remaining
                );
                Stopped::TimedOut {
                    in_flight: remaining,
                }
            }
        };

        info!("lifecycle: {}", Phase::Stopped);
        Ok(stopped)
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Handles one connection on its own task. A request counts as in flight
/// from the moment it is dispatched until its response has been written.
///
/// Once `closed` is closed the connection takes no further requests: an idle
/// connection is dropped at once, a busy one after its response is written.
fn serve<S>(
    stream: TcpStream,
    app: tide::Server<S>,
    in_flight: Arc<InFlight>,
    closed: Receiver<()>,
) where
    S: Clone + Send + Sync + 'static,
{
    task::spawn(async move {
        let dispatched = AtomicBool::new(false);
        let mut connection = async_h1::server::Server::new(stream, |req: http_types::Request| {
            dispatched.store(true, Ordering::SeqCst);
            in_flight.enter();
            app.respond::<_, http_types::Response>(req)
        });

        while !closed.is_closed() {
            let exchange = Box::pin(connection.accept_one());
            let status = match select(exchange, Box::pin(closed.recv())).await {
                Either::Left((status, _)) => status,
                Either::Right((_, exchange)) => {
                    if !dispatched.load(Ordering::SeqCst) {
                        break;
                    }
                    exchange.await
                }
            };

            if dispatched.swap(false, Ordering::SeqCst) {
                in_flight.leave();
            }

            match status {
                Ok(ConnectionStatus::KeepAlive) => continue,
                Ok(ConnectionStatus::Close) => break,
                Err(e) => {
                    warn!("connection error: {}", e);
                    break;
                }
            }
        }
    });
}
