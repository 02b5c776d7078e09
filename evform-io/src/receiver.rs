//! UDP producer loop.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use evform_core::trace::{targets, Trace};
use log::Level;

use crate::config::RxConfig;
use crate::rx::{Received, RxProducer};
use crate::stats::{bump, RxStats};
use crate::Result;

/// Receives datagrams into the rx channel until told to stop.
#[derive(Debug)]
pub struct Receiver {
    socket: UdpSocket,
    producer: RxProducer,
    stats: Arc<RxStats>,
    trace: Trace,
}

impl Receiver {
    /// Binds a socket per `config`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or binding fails.
    pub fn bind(config: &RxConfig, producer: RxProducer, stats: Arc<RxStats>) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(&config.bind)?;
        Self::from_socket(socket, config.timeout(), producer, stats)
    }

    /// Uses an already bound socket.
    ///
    /// # Errors
    /// Returns an error if the receive timeout cannot be set.
    pub fn from_socket(
        socket: UdpSocket,
        timeout: Duration,
        producer: RxProducer,
        stats: Arc<RxStats>,
    ) -> Result<Self> {
        socket.set_read_timeout(Some(timeout))?;
        Ok(Self {
            socket,
            producer,
            stats,
            trace: Trace::new(targets::RECEIVER),
        })
    }

    /// Replaces the logging context.
    #[must_use]
    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = trace;
        self
    }

    /// Address the socket is bound to.
    ///
    /// # Errors
    /// Returns an error if the address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receives until `keep_running` is cleared.
    ///
    /// The flag is checked after every datagram and every receive timeout.
    ///
    /// # Errors
    /// Returns the first socket error other than a timeout or interrupt.
    pub fn run(&mut self, keep_running: &AtomicBool) -> Result<()> {
        if self.trace.enabled(Level::Info) {
            log::info!(target: self.trace.target(), "receiving on {:?}", self.socket.local_addr());
        }
        while keep_running.load(Ordering::Acquire) {
            let socket = &self.socket;
            match self.producer.receive_with(|slot| socket.recv(slot)) {
                Ok(Received::Queued(bytes)) => {
                    bump(&self.stats.rx_packets, 1);
                    bump(&self.stats.rx_bytes, bytes as u64);
                }
                Ok(Received::Dropped(bytes)) => {
                    bump(&self.stats.rx_packets, 1);
                    bump(&self.stats.rx_bytes, bytes as u64);
                    bump(&self.stats.fifo_push_errors, 1);
                    if self.trace.enabled(Level::Warn) {
                        log::warn!(target: self.trace.target(), "queue full, dropped {bytes} bytes");
                    }
                }
                Ok(Received::Empty) => {}
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    bump(&self.stats.rx_idle, 1);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    if self.trace.enabled(Level::Error) {
                        log::error!(target: self.trace.target(), "receive failed: {err}");
                    }
                    return Err(err.into());
                }
            }
        }
        if self.trace.enabled(Level::Debug) {
            log::debug!(target: self.trace.target(), "receiver stopped");
        }
        Ok(())
    }
}
