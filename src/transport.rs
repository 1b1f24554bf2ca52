// Copyright (C) 2025 Eventwire contributors
//
// This file is part of eventwire.
//
// eventwire is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// eventwire is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with eventwire.  If not,
// see <http://www.gnu.org/licenses/>.

//! The record transport layer.
//!
//! This module defines the [`Transport`] trait all sinks must support, along with UDP, TCP
//! and Unix-socket implementations and an in-memory [`CollectorTransport`] for tests and
//! demos. A transport receives the framed bytes of one [`crate::record::WireRecord`] per
//! call; everything downstream of that call -- persistence, streaming, back-pressure,
//! multi-consumer fan-out -- is the sink's responsibility, and must look non-blocking from
//! the emitter's point of view.
//!
//! # Examples
//!
//! To send records to a collector listening on UDP port 5644 on localhost:
//!
//! ```rust
//! use eventwire::transport::UdpTransport;
//! let transpo = UdpTransport::local();
//! ```
//!
//! On another host:
//!
//! ```rust
//! use eventwire::transport::UdpTransport;
//! let transpo = UdpTransport::new("some-host.domain.io:5644");
//! assert!(transpo.is_err()); // no such host, after all
//! ```

use crate::error::{Error, Result};

use backtrace::Backtrace;

use std::net::TcpStream;

/// Operations all transport layers must support.
pub trait Transport {
    /// Send one framed record on this transport mechanism.
    ///
    /// It would be nice to make this more general, to accept input in a variety of forms
    /// that might support zero-copy, but at the end of the day UDP, TCP & Unix sockets all
    /// operate on a contiguous slice of `u8`, so we require that our caller assemble one.
    fn send(&self, buf: &[u8]) -> Result<usize>;
}

/// Sending records via UDP datagrams, one record per datagram.
pub struct UdpTransport {
    socket: std::net::UdpSocket,
}

impl UdpTransport {
    /// The port the demo collector listens on by default.
    pub const DEFAULT_PORT: u16 = 5644;

    /// Construct a [`Transport`] implementation via UDP at `addr`.
    pub fn new<A: std::net::ToSocketAddrs>(addr: A) -> Result<UdpTransport> {
        // Bind to any available port on localhost...
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").map_err(|err| Error::Transport {
            source: Box::new(err),
            back: Backtrace::new(),
        })?;
        // and connect to the collector at `addr`:
        socket.connect(addr).map_err(|err| Error::Transport {
            source: Box::new(err),
            back: Backtrace::new(),
        })?;
        Ok(UdpTransport { socket })
    }

    /// Construct a [`Transport`] implementation via UDP to the default port on localhost.
    pub fn local() -> Result<UdpTransport> {
        UdpTransport::new(("localhost", UdpTransport::DEFAULT_PORT))
    }
}

impl Transport for UdpTransport {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        self.socket.send(buf).map_err(|err| Error::Transport {
            source: Box::new(err),
            back: Backtrace::new(),
        })
    }
}

/// Sending records via a TCP stream, each preceded by a four-byte length so the peer can
/// re-frame the stream.
pub struct TcpTransport {
    socket: TcpStream,
}

impl TcpTransport {
    /// Construct a [`Transport`] implementation via TCP at `addr`.
    pub fn new<A: std::net::ToSocketAddrs>(addr: A) -> Result<TcpTransport> {
        Ok(TcpTransport {
            socket: TcpStream::connect(addr).map_err(|err| Error::Transport {
                source: Box::new(err),
                back: Backtrace::new(),
            })?,
        })
    }
}

impl Transport for TcpTransport {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        use std::io::Write;
        // Trick learned from tracing-subscriber's fmt layer: `Write` takes `&mut self`
        // but we only have `&self`. `Write` is implemented on `&TcpStream` as well as
        // `TcpStream`, so write through a `&mut &TcpStream`.
        let mut writer: &TcpStream = &self.socket;
        writer
            .write_all(&(buf.len() as u32).to_be_bytes())
            .and_then(|_| writer.write_all(buf))
            .and_then(|_| writer.flush())
            .map_err(|err| Error::Transport {
                source: Box::new(err),
                back: Backtrace::new(),
            })?;
        Ok(buf.len())
    }
}

/// Sending records via Unix datagram socket.
#[cfg(unix)]
pub struct UnixSocket {
    socket: std::os::unix::net::UnixDatagram,
}

#[cfg(unix)]
impl UnixSocket {
    /// Construct a [`Transport`] implementation via Unix datagram sockets at `path`.
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> Result<UnixSocket> {
        let socket =
            std::os::unix::net::UnixDatagram::unbound().map_err(|err| Error::Transport {
                source: Box::new(err),
                back: Backtrace::new(),
            })?;
        socket.connect(path).map_err(|err| Error::Transport {
            source: Box::new(err),
            back: Backtrace::new(),
        })?;
        Ok(UnixSocket { socket })
    }
}

#[cfg(unix)]
impl Transport for UnixSocket {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        self.socket.send(buf).map_err(|err| Error::Transport {
            source: Box::new(err),
            back: Backtrace::new(),
        })
    }
}

/// An in-memory sink that keeps every record it is sent.
///
/// Cloning yields another handle to the same buffer: hand one clone to the provider, keep
/// the other to [`take`](CollectorTransport::take) what was emitted.
#[derive(Clone, Default)]
pub struct CollectorTransport {
    records: std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>>,
}

impl CollectorTransport {
    pub fn new() -> CollectorTransport {
        CollectorTransport::default()
    }

    /// Drain and return everything sent so far, in send order.
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.records.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

impl Transport for CollectorTransport {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        self.records.lock().unwrap().push(buf.to_vec());
        Ok(buf.len())
    }
}
