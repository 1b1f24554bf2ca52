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

//! [eventwire](crate) errors.
//!
//! Errors here surface only at *setup* time -- building a provider, registering a schema,
//! connecting a transport. The emission path never returns one: by contract a diagnostic
//! emission call degrades to "emit less" or "emit nothing", never to an error propagated
//! into the instrumented caller.

use backtrace::Backtrace;

/// [eventwire](crate) error type
///
/// [eventwire](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of
/// a straightforward enumeration with a few match arms chosen on the basis of what the
/// caller will need to respond.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// A provider name that is not printable ASCII of a sane length
    BadProviderName {
        name: String,
        back: Backtrace,
    },
    /// A hostname that is not printable ASCII of a sane length
    BadHostname {
        name: String,
        back: Backtrace,
    },
    /// The tracing bridge was requested but its descriptor is missing from the table
    MissingBridgeDescriptor {
        back: Backtrace,
    },
    /// Failed to fetch the current executable (via std::env)
    NoExecutable {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// Failed to fetch hostname (via libc)
    NoHostname {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// Schema registration failure; a programming defect, fatal at startup
    Registration {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// General transport layer error
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadProviderName { name, .. } => {
                write!(f, "{:?} is not a usable provider name", name)
            }
            Error::BadHostname { name, .. } => {
                write!(f, "{:?} is not a usable hostname", name)
            }
            Error::MissingBridgeDescriptor { .. } => {
                write!(
                    f,
                    "The tracing bridge descriptor was not registered with this provider"
                )
            }
            Error::NoExecutable { source, .. } => {
                write!(f, "While fetching the current executable, got {}", source)
            }
            Error::NoHostname { source, .. } => {
                write!(f, "While fetching the hostname, got {}", source)
            }
            Error::Registration { source, .. } => {
                write!(f, "While registering the event schema, got {}", source)
            }
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            _ => write!(f, "Other eventwire error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadProviderName { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::BadHostname { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::MissingBridgeDescriptor { back } => write!(f, "{}\n{:?}", self, back),
            Error::NoExecutable { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::NoHostname { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Registration { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Transport { back, .. } => write!(f, "{}\n{:?}", self, back),
            err => write!(f, "eventwire error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::descriptor::Error> for Error {
    fn from(err: crate::descriptor::Error) -> Self {
        Error::Registration {
            source: Box::new(err),
            back: Backtrace::new(),
        }
    }
}

impl From<crate::keyword::Error> for Error {
    fn from(err: crate::keyword::Error) -> Self {
        Error::Registration {
            source: Box::new(err),
            back: Backtrace::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
