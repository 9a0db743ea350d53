//! IO abstraction
//!
//! Unified boxed IO type handed from the host to the WebSocket adapter.
//! The framework never touches raw sockets directly; the host accepts a
//! connection and passes it down as an `Io`.

use tokio::io::{AsyncRead, AsyncWrite};

/// The core IO type used throughout the framework.
pub type Io = Box<dyn AsyncReadWrite + Unpin + Send>;

/// Combined trait for async read + write
pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}

impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

/// Trait for types that can be converted into an [`Io`]
pub trait IntoIo {
    fn into_io(self) -> Io;
}

impl<T> IntoIo for T
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn into_io(self) -> Io {
        Box::new(self)
    }
}
