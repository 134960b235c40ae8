//! # TCP Acceptor
//!
//! Plain TCP listener, optionally wrapped in TLS when the server is
//! configured with a certificate. The frame codec is identical either way;
//! TLS is purely a transport-level add-on.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use crate::error::{GateError, Result};
use crate::transport::{split_stream, Acceptor, FrameReader, FrameWriter};

/// Listener for framed TCP connections.
pub struct TcpAcceptor {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    local_addr: SocketAddr,
    max_body_len: usize,
    read_buffer_size: usize,
}

impl TcpAcceptor {
    /// Bind the listener. Passing a TLS acceptor upgrades every accepted
    /// connection before framing.
    pub async fn bind(
        addr: &str,
        tls: Option<TlsAcceptor>,
        max_body_len: usize,
        read_buffer_size: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            tls,
            local_addr,
            max_body_len,
            read_buffer_size,
        })
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept_raw(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await
    }

    async fn upgrade(
        &self,
        stream: TcpStream,
    ) -> Result<(Box<dyn FrameReader>, Box<dyn FrameWriter>)> {
        stream.set_nodelay(true).ok();

        match &self.tls {
            Some(acceptor) => {
                let tls_stream = acceptor
                    .accept(stream)
                    .await
                    .map_err(|e| GateError::TlsError(format!("TLS accept failed: {e}")))?;
                let (reader, writer) =
                    split_stream(tls_stream, self.max_body_len, self.read_buffer_size);
                Ok((Box::new(reader), Box::new(writer)))
            }
            None => {
                let (reader, writer) =
                    split_stream(stream, self.max_body_len, self.read_buffer_size);
                Ok((Box::new(reader), Box::new(writer)))
            }
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "tls"
        } else {
            "tcp"
        }
    }
}
