//! PROXY protocol (v1 text, v2 binary) header decoding.
//!
//! # Responsibilities
//! - Detect whether a fresh connection starts with a PROXY signature
//! - Decode the originating address from v1 or v2 framing
//! - Hand the remaining bytes back untouched to the HTTP layer
//! - Decide, per peer, whether the decoded address is trusted
//!
//! # Design Decisions
//! - Trust is decided from the immediate peer address only
//! - A stream without a signature is passed through as-is
//! - A malformed or truncated header drops the connection; nothing is trusted partially
//! - TLVs in v2 headers are skipped

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

use crate::security::allow_list::ProxyAllowList;

const V1_SIGNATURE: &[u8] = b"PROXY ";
const V2_SIGNATURE: &[u8] = b"\r\n\r\n\0\r\nQUIT\n";
/// Longest legal v1 line, CRLF included.
const V1_MAX_LEN: usize = 107;
/// Fixed part of a v2 header: signature, version/command, family, length.
const V2_FIXED_LEN: usize = 16;

/// Default time a peer gets to deliver its header.
pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors while decoding a PROXY header.
#[derive(Debug, Error)]
pub enum ProxyHeaderError {
    #[error("I/O error reading PROXY header: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed inside the PROXY header")]
    Truncated,

    #[error("timed out waiting for the PROXY header")]
    Timeout,

    #[error("malformed PROXY v1 header: {0}")]
    InvalidV1(&'static str),

    #[error("malformed PROXY v2 header: {0}")]
    InvalidV2(&'static str),
}

/// Decoded content of a PROXY header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyHeader {
    /// The upstream relayed a client connection.
    Proxied {
        source: SocketAddr,
        destination: SocketAddr,
    },
    /// Health check, `UNKNOWN` or non-IP family: keep the peer address.
    Local,
}

enum Signature {
    V1,
    V2,
    NeedMore,
    Absent,
}

fn detect(buf: &[u8]) -> Signature {
    let check = |sig: &[u8]| {
        if buf.len() >= sig.len() {
            buf.starts_with(sig).then_some(true)
        } else {
            sig.starts_with(buf).then_some(false)
        }
    };

    match (check(V1_SIGNATURE), check(V2_SIGNATURE)) {
        (Some(true), _) => Signature::V1,
        (_, Some(true)) => Signature::V2,
        (Some(false), _) | (_, Some(false)) => Signature::NeedMore,
        (None, None) => Signature::Absent,
    }
}

/// Read a PROXY header from the start of `stream`.
///
/// Returns the decoded header (`None` when the stream carries no signature)
/// and every byte read past the header, which belongs to the payload.
pub async fn read_proxy_header<S>(stream: &mut S) -> Result<(Option<ProxyHeader>, Bytes), ProxyHeaderError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(V1_MAX_LEN * 2);

    loop {
        match detect(&buf) {
            Signature::Absent => return Ok((None, buf.freeze())),
            Signature::V1 => return read_v1(stream, buf).await,
            Signature::V2 => return read_v2(stream, buf).await,
            Signature::NeedMore => {}
        }

        if stream.read_buf(&mut buf).await? == 0 {
            if buf.is_empty() {
                return Ok((None, Bytes::new()));
            }
            return Err(ProxyHeaderError::Truncated);
        }
    }
}

async fn fill_to<S>(stream: &mut S, buf: &mut BytesMut, len: usize) -> Result<(), ProxyHeaderError>
where
    S: AsyncRead + Unpin,
{
    while buf.len() < len {
        if stream.read_buf(buf).await? == 0 {
            return Err(ProxyHeaderError::Truncated);
        }
    }
    Ok(())
}

async fn read_v1<S>(stream: &mut S, mut buf: BytesMut) -> Result<(Option<ProxyHeader>, Bytes), ProxyHeaderError>
where
    S: AsyncRead + Unpin,
{
    let line_end = loop {
        let window = &buf[..buf.len().min(V1_MAX_LEN)];
        if let Some(pos) = window.windows(2).position(|w| w == b"\r\n") {
            break pos;
        }
        if buf.len() >= V1_MAX_LEN {
            return Err(ProxyHeaderError::InvalidV1("header line too long"));
        }
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(ProxyHeaderError::Truncated);
        }
    };

    let line = buf.split_to(line_end + 2);
    let header = parse_v1_line(&line[..line_end])?;
    Ok((Some(header), buf.freeze()))
}

/// Parse a v1 line without its trailing CRLF.
pub fn parse_v1_line(line: &[u8]) -> Result<ProxyHeader, ProxyHeaderError> {
    let line = std::str::from_utf8(line).map_err(|_| ProxyHeaderError::InvalidV1("not ASCII"))?;
    let fields: Vec<&str> = line.split(' ').collect();

    match fields.as_slice() {
        ["PROXY", "UNKNOWN", ..] => Ok(ProxyHeader::Local),
        ["PROXY", proto, src, dst, sport, dport] => {
            let (src, dst): (IpAddr, IpAddr) = match *proto {
                "TCP4" => (
                    parse_ip::<Ipv4Addr>(src)?.into(),
                    parse_ip::<Ipv4Addr>(dst)?.into(),
                ),
                "TCP6" => (
                    parse_ip::<Ipv6Addr>(src)?.into(),
                    parse_ip::<Ipv6Addr>(dst)?.into(),
                ),
                _ => return Err(ProxyHeaderError::InvalidV1("unknown protocol")),
            };
            Ok(ProxyHeader::Proxied {
                source: SocketAddr::new(src, parse_port(sport)?),
                destination: SocketAddr::new(dst, parse_port(dport)?),
            })
        }
        _ => Err(ProxyHeaderError::InvalidV1("wrong field count")),
    }
}

fn parse_ip<T: std::str::FromStr>(s: &str) -> Result<T, ProxyHeaderError> {
    s.parse().map_err(|_| ProxyHeaderError::InvalidV1("invalid address"))
}

fn parse_port(s: &str) -> Result<u16, ProxyHeaderError> {
    // Leading zeros and signs are not allowed by the text format.
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProxyHeaderError::InvalidV1("invalid port"));
    }
    s.parse().map_err(|_| ProxyHeaderError::InvalidV1("invalid port"))
}

async fn read_v2<S>(stream: &mut S, mut buf: BytesMut) -> Result<(Option<ProxyHeader>, Bytes), ProxyHeaderError>
where
    S: AsyncRead + Unpin,
{
    fill_to(stream, &mut buf, V2_FIXED_LEN).await?;
    let body_len = u16::from_be_bytes([buf[14], buf[15]]) as usize;
    fill_to(stream, &mut buf, V2_FIXED_LEN + body_len).await?;

    let header = buf.split_to(V2_FIXED_LEN + body_len);
    let parsed = parse_v2(&header)?;
    Ok((Some(parsed), buf.freeze()))
}

/// Parse a complete v2 header (fixed part plus address block).
pub fn parse_v2(header: &[u8]) -> Result<ProxyHeader, ProxyHeaderError> {
    if header.len() < V2_FIXED_LEN || !header.starts_with(V2_SIGNATURE) {
        return Err(ProxyHeaderError::InvalidV2("missing signature"));
    }

    let version = header[12] >> 4;
    let command = header[12] & 0x0F;
    let family = header[13] >> 4;
    let mut body = &header[V2_FIXED_LEN..];

    if version != 2 {
        return Err(ProxyHeaderError::InvalidV2("unsupported version"));
    }

    match command {
        0x0 => return Ok(ProxyHeader::Local),
        0x1 => {}
        _ => return Err(ProxyHeaderError::InvalidV2("unknown command")),
    }

    match family {
        // AF_INET
        0x1 => {
            if body.len() < 12 {
                return Err(ProxyHeaderError::InvalidV2("short IPv4 address block"));
            }
            let src = Ipv4Addr::from(body.get_u32());
            let dst = Ipv4Addr::from(body.get_u32());
            let sport = body.get_u16();
            let dport = body.get_u16();
            Ok(ProxyHeader::Proxied {
                source: SocketAddr::new(src.into(), sport),
                destination: SocketAddr::new(dst.into(), dport),
            })
        }
        // AF_INET6
        0x2 => {
            if body.len() < 36 {
                return Err(ProxyHeaderError::InvalidV2("short IPv6 address block"));
            }
            let src = Ipv6Addr::from(body.get_u128());
            let dst = Ipv6Addr::from(body.get_u128());
            let sport = body.get_u16();
            let dport = body.get_u16();
            Ok(ProxyHeader::Proxied {
                source: SocketAddr::new(src.into(), sport),
                destination: SocketAddr::new(dst.into(), dport),
            })
        }
        // AF_UNSPEC, AF_UNIX
        0x0 | 0x3 => Ok(ProxyHeader::Local),
        _ => Err(ProxyHeaderError::InvalidV2("unknown address family")),
    }
}

/// Decorator applied to accepted connections when PROXY support is enabled.
#[derive(Debug, Clone)]
pub struct ProxyUnwrapper {
    allow_list: ProxyAllowList,
    header_timeout: Duration,
}

impl ProxyUnwrapper {
    pub fn new(allow_list: ProxyAllowList) -> Self {
        Self {
            allow_list,
            header_timeout: DEFAULT_HEADER_TIMEOUT,
        }
    }

    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// Consume any PROXY header on `stream` and return the effective client address.
    ///
    /// Headers from peers outside the allow-list are stripped but their
    /// addresses are ignored.
    pub async fn unwrap<S>(&self, mut stream: S, peer: SocketAddr) -> Result<(PrefixedStream<S>, SocketAddr), ProxyHeaderError>
    where
        S: AsyncRead + Unpin,
    {
        let trusted = self.allow_list.is_trusted(peer.ip());

        let (header, rest) = tokio::time::timeout(self.header_timeout, read_proxy_header(&mut stream))
            .await
            .map_err(|_| ProxyHeaderError::Timeout)??;

        let client = match header {
            Some(ProxyHeader::Proxied { source, .. }) if trusted => {
                tracing::debug!(peer = %peer, client = %source, "PROXY header accepted");
                source
            }
            Some(ProxyHeader::Proxied { source, .. }) => {
                tracing::debug!(peer = %peer, claimed = %source, "Ignoring PROXY header from untrusted peer");
                peer
            }
            Some(ProxyHeader::Local) | None => peer,
        };

        Ok((PrefixedStream::new(rest, stream), client))
    }
}

/// Stream that replays bytes read ahead of the payload before reading more.
#[derive(Debug)]
pub struct PrefixedStream<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> PrefixedStream<S> {
    pub fn new(prefix: Bytes, inner: S) -> Self {
        Self { prefix, inner }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PrefixedStream<S> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            let chunk = self.prefix.split_to(n);
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<S> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
