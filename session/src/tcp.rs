//! TCP socket transport for SCPI-over-socket instruments.
//!
//! Text exchanges are newline-terminated by default (configurable through
//! [`TcpConfig`]); binary transfers use IEEE 488.2 definite-length blocks
//! (`#<n><length><payload>`). Timeouts apply to both reads and writes and
//! can be swapped at runtime, which is what scoped session overrides use.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::TransportError;
use crate::transport::{BinaryDatatype, BinaryFormat, ByteOrder, Transport};

/// Connection parameters for [`TcpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// How long to wait for the TCP handshake.
    pub connect_timeout: Duration,
    /// Initial read/write timeout; sessions may override it later.
    pub io_timeout: Duration,
    /// Byte sequence that ends an incoming reply.
    pub read_termination: String,
    /// Byte sequence appended to every outgoing message.
    pub write_termination: String,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(3),
            read_termination: "\n".to_string(),
            write_termination: "\n".to_string(),
        }
    }
}

/// A [`Transport`] over a plain TCP stream.
///
/// Construct it unconnected and let the session drive `connect`; the
/// transport keeps a read buffer so bytes beyond a terminator are not lost
/// between replies.
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpConfig,
    timeout: Duration,
    stream: Option<TcpStream>,
    pending: Vec<u8>,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        let timeout = config.io_timeout;
        Self {
            config,
            timeout,
            stream: None,
            pending: Vec::new(),
        }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }

    fn apply_timeout(stream: &TcpStream, timeout: Duration) -> Result<(), TransportError> {
        // zero duration is our "wait forever" convention; the socket API
        // spells that None
        let value = (!timeout.is_zero()).then_some(timeout);
        stream.set_read_timeout(value)?;
        stream.set_write_timeout(value)?;
        Ok(())
    }

    /// Pulls more bytes from the socket into the pending buffer.
    fn fill(&mut self) -> Result<(), TransportError> {
        let mut chunk = [0u8; 4096];
        let count = self.stream()?.read(&mut chunk)?;
        if count == 0 {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-reply",
            )));
        }
        self.pending.extend_from_slice(&chunk[..count]);
        Ok(())
    }

    fn read_until_terminator(&mut self) -> Result<Vec<u8>, TransportError> {
        let term = if self.config.read_termination.is_empty() {
            b"\n".to_vec()
        } else {
            self.config.read_termination.clone().into_bytes()
        };
        loop {
            if let Some(position) = find_subsequence(&self.pending, &term) {
                let mut line: Vec<u8> = self.pending.drain(..position + term.len()).collect();
                line.truncate(position);
                return Ok(line);
            }
            self.fill()?;
        }
    }

    fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        while self.pending.len() < len {
            self.fill()?;
        }
        Ok(self.pending.drain(..len).collect())
    }

    /// Consumes the reply termination that follows a definite-length block.
    ///
    /// Conforming instruments terminate binary replies like text ones; a
    /// device that does not should run with an empty `read_termination`.
    fn consume_block_termination(&mut self) -> Result<(), TransportError> {
        if self.config.read_termination.is_empty() {
            return Ok(());
        }
        let rest = self.read_until_terminator()?;
        if !rest.iter().all(|byte| byte.is_ascii_whitespace()) {
            return Err(TransportError::BadBlock(format!(
                "unexpected {} trailing bytes after block payload",
                rest.len()
            )));
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        let addrs: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|_| TransportError::BadAddress(address.to_string()))?
            .collect();

        let mut last = TransportError::BadAddress(address.to_string());
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => {
                    Self::apply_timeout(&stream, self.timeout)?;
                    stream.set_nodelay(true)?;
                    self.stream = Some(stream);
                    self.pending.clear();
                    debug!(%address, "tcp transport connected");
                    return Ok(());
                }
                Err(err) => last = TransportError::Io(err),
            }
        }
        Err(last)
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(stream) = self.stream.take() {
            // a failed shutdown still drops the socket
            let _ = stream.shutdown(Shutdown::Both);
            debug!("tcp transport disconnected");
        }
        self.pending.clear();
        Ok(())
    }

    fn read(&mut self) -> Result<String, TransportError> {
        let mut line = self.read_until_terminator()?;
        while line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(String::from_utf8(line)?)
    }

    fn write(&mut self, text: &str) -> Result<(), TransportError> {
        let mut message = Vec::with_capacity(text.len() + self.config.write_termination.len());
        message.extend_from_slice(text.as_bytes());
        message.extend_from_slice(self.config.write_termination.as_bytes());
        let stream = self.stream()?;
        stream.write_all(&message)?;
        stream.flush()?;
        Ok(())
    }

    fn read_binary_values(&mut self, format: &BinaryFormat) -> Result<Vec<f64>, TransportError> {
        let lead = self.read_exact_bytes(2)?;
        if lead[0] != b'#' {
            return Err(TransportError::BadBlock(format!(
                "expected '#', found {:?}",
                lead[0] as char
            )));
        }
        let payload = if lead[1] == b'0' {
            // indefinite-length block, ends at the terminator
            self.read_until_terminator()?
        } else {
            let digits = (lead[1] as char)
                .to_digit(10)
                .ok_or_else(|| {
                    TransportError::BadBlock(format!(
                        "length digit count {:?} is not a digit",
                        lead[1] as char
                    ))
                })? as usize;
            let header = self.read_exact_bytes(digits)?;
            let length: usize = std::str::from_utf8(&header)
                .ok()
                .and_then(|text| text.parse().ok())
                .ok_or_else(|| {
                    TransportError::BadBlock(format!("unreadable block length {header:?}"))
                })?;
            let payload = self.read_exact_bytes(length)?;
            self.consume_block_termination()?;
            payload
        };
        decode_values(&payload, format)
    }

    fn write_binary_values(
        &mut self,
        text: &str,
        values: &[f64],
        format: &BinaryFormat,
    ) -> Result<(), TransportError> {
        let payload = encode_values(values, format);
        let header = block_header(payload.len())?;

        let mut message = Vec::with_capacity(
            text.len() + 1 + header.len() + payload.len() + self.config.write_termination.len(),
        );
        message.extend_from_slice(text.as_bytes());
        if !text.is_empty() {
            message.push(b' ');
        }
        message.extend_from_slice(header.as_bytes());
        message.extend_from_slice(&payload);
        message.extend_from_slice(self.config.write_termination.as_bytes());

        let stream = self.stream()?;
        stream.write_all(&message)?;
        stream.flush()?;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if let Some(stream) = &self.stream {
            Self::apply_timeout(stream, timeout)?;
        }
        self.timeout = timeout;
        Ok(())
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Builds the `#<n><length>` prefix of a definite-length block.
fn block_header(payload_len: usize) -> Result<String, TransportError> {
    let digits = payload_len.to_string();
    if digits.len() > 9 {
        return Err(TransportError::BadBlock(format!(
            "payload of {payload_len} bytes exceeds the definite-length format"
        )));
    }
    Ok(format!("#{}{digits}", digits.len()))
}

fn encode_values(values: &[f64], format: &BinaryFormat) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * format.datatype.width());
    for &value in values {
        match format.datatype {
            BinaryDatatype::U8 => out.push(value as u8),
            BinaryDatatype::I8 => out.push(value as i8 as u8),
            BinaryDatatype::U16 => extend_ordered(
                &mut out,
                format.byte_order,
                (value as u16).to_le_bytes(),
                (value as u16).to_be_bytes(),
            ),
            BinaryDatatype::I16 => extend_ordered(
                &mut out,
                format.byte_order,
                (value as i16).to_le_bytes(),
                (value as i16).to_be_bytes(),
            ),
            BinaryDatatype::U32 => extend_ordered(
                &mut out,
                format.byte_order,
                (value as u32).to_le_bytes(),
                (value as u32).to_be_bytes(),
            ),
            BinaryDatatype::I32 => extend_ordered(
                &mut out,
                format.byte_order,
                (value as i32).to_le_bytes(),
                (value as i32).to_be_bytes(),
            ),
            BinaryDatatype::U64 => extend_ordered(
                &mut out,
                format.byte_order,
                (value as u64).to_le_bytes(),
                (value as u64).to_be_bytes(),
            ),
            BinaryDatatype::I64 => extend_ordered(
                &mut out,
                format.byte_order,
                (value as i64).to_le_bytes(),
                (value as i64).to_be_bytes(),
            ),
            BinaryDatatype::F32 => extend_ordered(
                &mut out,
                format.byte_order,
                (value as f32).to_le_bytes(),
                (value as f32).to_be_bytes(),
            ),
            BinaryDatatype::F64 => extend_ordered(
                &mut out,
                format.byte_order,
                value.to_le_bytes(),
                value.to_be_bytes(),
            ),
        }
    }
    out
}

fn extend_ordered<const N: usize>(
    out: &mut Vec<u8>,
    order: ByteOrder,
    little: [u8; N],
    big: [u8; N],
) {
    match order {
        ByteOrder::Little => out.extend_from_slice(&little),
        ByteOrder::Big => out.extend_from_slice(&big),
    }
}

fn decode_values(payload: &[u8], format: &BinaryFormat) -> Result<Vec<f64>, TransportError> {
    let width = format.datatype.width();
    if payload.len() % width != 0 {
        return Err(TransportError::BadBlock(format!(
            "payload of {} bytes is not a multiple of element width {width}",
            payload.len()
        )));
    }
    Ok(payload
        .chunks_exact(width)
        .map(|chunk| decode_one(chunk, format.datatype, format.byte_order))
        .collect())
}

fn decode_one(bytes: &[u8], datatype: BinaryDatatype, order: ByteOrder) -> f64 {
    match datatype {
        BinaryDatatype::U8 => bytes[0] as f64,
        BinaryDatatype::I8 => bytes[0] as i8 as f64,
        BinaryDatatype::U16 => {
            ordered::<2, _>(bytes, order, u16::from_le_bytes, u16::from_be_bytes) as f64
        }
        BinaryDatatype::I16 => {
            ordered::<2, _>(bytes, order, i16::from_le_bytes, i16::from_be_bytes) as f64
        }
        BinaryDatatype::U32 => {
            ordered::<4, _>(bytes, order, u32::from_le_bytes, u32::from_be_bytes) as f64
        }
        BinaryDatatype::I32 => {
            ordered::<4, _>(bytes, order, i32::from_le_bytes, i32::from_be_bytes) as f64
        }
        BinaryDatatype::U64 => {
            ordered::<8, _>(bytes, order, u64::from_le_bytes, u64::from_be_bytes) as f64
        }
        BinaryDatatype::I64 => {
            ordered::<8, _>(bytes, order, i64::from_le_bytes, i64::from_be_bytes) as f64
        }
        BinaryDatatype::F32 => {
            ordered::<4, _>(bytes, order, f32::from_le_bytes, f32::from_be_bytes) as f64
        }
        BinaryDatatype::F64 => ordered::<8, _>(bytes, order, f64::from_le_bytes, f64::from_be_bytes),
    }
}

fn ordered<const N: usize, T>(
    bytes: &[u8],
    order: ByteOrder,
    from_le: fn([u8; N]) -> T,
    from_be: fn([u8; N]) -> T,
) -> T {
    let mut array = [0u8; N];
    for (dst, src) in array.iter_mut().zip(bytes) {
        *dst = *src;
    }
    match order {
        ByteOrder::Little => from_le(array),
        ByteOrder::Big => from_be(array),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_header_format() {
        assert_eq!(block_header(0).unwrap(), "#10");
        assert_eq!(block_header(8).unwrap(), "#18");
        assert_eq!(block_header(2000).unwrap(), "#42000");
    }

    #[test]
    fn test_encode_f32_little_endian() {
        let format = BinaryFormat::default();
        let payload = encode_values(&[1.0], &format);
        assert_eq!(payload, 1.0f32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_encode_i16_big_endian() {
        let format = BinaryFormat::new(BinaryDatatype::I16, ByteOrder::Big);
        let payload = encode_values(&[-2.0, 515.0], &format);
        assert_eq!(payload, vec![0xFF, 0xFE, 0x02, 0x03]);
    }

    #[test]
    fn test_decode_reverses_encode() {
        let format = BinaryFormat::new(BinaryDatatype::F64, ByteOrder::Big);
        let values = vec![0.0, -1.5, 6.02e23];
        let decoded = decode_values(&encode_values(&values, &format), &format).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_decode_rejects_ragged_payload() {
        let format = BinaryFormat::new(BinaryDatatype::F32, ByteOrder::Little);
        let err = decode_values(&[0u8; 6], &format).unwrap_err();
        assert!(matches!(err, TransportError::BadBlock(_)));
    }

    #[test]
    fn test_unconnected_transport_refuses_io() {
        let mut transport = TcpTransport::new(TcpConfig::default());
        assert!(matches!(
            transport.write("*IDN?"),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(transport.read(), Err(TransportError::NotConnected)));
    }

    #[test]
    fn test_set_timeout_without_stream_is_remembered() {
        let mut transport = TcpTransport::new(TcpConfig::default());
        transport.set_timeout(Duration::from_millis(250)).unwrap();
        assert_eq!(transport.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_find_subsequence() {
        assert_eq!(find_subsequence(b"READY\nrest", b"\n"), Some(5));
        assert_eq!(find_subsequence(b"READY", b"\n"), None);
        assert_eq!(find_subsequence(b"a\r\nb", b"\r\n"), Some(1));
    }
}
