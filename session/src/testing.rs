//! Scripted in-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::TransportError;
use crate::transport::{BinaryFormat, Transport};

/// Records everything written and answers reads from scripted queues.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    pub connected: bool,
    pub fail_connect: bool,
    pub timeout: Duration,
    pub sent: Vec<String>,
    pub replies: VecDeque<String>,
    pub binary_replies: VecDeque<Vec<f64>>,
    pub binary_sent: Vec<(String, Vec<f64>)>,
    pub disconnects: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    fn no_reply() -> TransportError {
        TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "no scripted reply",
        ))
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        if self.fail_connect {
            return Err(TransportError::BadAddress(address.to_string()));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self) -> Result<String, TransportError> {
        self.replies.pop_front().ok_or_else(Self::no_reply)
    }

    fn write(&mut self, text: &str) -> Result<(), TransportError> {
        self.sent.push(text.to_string());
        Ok(())
    }

    fn read_binary_values(&mut self, _format: &BinaryFormat) -> Result<Vec<f64>, TransportError> {
        self.binary_replies.pop_front().ok_or_else(Self::no_reply)
    }

    fn write_binary_values(
        &mut self,
        text: &str,
        values: &[f64],
        _format: &BinaryFormat,
    ) -> Result<(), TransportError> {
        self.binary_sent.push((text.to_string(), values.to_vec()));
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }
}
