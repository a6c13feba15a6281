//! Stateful device session over an injected transport.
//!
//! A [`DeviceSession`] owns one transport exclusively and shares a
//! read-only [`CommandDictionary`] with any number of sibling sessions.
//! Every data operation resolves its key through the dictionary, renders
//! the command text, and exchanges it over the transport; a key the
//! dictionary does not know is passed through as a literal, already-formed
//! command as long as no arguments were supplied.
//!
//! Sessions start disconnected. [`connect`](DeviceSession::connect) and
//! [`disconnect`](DeviceSession::disconnect) move between the two states;
//! data operations while disconnected fail with
//! [`SessionError::NotConnected`] rather than touching the transport.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use scpi_dictionary_core::{CommandArgs, CommandDictionary, DictionaryError};

use crate::error::{Result, SessionError};
use crate::reply::Reply;
use crate::transport::{BinaryFormat, Transport};

/// A connection-stated wrapper tying a transport to a command dictionary.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use scpi_dictionary_core::CommandDictionary;
/// use scpi_dictionary_session::{DeviceSession, TcpConfig, TcpTransport};
///
/// let dictionary = Arc::new(CommandDictionary::scpi());
/// let session = DeviceSession::new(TcpTransport::new(TcpConfig::default()), dictionary);
/// assert!(!session.is_connected());
/// ```
#[derive(Debug)]
pub struct DeviceSession<T: Transport> {
    transport: T,
    dictionary: Arc<CommandDictionary>,
    connected: bool,
    address: Option<String>,
    settings_keys: Vec<String>,
    settings: IndexMap<String, Reply>,
}

impl<T: Transport> DeviceSession<T> {
    /// Creates a disconnected session around `transport`.
    pub fn new(transport: T, dictionary: Arc<CommandDictionary>) -> Self {
        Self {
            transport,
            dictionary,
            connected: false,
            address: None,
            settings_keys: Vec::new(),
            settings: IndexMap::new(),
        }
    }

    /// Declares the ordered list of keys [`get_settings`](Self::get_settings)
    /// polls.
    pub fn with_settings_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn dictionary(&self) -> &CommandDictionary {
        &self.dictionary
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The address of the current connection, if any.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Last-known settings snapshot, in declared key order.
    pub fn settings(&self) -> &IndexMap<String, Reply> {
        &self.settings
    }

    pub fn setting(&self, key: &str) -> Option<&Reply> {
        self.settings.get(key)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn timeout(&self) -> Duration {
        self.transport.timeout()
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.transport.set_timeout(timeout)?;
        Ok(())
    }

    /// Opens the transport. A session that is already connected is
    /// disconnected first, so `connect` can always be used to re-point a
    /// session at a new address.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] when the transport refuses the
    /// address; the session stays disconnected.
    pub fn connect(&mut self, address: &str) -> Result<()> {
        if self.connected {
            self.disconnect()?;
        }
        self.transport
            .connect(address)
            .map_err(|source| SessionError::Connection {
                address: address.to_string(),
                source,
            })?;
        self.connected = true;
        self.address = Some(address.to_string());
        debug!(%address, "session connected");
        Ok(())
    }

    /// Closes the transport. Calling this on a disconnected session is a
    /// no-op. The session is marked disconnected before the transport is
    /// asked to close, so a failing close cannot strand it half-open.
    pub fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.address = None;
        self.transport.disconnect()?;
        debug!("session disconnected");
        Ok(())
    }

    /// Resolves `key` and renders the command text with `args`.
    ///
    /// An unknown key with no arguments is treated as a literal, already
    /// formed command; an unknown key *with* arguments is a lookup error,
    /// since a literal has no slots to fill.
    pub(crate) fn resolve_text(&self, key: &str, args: &CommandArgs) -> Result<String> {
        match self.dictionary.resolve(key) {
            Ok(template) => Ok(template.build(args)?),
            Err(DictionaryError::UnknownCommand { .. }) if args.is_empty() => {
                Ok(key.trim().to_string())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn ensure_connected(&self, operation: &'static str) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(SessionError::NotConnected { operation })
        }
    }

    pub(crate) fn send_write(&mut self, command: &str) -> Result<()> {
        debug!(%command, "write");
        self.transport
            .write(command)
            .map_err(|source| SessionError::Command {
                command: command.to_string(),
                source,
            })
    }

    pub(crate) fn send_query(&mut self, command: &str) -> Result<String> {
        debug!(%command, "query");
        let reply = self
            .transport
            .query(command)
            .map_err(|source| SessionError::Command {
                command: command.to_string(),
                source,
            })?;
        trace!(%reply, "reply");
        Ok(reply)
    }

    /// Resolves, renders, and sends a command.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] while disconnected,
    /// [`SessionError::Lookup`]/[`SessionError::Format`] for bad keys or
    /// arguments, [`SessionError::Command`] when the transport fails.
    pub fn write(&mut self, key: &str, args: &CommandArgs) -> Result<()> {
        self.ensure_connected("write")?;
        let command = self.resolve_text(key, args)?;
        self.send_write(&command)
    }

    /// Like [`write`](Self::write), then reads and casts the reply.
    pub fn query(&mut self, key: &str, args: &CommandArgs) -> Result<Reply> {
        Ok(Reply::cast(&self.query_raw(key, args)?))
    }

    /// Like [`query`](Self::query) but returns the reply text verbatim.
    pub fn query_raw(&mut self, key: &str, args: &CommandArgs) -> Result<String> {
        self.ensure_connected("query")?;
        let command = self.resolve_text(key, args)?;
        self.send_query(&command)
    }

    /// Reads one reply without sending anything first.
    pub fn read(&mut self) -> Result<String> {
        self.ensure_connected("read")?;
        Ok(self.transport.read()?)
    }

    /// Resolves and sends a command followed by a binary block of `values`.
    ///
    /// Encoding is entirely the transport's business; this layer only
    /// threads `format` through.
    pub fn write_binary(
        &mut self,
        key: &str,
        args: &CommandArgs,
        values: &[f64],
        format: &BinaryFormat,
    ) -> Result<()> {
        self.ensure_connected("write_binary")?;
        let command = self.resolve_text(key, args)?;
        debug!(%command, count = values.len(), "binary write");
        self.transport
            .write_binary_values(&command, values, format)
            .map_err(|source| SessionError::Command { command, source })
    }

    /// Resolves and sends a command, then reads a binary block reply.
    pub fn query_binary(
        &mut self,
        key: &str,
        args: &CommandArgs,
        format: &BinaryFormat,
    ) -> Result<Vec<f64>> {
        self.ensure_connected("query_binary")?;
        let command = self.resolve_text(key, args)?;
        debug!(%command, "binary query");
        self.transport
            .query_binary_values(&command, format)
            .map_err(|source| SessionError::Command { command, source })
    }

    pub(crate) fn settings_keys(&self) -> &[String] {
        &self.settings_keys
    }

    pub(crate) fn record_setting(&mut self, key: String, reply: Reply) {
        self.settings.insert(key, reply);
    }

    /// Queries every declared settings key and refreshes the snapshot.
    ///
    /// Keys are queried in declaration order; a failing query aborts the
    /// refresh and leaves earlier keys updated.
    pub fn get_settings(&mut self) -> Result<&IndexMap<String, Reply>> {
        let keys = self.settings_keys.clone();
        for key in keys {
            let reply = self.query(&key, &CommandArgs::new())?;
            self.record_setting(key, reply);
        }
        Ok(&self.settings)
    }

    /// Runs `op` with the transport timeout temporarily set to `timeout`.
    ///
    /// The previous timeout is restored whether `op` succeeds or fails.
    /// When `op` fails *and* the restore fails, the operation error wins
    /// and the restore failure is logged.
    pub fn with_timeout<R>(
        &mut self,
        timeout: Duration,
        op: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let previous = self.transport.timeout();
        self.transport.set_timeout(timeout)?;
        let outcome = op(self);
        let restored = self.transport.set_timeout(previous).map_err(SessionError::from);
        match (outcome, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(restore_err)) => {
                warn!(error = %restore_err, "failed to restore transport timeout");
                Err(err)
            }
        }
    }
}

impl<T: Transport> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
