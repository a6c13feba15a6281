//! SCPI-flavored session refinements.
//!
//! [`ScpiSession`] wraps a [`DeviceSession`] with the two conventions SCPI
//! instruments expect:
//!
//! - **Auto-query marker**: a [`query`](ScpiSession::query) with no
//!   arguments appends `?` to the resolved command unless it already
//!   carries one, so one dictionary entry serves as both setter (called
//!   with arguments) and getter (called bare).
//! - **Completion barrier**: every [`write`](ScpiSession::write) is
//!   followed by a blocking completion query (`*OPC?` by default), so
//!   control returns only after the instrument reports the operation
//!   finished. [`write_unbarriered`](ScpiSession::write_unbarriered) skips
//!   the barrier for fire-and-forget commands.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, warn};

use scpi_dictionary_core::{CommandArgs, CommandDictionary, DictionaryError};

use crate::error::{Result, SessionError};
use crate::reply::Reply;
use crate::session::DeviceSession;
use crate::transport::{BinaryFormat, Transport};

/// The IEEE 488.2 operation-complete query used as the default barrier.
pub const OPC_QUERY: &str = "*OPC?";

/// A [`DeviceSession`] with SCPI query and completion-barrier semantics.
#[derive(Debug)]
pub struct ScpiSession<T: Transport> {
    inner: DeviceSession<T>,
    completion_query: String,
}

impl<T: Transport> ScpiSession<T> {
    /// Creates a disconnected SCPI session with the `*OPC?` barrier.
    pub fn new(transport: T, dictionary: Arc<CommandDictionary>) -> Self {
        Self::from_session(DeviceSession::new(transport, dictionary))
    }

    /// Wraps an existing session without touching its state.
    pub fn from_session(inner: DeviceSession<T>) -> Self {
        Self {
            inner,
            completion_query: OPC_QUERY.to_string(),
        }
    }

    /// Replaces the completion query issued after barriered writes.
    pub fn with_completion_query(mut self, query: impl Into<String>) -> Self {
        self.completion_query = query.into();
        self
    }

    /// See [`DeviceSession::with_settings_keys`].
    pub fn with_settings_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner = self.inner.with_settings_keys(keys);
        self
    }

    pub fn completion_query(&self) -> &str {
        &self.completion_query
    }

    /// The wrapped session, for operations without SCPI refinements.
    pub fn session(&self) -> &DeviceSession<T> {
        &self.inner
    }

    pub fn session_mut(&mut self) -> &mut DeviceSession<T> {
        &mut self.inner
    }

    pub fn dictionary(&self) -> &CommandDictionary {
        self.inner.dictionary()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn address(&self) -> Option<&str> {
        self.inner.address()
    }

    pub fn settings(&self) -> &IndexMap<String, Reply> {
        self.inner.settings()
    }

    pub fn setting(&self, key: &str) -> Option<&Reply> {
        self.inner.setting(key)
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout()
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.inner.set_timeout(timeout)
    }

    pub fn connect(&mut self, address: &str) -> Result<()> {
        self.inner.connect(address)
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.inner.disconnect()
    }

    /// Sends a command and blocks on the completion query.
    ///
    /// # Errors
    ///
    /// Besides the [`DeviceSession::write`] failure modes, a transport
    /// failure during the barrier query surfaces as
    /// [`SessionError::Command`] carrying the barrier text.
    pub fn write(&mut self, key: &str, args: &CommandArgs) -> Result<()> {
        self.inner.write(key, args)?;
        self.completion_barrier()
    }

    /// Sends a command without waiting for completion.
    pub fn write_unbarriered(&mut self, key: &str, args: &CommandArgs) -> Result<()> {
        self.inner.write(key, args)
    }

    fn completion_barrier(&mut self) -> Result<()> {
        let query = self.completion_query.clone();
        let reply = self.inner.send_query(&query)?;
        debug!(barrier = %query, %reply, "completion barrier passed");
        Ok(())
    }

    /// Queries with the auto-appended `?` convention and casts the reply.
    pub fn query(&mut self, key: &str, args: &CommandArgs) -> Result<Reply> {
        Ok(Reply::cast(&self.query_raw(key, args)?))
    }

    /// Like [`query`](Self::query) but returns the reply text verbatim.
    pub fn query_raw(&mut self, key: &str, args: &CommandArgs) -> Result<String> {
        self.inner.ensure_connected("query")?;
        let command = self.resolve_query_text(key, args)?;
        self.inner.send_query(&command)
    }

    /// Resolves `key` into query form.
    ///
    /// With arguments the caller has spelled the command out and nothing is
    /// injected. Bare calls get a `?`: templates whose raw text already
    /// contains one are built as-is, zero-argument templates get a textual
    /// `?` appended, and templates with slots are built with `?` as the
    /// first positional so the dialect can collapse the joining space.
    /// Unknown keys fall back to the literal text, `?`-suffixed unless
    /// already present.
    fn resolve_query_text(&self, key: &str, args: &CommandArgs) -> Result<String> {
        if !args.is_empty() {
            return self.inner.resolve_text(key, args);
        }
        match self.dictionary().resolve(key) {
            Ok(template) => {
                if template.raw().contains('?') {
                    Ok(template.build(&CommandArgs::new())?)
                } else if template.argument_count() == 0 {
                    let mut command = template.build(&CommandArgs::new())?;
                    command.push('?');
                    Ok(command)
                } else {
                    Ok(template.build(&CommandArgs::with("?"))?)
                }
            }
            Err(DictionaryError::UnknownCommand { .. }) => {
                let mut command = key.trim().to_string();
                if !command.contains('?') {
                    command.push('?');
                }
                Ok(command)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// See [`DeviceSession::read`].
    pub fn read(&mut self) -> Result<String> {
        self.inner.read()
    }

    /// See [`DeviceSession::write_binary`]. Binary writes are not
    /// barriered; callers needing the barrier can follow up with
    /// [`write`](Self::write).
    pub fn write_binary(
        &mut self,
        key: &str,
        args: &CommandArgs,
        values: &[f64],
        format: &BinaryFormat,
    ) -> Result<()> {
        self.inner.write_binary(key, args, values, format)
    }

    /// See [`DeviceSession::query_binary`].
    pub fn query_binary(
        &mut self,
        key: &str,
        args: &CommandArgs,
        format: &BinaryFormat,
    ) -> Result<Vec<f64>> {
        self.inner.query_binary(key, args, format)
    }

    /// Refreshes the settings snapshot using query-form commands, so bare
    /// setter entries are polled as getters.
    pub fn get_settings(&mut self) -> Result<&IndexMap<String, Reply>> {
        let keys: Vec<String> = self.inner.settings_keys().to_vec();
        for key in keys {
            let reply = self.query(&key, &CommandArgs::new())?;
            self.inner.record_setting(key, reply);
        }
        Ok(self.inner.settings())
    }

    /// Runs `op` under a temporary transport timeout; see
    /// [`DeviceSession::with_timeout`].
    pub fn with_timeout<R>(
        &mut self,
        timeout: Duration,
        op: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let previous = self.inner.timeout();
        self.inner.set_timeout(timeout)?;
        let outcome = op(self);
        let restored = self.inner.set_timeout(previous);
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

    /// Asks the instrument for its `*IDN?` identification string.
    pub fn identify(&mut self) -> Result<String> {
        self.query_raw("*IDN?", &CommandArgs::new())
    }

    /// Issues `*RST` and waits for the completion barrier.
    pub fn reset(&mut self) -> Result<()> {
        self.write("*RST", &CommandArgs::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use scpi_dictionary_core::{CommandTemplate, Dialect};

    fn scpi_dictionary() -> Arc<CommandDictionary> {
        let mut dictionary = CommandDictionary::scpi();
        for raw in [
            "FREQ:START <num>",
            "SYSTem:ERRor",
            "OUTPut <state>",
            "CALCulate<cnum>:DATA? <char>",
        ] {
            dictionary
                .add(CommandTemplate::parse(raw, Dialect::Scpi).unwrap())
                .unwrap();
        }
        Arc::new(dictionary)
    }

    fn connected(transport: MockTransport) -> ScpiSession<MockTransport> {
        let mut session = ScpiSession::new(transport, scpi_dictionary());
        session.connect("192.0.2.10:5025").unwrap();
        session
    }

    #[test]
    fn test_bare_query_appends_marker() {
        let mut session = connected(MockTransport::with_replies(["100"]));
        session.query("FREQ:START", &CommandArgs::new()).unwrap();
        assert_eq!(session.session().transport().sent, vec!["FREQ:START?"]);
    }

    #[test]
    fn test_literal_query_key_is_sent_unchanged() {
        let mut session = connected(MockTransport::with_replies(["100"]));
        session.query("FREQ:START?", &CommandArgs::new()).unwrap();
        assert_eq!(session.session().transport().sent, vec!["FREQ:START?"]);
    }

    #[test]
    fn test_query_with_arguments_skips_marker() {
        let mut session = connected(MockTransport::with_replies(["ok"]));
        session
            .query("FREQ:START", &CommandArgs::with(100))
            .unwrap();
        assert_eq!(session.session().transport().sent, vec!["FREQ:START 100"]);
    }

    #[test]
    fn test_zero_argument_template_gets_marker() {
        let mut session = connected(MockTransport::with_replies(["0,\"No error\""]));
        let reply = session.query("SYST:ERR", &CommandArgs::new()).unwrap();
        assert_eq!(session.session().transport().sent, vec!["SYSTem:ERRor?"]);
        assert_eq!(reply, Reply::Text("0,\"No error\"".to_string()));
    }

    #[test]
    fn test_template_with_embedded_marker_builds_bare() {
        let mut session = connected(MockTransport::with_replies(["1,0"]));
        session.query("CALC:DATA?", &CommandArgs::new()).unwrap();
        assert_eq!(session.session().transport().sent, vec!["CALCulate:DATA?"]);
    }

    #[test]
    fn test_unknown_bare_key_gets_marker() {
        let mut session = connected(MockTransport::with_replies(["ready"]));
        session.query(" *ESR ", &CommandArgs::new()).unwrap();
        assert_eq!(session.session().transport().sent, vec!["*ESR?"]);
    }

    #[test]
    fn test_write_runs_completion_barrier() {
        let mut session = connected(MockTransport::with_replies(["1"]));
        session.write("OUTP", &CommandArgs::with(true)).unwrap();
        assert_eq!(
            session.session().transport().sent,
            vec!["OUTPut 1", "*OPC?"]
        );
    }

    #[test]
    fn test_write_unbarriered_skips_barrier() {
        let mut session = connected(MockTransport::new());
        session
            .write_unbarriered("OUTP", &CommandArgs::with(false))
            .unwrap();
        assert_eq!(session.session().transport().sent, vec!["OUTPut 0"]);
    }

    #[test]
    fn test_custom_completion_query() {
        let transport = MockTransport::with_replies(["1"]);
        let mut session = ScpiSession::new(transport, scpi_dictionary())
            .with_completion_query("STATus:OPERation:CONDition?");
        session.connect("192.0.2.10:5025").unwrap();
        session.write("OUTP", &CommandArgs::with(true)).unwrap();
        assert_eq!(
            session.session().transport().sent,
            vec!["OUTPut 1", "STATus:OPERation:CONDition?"]
        );
    }

    #[test]
    fn test_barrier_failure_carries_barrier_text() {
        // one scripted reply would be needed for the barrier; give none
        let mut session = connected(MockTransport::new());
        let err = session.write("OUTP", &CommandArgs::with(true)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Command { ref command, .. } if command == OPC_QUERY
        ));
    }

    #[test]
    fn test_identify_and_reset() {
        let mut session = connected(MockTransport::with_replies([
            "Keysight,P9375A,MY12345678,A.13.06",
            "1",
        ]));
        let idn = session.identify().unwrap();
        assert_eq!(idn, "Keysight,P9375A,MY12345678,A.13.06");
        session.reset().unwrap();
        assert_eq!(
            session.session().transport().sent,
            vec!["*IDN?", "*RST", "*OPC?"]
        );
    }

    #[test]
    fn test_get_settings_uses_query_form() {
        let transport = MockTransport::with_replies(["1000000"]);
        let mut session = ScpiSession::new(transport, scpi_dictionary())
            .with_settings_keys(["FREQ:START"]);
        session.connect("192.0.2.10:5025").unwrap();

        let settings = session.get_settings().unwrap();
        assert_eq!(settings["FREQ:START"], Reply::Number(1e6));
        assert_eq!(session.session().transport().sent, vec!["FREQ:START?"]);
    }

    #[test]
    fn test_with_timeout_restores_previous_value() {
        let mut session = connected(MockTransport::with_replies(["100"]));
        session.set_timeout(Duration::from_secs(3)).unwrap();
        session
            .with_timeout(Duration::from_secs(60), |session| {
                session.query("FREQ:START", &CommandArgs::new())
            })
            .unwrap();
        assert_eq!(session.timeout(), Duration::from_secs(3));
    }
}
