use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use scpi_dictionary_core::{CommandArgs, CommandDictionary, CommandTemplate, Dialect};
use scpi_dictionary_session::{
    BinaryFormat, DeviceSession, Reply, ScpiSession, Transport, TransportError,
};

// ---------------------------------------------------------------------------
// Simulated instrument
// ---------------------------------------------------------------------------

/// A VNA-shaped instrument behind the transport interface: setters store
/// state, query-form commands read it back, and the trace buffer answers
/// binary queries.
#[derive(Debug)]
struct SimInstrument {
    connected: bool,
    timeout: Duration,
    state: HashMap<String, String>,
    log: Vec<String>,
    pending: VecDeque<String>,
    trace: Vec<f64>,
}

impl SimInstrument {
    fn new() -> Self {
        Self {
            connected: false,
            timeout: Duration::from_secs(3),
            state: HashMap::new(),
            log: Vec::new(),
            pending: VecDeque::new(),
            trace: vec![0.9, -0.1, 0.05, -0.02],
        }
    }

    fn answer(&mut self, command: &str) -> String {
        match command {
            "*IDN?" => "SimTech,VNA-1000,0042,1.0".to_string(),
            "*OPC?" => "1".to_string(),
            _ => {
                let bare = command.trim_end_matches('?');
                self.state.get(bare).cloned().unwrap_or_else(|| "0".into())
            }
        }
    }
}

impl Transport for SimInstrument {
    fn connect(&mut self, _address: &str) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        Ok(())
    }

    fn read(&mut self) -> Result<String, TransportError> {
        self.pending.pop_front().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "nothing to read",
            ))
        })
    }

    fn write(&mut self, text: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.log.push(text.to_string());
        if text == "*RST" {
            self.state.clear();
        } else if text.contains('?') {
            let reply = self.answer(text);
            self.pending.push_back(reply);
        } else if let Some((name, value)) = text.split_once(' ') {
            self.state.insert(name.to_string(), value.to_string());
        }
        Ok(())
    }

    fn read_binary_values(&mut self, _format: &BinaryFormat) -> Result<Vec<f64>, TransportError> {
        Ok(self.trace.clone())
    }

    fn write_binary_values(
        &mut self,
        text: &str,
        values: &[f64],
        _format: &BinaryFormat,
    ) -> Result<(), TransportError> {
        self.log.push(text.to_string());
        self.trace = values.to_vec();
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

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn vna_dictionary() -> Arc<CommandDictionary> {
    let mut dictionary = CommandDictionary::scpi();
    for raw in [
        "FREQuency:STARt <num>",
        "FREQuency:STOP <num>",
        "SENSe<cnum>:BANDwidth <num>",
        "INITiate:CONTinuous <state>",
        "CALCulate<cnum>:DATA? <char>",
    ] {
        dictionary
            .add(CommandTemplate::parse(raw, Dialect::Scpi).unwrap())
            .unwrap();
    }
    // measurement scripts use these channel-sounder shorthands
    dictionary.alias("f0", "FREQ:STAR");
    dictionary.alias("f1", "FREQ:STOP");
    Arc::new(dictionary)
}

// ---------------------------------------------------------------------------
// End-to-end session flow
// ---------------------------------------------------------------------------

#[test]
fn test_full_sweep_setup_flow() {
    let mut session = ScpiSession::new(SimInstrument::new(), vna_dictionary())
        .with_settings_keys(["FREQ:STAR", "FREQ:STOP", "SENS:BAND"]);

    session.connect("sim://vna").unwrap();
    assert_eq!(session.identify().unwrap(), "SimTech,VNA-1000,0042,1.0");

    // every barriered write issues *OPC? and blocks on the reply
    session.write("FREQ:STAR", &CommandArgs::with(1e6)).unwrap();
    session.write("FREQ:STOP", &CommandArgs::with(2e9)).unwrap();
    session
        .write("SENS:BAND", &CommandArgs::with(1000).set("cnum", 2))
        .unwrap();

    assert_eq!(
        session.session().transport().log,
        vec![
            "*IDN?",
            "FREQuency:STARt 1000000",
            "*OPC?",
            "FREQuency:STOP 2000000000",
            "*OPC?",
            "SENSe2:BANDwidth 1000",
            "*OPC?",
        ]
    );

    // bare query of a setter entry reads the stored value back
    let start = session.query("f0", &CommandArgs::new()).unwrap();
    assert_eq!(start, Reply::Number(1e6));

    session.disconnect().unwrap();
    assert!(!session.is_connected());
}

#[test]
fn test_settings_snapshot_reflects_instrument_state() {
    let mut session = ScpiSession::new(SimInstrument::new(), vna_dictionary())
        .with_settings_keys(["FREQ:STAR", "FREQ:STOP"]);
    session.connect("sim://vna").unwrap();

    session.write("FREQ:STAR", &CommandArgs::with(5e8)).unwrap();
    session.write("FREQ:STOP", &CommandArgs::with(6e9)).unwrap();

    let settings = session.get_settings().unwrap();
    assert_eq!(settings["FREQ:STAR"], Reply::Number(5e8));
    assert_eq!(settings["FREQ:STOP"], Reply::Number(6e9));

    // the snapshot survives disconnect as a last-known record
    session.disconnect().unwrap();
    assert_eq!(session.setting("FREQ:STAR"), Some(&Reply::Number(5e8)));
}

#[test]
fn test_binary_trace_readout() {
    let mut session = ScpiSession::new(SimInstrument::new(), vna_dictionary());
    session.connect("sim://vna").unwrap();

    let trace = session
        .query_binary(
            "CALC:DATA?",
            &CommandArgs::with("SDATA"),
            &BinaryFormat::default(),
        )
        .unwrap();
    assert_eq!(trace, vec![0.9, -0.1, 0.05, -0.02]);
    assert_eq!(
        session.session().transport().log.last().unwrap(),
        "CALCulate:DATA? SDATA"
    );
}

#[test]
fn test_scoped_timeout_around_long_trigger() {
    let mut session = ScpiSession::new(SimInstrument::new(), vna_dictionary());
    session.connect("sim://vna").unwrap();
    session.set_timeout(Duration::from_secs(3)).unwrap();

    session
        .with_timeout(Duration::from_secs(120), |session| {
            assert_eq!(session.timeout(), Duration::from_secs(120));
            session.write("INIT:CONT", &CommandArgs::with(false))
        })
        .unwrap();
    assert_eq!(session.timeout(), Duration::from_secs(3));
}

#[test]
fn test_reset_clears_instrument_state() {
    let mut session = ScpiSession::new(SimInstrument::new(), vna_dictionary());
    session.connect("sim://vna").unwrap();

    session.write("FREQ:STAR", &CommandArgs::with(1e6)).unwrap();
    session.reset().unwrap();
    let start = session.query("FREQ:STAR", &CommandArgs::new()).unwrap();
    // the simulated instrument answers 0 for unset state
    assert_eq!(start, Reply::Number(0.0));
}

#[test]
fn test_plain_session_has_no_scpi_refinements() {
    let mut session = DeviceSession::new(SimInstrument::new(), vna_dictionary());
    session.connect("sim://vna").unwrap();

    // no auto-? — the bare setter form goes out verbatim
    session.write("FREQ:STAR", &CommandArgs::new()).unwrap();
    assert_eq!(session.transport().log, vec!["FREQuency:STARt"]);
}
