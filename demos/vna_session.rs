//! SCPI session example against a simulated instrument.
//!
//! Wires a `ScpiSession` to an in-process transport that behaves like a
//! small VNA: setters store state, query-form commands read it back, and
//! the trace buffer answers binary queries. Shows the auto-`?` convention,
//! the `*OPC?` completion barrier, and the settings snapshot.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p scpi-dictionary-demos --example vna_session
//! ```
//!
//! No hardware is required; the instrument lives in this file.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use scpi_dictionary_core::{CommandArgs, CommandDictionary, CommandTemplate, Dialect};
use scpi_dictionary_session::{BinaryFormat, ScpiSession, Transport, TransportError};

fn main() {
    let dictionary = Arc::new(create_vna_dictionary());
    let mut session = ScpiSession::new(SimulatedVna::new(), dictionary)
        .with_settings_keys(["FREQ:STAR", "FREQ:STOP", "SENS:BAND"]);

    session.connect("sim://vna").unwrap();
    println!("Connected to: {}", session.identify().unwrap());
    println!();

    // Each write blocks on *OPC? before returning
    session.write("FREQ:STAR", &CommandArgs::with(1e6)).unwrap();
    session.write("FREQ:STOP", &CommandArgs::with(2e9)).unwrap();
    session.write("SENS:BAND", &CommandArgs::with(1000)).unwrap();

    // Bare queries reuse the setter entries with an appended `?`
    let start = session.query("FREQ:STAR", &CommandArgs::new()).unwrap();
    println!("Sweep start readback: {start}");

    let settings = session.get_settings().unwrap();
    println!("Settings snapshot:");
    for (key, value) in settings {
        println!("  {key:<12} = {value}");
    }
    println!();

    // Long acquisitions get a scoped timeout; the old value comes back
    // whether or not the trigger succeeds
    session
        .with_timeout(Duration::from_secs(120), |session| {
            session.write("INIT:CONT", &CommandArgs::with(false))
        })
        .unwrap();

    let trace = session
        .query_binary(
            "CALC:DATA?",
            &CommandArgs::with("SDATA"),
            &BinaryFormat::default(),
        )
        .unwrap();
    println!("Trace ({} points): {trace:?}", trace.len());

    println!();
    println!("Wire log:");
    for entry in &session.session().transport().log {
        println!("  > {entry}");
    }

    session.disconnect().unwrap();
}

fn create_vna_dictionary() -> CommandDictionary {
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
    dictionary
}

/// The instrument side of the demo: a transport whose far end is a map.
struct SimulatedVna {
    timeout: Duration,
    state: HashMap<String, String>,
    pending: VecDeque<String>,
    log: Vec<String>,
}

impl SimulatedVna {
    fn new() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            state: HashMap::new(),
            pending: VecDeque::new(),
            log: Vec::new(),
        }
    }
}

impl Transport for SimulatedVna {
    fn connect(&mut self, _address: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
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
        self.log.push(text.to_string());
        if text == "*IDN?" {
            self.pending.push_back("SimTech,VNA-1000,0042,1.0".into());
        } else if text == "*OPC?" {
            self.pending.push_back("1".into());
        } else if text.contains('?') {
            let bare = text.trim_end_matches('?');
            let value = self.state.get(bare).cloned().unwrap_or_else(|| "0".into());
            self.pending.push_back(value);
        } else if let Some((name, value)) = text.split_once(' ') {
            self.state.insert(name.to_string(), value.to_string());
        }
        Ok(())
    }

    fn read_binary_values(&mut self, _format: &BinaryFormat) -> Result<Vec<f64>, TransportError> {
        Ok(vec![0.9, -0.1, 0.05, -0.02])
    }

    fn write_binary_values(
        &mut self,
        text: &str,
        _values: &[f64],
        _format: &BinaryFormat,
    ) -> Result<(), TransportError> {
        self.log.push(text.to_string());
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
