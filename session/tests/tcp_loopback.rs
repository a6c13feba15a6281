use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use scpi_dictionary_core::{CommandArgs, CommandDictionary, CommandTemplate, Dialect};
use scpi_dictionary_session::{
    BinaryDatatype, BinaryFormat, ByteOrder, Reply, ScpiSession, TcpConfig, TcpTransport,
};

// ---------------------------------------------------------------------------
// Loopback instrument
// ---------------------------------------------------------------------------

/// Serves one connection with a newline-framed SCPI-ish protocol: setters
/// store state, `?`-commands read it back, and `TRACE:DATA?` answers with a
/// definite-length block of three little-endian f32 values.
fn spawn_instrument() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        serve(stream);
    });
    (address, handle)
}

fn serve(stream: TcpStream) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;
    let mut state: HashMap<String, String> = HashMap::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return; // client hung up
        }
        let command = line.trim();
        if command == "*IDN?" {
            writer.write_all(b"LoopTech,SIM-5,001,0.1\n").unwrap();
        } else if command == "*OPC?" {
            writer.write_all(b"1\n").unwrap();
        } else if command == "TRACE:DATA?" {
            let payload: Vec<u8> = [1.0f32, 0.5, -0.25]
                .iter()
                .flat_map(|value| value.to_le_bytes())
                .collect();
            let length = payload.len().to_string();
            writer
                .write_all(format!("#{}{length}", length.len()).as_bytes())
                .unwrap();
            writer.write_all(&payload).unwrap();
            writer.write_all(b"\n").unwrap();
        } else if let Some(bare) = command.strip_suffix('?') {
            let value = state.get(bare).cloned().unwrap_or_else(|| "0".into());
            writer.write_all(value.as_bytes()).unwrap();
            writer.write_all(b"\n").unwrap();
        } else if let Some((name, value)) = command.split_once(' ') {
            state.insert(name.to_string(), value.to_string());
        }
    }
}

fn vna_dictionary() -> Arc<CommandDictionary> {
    let mut dictionary = CommandDictionary::scpi();
    dictionary
        .add(CommandTemplate::parse("FREQuency:STARt <num>", Dialect::Scpi).unwrap())
        .unwrap();
    Arc::new(dictionary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_text_exchange_over_socket() {
    let (address, handle) = spawn_instrument();
    let mut session = ScpiSession::new(TcpTransport::new(TcpConfig::default()), vna_dictionary());

    session.connect(&address.to_string()).unwrap();
    assert_eq!(session.identify().unwrap(), "LoopTech,SIM-5,001,0.1");

    session.write("FREQ:STAR", &CommandArgs::with(1e6)).unwrap();
    let start = session.query("FREQ:STAR", &CommandArgs::new()).unwrap();
    assert_eq!(start, Reply::Number(1e6));

    session.disconnect().unwrap();
    handle.join().unwrap();
}

#[test]
fn test_binary_block_over_socket() {
    let (address, handle) = spawn_instrument();
    let mut session = ScpiSession::new(TcpTransport::new(TcpConfig::default()), vna_dictionary());
    session.connect(&address.to_string()).unwrap();

    let format = BinaryFormat::new(BinaryDatatype::F32, ByteOrder::Little);
    let trace = session
        .query_binary("TRACE:DATA?", &CommandArgs::new(), &format)
        .unwrap();
    assert_eq!(trace, vec![1.0, 0.5, -0.25]);

    // the block termination was consumed, so text exchanges still line up
    assert_eq!(session.identify().unwrap(), "LoopTech,SIM-5,001,0.1");

    session.disconnect().unwrap();
    handle.join().unwrap();
}
