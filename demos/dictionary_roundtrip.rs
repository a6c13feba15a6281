//! Dictionary construction and persistence example.
//!
//! Builds a small VNA command dictionary from raw SCPI patterns, shows the
//! derived short aliases, saves the dictionary to a JSON document, reloads
//! it, and runs a few lookups against the reloaded copy.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p scpi-dictionary-demos --example dictionary_roundtrip
//! ```
//!
//! The document is written to a temporary file and removed afterwards.

use scpi_dictionary_core::{CommandArgs, CommandDictionary, CommandTemplate, Dialect, ReturnType};

fn main() {
    let dictionary = create_vna_dictionary();

    println!("Commands ({}):", dictionary.len());
    for (name, template) in dictionary.commands() {
        println!("  {name:<28} <- {:?}", template.raw());
    }
    println!();

    println!("Aliases:");
    for (alias, target) in dictionary.aliases() {
        println!("  {alias:<28} -> {target}");
    }
    println!();

    // Persist and reload
    let path = std::env::temp_dir().join("vna_commands_demo.json");
    dictionary.save(&path).unwrap();
    println!("Saved to {}", path.display());
    println!(
        "{}",
        serde_json::to_string_pretty(&dictionary.to_document()).unwrap()
    );

    let reloaded = CommandDictionary::load(&path).unwrap();
    assert_eq!(reloaded.len(), dictionary.len());

    // Search both command names and aliases
    let matches = reloaded.search("freq", false);
    println!("Search \"freq\":");
    println!("  commands: {:?}", matches.commands);
    println!("  aliases:  {:?}", matches.aliases);
    println!();

    // Resolve through an alias and build a concrete command
    let template = reloaded.resolve("SENS:FREQ:CENT").unwrap();
    let command = template
        .build(&CommandArgs::with(1e9).set("cnum", 2))
        .unwrap();
    println!("SENS:FREQ:CENT @ 1 GHz on channel 2 -> {command:?}");

    std::fs::remove_file(&path).ok();
}

fn create_vna_dictionary() -> CommandDictionary {
    let mut dictionary = CommandDictionary::scpi();

    for raw in [
        "SENSe<cnum>:FREQuency:CENTer <num>",
        "SENSe<cnum>:FREQuency:SPAN <num>",
        "SENSe<cnum>:BANDwidth <num>",
        "SOURce<cnum>:POWer <num>",
    ] {
        let mut template = CommandTemplate::parse(raw, Dialect::Scpi).unwrap();
        template.set_default("cnum", "1").unwrap();
        template.set_return_type("num", ReturnType::Number).unwrap();
        dictionary.add(template).unwrap();
    }
    dictionary.add_raw("INITiate:CONTinuous <state>").unwrap();

    // a couple of script-facing shorthands on top of the derived aliases
    dictionary.alias("fc", "SENS:FREQ:CENT");
    dictionary.alias("span", "SENS:FREQ:SPAN");

    dictionary
}
