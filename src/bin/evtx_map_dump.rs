use anyhow::{Context, Result};
use clap::{crate_version, Arg, Command};
use log::{error, warn, LevelFilter};
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use evtx_map::EvtxParser;

fn main() -> Result<()> {
    let matches = Command::new("evtx_map_dump")
        .version(crate_version!())
        .about("Dump EVTX files as JSON arrays of expanded event maps.")
        .arg(
            Arg::new("event-ids")
                .short('e')
                .long("event-ids")
                .value_name("IDS")
                .help("Comma separated event IDs; only matching events are dumped"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .default_value("warn"),
        )
        .arg(
            Arg::new("FILES")
                .required(true)
                .num_args(1..)
                .help("EVTX files to dump"),
        )
        .get_matches();

    let level_filter = match matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("warn")
    {
        "error" => LevelFilter::Error,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Warn,
    };
    env_logger::Builder::new().filter_level(level_filter).init();

    let event_id_filters = matches
        .get_one::<String>("event-ids")
        .map(|ids| parse_event_id_filters(ids))
        .transpose()?
        .unwrap_or_default();

    let files: Vec<&String> = matches
        .get_many::<String>("FILES")
        .map(Iterator::collect)
        .unwrap_or_default();

    // Per-file failures are soft: they are logged and the remaining files
    // are still processed.
    for input in files {
        let input = PathBuf::from(input);
        if let Err(e) = dump_file(&input, &event_id_filters) {
            error!("{}: {e:#}", input.display());
        }
    }

    Ok(())
}

/// Event ids match both their numeric and textual rendering, since inline
/// text values surface as strings while substitutions surface as numbers.
fn parse_event_id_filters(raw: &str) -> Result<Vec<Value>> {
    let mut filters = Vec::new();

    for part in raw.split(',').filter(|part| !part.is_empty()) {
        let id: i64 = part
            .trim()
            .parse()
            .with_context(|| format!("`{part}` is not a valid event id"))?;

        filters.push(Value::from(id));
        filters.push(Value::from(id.to_string()));
    }

    Ok(filters)
}

fn dump_file(input: &Path, event_id_filters: &[Value]) -> Result<()> {
    let parser = EvtxParser::from_path_dirty(input)?;

    let output_path = input.with_extension("json");
    let mut output = BufWriter::new(
        File::create(&output_path)
            .with_context(|| format!("failed to create {}", output_path.display()))?,
    );

    output.write_all(b"[")?;

    let mut first = true;
    for record in parser.events() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("{}: dropped event: {e}", input.display());
                continue;
            }
        };

        if !event_id_filters.is_empty() && !record.data.is_event_id(event_id_filters) {
            continue;
        }

        if !first {
            output.write_all(b",")?;
        }
        first = false;

        serde_json::to_writer(&mut output, &record.data)?;
    }

    output.write_all(b"]\n")?;
    output.flush()?;

    Ok(())
}
