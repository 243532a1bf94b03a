//! `swcount` main executable, which estimates sliding-window distinct
//! counts on the command line.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process;
use std::str::{self, FromStr};

use serde::Serialize;
use structopt::StructOpt;

use swcount::counters::{HeavyHitters, HoppingCounter, SlidingCounter};
use swcount::stream_reducer::{drain_keys, KeySink};
use swcount::SlidingLc;

/// `swcount` reads a stream of keys (one per line, or one per row of a CSV
/// column with `--csv-column`) and prints approximate distinct counts over a
/// sliding window of `--window` elements, one estimate every `--stride`
/// elements.
///
/// Two engines are available:
///
/// * `lc` (default) maintains a linear-counting bit table continuously: the
///   first estimate appears once a full window has been seen, then every
///   stride elements. Table and frequency-sketch sizes are set with
///   `--table-size`, `--depth` and `--width`.
///
/// * `qs` evaluates a fresh register sketch over each hopping window of the
///   stream; `--registers` and `--register-bits` size the sketch.
///
/// Output is a one-column CSV (`LC_estimate` or `QS_estimate`) on stdout,
/// unrounded. All hashing and shuffling derives from `--seed`, so a rerun
/// with identical inputs and flags reproduces the output bit for bit.
///
/// `swcount --hh K` is a separate evaluation aid: instead of cardinality it
/// prints the approximate top-K most frequent keys of the whole stream as
/// `count key` lines, most frequent first.
///
/// ```bash
/// seq 10000 | swcount --window 1024 --stride 512
/// swcount --engine qs --window 65536 --csv-column src trace.csv
/// seq 100 | swcount --hh 3
/// ```
#[derive(Debug, StructOpt)]
#[structopt(name = "swcount", about = "Approximate distinct keys under a sliding window.")]
struct Opt {
    /// Estimation engine: `lc` (sliding linear counting) or `qs`
    /// (per-window register sketch).
    #[structopt(long, default_value = "lc")]
    engine: Engine,

    /// Sliding-window size W in elements.
    #[structopt(long, default_value = "65536")]
    window: usize,

    /// Elements between emitted estimates; defaults to half the window.
    #[structopt(long)]
    stride: Option<usize>,

    /// Linear-counting table size m (lc engine).
    #[structopt(long, default_value = "262144")]
    table_size: usize,

    /// Frequency-sketch rows d (lc engine).
    #[structopt(long, default_value = "4")]
    depth: usize,

    /// Frequency-sketch columns w (lc engine).
    #[structopt(long, default_value = "131072")]
    width: usize,

    /// Register count m (qs engine).
    #[structopt(long, default_value = "512")]
    registers: usize,

    /// Register width r in bits (qs engine).
    #[structopt(long, default_value = "8")]
    register_bits: u32,

    /// Seed from which every hash seed, bias value and shuffle derives.
    #[structopt(long, default_value = "2024")]
    seed: u64,

    /// Treat the input as CSV and read keys from this column.
    #[structopt(long)]
    csv_column: Option<String>,

    /// Print the approximate top-K most frequent keys and exit.
    #[structopt(long)]
    hh: Option<usize>,

    /// Input file; stdin when omitted.
    #[structopt(parse(from_os_str))]
    input: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Engine {
    Lc,
    Qs,
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "lc" => Ok(Engine::Lc),
            "qs" => Ok(Engine::Qs),
            other => Err(format!("unknown engine '{}' (expected lc or qs)", other)),
        }
    }
}

#[derive(Serialize)]
struct LcRow {
    #[serde(rename = "LC_estimate")]
    estimate: f64,
}

#[derive(Serialize)]
struct QsRow {
    #[serde(rename = "QS_estimate")]
    estimate: f64,
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();
    let stride = opt.stride.unwrap_or_else(|| (opt.window / 2).max(1));

    let reader: Box<dyn BufRead> = match &opt.input {
        Some(path) => Box::new(BufReader::new(File::open(path).unwrap_or_else(|err| {
            eprintln!("swcount: {}: {}", path.display(), err);
            process::exit(2)
        }))),
        None => Box::new(BufReader::new(io::stdin())),
    };

    if let Some(k) = opt.hh {
        if k == 0 {
            return;
        }
        let reduced = pump(reader, opt.csv_column.as_deref(), HeavyHitters::new(k, opt.seed));
        for (count, key) in reduced.top() {
            println!("{} {}", count, str::from_utf8(key).expect("valid UTF-8"));
        }
        return;
    }

    match opt.engine {
        Engine::Lc => {
            let engine = SlidingLc::new(
                opt.table_size,
                opt.window,
                opt.depth,
                opt.width,
                stride,
                opt.seed,
            )
            .unwrap_or_else(|err| {
                eprintln!("swcount: {}", err);
                process::exit(2)
            });
            let reduced = pump(reader, opt.csv_column.as_deref(), SlidingCounter::new(engine));
            let mut estimates = reduced.estimates().to_vec();
            if estimates.is_empty() {
                // the stream never filled a window; report the lower bound
                log::warn!(
                    "stream ended after {} of {} window elements",
                    reduced.engine().elements_seen(),
                    opt.window
                );
                if let Ok(partial) = reduced.engine().estimate() {
                    estimates.push(partial);
                }
            }
            print_series(estimates.into_iter().map(|estimate| LcRow { estimate }));
        }
        Engine::Qs => {
            let counter = HoppingCounter::new(
                opt.registers,
                opt.register_bits,
                opt.window,
                stride,
                opt.seed,
            )
            .unwrap_or_else(|err| {
                eprintln!("swcount: {}", err);
                process::exit(2)
            });
            let reduced = pump(reader, opt.csv_column.as_deref(), counter);
            if reduced.buffered() > 0 {
                log::warn!(
                    "{} trailing elements did not fill a window and were not estimated",
                    reduced.buffered()
                );
            }
            print_series(
                reduced
                    .estimates()
                    .iter()
                    .map(|&estimate| QsRow { estimate }),
            );
        }
    }
}

/// Drain `reader` into `sink`, interpreting the input as raw key lines or as
/// a CSV with the named key column.
fn pump<S: KeySink>(reader: Box<dyn BufRead>, csv_column: Option<&str>, sink: S) -> S {
    match csv_column {
        None => drain_keys(reader, sink).expect("no io error"),
        Some(column) => drain_csv(reader, column, sink).expect("no io error"),
    }
}

fn drain_csv<R: BufRead, S: KeySink>(reader: R, column: &str, mut sink: S) -> io::Result<S> {
    let into_io = |err: csv::Error| io::Error::new(io::ErrorKind::InvalidData, err);
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);
    let headers = csv_reader.byte_headers().map_err(into_io)?;
    let key_index = headers
        .iter()
        .position(|header| header == column.as_bytes())
        .unwrap_or_else(|| panic!("column '{}' missing from CSV header", column));
    let mut record = csv::ByteRecord::new();
    while csv_reader.read_byte_record(&mut record).map_err(into_io)? {
        sink.observe_key(record.get(key_index).unwrap_or(b""));
    }
    Ok(sink)
}

/// Print rows as a one-column CSV; the header comes from the row type.
fn print_series<Row: Serialize>(rows: impl Iterator<Item = Row>) {
    let mut writer = csv::Writer::from_writer(io::stdout());
    for row in rows {
        writer.serialize(row).expect("stdout writable");
    }
    writer.flush().expect("stdout flushed");
}
