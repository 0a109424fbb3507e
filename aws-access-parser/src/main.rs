use std::fs::{self, File, metadata};
use std::io::{BufRead, BufReader, Read, Write, stdin, stdout};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand, builder::ValueHint};
use clap_complete::{Shell, generate};
use crossbeam_channel::unbounded;
use flate2::read::MultiGzDecoder;
use libaws_access_parser::{
    BatchSummary, EmitterConfig, FsObjectSource, JsonLinesSink, LoglineEmitter, MetricsSink,
    S3Event, StatsdSink, decode, handle_event, process_object,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::{DirEntry, WalkDir};

#[derive(Parser)]
#[command(about, version, arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every access log entry as a JSON line
    #[command(arg_required_else_help = true)]
    Parse {
        /// Log file, or directory containing `.log` / `.log.gz` files. To read from stdin, use "-".
        #[arg(value_hint = ValueHint::AnyPath, allow_hyphen_values = true)]
        path: String,
    },

    /// Send request timings of stored log files to a metrics sink
    #[command(arg_required_else_help = true)]
    Emit {
        /// TOML file with the metric prefix and path translations.
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        config: PathBuf,

        /// Directory holding one subdirectory per bucket.
        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath)]
        root: PathBuf,

        /// StatsD address. Samples are printed as JSON lines when omitted.
        #[arg(long)]
        statsd: Option<String>,

        /// S3 event notification (JSON) naming the objects to process.
        #[arg(long, value_hint = ValueHint::FilePath, conflicts_with_all = ["bucket", "key"])]
        event: Option<PathBuf>,

        /// Bucket of the log file.
        #[arg(required_unless_present = "event")]
        bucket: Option<String>,

        /// Key of the log file.
        #[arg(required_unless_present = "event")]
        key: Option<String>,
    },

    /// Generate shell completion script for specified shell
    #[command(arg_required_else_help = true)]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Commands::Parse { path } => parse(&path),
        Commands::Emit {
            config,
            root,
            statsd,
            event,
            bucket,
            key,
        } => {
            let config = EmitterConfig::load(&config)?;
            let source = FsObjectSource::new(root);
            let target = match (event, bucket, key) {
                (Some(event), ..) => Target::Event(event),
                (None, Some(bucket), Some(key)) => Target::Object { bucket, key },
                _ => unreachable!(),
            };

            let summary = match statsd {
                Some(addr) => {
                    let sink = StatsdSink::connect(addr.as_str())
                        .with_context(|| format!("failed to reach StatsD at {addr}"))?;
                    emit(&source, &target, LoglineEmitter::new(config, sink))?
                }
                None => {
                    let sink = JsonLinesSink::new(stdout().lock());
                    emit(&source, &target, LoglineEmitter::new(config, sink))?
                }
            };
            info!(
                records = summary.records,
                emitted = summary.emitted,
                skipped = summary.skipped,
                "done"
            );
            Ok(())
        }
        Commands::Completion { shell } => {
            let mut cmd = Args::command();
            let bin_name = env!("CARGO_PKG_NAME");
            generate(shell, &mut cmd, bin_name, &mut stdout());
            Ok(())
        }
    }
}

enum Target {
    Event(PathBuf),
    Object { bucket: String, key: String },
}

fn emit<S: MetricsSink>(
    source: &FsObjectSource,
    target: &Target,
    mut emitter: LoglineEmitter<S>,
) -> Result<BatchSummary> {
    let summary = match target {
        Target::Event(path) => {
            let input = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            handle_event(&S3Event::from_json(&input)?, source, &mut emitter)?
        }
        Target::Object { bucket, key } => process_object(source, bucket, key, &mut emitter)?,
    };
    Ok(summary)
}

fn parse(path: &str) -> Result<()> {
    if path == "-" {
        let stdin = stdin().lock();
        let mut stdout = stdout().lock();
        return for_each_decoded_line(stdin, |json| {
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
            Ok(())
        });
    }

    if metadata(path)?.is_file() {
        let mut stdout = stdout().lock();
        return for_each_decoded_line(open(Path::new(path))?, |json| {
            writeln!(stdout, "{json}")?;
            Ok(())
        });
    }

    walkdir(path)
}

fn is_log_file(path: &Path) -> bool {
    path.to_str()
        .map(|s| s.ends_with(".log") || s.ends_with(".log.gz"))
        .unwrap_or(false)
}

fn open(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

fn walkdir(path: &str) -> Result<()> {
    //
    // 1 walkdir thread  --------> N decoding/serializing worker threads --------> 1 output thread
    //   (main thread)     (t,r)            `worker_threads`              (tx,rx)   `output_thread`
    //
    let (t, r) = unbounded::<DirEntry>();
    let (tx, rx) = unbounded::<String>();

    let worker_threads: Vec<_> = (0..thread::available_parallelism()?.get())
        .map(|_| {
            let r = r.clone();
            let tx = tx.clone();
            thread::spawn(move || -> Result<()> {
                while let Ok(entry) = r.recv() {
                    let path = entry.path();
                    if !is_log_file(path) {
                        continue;
                    }

                    // Check for an empty file
                    let metadata = metadata(path)?;
                    if !metadata.is_file() || metadata.len() == 0 {
                        continue;
                    }

                    for_each_decoded_line(open(path)?, |json| {
                        tx.send(json)?;
                        Ok(())
                    })?;
                }
                Ok(())
            })
        })
        .collect();
    drop(r);
    drop(tx);

    let output_thread = thread::spawn(move || -> Result<()> {
        let mut stdout = stdout().lock();

        while let Ok(json) = rx.recv() {
            writeln!(stdout, "{json}")?;
        }
        Ok(())
    });

    for entry in WalkDir::new(path) {
        t.send(entry?)?;
    }
    drop(t);

    let mut results = Vec::new();
    for thread in worker_threads {
        match thread.join() {
            Ok(result) => results.push(result),
            Err(panic) => bail!("Thread panicked with error: {:?}", panic),
        }
    }
    match output_thread.join() {
        Ok(result) => results.push(result),
        Err(panic) => bail!("Thread panicked with error: {:?}", panic),
    }
    results.into_iter().collect()
}

/// Decodes each line and hands its JSON form to `callback`. Lines that do not
/// decode are skipped.
fn for_each_decoded_line(
    mut reader: impl BufRead,
    mut callback: impl FnMut(String) -> Result<()>,
) -> Result<()> {
    let mut buffer = Vec::new();
    while reader.read_until(b'\n', &mut buffer)? > 0 {
        let line = String::from_utf8_lossy(&buffer);
        if let Some(log) = decode(&line) {
            callback(serde_json::to_string(&log)?)?;
        }
        drop(line);
        buffer.clear();
    }
    Ok(())
}
