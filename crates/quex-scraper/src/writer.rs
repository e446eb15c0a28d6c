use std::io;
use std::path::{Path, PathBuf};

use fs_err as fs;
use serde::{Deserialize, Serialize};

use quex_crawler::FailureRecord;

use crate::config::QuestionScraperConfig;
use crate::record::QuestionRecord;

/// One unit of output: a harvested question or an explicit failure.
#[derive(Debug, Clone)]
pub enum Output {
    Question(QuestionRecord),
    Failure(FailureRecord),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Terminator {
    Crlf,
    Lf,
    Any(char),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CsvWriterConfig {
    pub delimiter: char,
    pub escape: Option<char>,
    pub terminator: Terminator,
    pub flexible: bool,
}

impl Default for CsvWriterConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            escape: None,
            terminator: Terminator::Lf,
            flexible: false,
        }
    }
}

impl From<&CsvWriterConfig> for csv::WriterBuilder {
    fn from(config: &CsvWriterConfig) -> Self {
        let mut builder = csv::WriterBuilder::new();
        builder.delimiter(config.delimiter as u8);
        if let Some(escape) = config.escape {
            builder.double_quote(false);
            builder.escape(escape as u8);
        }
        builder.terminator(match config.terminator {
            Terminator::Crlf => csv::Terminator::CRLF,
            Terminator::Lf => csv::Terminator::Any(b'\n'),
            Terminator::Any(c) => csv::Terminator::Any(c as u8),
        });
        builder.flexible(config.flexible);
        builder
    }
}

/// How an output file is opened.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileMode {
    /// Fail if the file already exists.
    #[default]
    Create,
    Truncate,
    Append,
}

impl FileMode {
    fn open(self, path: &Path) -> io::Result<fs::File> {
        let mut opts = fs::OpenOptions::new();
        match self {
            FileMode::Create => opts.write(true).create_new(true),
            FileMode::Truncate => opts.write(true).create(true).truncate(true),
            FileMode::Append => opts.write(true).create(true).append(true),
        };
        opts.open(path)
    }
}

pub enum RecordSink {
    File(csv::Writer<fs::File>),
    Stdout(csv::Writer<io::Stdout>),
    Stderr(csv::Writer<io::Stderr>),
}

impl RecordSink {
    fn serialize<S: Serialize>(&mut self, row: &S) -> csv::Result<()> {
        match self {
            RecordSink::File(wtr) => wtr.serialize(row),
            RecordSink::Stdout(wtr) => wtr.serialize(row),
            RecordSink::Stderr(wtr) => wtr.serialize(row),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            RecordSink::File(wtr) => wtr.flush(),
            RecordSink::Stdout(wtr) => wtr.flush(),
            RecordSink::Stderr(wtr) => wtr.flush(),
        }
    }
}

/// Where question rows and failure rows go. Questions default to stdout;
/// failures follow the question file (`<file>.failures.csv`) or fall
/// back to stderr so the two row shapes never share a stream.
pub struct OutputSinks {
    records: RecordSink,
    failures: RecordSink,
}

impl OutputSinks {
    pub fn open(config: &QuestionScraperConfig) -> anyhow::Result<Self> {
        let builder = csv::WriterBuilder::from(&config.csv);
        let records = match &config.csv_file {
            Some(path) => RecordSink::File(builder.from_writer(config.file_mode.open(path)?)),
            None => RecordSink::Stdout(builder.from_writer(io::stdout())),
        };
        let failures = match (&config.failures_file, &config.csv_file) {
            (Some(path), _) => RecordSink::File(builder.from_writer(config.file_mode.open(path)?)),
            (None, Some(csv_file)) => RecordSink::File(
                builder.from_writer(config.file_mode.open(&failures_path(csv_file))?),
            ),
            (None, None) => RecordSink::Stderr(builder.from_writer(io::stderr())),
        };
        Ok(Self { records, failures })
    }

    pub fn write(&mut self, output: &Output) -> csv::Result<()> {
        match output {
            Output::Question(question) => self.records.serialize(question),
            Output::Failure(failure) => self.failures.serialize(failure),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.records.flush()?;
        self.failures.flush()
    }
}

fn failures_path(csv_file: &Path) -> PathBuf {
    let mut path = csv_file.as_os_str().to_owned();
    path.push(".failures.csv");
    PathBuf::from(path)
}
