//! Command line interface definitions
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Inspect the contents of Bruker Opus files
#[derive(Debug, Parser)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub(crate) command: Commands,

    /// TOML file with decoding options. Options may also be set with
    /// BRUKER_OPUS_* environment variables, which take precedence.
    #[clap(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    /// Also write log messages to this file
    #[clap(long, global = true)]
    pub(crate) log_file: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum Commands {
    /// List the blocks in a file's directory and how each is classified
    List(FileCli),
    /// Summarize the decoded parameters, data records and reports of a file
    Summary(SummaryCli),
    /// Print the sample or reference parameters of a file
    Params(ParamsCli),
    /// Write an example decoding options file
    ConfigTemplate(TemplateCli),
}

#[derive(Debug, Clone, Args)]
pub(crate) struct FileCli {
    /// Paths to Opus files. Files that are not Opus files are skipped with a warning.
    #[clap(required = true)]
    pub(crate) opus_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct SummaryCli {
    #[clap(flatten)]
    pub(crate) file: FileCli,

    /// Print the summaries as JSON, an object keyed by file path, instead of tables
    #[clap(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct ParamsCli {
    /// Path to the Opus file
    pub(crate) opus_file: PathBuf,

    /// Print the reference channel parameters instead of the sample parameters
    #[clap(short, long)]
    pub(crate) reference: bool,

    /// Print the parameters of the status block for this data record (e.g. "sm") instead
    #[clap(short, long, conflicts_with = "reference")]
    pub(crate) data: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct TemplateCli {
    /// Path to write the template to
    pub(crate) template_file: PathBuf,
}
