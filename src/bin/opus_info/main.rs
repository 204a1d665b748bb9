use std::{io::Write, path::Path, process::ExitCode};

use bruker_opus::{
    config::{load_options, DecodeOptions, ENV_PREFIX},
    logging::init_logging,
    opus::{is_opus, DecodedFile, Directory, FileBlock},
    read_opus_with_options,
};
use clap::Parser;
use error_stack::ResultExt;

mod cli;
mod summary;

fn main() -> ExitCode {
    let clargs = cli::Cli::parse();
    if let Err(e) = init_logging(clargs.verbosity.log_level_filter(), clargs.log_file.as_deref()) {
        eprintln!("ERROR: {e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = main_inner(clargs) {
        eprintln!("ERROR: {e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_inner(clargs: cli::Cli) -> error_stack::Result<(), CliError> {
    if let cli::Commands::ConfigTemplate(template_cli) = &clargs.command {
        return write_config_template(&template_cli.template_file);
    }

    let options = load_options(clargs.config.as_deref())
        .change_context_lazy(|| CliError::context("Error loading decoding options"))?;
    log::debug!("Decoding options: {options:?}");

    match clargs.command {
        cli::Commands::List(file_cli) => {
            for opus_file in file_cli.opus_files.iter() {
                list_blocks(opus_file, &options)?;
            }
            Ok(())
        },
        cli::Commands::Summary(summary_cli) => summarize(&summary_cli, &options),
        cli::Commands::Params(params_cli) => {
            let opus = load_file(&params_cli.opus_file, &options)?
                .ok_or_else(|| CliError::not_opus(&params_cli.opus_file))?;
            let params = if let Some(key) = params_cli.data.as_deref() {
                opus.get(key)
                    .ok_or_else(|| CliError::MissingRecord(key.to_string()))?
                    .params()
            } else if params_cli.reference {
                &opus.rf_params
            } else {
                &opus.params
            };
            println!("{}\n{}", params.label(), summary::render_params(params));
            Ok(())
        },
        cli::Commands::ConfigTemplate(_) => unreachable!("config-template handled before loading options"),
    }
}

/// Read and decode an Opus file. Returns `Ok(None)` (after a warning) if the file is not an Opus file.
fn load_file(opus_file: &Path, options: &DecodeOptions) -> error_stack::Result<Option<DecodedFile>, CliError> {
    log::info!("Reading {}", opus_file.display());
    let opus = read_opus_with_options(opus_file, options)
        .change_context_lazy(|| CliError::context(format!("Error reading {}", opus_file.display())))?;

    match &opus {
        Some(opus) => {
            for failed in opus.failed_blocks.iter() {
                log::warn!("{} block at byte {} could not be decoded: {}", failed.descriptor.label(), failed.descriptor.start, failed.error);
            }
        },
        None => log::warn!("Skipping {}, it is not an Opus file", opus_file.display()),
    }
    Ok(opus)
}

fn summarize(summary_cli: &cli::SummaryCli, options: &DecodeOptions) -> error_stack::Result<(), CliError> {
    let mut decoded = vec![];
    for opus_file in summary_cli.file.opus_files.iter() {
        if let Some(opus) = load_file(opus_file, options)? {
            decoded.push((opus_file.display().to_string(), opus));
        }
    }

    if summary_cli.json {
        return summary::print_json(&decoded);
    }

    for (name, opus) in decoded.iter() {
        let text = summary::render_summary(opus)
            .change_context_lazy(|| CliError::context(format!("Error formatting summary of {name}")))?;
        println!("== {name} ==\n{text}");
    }
    Ok(())
}

/// Print every directory entry, including those whose blocks fail to parse.
fn list_blocks(opus_file: &Path, options: &DecodeOptions) -> error_stack::Result<(), CliError> {
    let buf = std::fs::read(opus_file)
        .change_context_lazy(|| CliError::context(format!("Error reading {}", opus_file.display())))?;
    if !is_opus(&buf) {
        log::warn!("Skipping {}, it is not an Opus file", opus_file.display());
        return Ok(());
    }

    let directory = Directory::read(&buf);
    let rows = directory.entries.iter()
        .enumerate()
        .map(|(i, &descr)| summary::BlockRow::new(i, FileBlock::parse(&buf, descr, options)));
    println!("== {} ==", opus_file.display());
    println!("Opus file version {}, {} of {} directory slots used", directory.header.version, directory.entries.len(), directory.header.max_blocks);
    println!("{}", summary::render_table(rows));
    if directory.truncated {
        log::warn!("The directory of {} is truncated", opus_file.display());
    }
    Ok(())
}

fn write_config_template(template_file: &Path) -> error_stack::Result<(), CliError> {
    let env_line = format!("Each option can also be set with an environment variable, e.g. {ENV_PREFIX}PARALLEL=true.");
    let comments = [
        "Options for decoding Bruker Opus files.",
        "",
        "parallel: parse the blocks of each file on multiple threads.",
        "keep_raw_history: keep empty lines in the history (file log) text.",
        "",
        env_line.as_str(),
    ];

    let body = toml::to_string_pretty(&DecodeOptions::default())
        .change_context_lazy(|| CliError::context("Error serializing the default options"))?;

    let mut f = std::fs::File::create(template_file)
        .change_context_lazy(|| CliError::context(format!("Error creating {}", template_file.display())))?;
    for line in comments {
        writeln!(f, "# {line}")
            .change_context_lazy(|| CliError::context(format!("Error writing {}", template_file.display())))?;
    }
    write!(f, "\n{body}")
        .change_context_lazy(|| CliError::context(format!("Error writing {}", template_file.display())))?;
    Ok(())
}

/// Program error type
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// The file given does not start with the Opus magic bytes
    #[error("Not an Opus file: {0}")]
    NotOpus(String),

    /// The requested data record is not in the file
    #[error("No data record with key '{0}'")]
    MissingRecord(String),

    /// Wrapper type used to add information to an inner error.
    #[error("{0}")]
    Context(String),
}

impl CliError {
    fn not_opus(path: &Path) -> Self {
        Self::NotOpus(path.display().to_string())
    }

    fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }
}
