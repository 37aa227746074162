#[cfg(not(feature = "cli"))]
compile_error!("The `ibread` binary requires the `cli` feature. Build with `--features cli`.");

use clap::Parser;
use std::fs::File;
use std::io::{IsTerminal, Write};
use std::process;

use ibread::cli;
use ibread::cli::app::{Cli, ColorMode, Commands};
use ibread::IbdError;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }

    // Progress output only when rows go to a file and stderr is a terminal
    let progress = cli.output.is_some() && std::io::stderr().is_terminal();

    let writer_result: Result<Box<dyn Write>, IbdError> = match &cli.output {
        Some(path) => File::create(path)
            .map(|f| Box::new(std::io::BufWriter::new(f)) as Box<dyn Write>)
            .map_err(|e| IbdError::Io(format!("Cannot create {}: {}", path, e))),
        None => Ok(Box::new(std::io::stdout().lock()) as Box<dyn Write>),
    };

    let mut writer = match writer_result {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Scan {
            file,
            schema,
            root,
            key,
            limit,
            columns,
            format,
            page_size,
            checksum,
            no_verify,
            best_effort,
            include_deleted,
            verbose,
        } => cli::scan::execute(
            &cli::scan::ScanCliOptions {
                file,
                schema,
                root,
                key,
                limit,
                columns,
                format,
                page_size,
                checksum: checksum.into(),
                verify: !no_verify,
                best_effort,
                include_deleted,
                verbose,
                mmap: cli.mmap,
                progress,
            },
            &mut writer,
        ),

        Commands::Pages {
            file,
            page,
            filter_type,
            json,
            page_size,
        } => cli::pages::execute(
            &cli::pages::PagesOptions {
                file,
                page,
                filter_type,
                json,
                page_size,
                mmap: cli.mmap,
            },
            &mut writer,
        ),

        Commands::Verify {
            file,
            json,
            page_size,
            checksum,
            verbose,
        } => cli::verify::execute(
            &cli::verify::VerifyOptions {
                file,
                json,
                page_size,
                checksum: checksum.into(),
                verbose,
                mmap: cli.mmap,
                progress: std::io::stderr().is_terminal(),
            },
            &mut writer,
        ),

        Commands::Blob {
            file,
            page,
            offset,
            length,
            space,
            raw,
            page_size,
        } => cli::blob::execute(
            &cli::blob::BlobOptions {
                file,
                page,
                offset,
                length,
                space,
                raw,
                page_size,
                mmap: cli.mmap,
            },
            &mut writer,
        ),

        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::generate(shell, &mut cmd, "ibread", &mut writer);
            Ok(())
        }
    };

    let flushed = writer.flush().map_err(|e| IbdError::Io(e.to_string()));
    if let Err(e) = result.and(flushed) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
