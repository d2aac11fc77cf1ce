//! Flash, erase, and go command implementations.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use stmboot::protocol::MAX_CHUNK;
use stmboot::{BinImage, Block, Error, Flasher, HexImage, SerialChannel};

use crate::config::Config;
use crate::serial::select_serial_port;
use crate::{use_fancy_output, was_interrupted, Cli, CliError, ImageFormat};

/// Flash command implementation.
#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &mut Config,
    image: &Path,
    format: Option<ImageFormat>,
    verify: bool,
    bin_base: u32,
    bin_block_size: usize,
    interrupted: &Arc<AtomicBool>,
) -> Result<()> {
    check_bin_block_size(bin_block_size)?;

    if !cli.quiet {
        eprintln!(
            "{} Loading image {}",
            style("📦").cyan(),
            style(image.display()).bold()
        );
    }

    let blocks = load_image(image, format, bin_base, bin_block_size)?;
    if !cli.quiet {
        let total_bytes: usize = blocks.iter().map(Block::len).sum();
        eprintln!(
            "{} {} block(s), {} byte(s)",
            style("ℹ").blue(),
            blocks.len(),
            total_bytes
        );
    }

    let mut flasher = connect(cli, config)?;

    let pb = progress_bar(cli, blocks.len() as u64);
    let result = flasher.upload(&blocks, verify, |done, _total| {
        pb.set_position(done as u64);
    });
    flasher.close();

    match result {
        Ok(report) => {
            pb.finish_with_message("done");
            if !cli.quiet {
                eprintln!(
                    "\n{} Flashed {} block(s), application launched",
                    style("🎉").green().bold(),
                    report.blocks_written
                );
            }
            Ok(())
        },
        Err(err) => {
            pb.abandon();
            if was_interrupted(interrupted) || matches!(err.source, Error::Interrupted) {
                return Err(CliError::Cancelled(format!(
                    "interrupted after {} block(s)",
                    err.completed
                ))
                .into());
            }
            Err(err).context("upload failed")
        },
    }
}

/// Erase command implementation.
pub(crate) fn cmd_erase(cli: &Cli, config: &mut Config, all: bool) -> Result<()> {
    if !all {
        return Err(CliError::Usage(
            "erasing the entire flash requires --all".to_string(),
        )
        .into());
    }

    let mut flasher = connect(cli, config)?;

    if !cli.quiet {
        eprintln!("{} Erasing flash...", style("🗑").red());
    }
    let result = flasher.erase();
    flasher.close();
    result.context("erase failed")?;

    if !cli.quiet {
        eprintln!("{} Erase complete", style("✓").green().bold());
    }
    Ok(())
}

/// Go command implementation.
pub(crate) fn cmd_go(cli: &Cli, config: &mut Config, address: u32) -> Result<()> {
    let mut flasher = connect(cli, config)?;

    if !cli.quiet {
        eprintln!(
            "{} Jumping to {}",
            style("🚀").cyan(),
            style(format!("{address:#010x}")).bold()
        );
    }
    let result = flasher.go(address);
    flasher.close();
    result.context("go failed")?;

    Ok(())
}

/// Reject block sizes the write command cannot carry, before anything
/// touches the target.
fn check_bin_block_size(size: usize) -> Result<()> {
    if size == 0 || size > MAX_CHUNK {
        return Err(CliError::Usage(format!(
            "--bin-block-size must be between 1 and {MAX_CHUNK}, got {size}"
        ))
        .into());
    }
    Ok(())
}

/// Load the image into transfer blocks, inferring the format from the file
/// extension when not given explicitly.
fn load_image(
    image: &Path,
    format: Option<ImageFormat>,
    bin_base: u32,
    bin_block_size: usize,
) -> Result<Vec<Block>> {
    let format = match format {
        Some(f) => f,
        None => match image.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("hex") => ImageFormat::Hex,
            Some(ext) if ext.eq_ignore_ascii_case("bin") => ImageFormat::Bin,
            _ => {
                return Err(CliError::Usage(format!(
                    "cannot infer image format from '{}', use --format",
                    image.display()
                ))
                .into())
            },
        },
    };

    let blocks = match format {
        ImageFormat::Hex => {
            HexImage::from_file(image)
                .with_context(|| format!("failed to load {}", image.display()))?
                .blocks
        },
        ImageFormat::Bin => {
            BinImage::from_file_at(image, bin_base, bin_block_size)
                .with_context(|| format!("failed to load {}", image.display()))?
                .blocks
        },
    };

    Ok(blocks)
}

/// Open the serial port and synchronize with the bootloader.
fn connect(cli: &Cli, config: &mut Config) -> Result<Flasher<SerialChannel>> {
    let port = select_serial_port(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            style(&port).green(),
            cli.baud
        );
    }

    let channel = SerialChannel::open(&port, cli.baud)
        .with_context(|| format!("failed to open {port}"))?;
    let mut flasher = Flasher::new(channel);

    if !cli.quiet {
        eprintln!("{} Entering bootloader...", style("⏳").yellow());
    }
    if let Err(err) = flasher.connect() {
        flasher.close();
        return Err(err).context("bootloader handshake failed");
    }
    if !cli.quiet {
        eprintln!("{} Connected", style("✓").green());
    }

    Ok(flasher)
}

/// Block-count progress bar on stderr, hidden in quiet/non-TTY mode.
fn progress_bar(cli: &Cli, total: u64) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(total);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    }
}
