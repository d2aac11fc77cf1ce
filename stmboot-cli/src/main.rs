//! stmboot CLI - Command-line tool for flashing STM32 chips over the
//! factory USART bootloader.
//!
//! ## Features
//!
//! - Flash Intel HEX and raw binary images
//! - Optional read-back verification
//! - Mass erase and application launch commands
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable support

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if progress animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;
mod serial;

use commands::flash::{cmd_erase, cmd_flash, cmd_go};
use commands::ports::cmd_list_ports;
use config::Config;

/// CLI-level errors that carry a specific exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Usage or setup problem (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Operation cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// stmboot - Flash STM32 firmware over the factory USART bootloader.
///
/// Environment variables:
///   STMBOOT_PORT              - Default serial port
///   STMBOOT_BAUD              - Default baud rate (default: 230400)
///   STMBOOT_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "stmboot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "STMBOOT_PORT")]
    port: Option<String>,

    /// Baud rate for the bootloader link.
    #[arg(
        short,
        long,
        global = true,
        default_value = "230400",
        env = "STMBOOT_BAUD"
    )]
    baud: u32,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "STMBOOT_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Firmware image formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ImageFormat {
    /// Intel HEX text file.
    Hex,
    /// Raw binary chunked from a base address.
    Bin,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Flash a firmware image (erase, write, optionally verify, launch).
    Flash {
        /// Path to the firmware image (.hex or .bin).
        image: PathBuf,

        /// Image format (inferred from the file extension if not given).
        #[arg(long, value_enum)]
        format: Option<ImageFormat>,

        /// Read back each block and compare after writing.
        #[arg(long)]
        verify: bool,

        /// Base address for raw binary images.
        #[arg(long, default_value = "0x08000000", value_parser = parse_hex_u32)]
        bin_base: u32,

        /// Transfer block size for raw binary images.
        #[arg(long, default_value = "128")]
        bin_block_size: usize,
    },

    /// Erase the entire flash.
    Erase {
        /// Confirm erasing the entire flash.
        #[arg(long)]
        all: bool,
    },

    /// Jump to application code at an address.
    Go {
        /// Target address to jump to.
        #[arg(short, long, default_value = "0x08000000", value_parser = parse_hex_u32)]
        address: u32,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse hexadecimal address (supports a single 0x prefix and underscore
/// digit separators like 0x0800_0000).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    // Underscores only between digits: no leading, trailing, or doubled.
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return Err(format!("Invalid hex address: '{s}'"));
    }
    let digits: String = digits.chars().filter(|c| *c != '_').collect();
    u32::from_str_radix(&digits, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

/// Whether Ctrl-C was pressed.
pub(crate) fn was_interrupted(flag: &Arc<AtomicBool>) -> bool {
    flag.load(Ordering::Relaxed)
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            match err.downcast_ref::<CliError>() {
                Some(CliError::Usage(_)) => ExitCode::from(2),
                Some(CliError::Cancelled(_)) => ExitCode::from(130),
                None => ExitCode::FAILURE,
            }
        },
    }
}

fn run() -> Result<()> {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "stmboot v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Wire Ctrl-C into the library's interrupt checker so uploads abort
    // between blocks.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        let _ = ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        });
        let flag = Arc::clone(&interrupted);
        stmboot::set_interrupt_checker(move || flag.load(Ordering::Relaxed));
    }

    // Load configuration
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            image,
            format,
            verify,
            bin_base,
            bin_block_size,
        } => {
            cmd_flash(
                &cli,
                &mut config,
                image,
                *format,
                *verify,
                *bin_base,
                *bin_block_size,
                &interrupted,
            )?;
        },
        Commands::Erase { all } => {
            cmd_erase(&cli, &mut config, *all)?;
        },
        Commands::Go { address } => {
            cmd_go(&cli, &mut config, *address)?;
        },
        Commands::ListPorts { json } => {
            cmd_list_ports(*json);
        },
        Commands::Completions { shell } => {
            cmd_completions(*shell);
        },
    }

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    // ---- clap validation ----

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_flash() {
        let cli = Cli::try_parse_from([
            "stmboot",
            "--port",
            "/dev/ttyUSB0",
            "--baud",
            "115200",
            "flash",
            "firmware.hex",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, 115200);
        assert!(matches!(cli.command, Commands::Flash { .. }));
    }

    #[test]
    fn test_cli_parse_flash_with_all_options() {
        let cli = Cli::try_parse_from([
            "stmboot",
            "flash",
            "fw.bin",
            "--format",
            "bin",
            "--verify",
            "--bin-base",
            "0x08004000",
            "--bin-block-size",
            "256",
        ])
        .unwrap();
        if let Commands::Flash {
            image,
            format,
            verify,
            bin_base,
            bin_block_size,
        } = cli.command
        {
            assert_eq!(image.to_str().unwrap(), "fw.bin");
            assert_eq!(format, Some(ImageFormat::Bin));
            assert!(verify);
            assert_eq!(bin_base, 0x0800_4000);
            assert_eq!(bin_block_size, 256);
        } else {
            panic!("Expected Flash command");
        }
    }

    #[test]
    fn test_cli_flash_defaults() {
        let cli = Cli::try_parse_from(["stmboot", "flash", "fw.hex"]).unwrap();
        if let Commands::Flash {
            format,
            verify,
            bin_base,
            bin_block_size,
            ..
        } = cli.command
        {
            assert!(format.is_none());
            assert!(!verify);
            assert_eq!(bin_base, 0x0800_0000);
            assert_eq!(bin_block_size, 128);
        } else {
            panic!("Expected Flash command");
        }
    }

    #[test]
    fn test_cli_parse_erase() {
        let cli = Cli::try_parse_from(["stmboot", "erase", "--all"]).unwrap();
        if let Commands::Erase { all } = cli.command {
            assert!(all);
        } else {
            panic!("Expected Erase command");
        }
    }

    #[test]
    fn test_cli_parse_go() {
        let cli = Cli::try_parse_from(["stmboot", "go", "--address", "0x08004000"]).unwrap();
        if let Commands::Go { address } = cli.command {
            assert_eq!(address, 0x0800_4000);
        } else {
            panic!("Expected Go command");
        }
    }

    #[test]
    fn test_cli_parse_go_default_address() {
        let cli = Cli::try_parse_from(["stmboot", "go"]).unwrap();
        if let Commands::Go { address } = cli.command {
            assert_eq!(address, 0x0800_0000);
        } else {
            panic!("Expected Go command");
        }
    }

    #[test]
    fn test_cli_parse_list_ports() {
        let cli = Cli::try_parse_from(["stmboot", "list-ports"]).unwrap();
        assert!(matches!(cli.command, Commands::ListPorts { json: false }));
    }

    #[test]
    fn test_cli_parse_list_ports_json() {
        let cli = Cli::try_parse_from(["stmboot", "list-ports", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::ListPorts { json: true }));
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["stmboot", "completions", "bash"]).unwrap();
        assert!(matches!(cli.command, Commands::Completions { .. }));
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["stmboot", "list-ports"]).unwrap();
        assert_eq!(cli.baud, 230_400);
        assert!(!cli.quiet);
        assert!(!cli.non_interactive);
        assert!(cli.port.is_none());
        assert!(cli.config_path.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "stmboot",
            "--port",
            "COM3",
            "--baud",
            "115200",
            "-vv",
            "--quiet",
            "--non-interactive",
            "--config",
            "/tmp/config.toml",
            "list-ports",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("COM3"));
        assert_eq!(cli.baud, 115200);
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert!(cli.non_interactive);
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["stmboot"]).is_err());
    }

    #[test]
    fn test_cli_invalid_format() {
        assert!(
            Cli::try_parse_from(["stmboot", "flash", "fw.hex", "--format", "elf"]).is_err()
        );
    }

    // ---- parse_hex_u32 ----

    #[test]
    fn test_parse_hex_u32_with_prefix() {
        assert_eq!(parse_hex_u32("0x08000000").unwrap(), 0x0800_0000);
        assert_eq!(parse_hex_u32("0X08000000").unwrap(), 0x0800_0000);
    }

    #[test]
    fn test_parse_hex_u32_without_prefix() {
        assert_eq!(parse_hex_u32("DEADBEEF").unwrap(), 0xDEAD_BEEF);
        assert_eq!(parse_hex_u32("ff").unwrap(), 0xFF);
    }

    #[test]
    fn test_parse_hex_u32_with_underscores() {
        assert_eq!(parse_hex_u32("0x0800_0000").unwrap(), 0x0800_0000);
    }

    #[test]
    fn test_parse_hex_u32_with_whitespace() {
        assert_eq!(parse_hex_u32("  0xFF  ").unwrap(), 0xFF);
    }

    #[test]
    fn test_parse_hex_u32_invalid() {
        assert!(parse_hex_u32("not_hex").is_err());
        assert!(parse_hex_u32("0xGG").is_err());
    }

    #[test]
    fn test_parse_hex_u32_rejects_repeated_prefix() {
        assert!(parse_hex_u32("0x0x0800").is_err());
        assert!(parse_hex_u32("0x0X0800").is_err());
    }

    #[test]
    fn test_parse_hex_u32_rejects_stray_underscores() {
        assert!(parse_hex_u32("_ff_").is_err());
        assert!(parse_hex_u32("0x_ff").is_err());
        assert!(parse_hex_u32("0xff_").is_err());
        assert!(parse_hex_u32("0x08__00").is_err());
    }

    #[test]
    fn test_parse_hex_u32_empty_after_prefix() {
        assert!(parse_hex_u32("0x").is_err());
        assert!(parse_hex_u32("").is_err());
    }

    #[test]
    fn test_parse_hex_u32_overflow() {
        assert!(parse_hex_u32("0x1FFFFFFFF").is_err());
    }

    #[test]
    fn test_parse_hex_u32_zero() {
        assert_eq!(parse_hex_u32("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u32("0").unwrap(), 0);
    }
}
