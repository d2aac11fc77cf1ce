//! Interactive serial port selection.
//!
//! Port resolution order: explicit `--port`, then the configured port, then
//! discovery. A single discovered port is auto-selected; multiple ports
//! prompt interactively via dialoguer unless non-interactive mode is set.

use {
    crate::{config::Config, Cli, CliError},
    anyhow::Result,
    console::style,
    dialoguer::{theme::ColorfulTheme, Confirm, Error as DialoguerError, Select},
    log::{debug, error, info},
    std::io::IsTerminal,
    stmboot::{available_ports, PortInfo},
};

fn usage_err(message: &str) -> anyhow::Error {
    // Selection failures map to CLI exit code 2 so script callers can
    // distinguish them from runtime errors.
    CliError::Usage(message.to_string()).into()
}

/// Select a serial port from CLI args, config, or discovery.
pub(crate) fn select_serial_port(cli: &Cli, config: &mut Config) -> Result<String> {
    // If port explicitly specified, use it
    if let Some(port_name) = &cli.port {
        return Ok(port_name.clone());
    }

    // If port in config, use it
    if let Some(port_name) = &config.connection.port {
        debug!("Using port from config: {port_name}");
        return Ok(port_name.clone());
    }

    // Detect available ports
    let ports = available_ports().unwrap_or_else(|e| {
        error!("Port discovery failed: {e}");
        Vec::new()
    });

    if ports.is_empty() {
        return Err(usage_err(
            "no serial ports found; specify one with --port",
        ));
    }

    if ports.len() == 1 {
        let port = &ports[0];
        info!("Auto-selected port: {}", port.name);
        return Ok(port.name.clone());
    }

    // Non-interactive mode must never prompt
    if cli.non_interactive {
        return Err(usage_err(
            "multiple serial ports found; specify one with --port",
        ));
    }

    ensure_interactive_terminal()?;
    let selected = select_port_interactive(ports)?;
    ask_remember_port(&selected, config);
    Ok(selected)
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "multiple serial ports found and no terminal to prompt on; use --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("port selection cancelled".to_string()).into()
            } else {
                CliError::Usage("port selection prompt failed".to_string()).into()
            }
        },
    }
}

/// Interactive port selection.
fn select_port_interactive(ports: Vec<PortInfo>) -> Result<String> {
    eprintln!(
        "{} Detected {} serial port(s)",
        style("ℹ").blue(),
        ports.len()
    );

    let labels: Vec<String> = ports.iter().map(port_label).collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => {
            let port = ports
                .into_iter()
                .nth(index)
                .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}"))?;
            Ok(port.name)
        },
        None => Err(CliError::Cancelled("port selection cancelled".to_string()).into()),
    }
}

fn port_label(port: &PortInfo) -> String {
    let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };

    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{}{vid_pid}{product}", port.name)
}

/// Ask the user whether to remember the selected port. Best-effort.
fn ask_remember_port(port: &str, config: &mut Config) {
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Remember {port} for future runs?"))
        .default(false)
        .interact_opt()
        .unwrap_or(None)
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.remember_port(port) {
            error!("Failed to save port configuration: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, product: Option<&str>) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            vid: Some(0x0483),
            pid: Some(0x5740),
            manufacturer: None,
            product: product.map(str::to_string),
            serial_number: None,
        }
    }

    #[test]
    fn test_port_label_includes_vid_pid() {
        let label = port_label(&port("/dev/ttyUSB0", None));
        assert!(label.starts_with("/dev/ttyUSB0"));
        assert!(label.contains("0483:5740"));
    }

    #[test]
    fn test_port_label_includes_product() {
        let label = port_label(&port("/dev/ttyACM0", Some("STM32 Virtual ComPort")));
        assert!(label.contains("STM32 Virtual ComPort"));
    }

    #[test]
    fn test_port_label_without_usb_info() {
        let bare = PortInfo {
            name: "/dev/ttyS0".to_string(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        };
        assert_eq!(port_label(&bare), "/dev/ttyS0");
    }

    #[test]
    fn test_usage_err_maps_to_usage_variant() {
        let err = usage_err("no ports");
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }
}
