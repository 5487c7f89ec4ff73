//! BLE configuration tool for FullWash machines
//!
//! Scans for machines, reads their configuration, and sets the machine
//! number (and optionally the environment) over BLE.

use btleplug::platform::Adapter;
use clap::{Parser, Subcommand};

use fullwash_ble_controller::ble::{self, BleError, MachineSession};

#[derive(Parser)]
#[command(name = "fullwash-ble")]
#[command(about = "BLE configuration tool for FullWash machines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby FullWash machines
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value_t = fullwash_proto::DEFAULT_SCAN_SECS)]
        duration: u64,
    },
    /// Read the current configuration of a machine
    Read {
        /// Device MAC address or name fragment
        #[arg(short, long)]
        address: String,
        /// Master password
        #[arg(short, long, default_value = fullwash_proto::DEFAULT_PASSWORD)]
        password: String,
    },
    /// Set a machine's number
    Configure {
        /// New machine number
        number: u32,
        /// Device MAC address or name fragment
        #[arg(short, long)]
        address: String,
        /// Master password
        #[arg(short, long, default_value = fullwash_proto::DEFAULT_PASSWORD)]
        password: String,
        /// Also set the environment (local or prod)
        #[arg(short, long)]
        environment: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), BleError> {
    let adapter = ble::get_adapter().await?;

    match cli.command {
        Commands::Scan { duration } => scan_machines(&adapter, duration).await,
        Commands::Read { address, password } => {
            read_configuration(&adapter, &address, &password).await
        }
        Commands::Configure { number, address, password, environment } => {
            configure_machine(&adapter, &address, &password, number, environment.as_deref()).await
        }
    }
}

async fn scan_machines(adapter: &Adapter, duration: u64) -> Result<(), BleError> {
    println!("Scanning for FullWash machines ({duration} seconds)...");

    let devices = ble::scan(adapter, duration).await?;

    println!("\nFound {} devices:", devices.len());
    for device in &devices {
        let marker = if device.is_fullwash { ">>> " } else { "    " };
        let rssi = device
            .rssi
            .map(|r| format!("{r} dBm"))
            .unwrap_or_else(|| "N/A".to_string());
        println!("{marker}{:30} | {}  RSSI: {rssi}", device.name, device.address);
    }

    let machines = devices.iter().filter(|d| d.is_fullwash).count();
    if machines > 0 {
        println!("\nFound {machines} FullWash machine(s)");
    } else {
        println!("\nNo FullWash machines found");
        println!("Troubleshooting:");
        println!("  1. Ensure the machine is powered on");
        println!("  2. Wait 5-10 seconds after power-on");
        println!("  3. Move closer to the device");
        println!("  4. Check that Bluetooth is enabled");
    }

    Ok(())
}

async fn read_configuration(
    adapter: &Adapter,
    address: &str,
    password: &str,
) -> Result<(), BleError> {
    println!("Connecting to {address}...");
    let device = ble::find_device(adapter, address).await?;
    let session = MachineSession::connect(device).await?;
    println!("Connected!");

    let outcome = async {
        println!("Authenticating...");
        session.authenticate(password).await?;
        println!("Authentication successful!");

        let number = session.machine_number().await?;
        let environment = session.environment().await?;
        println!("\nCurrent configuration:");
        println!("  Machine number: {number}");
        println!("  Environment:    {environment}");
        Ok(())
    }
    .await;

    let _ = session.disconnect().await;
    outcome
}

async fn configure_machine(
    adapter: &Adapter,
    address: &str,
    password: &str,
    number: u32,
    environment: Option<&str>,
) -> Result<(), BleError> {
    println!("Connecting to {address}...");
    let device = ble::find_device(adapter, address).await?;
    let session = MachineSession::connect(device).await?;
    println!("Connected!");

    let outcome = async {
        println!("Authenticating...");
        session.authenticate(password).await?;
        println!("Authentication successful!");

        let current = session.machine_number().await?;
        println!("Current machine number: {current}");

        println!("Setting machine number to {number}...");
        session.set_machine_number(&number.to_string()).await?;

        let verified = session.machine_number().await?;
        println!("Machine number updated, verified: {verified}");

        if let Some(env) = environment {
            println!("Setting environment to {env}...");
            session.set_environment(env).await?;
            let verified = session.environment().await?;
            println!("Environment updated, verified: {verified}");
        }

        println!("\nRESTART THE MACHINE for changes to take effect");
        Ok(())
    }
    .await;

    let _ = session.disconnect().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn read_requires_address() {
        assert!(Cli::try_parse_from(["fullwash-ble", "read"]).is_err());
    }

    #[test]
    fn configure_requires_address() {
        assert!(Cli::try_parse_from(["fullwash-ble", "configure", "42"]).is_err());
    }

    #[test]
    fn configure_rejects_non_numeric_machine_number() {
        assert!(
            Cli::try_parse_from(["fullwash-ble", "configure", "abc", "--address", "AA:BB"])
                .is_err()
        );
    }

    #[test]
    fn password_defaults_to_factory_value() {
        let cli = Cli::try_parse_from(["fullwash-ble", "read", "--address", "AA:BB"]).unwrap();
        match cli.command {
            Commands::Read { password, .. } => {
                assert_eq!(password, fullwash_proto::DEFAULT_PASSWORD)
            }
            _ => panic!("expected read command"),
        }
    }

    #[test]
    fn scan_duration_defaults_to_protocol_window() {
        let cli = Cli::try_parse_from(["fullwash-ble", "scan"]).unwrap();
        match cli.command {
            Commands::Scan { duration } => {
                assert_eq!(duration, fullwash_proto::DEFAULT_SCAN_SECS)
            }
            _ => panic!("expected scan command"),
        }
    }

    #[test]
    fn configure_parses_environment_flag() {
        let cli = Cli::try_parse_from([
            "fullwash-ble",
            "configure",
            "7",
            "--address",
            "AA:BB",
            "--environment",
            "local",
        ])
        .unwrap();
        match cli.command {
            Commands::Configure { number, environment, .. } => {
                assert_eq!(number, 7);
                assert_eq!(environment.as_deref(), Some("local"));
            }
            _ => panic!("expected configure command"),
        }
    }
}
