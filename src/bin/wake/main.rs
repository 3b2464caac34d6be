use std::net::Ipv4Addr;

use anyhow::{Error, Result, bail};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use wolcast::{WakeOnLan, net::get_interface, wol::is_valid_mac_address};

#[derive(Parser)]
struct WakeArgs {
    /// Hardware address of the device to wake.
    mac: String,
    /// Broadcast address (or host name) to send the magic packet to.
    #[clap(long)]
    ip: Option<String>,
    /// Interface whose subnet broadcast address is used when --ip is absent.
    #[clap(long)]
    interface: Option<String>,
}

fn broadcast_address(args: &WakeArgs) -> Result<String> {
    if let Some(ip) = &args.ip {
        return Ok(ip.trim().to_owned());
    }

    match get_interface(args.interface.as_deref())? {
        Some(interface) => {
            let Some(broadcast) = interface.broadcast() else {
                return Err(Error::msg(
                    "The selected interface has no IPv4 network with a broadcast address.",
                ));
            };
            info!(
                "Using broadcast address {} of interface {}",
                broadcast, interface.name
            );
            Ok(broadcast.to_string())
        }
        None if args.interface.is_some() => Err(Error::msg("Cannot find requested interface.")),
        None => {
            warn!("No broadcast capable interface found, using the limited broadcast address");
            Ok(Ipv4Addr::BROADCAST.to_string())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = WakeArgs::parse();
    let mac = args.mac.trim().to_owned();

    if !is_valid_mac_address(&mac) {
        bail!("Invalid MAC address format: {}", args.mac);
    }

    let target = broadcast_address(&args)?;

    let sent = tokio::task::spawn_blocking(move || WakeOnLan::new().send(&mac, &target)).await??;

    if !sent {
        bail!("Failed to send magic packet");
    }

    Ok(())
}
