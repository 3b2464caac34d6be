pub mod net;
pub mod update;
pub mod wol;

pub use update::{UpdateInfo, UpdateService};
pub use wol::{MacAddress, MagicPacket, WakeOnLan};

/// Errors caused by caller input rather than by the environment.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid MAC address format: {0:?}")]
    InvalidMacAddress(String),
}
