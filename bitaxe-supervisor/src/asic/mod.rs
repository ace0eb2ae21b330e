//! ASIC driver seam.
//!
//! The BM13xx command/response protocol lives behind these traits. The
//! pipeline supervisor only needs to reset the chain, count chips, and
//! agree on a UART speed before handing the hardware to the workers.

use async_trait::async_trait;

use crate::hw_trait::Result;
use crate::status::SystemStatus;

/// Default UART rate the chips power up at.
pub const DEFAULT_BAUD: u32 = 115_200;

/// BM13xx chain control.
#[async_trait]
pub trait AsicDriver: Send {
    /// Pulse the chain's reset line.
    async fn reset(&mut self) -> Result<()>;

    /// Address the chain and return how many chips answered.
    async fn enumerate(&mut self, status: &SystemStatus) -> u32;

    /// Program the chips for the fastest UART rate they support at the
    /// enumerated chip count and return that rate.
    async fn set_max_baud(&mut self, status: &SystemStatus) -> u32;
}

/// Host side of the UART to the chain.
#[async_trait]
pub trait SerialChannel: Send {
    /// Open the port at [`DEFAULT_BAUD`].
    async fn init(&mut self);

    async fn set_baud(&mut self, baud: u32);

    /// Discard anything already received.
    async fn clear_buffer(&mut self);
}
