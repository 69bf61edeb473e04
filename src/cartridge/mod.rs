pub mod header;
mod mbc1;
mod rom;

use crate::error::Error;
use crate::mmu::memory::Memory;
use header::{CartridgeHeader, CartridgeType};
use log::{info, warn};
use mbc1::Mbc1;
use rom::RomOnly;

/// A cartridge is memory below 0x8000 (plus, on real MBCs, external RAM the
/// core does not model). The MMU owns exactly one.
pub trait Cartridge: Memory + std::fmt::Debug {}

/// Build a cartridge from a raw ROM dump, dispatching on the type byte at
/// 0x0147. MBC1/MBC2 carts get the bank-latch stub; their write behavior
/// beyond ROM bank select is not implemented.
pub fn new(rom: Vec<u8>) -> Result<Box<dyn Cartridge>, Error> {
    if rom.is_empty() {
        return Err(Error::UnsupportedCartridge(0xFF));
    }

    let header = CartridgeHeader::parse(&rom);
    info!("cartridge title: {}", header.title());
    info!(
        "cartridge type: {:?}, ROM size: {:?}, RAM size: {:?}",
        header.cartridge_type(),
        header.rom_size(),
        header.ram_size()
    );

    let kind = header
        .cartridge_type()
        .map_err(Error::UnsupportedCartridge)?;
    let cart: Box<dyn Cartridge> = match kind {
        CartridgeType::RomOnly | CartridgeType::RomRam | CartridgeType::RomRamBattery => {
            Box::new(RomOnly::new(rom))
        }
        CartridgeType::Mbc1 | CartridgeType::Mbc1Ram | CartridgeType::Mbc1RamBattery => {
            warn!("MBC1 support is limited to ROM bank switching");
            Box::new(Mbc1::new(rom))
        }
        CartridgeType::Mbc2 | CartridgeType::Mbc2Battery => {
            warn!("MBC2 is not implemented; falling back to the MBC1 bank latch");
            Box::new(Mbc1::new(rom))
        }
    };
    Ok(cart)
}
