use crate::cartridge;
use crate::cpu::interrupts::Interrupt;
use crate::cpu::Cpu;
use crate::error::Error;
use crate::mmu::Mmu;
use crate::ppu;
use crate::screen::{Control, Screen};
use log::{error, info};
use std::cell::RefCell;
use std::rc::Rc;

/// Scanlines per frame: 144 visible plus the 10 VBlank lines.
const LAST_SCANLINE: u8 = 153;
/// First VBlank scanline; entering it raises the VBlank request.
const VBLANK_SCANLINE: u8 = 144;

/// Instructions between frame pushes. The real DMG paces scanlines by
/// T-cycles (456 per line); this loop only promises that LY cycles
/// 0..=153 and that VBlank fires once per revolution.
const FRAME_INTERVAL: u64 = 8192;

/// The GameBoy DMG-01 (non-color).
#[derive(Debug)]
pub struct GameBoy {
    /// The heart of the Gameboy, the CPU.
    /// The DMG-01 had a Sharp LR35902 CPU (speculated to be a SM83 core),
    /// which is a hybrid of the Z80 and the 8080.
    cpu: Cpu,

    /// The DMG-01 didn't have an actual Memory Management Unit (MMU), but
    /// it had a memory-mapped I/O system with a single RAM chip. To make
    /// emulation easier, we define an MMU; it is the only thing to access
    /// memory directly.
    mmu: Rc<RefCell<Mmu>>,

    /// Instructions stepped since power-on, for frame pacing.
    steps: u64,
}

impl GameBoy {
    /// Initialize Gameboy hardware from a cartridge ROM dump and an
    /// optional 256-byte boot ROM.
    pub fn power_on(rom: Vec<u8>, boot: Option<Vec<u8>>) -> Result<Self, Error> {
        let boot = match boot {
            Some(bytes) => Some(
                <[u8; 0x100]>::try_from(bytes.as_slice())
                    .map_err(|_| Error::BootRomSize(bytes.len()))?,
            ),
            None => None,
        };
        if boot.is_some() {
            info!("boot ROM mapped; starting from 0x0000");
        } else {
            info!("no boot ROM; starting from the cartridge entry point");
        }

        let cartridge = cartridge::new(rom)?;
        let mmu = Rc::new(RefCell::new(Mmu::new(cartridge, boot)));
        let cpu = Cpu::power_on(mmu.clone(), mmu.borrow().has_boot_rom());
        Ok(Self {
            cpu,
            mmu,
            steps: 0,
        })
    }

    /// One scheduler iteration: dispatch at most one interrupt, step the
    /// CPU unless halted, and advance the scanline counter.
    pub fn tick(&mut self) -> Result<(), Error> {
        self.cpu.dispatch_interrupt();

        if !self.cpu.halted {
            if let Err(err) = self.cpu.step() {
                self.cpu.dump_registers();
                return Err(err);
            }
        }

        self.advance_scanline();
        self.steps += 1;
        Ok(())
    }

    /// Run until the presentation port asks for shutdown or the CPU trips
    /// on an undecodable opcode.
    pub fn run<S: Screen>(&mut self, screen: &mut S) -> Result<(), Error> {
        info!("starting emulation loop");
        loop {
            if screen.poll() == Control::Shutdown {
                info!("shutdown requested");
                return Ok(());
            }

            if let Err(err) = self.tick() {
                error!("emulation stopped: {err}");
                return Err(err);
            }

            if self.steps % FRAME_INTERVAL == 0 {
                ppu::draw_background(&*self.mmu.borrow(), screen.frame());
                screen.present()?;
            }
        }
    }

    /// LY walks one line per instruction; program writes can only clear
    /// it, so the loop bumps the raw byte. Reaching line 144 requests
    /// VBlank, line 153 wraps back to 0.
    fn advance_scanline(&mut self) {
        let mut mmu = self.mmu.borrow_mut();
        let ly = mmu.ly() + 1;
        if ly == VBLANK_SCANLINE {
            mmu.request_interrupt(Interrupt::VBlank);
        }
        mmu.set_ly(if ly > LAST_SCANLINE { 0 } else { ly });
    }
}
