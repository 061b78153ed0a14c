//! FEL transport abstraction
//!
//! The SPI flash driver never talks USB itself. Everything it needs from the
//! target is expressed by [`FelTransport`]: raw memory access, the static SRAM
//! layout of the SoC, and the upload/execute pair for the remote SPI batch
//! interpreter.

use crate::error::Result;

/// Static SRAM layout of the connected SoC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocInfo {
    /// SoC identifier reported by the boot ROM (e.g. 0x1680 for H3)
    pub soc_id: u32,
    /// SPL load address, start of the scratch data buffer
    pub spl_addr: u32,
    /// Address where uploaded code is placed and run
    pub scratch_addr: u32,
}

impl SocInfo {
    /// Size of the SRAM area between the SPL load address and scratch code
    pub fn spl_area_len(&self) -> usize {
        self.scratch_addr.saturating_sub(self.spl_addr) as usize
    }
}

/// Register parameters of the remote SPI batch interpreter
///
/// The interpreter is generic over the SPI controller generation; the host
/// passes the register addresses and the XCH bit it has to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTransferParams {
    /// SRAM address of the command stream
    pub buf: u32,
    /// Transfer control register holding the XCH bit
    pub xfer_ctl: u32,
    /// "Exchange burst" start bit in `xfer_ctl`
    pub xch_bit: u32,
    /// FIFO status register
    pub fifo_status: u32,
    /// TX data register
    pub txd: u32,
    /// RX data register
    pub rxd: u32,
    /// Burst counter register
    pub burst_count: u32,
    /// Transfer counter register
    pub xfer_count: u32,
    /// Burst control register (0 when the generation has none)
    pub burst_ctl: u32,
}

/// Access to a device in FEL mode
///
/// All methods block until the target has completed the request. Failures of
/// the underlying link are reported as [`FelError::TransportFailure`].
///
/// [`FelError::TransportFailure`]: crate::FelError::TransportFailure
pub trait FelTransport {
    /// Static SRAM layout of the connected SoC
    fn soc_info(&self) -> SocInfo;

    /// Read target memory starting at `addr`
    fn read_memory(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Write target memory starting at `addr`
    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    /// Read a single 32-bit register
    fn read_register(&mut self, addr: u32) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_memory(addr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Write a single 32-bit register
    fn write_register(&mut self, addr: u32, value: u32) -> Result<()> {
        self.write_memory(addr, &value.to_le_bytes())
    }

    /// Upload the SPI batch interpreter configured with `params`
    ///
    /// Returns the entry address to pass to [`execute_remote`](Self::execute_remote).
    fn prepare_batch_transfer(&mut self, params: &BatchTransferParams) -> Result<u32>;

    /// Run previously uploaded code and wait for it to return
    fn execute_remote(&mut self, entry: u32) -> Result<()>;
}

impl<T: FelTransport + ?Sized> FelTransport for Box<T> {
    fn soc_info(&self) -> SocInfo {
        (**self).soc_info()
    }

    fn read_memory(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read_memory(addr, buf)
    }

    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        (**self).write_memory(addr, data)
    }

    fn read_register(&mut self, addr: u32) -> Result<u32> {
        (**self).read_register(addr)
    }

    fn write_register(&mut self, addr: u32, value: u32) -> Result<()> {
        (**self).write_register(addr, value)
    }

    fn prepare_batch_transfer(&mut self, params: &BatchTransferParams) -> Result<u32> {
        (**self).prepare_batch_transfer(params)
    }

    fn execute_remote(&mut self, entry: u32) -> Result<()> {
        (**self).execute_remote(entry)
    }
}
