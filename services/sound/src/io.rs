//! Register access
//!
//! Both AC'97 register spaces (NAM mixer and NABM bus master) are I/O port
//! windows. [`RegisterPort`] is a typed view over one window; the actual
//! `in`/`out` instructions live behind [`PortIo`] so that the driver can run
//! against a simulated controller.

/// Raw port I/O.
///
/// Register access cannot fail. Passing a port outside the device's
/// windows is a programming error, not a runtime condition.
pub trait PortIo: Send + Sync {
    /// Reads an 8-bit port
    fn in8(&self, port: u16) -> u8;
    /// Reads a 16-bit port
    fn in16(&self, port: u16) -> u16;
    /// Reads a 32-bit port
    fn in32(&self, port: u16) -> u32;
    /// Writes an 8-bit port
    fn out8(&self, port: u16, value: u8);
    /// Writes a 16-bit port
    fn out16(&self, port: u16, value: u16);
    /// Writes a 32-bit port
    fn out32(&self, port: u16, value: u32);

    /// Busy-waits for roughly `microseconds`.
    ///
    /// Each write to the POST diagnostic port takes about a microsecond on
    /// the ISA timing most chipsets still emulate.
    fn io_delay(&self, microseconds: u32) {
        for _ in 0..microseconds {
            self.out8(POST_PORT, 0);
        }
    }
}

/// POST code port, used as a delay sink
const POST_PORT: u16 = 0x80;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
}

/// Register widths supported by the controller: `u8`, `u16` and `u32`.
pub trait RegisterWidth: Copy + sealed::Sealed {
    /// Reads a value of this width from `port`
    fn read_port<P: PortIo + ?Sized>(io: &P, port: u16) -> Self;
    /// Writes a value of this width to `port`
    fn write_port<P: PortIo + ?Sized>(self, io: &P, port: u16);
}

impl RegisterWidth for u8 {
    fn read_port<P: PortIo + ?Sized>(io: &P, port: u16) -> Self {
        io.in8(port)
    }

    fn write_port<P: PortIo + ?Sized>(self, io: &P, port: u16) {
        io.out8(port, self)
    }
}

impl RegisterWidth for u16 {
    fn read_port<P: PortIo + ?Sized>(io: &P, port: u16) -> Self {
        io.in16(port)
    }

    fn write_port<P: PortIo + ?Sized>(self, io: &P, port: u16) {
        io.out16(port, self)
    }
}

impl RegisterWidth for u32 {
    fn read_port<P: PortIo + ?Sized>(io: &P, port: u16) -> Self {
        io.in32(port)
    }

    fn write_port<P: PortIo + ?Sized>(self, io: &P, port: u16) {
        io.out32(port, self)
    }
}

/// Typed accessor over one register window
pub struct RegisterPort<'a, P: ?Sized> {
    io: &'a P,
    base: u16,
}

impl<'a, P: PortIo + ?Sized> RegisterPort<'a, P> {
    /// Creates a view over the window starting at `base`
    pub fn new(io: &'a P, base: u16) -> Self {
        Self { io, base }
    }

    /// Reads the register at `offset`
    pub fn read<W: RegisterWidth>(&self, offset: u16) -> W {
        W::read_port(self.io, self.base + offset)
    }

    /// Writes the register at `offset`
    pub fn write<W: RegisterWidth>(&self, offset: u16, value: W) {
        value.write_port(self.io, self.base + offset)
    }

    /// Busy-waits through the underlying port backend
    pub fn delay(&self, microseconds: u32) {
        self.io.io_delay(microseconds)
    }
}
