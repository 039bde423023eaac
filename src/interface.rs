/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
use crate::hal::blocking::i2c::{Write, WriteRead};
use crate::Error;

/// 7-bit bus address with the A0 pin low.
pub const ADDRESS: u8 = 0b0110_0000;

/// Byte-wide register access to one chip.
///
/// Implementations report any transport failure as
/// [`Error::CommunicationError`]; retrying is left to the implementation.
pub trait RegisterAccess {
    fn read(&mut self, addr: u8) -> Result<u8, Error>;
    fn write(&mut self, addr: u8, value: u8) -> Result<(), Error>;
    /// Writes consecutive registers starting at `addr`. At most 8 bytes.
    fn write_bulk(&mut self, addr: u8, values: &[u8]) -> Result<(), Error>;
}

fn i2c_error<E>(_: E) -> Error {
    Error::CommunicationError
}

/// [`RegisterAccess`] over a blocking I²C bus.
pub struct I2cInterface<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> I2cInterface<I2C> {
    pub fn new(i2c: I2C, address_bit: bool) -> Self {
        I2cInterface {
            i2c,
            address: ADDRESS | if address_bit { 1 } else { 0 },
        }
    }

    /// Gives the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> RegisterAccess for I2cInterface<I2C>
where
    I2C: WriteRead<Error = E> + Write<Error = E>,
{
    fn read(&mut self, addr: u8) -> Result<u8, Error> {
        let mut buffer = [0u8; 1];
        self.i2c
            .write_read(self.address, &[addr], &mut buffer)
            .map_err(i2c_error)?;
        Ok(buffer[0])
    }

    fn write(&mut self, addr: u8, value: u8) -> Result<(), Error> {
        self.i2c
            .write(self.address, &[addr, value])
            .map_err(i2c_error)
    }

    fn write_bulk(&mut self, addr: u8, values: &[u8]) -> Result<(), Error> {
        if values.len() > 8 {
            return Err(Error::InvalidParameter);
        }
        let mut buffer = [0u8; 9];
        buffer[0] = addr;
        buffer[1..=values.len()].copy_from_slice(values);
        self.i2c
            .write(self.address, &buffer[..=values.len()])
            .map_err(i2c_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[derive(Default)]
    struct MockI2c {
        writes: Vec<(u8, Vec<u8>)>,
        fail: bool,
    }

    impl Write for MockI2c {
        type Error = ();

        fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), ()> {
            if self.fail {
                return Err(());
            }
            self.writes.push((addr, bytes.to_vec()));
            Ok(())
        }
    }

    impl WriteRead for MockI2c {
        type Error = ();

        fn write_read(&mut self, addr: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), ()> {
            if self.fail {
                return Err(());
            }
            self.writes.push((addr, bytes.to_vec()));
            // every register reads back as its inverted address
            buffer[0] = bytes[0] ^ 0xFF;
            Ok(())
        }
    }

    #[test]
    fn register_write_is_address_then_value() {
        let mut interface = I2cInterface::new(MockI2c::default(), true);
        interface.write(177, 0x20).unwrap();
        let i2c = interface.release();
        assert_eq!(i2c.writes, [(0x61, vec![177, 0x20])]);
    }

    #[test]
    fn bulk_write_is_one_transaction() {
        let mut interface = I2cInterface::new(MockI2c::default(), false);
        interface
            .write_bulk(26, &[0, 1, 0, 0x10, 0, 0, 0, 0])
            .unwrap();
        let i2c = interface.release();
        assert_eq!(i2c.writes, [(0x60, vec![26, 0, 1, 0, 0x10, 0, 0, 0, 0])]);
    }

    #[test]
    fn bulk_write_rejects_oversized_blocks() {
        let mut interface = I2cInterface::new(MockI2c::default(), false);
        assert_eq!(
            interface.write_bulk(26, &[0; 9]),
            Err(Error::InvalidParameter)
        );
        assert!(interface.release().writes.is_empty());
    }

    #[test]
    fn read_addresses_register() {
        let mut interface = I2cInterface::new(MockI2c::default(), false);
        assert_eq!(interface.read(0).unwrap(), 0xFF);
        assert_eq!(interface.release().writes, [(0x60, vec![0])]);
    }

    #[test]
    fn bus_errors_become_communication_errors() {
        let mut interface = I2cInterface::new(
            MockI2c {
                fail: true,
                ..MockI2c::default()
            },
            false,
        );
        assert_eq!(interface.read(0), Err(Error::CommunicationError));
        assert_eq!(interface.write(3, 0xFF), Err(Error::CommunicationError));
    }
}
