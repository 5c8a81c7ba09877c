use embedded_hal::serial::{Read, Write};
use heapless::Vec;
use ufmt::uWrite;

pub const LINE_CAPACITY: usize = 64;

pub struct SerialWriter<TX> {
    serial: TX,
}
impl<TX: Write<u8>> SerialWriter<TX> {
    pub fn new(serial: TX) -> SerialWriter<TX> {
        SerialWriter { serial }
    }
    pub fn return_pin(self) -> TX {
        self.serial
    }
}
impl<TX: Write<u8>> uWrite for SerialWriter<TX> {
    type Error = TX::Error;
    fn write_char(&mut self, c: char) -> Result<(), Self::Error> {
        nb::block!(self.serial.write(c as u8))
    }

    fn write_str(&mut self, string: &str) -> Result<(), Self::Error> {
        for byte in string.bytes() {
            nb::block!(self.serial.write(byte))?;
        }
        nb::block!(self.serial.flush())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(heapless::String<LINE_CAPACITY>),
    Overflow, // the line was longer than the buffer and has been thrown away
}

/// Accumulates bytes from the host until a newline.
#[derive(Debug, Default)]
pub struct LineReader {
    buffer: Vec<u8, LINE_CAPACITY>,
    overflowed: bool,
}
impl LineReader {
    pub fn new() -> LineReader {
        LineReader { buffer: Vec::new(), overflowed: false }
    }

    pub fn push(&mut self, byte: u8) -> Option<LineEvent> {
        if byte == b'\n' {
            let event = if self.overflowed { LineEvent::Overflow } else { LineEvent::Line(self.take()) };
            self.buffer.clear();
            self.overflowed = false;
            return Some(event);
        }
        if byte == b'\r' {
            return None;
        }
        // Only ASCII reaches the dispatcher, anything else can't match a command anyway.
        let byte = if byte.is_ascii() { byte } else { b'?' };
        if self.buffer.push(byte).is_err() {
            self.overflowed = true;
        }
        None
    }

    /// Drains the receiver until a line completes or no more bytes are waiting.
    pub fn poll<RX: Read<u8>>(&mut self, serial: &mut RX) -> Option<LineEvent> {
        loop {
            match serial.read() {
                Ok(byte) => {
                    if let Some(event) = self.push(byte) {
                        return Some(event);
                    }
                }
                Err(nb::Error::WouldBlock) => return None,
                Err(nb::Error::Other(_)) => return None, // framing or overrun, the bytes are gone
            }
        }
    }

    fn take(&self) -> heapless::String<LINE_CAPACITY> {
        let mut line = heapless::String::new();
        line.push_str(core::str::from_utf8(&self.buffer).unwrap_or("")).ok();
        line
    }
}
