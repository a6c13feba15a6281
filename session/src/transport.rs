//! The transport capability a device session drives.
//!
//! [`Transport`] is the seam between sessions and wires: anything that can
//! open a connection, exchange terminated text, and move binary blocks can
//! back a session. The crate ships [`TcpTransport`](crate::TcpTransport) for
//! socket instruments; tests and simulators implement the trait directly.

use std::time::Duration;

use crate::error::TransportError;

/// Element type of a binary transfer, with its IEEE 488.2 block wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryDatatype {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl BinaryDatatype {
    /// Single-character code used in transfer format commands (`B`, `b`,
    /// `H`, `h`, `I`, `i`, `Q`, `q`, `f`, `d`).
    pub fn code(&self) -> char {
        match self {
            BinaryDatatype::U8 => 'B',
            BinaryDatatype::I8 => 'b',
            BinaryDatatype::U16 => 'H',
            BinaryDatatype::I16 => 'h',
            BinaryDatatype::U32 => 'I',
            BinaryDatatype::I32 => 'i',
            BinaryDatatype::U64 => 'Q',
            BinaryDatatype::I64 => 'q',
            BinaryDatatype::F32 => 'f',
            BinaryDatatype::F64 => 'd',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'B' => Some(BinaryDatatype::U8),
            'b' => Some(BinaryDatatype::I8),
            'H' => Some(BinaryDatatype::U16),
            'h' => Some(BinaryDatatype::I16),
            'I' => Some(BinaryDatatype::U32),
            'i' => Some(BinaryDatatype::I32),
            'Q' => Some(BinaryDatatype::U64),
            'q' => Some(BinaryDatatype::I64),
            'f' => Some(BinaryDatatype::F32),
            'd' => Some(BinaryDatatype::F64),
            _ => None,
        }
    }

    /// Element width in bytes.
    pub fn width(&self) -> usize {
        match self {
            BinaryDatatype::U8 | BinaryDatatype::I8 => 1,
            BinaryDatatype::U16 | BinaryDatatype::I16 => 2,
            BinaryDatatype::U32 | BinaryDatatype::I32 | BinaryDatatype::F32 => 4,
            BinaryDatatype::U64 | BinaryDatatype::I64 | BinaryDatatype::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Element type and byte order of a binary block transfer.
///
/// Values cross the session API as `f64` regardless of the wire type; the
/// transport converts at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryFormat {
    pub datatype: BinaryDatatype,
    pub byte_order: ByteOrder,
}

impl BinaryFormat {
    pub fn new(datatype: BinaryDatatype, byte_order: ByteOrder) -> Self {
        Self {
            datatype,
            byte_order,
        }
    }
}

impl Default for BinaryFormat {
    /// 32-bit float, little-endian: the common instrument trace format.
    fn default() -> Self {
        Self::new(BinaryDatatype::F32, ByteOrder::Little)
    }
}

/// A connection a session can exchange commands over.
///
/// Implementations own their wire details (termination characters, block
/// framing); sessions hand over fully rendered command text and expect
/// stripped reply text back.
pub trait Transport {
    /// Opens the connection to `address`.
    fn connect(&mut self, address: &str) -> Result<(), TransportError>;

    /// Closes the connection. Closing an unopened transport is a no-op.
    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Reads one reply, with termination stripped.
    fn read(&mut self) -> Result<String, TransportError>;

    /// Sends one command, adding termination as needed.
    fn write(&mut self, text: &str) -> Result<(), TransportError>;

    /// Sends a command and reads its reply.
    fn query(&mut self, text: &str) -> Result<String, TransportError> {
        self.write(text)?;
        self.read()
    }

    /// Reads a binary block and decodes it per `format`.
    fn read_binary_values(&mut self, format: &BinaryFormat) -> Result<Vec<f64>, TransportError>;

    /// Sends a command followed by `values` encoded per `format`.
    fn write_binary_values(
        &mut self,
        text: &str,
        values: &[f64],
        format: &BinaryFormat,
    ) -> Result<(), TransportError>;

    /// Sends a command and reads its binary block reply.
    fn query_binary_values(
        &mut self,
        text: &str,
        format: &BinaryFormat,
    ) -> Result<Vec<f64>, TransportError> {
        self.write(text)?;
        self.read_binary_values(format)
    }

    /// Current I/O timeout.
    fn timeout(&self) -> Duration;

    /// Replaces the I/O timeout. `Duration::ZERO` means wait forever.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_codes_round_trip() {
        for datatype in [
            BinaryDatatype::U8,
            BinaryDatatype::I16,
            BinaryDatatype::U32,
            BinaryDatatype::I64,
            BinaryDatatype::F32,
            BinaryDatatype::F64,
        ] {
            assert_eq!(BinaryDatatype::from_code(datatype.code()), Some(datatype));
        }
        assert_eq!(BinaryDatatype::from_code('x'), None);
    }

    #[test]
    fn test_datatype_widths() {
        assert_eq!(BinaryDatatype::U8.width(), 1);
        assert_eq!(BinaryDatatype::I16.width(), 2);
        assert_eq!(BinaryDatatype::F32.width(), 4);
        assert_eq!(BinaryDatatype::F64.width(), 8);
    }

    #[test]
    fn test_default_format_is_f32_little_endian() {
        let format = BinaryFormat::default();
        assert_eq!(format.datatype, BinaryDatatype::F32);
        assert_eq!(format.byte_order, ByteOrder::Little);
    }
}
