//! Emisión en formato Intel HEX.
//!
//! La imagen de bytecode se serializa como una secuencia de registros
//! de texto, uno por línea. Cada registro lleva su propia suma de
//! verificación, de forma que el dispositivo que carga la imagen puede
//! detectar corrupción línea por línea.

use std::{
    convert::TryFrom,
    fmt::{self, Display},
    str::FromStr,
};

use crate::codegen::{Chunk, Image};
use bitflags::bitflags;
use thiserror::Error;

use log::{debug, trace};

/// Máximo de bytes de datos por registro.
pub const RECORD_LIMIT: usize = 16;

bitflags! {
    /// Opciones a aplicar durante la serialización.
    pub struct HexOptions: u32 {
        /// Escribir la dirección de entrada como registro de tipo `03`
        /// (CS:IP, con CS = 0000) en vez del registro lineal de tipo `05`.
        const SEGMENT_START = 0x01;

        /// Omitir el registro de dirección de entrada.
        const NO_START = 0x02;
    }
}

impl Default for HexOptions {
    fn default() -> Self {
        HexOptions::empty()
    }
}

#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HexError {
    #[error("Record does not start with `:`")]
    MissingColon,

    #[error("Invalid hex digit in record")]
    BadDigit,

    #[error("Record is too short")]
    Truncated,

    #[error("Record declares {declared} data bytes, found {found}")]
    LengthMismatch { declared: usize, found: usize },

    #[error("Bad checksum, expected 0x{expected:02X}, found 0x{found:02X}")]
    BadChecksum { expected: u8, found: u8 },

    #[error("Unknown record type 0x{0:02X}")]
    UnknownType(u8),
}

/// Tipo de registro.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Data = 0x00,
    EndOfFile = 0x01,
    ExtendedSegmentAddress = 0x02,
    StartSegmentAddress = 0x03,
    ExtendedLinearAddress = 0x04,
    StartLinearAddress = 0x05,
}

impl TryFrom<u8> for RecordType {
    type Error = HexError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        use RecordType::*;

        let kind = match byte {
            0x00 => Data,
            0x01 => EndOfFile,
            0x02 => ExtendedSegmentAddress,
            0x03 => StartSegmentAddress,
            0x04 => ExtendedLinearAddress,
            0x05 => StartLinearAddress,
            _ => return Err(HexError::UnknownType(byte)),
        };

        Ok(kind)
    }
}

/// Un registro Intel HEX.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    kind: RecordType,
    address: u16,
    data: Vec<u8>,
}

impl Record {
    /// Registro de datos. `data` no debe exceder [`RECORD_LIMIT`].
    pub(crate) fn data(address: u16, data: &[u8]) -> Self {
        debug_assert!(data.len() <= RECORD_LIMIT);

        Record {
            kind: RecordType::Data,
            address,
            data: data.to_vec(),
        }
    }

    /// Registro de fin de archivo, siempre `:00000001FF`.
    pub fn end_of_file() -> Self {
        Record {
            kind: RecordType::EndOfFile,
            address: 0,
            data: Vec::new(),
        }
    }

    pub fn start_linear(entry: u16) -> Self {
        Record {
            kind: RecordType::StartLinearAddress,
            address: 0,
            data: u32::from(entry).to_be_bytes().to_vec(),
        }
    }

    pub fn start_segment(entry: u16) -> Self {
        let [high, low] = entry.to_be_bytes();

        Record {
            kind: RecordType::StartSegmentAddress,
            address: 0,
            data: vec![0x00, 0x00, high, low],
        }
    }

    pub fn kind(&self) -> RecordType {
        self.kind
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Complemento a dos de la suma de todos los bytes previos.
    pub fn checksum(&self) -> u8 {
        let [high, low] = self.address.to_be_bytes();
        let sum = [self.data.len() as u8, high, low, self.kind as u8]
            .iter()
            .chain(self.data.iter())
            .fold(0u8, |sum, &byte| sum.wrapping_add(byte));

        (!sum).wrapping_add(1)
    }
}

impl Display for Record {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            ":{:02X}{:04X}{:02X}",
            self.data.len(),
            self.address,
            self.kind as u8
        )?;

        for byte in &self.data {
            write!(fmt, "{:02X}", byte)?;
        }

        write!(fmt, "{:02X}", self.checksum())
    }
}

impl FromStr for Record {
    type Err = HexError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let digits = line.trim_end().strip_prefix(':').ok_or(HexError::MissingColon)?;
        if !digits.bytes().all(|digit| digit.is_ascii_hexdigit()) || digits.len() % 2 != 0 {
            return Err(HexError::BadDigit);
        }

        let bytes = (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| HexError::BadDigit))
            .collect::<Result<Vec<_>, _>>()?;

        if bytes.len() < 5 {
            return Err(HexError::Truncated);
        }

        let declared = bytes[0] as usize;
        let found = bytes.len() - 5;
        if declared != found {
            return Err(HexError::LengthMismatch { declared, found });
        }

        let record = Record {
            kind: RecordType::try_from(bytes[3])?,
            address: u16::from_be_bytes([bytes[1], bytes[2]]),
            data: bytes[4..4 + declared].to_vec(),
        };

        let found = bytes[4 + declared];
        let expected = record.checksum();
        if found != expected {
            return Err(HexError::BadChecksum { expected, found });
        }

        Ok(record)
    }
}

/// Serializa una imagen como registros.
///
/// Si la imagen declara una dirección de entrada, el registro de inicio
/// precede a los datos. El último registro es siempre el de fin de archivo.
pub fn records(image: &Image, options: HexOptions) -> Vec<Record> {
    let mut records = Vec::new();

    match image.entry() {
        Some(_) if options.contains(HexOptions::NO_START) => (),
        Some(entry) if options.contains(HexOptions::SEGMENT_START) => {
            records.push(Record::start_segment(entry))
        }

        Some(entry) => records.push(Record::start_linear(entry)),
        None => (),
    }

    for chunk in image.chunks() {
        // Un bloque vacío se conserva como registro sin datos
        if chunk.bytes.is_empty() {
            records.push(Record::data(chunk.address, &[]));
            continue;
        }

        let mut address = chunk.address;
        for data in chunk.bytes.chunks(RECORD_LIMIT) {
            records.push(Record::data(address, data));
            address = address.wrapping_add(data.len() as u16);
        }
    }

    records.push(Record::end_of_file());

    for record in &records {
        trace!("{:?} record at 0x{:04X}: {}", record.kind, record.address, record);
    }

    debug!("Encoded {} records", records.len());
    records
}

/// Serializa una imagen como líneas de texto.
pub fn encode(image: &Image, options: HexOptions) -> Vec<String> {
    records(image, options)
        .iter()
        .map(Record::to_string)
        .collect()
}

/// Reconstruye los fragmentos de datos a partir de registros.
///
/// Registros de datos contiguos se unen en un mismo fragmento. Un
/// registro sin datos es siempre un fragmento vacío propio.
pub fn chunks(records: &[Record]) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();

    for record in records.iter().filter(|record| record.kind == RecordType::Data) {
        match chunks.last_mut() {
            Some(last)
                if !last.bytes.is_empty()
                    && !record.data.is_empty()
                    && last.end() == record.address as usize =>
            {
                last.bytes.extend_from_slice(&record.data)
            }

            _ => chunks.push(Chunk {
                address: record.address,
                bytes: record.data.clone(),
            }),
        }
    }

    chunks
}
