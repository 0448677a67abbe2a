//! On-disk codec for `.sma` artifacts.
//!
//! Layout: an 8-byte magic-plus-version tag, a little-endian `u32` header
//! length, a JSON header holding the scalar statistics, then the outlier
//! slice as an Arrow IPC file. Both the length prefix and the IPC framing
//! are self-delimiting, so a decoder never has to trust the file length.

use arrow::compute::concat_batches;
use arrow::error::ArrowError;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::io::{self, Cursor, Read, Write};

use super::Sma;

/// Magic tag; the trailing digit is the format version.
pub(crate) const MAGIC: &[u8; 8] = b"SMAQSMA1";

/// Upper bound on the JSON header, far above anything the codec produces.
const MAX_HEADER_LEN: u32 = 1 << 20;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    min: f64,
    max: f64,
    lower_threshold: f64,
    upper_threshold: f64,
    outlier_rows: usize,
}

pub(crate) fn encode<W: Write>(sma: &Sma, mut writer: W) -> io::Result<()> {
    let header = serde_json::to_vec(&Header {
        min: sma.min,
        max: sma.max,
        lower_threshold: sma.lower_threshold,
        upper_threshold: sma.upper_threshold,
        outlier_rows: sma.outliers.num_rows(),
    })?;

    writer.write_all(MAGIC)?;
    writer.write_all(&(header.len() as u32).to_le_bytes())?;
    writer.write_all(&header)?;

    let mut ipc = FileWriter::try_new(&mut writer, sma.outliers.schema().as_ref())
        .map_err(arrow_to_io)?;
    ipc.write(&sma.outliers).map_err(arrow_to_io)?;
    ipc.finish().map_err(arrow_to_io)?;
    Ok(())
}

pub(crate) fn decode<R: Read>(mut reader: R) -> io::Result<Sma> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(corrupt("unrecognised artifact magic"));
    }

    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len);
    if len > MAX_HEADER_LEN {
        return Err(corrupt("oversized artifact header"));
    }
    let mut header = vec![0u8; len as usize];
    reader.read_exact(&mut header)?;
    let header: Header = serde_json::from_slice(&header)?;

    let mut payload = Vec::new();
    reader.read_to_end(&mut payload)?;
    let ipc = FileReader::try_new(Cursor::new(payload), None).map_err(arrow_to_io)?;
    let schema = ipc.schema();
    let batches = ipc
        .collect::<Result<Vec<RecordBatch>, ArrowError>>()
        .map_err(arrow_to_io)?;
    let outliers = match batches.len() {
        0 => RecordBatch::new_empty(schema),
        1 => batches.into_iter().next().ok_or_else(|| corrupt("missing outlier batch"))?,
        _ => concat_batches(&schema, &batches).map_err(arrow_to_io)?,
    };
    if outliers.num_rows() != header.outlier_rows {
        return Err(corrupt("outlier row count does not match header"));
    }

    Ok(Sma {
        min: header.min,
        max: header.max,
        lower_threshold: header.lower_threshold,
        upper_threshold: header.upper_threshold,
        outliers,
    })
}

fn corrupt(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

fn arrow_to_io(err: ArrowError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
