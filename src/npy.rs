//! Reader for the pre-generated parameter arrays (`numpy.save` output).
//!
//! Only what parameter files use is supported: C-ordered, little-endian,
//! 1-D or 2-D arrays of `f8`, `f4`, `i8` or `i4`. Values are widened to `f64`.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::NpyError;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

#[derive(Debug, Clone, PartialEq)]
pub struct Array2 {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl Array2 {
    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }
}

#[derive(Debug, Clone, Copy)]
enum Dtype {
    F8,
    F4,
    I8,
    I4,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, NpyError> {
        match descr {
            "<f8" => Ok(Dtype::F8),
            "<f4" => Ok(Dtype::F4),
            "<i8" => Ok(Dtype::I8),
            "<i4" => Ok(Dtype::I4),
            other => Err(NpyError::UnsupportedDtype(other.to_string())),
        }
    }

    fn size(&self) -> usize {
        match self {
            Dtype::F8 | Dtype::I8 => 8,
            Dtype::F4 | Dtype::I4 => 4,
        }
    }

    fn decode(&self, bytes: &[u8]) -> f64 {
        match self {
            Dtype::F8 => f64::from_le_bytes(bytes.try_into().unwrap_or_default()),
            Dtype::F4 => f32::from_le_bytes(bytes.try_into().unwrap_or_default()) as f64,
            Dtype::I8 => i64::from_le_bytes(bytes.try_into().unwrap_or_default()) as f64,
            Dtype::I4 => i32::from_le_bytes(bytes.try_into().unwrap_or_default()) as f64,
        }
    }
}

/// Text following `'key':` in the header dict, up to the end of the header.
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let needle = format!("'{}':", key);
    let start = header
        .find(&needle)
        .ok_or_else(|| NpyError::BadHeader(format!("no `{}` key", key)))?;
    Ok(header[start + needle.len()..].trim_start())
}

fn parse_descr(header: &str) -> Result<Dtype, NpyError> {
    let value = dict_value(header, "descr")?;
    let quoted = value
        .strip_prefix('\'')
        .and_then(|v| v.split('\'').next())
        .ok_or_else(|| NpyError::BadHeader("descr is not a string".to_string()))?;
    Dtype::parse(quoted)
}

fn parse_shape(header: &str) -> Result<(usize, usize), NpyError> {
    let value = dict_value(header, "shape")?;
    let inner = value
        .strip_prefix('(')
        .and_then(|v| v.split(')').next())
        .ok_or_else(|| NpyError::BadHeader("shape is not a tuple".to_string()))?;
    let dims = inner
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.parse::<usize>()
                .map_err(|_| NpyError::BadHeader(format!("bad dimension `{}`", dim)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match dims.as_slice() {
        [cols] => Ok((1, *cols)),
        [rows, cols] => Ok((*rows, *cols)),
        _ => Err(NpyError::BadHeader(format!(
            "expected a 1-D or 2-D array, got shape {:?}",
            dims
        ))),
    }
}

pub fn read_npy<R: Read>(reader: &mut R) -> Result<Array2, NpyError> {
    let mut preamble = [0u8; 8];
    reader.read_exact(&mut preamble)?;
    if &preamble[..6] != MAGIC {
        return Err(NpyError::BadMagic);
    }
    let header_len = match (preamble[6], preamble[7]) {
        (1, _) => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        (2, _) | (3, _) => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        (major, minor) => return Err(NpyError::UnsupportedVersion(major, minor)),
    };

    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);

    let dtype = parse_descr(&header)?;
    if dict_value(&header, "fortran_order")?.starts_with("True") {
        return Err(NpyError::FortranOrder);
    }
    let (rows, cols) = parse_shape(&header)?;

    let expected = rows
        .checked_mul(cols)
        .and_then(|count| count.checked_mul(dtype.size()))
        .ok_or_else(|| NpyError::BadHeader(format!("shape ({}, {}) is too large", rows, cols)))?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.len() < expected {
        return Err(NpyError::Truncated {
            expected,
            found: bytes.len(),
        });
    }
    let data = bytes[..expected]
        .chunks_exact(dtype.size())
        .map(|chunk| dtype.decode(chunk))
        .collect();

    Ok(Array2 { rows, cols, data })
}

pub fn load_npy(path: &Path) -> Result<Array2, NpyError> {
    let file = File::open(path)?;
    read_npy(&mut BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npy_bytes(descr: &str, shape: &str, data: &[u8]) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
            descr, shape
        );
        // numpy pads the header with spaces so the data starts 64-byte aligned
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut bytes = MAGIC.to_vec();
        bytes.extend([1, 0]);
        bytes.extend((header.len() as u16).to_le_bytes());
        bytes.extend(header.as_bytes());
        bytes.extend(data);
        bytes
    }

    #[test]
    fn test_read_f8_matrix() {
        let values = [16.0f64, 1.0, 9.0, 7.0, 4.0, 1.0, 30.0, 3.0];
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = npy_bytes("<f8", "(2, 4)", &data);

        let array = read_npy(&mut bytes.as_slice()).unwrap();
        assert_eq!((array.rows, array.cols), (2, 4));
        assert_eq!(array.row(1), &[4.0, 1.0, 30.0, 3.0]);
        assert_eq!(array.iter_rows().count(), 2);
    }

    #[test]
    fn test_read_i8_vector() {
        let data: Vec<u8> = [3i64, -2, 5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = npy_bytes("<i8", "(3,)", &data);
        let array = read_npy(&mut bytes.as_slice()).unwrap();
        assert_eq!((array.rows, array.cols), (1, 3));
        assert_eq!(array.data, vec![3.0, -2.0, 5.0]);
    }

    #[test]
    fn test_rejects_bad_input() {
        let bytes = b"NOTNUMPY".to_vec();
        assert!(matches!(
            read_npy(&mut bytes.as_slice()),
            Err(NpyError::BadMagic)
        ));

        let bytes = npy_bytes(">f8", "(1, 1)", &[0; 8]);
        assert!(matches!(
            read_npy(&mut bytes.as_slice()),
            Err(NpyError::UnsupportedDtype(_))
        ));

        let bytes = npy_bytes("<f8", "(2, 2)", &[0; 8]);
        assert!(matches!(
            read_npy(&mut bytes.as_slice()),
            Err(NpyError::Truncated {
                expected: 32,
                found: 8
            })
        ));
    }

    #[test]
    fn test_rejects_oversized_shape() {
        let shape = format!("({}, 2)", usize::MAX / 2);
        let bytes = npy_bytes("<f8", &shape, &[]);
        assert!(matches!(
            read_npy(&mut bytes.as_slice()),
            Err(NpyError::BadHeader(_))
        ));
    }
}
