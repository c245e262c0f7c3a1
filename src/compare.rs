//! Inspection of reconstructed point clouds against their originals.

use anyhow::Result;
use ply_rs::parser;
use ply_rs::ply::{DefaultElement, Encoding};
use ply_rs::writer::Writer;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::FormatError;
use crate::gaussian_ply::scalar_value;

/// Scalar columns of the `vertex` element, in header order.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexColumns {
    pub names: Vec<String>,
    pub values: Vec<Vec<f32>>,
}

impl VertexColumns {
    pub fn vertex_count(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    fn column(&self, name: &str) -> Option<&[f32]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i].as_slice())
    }
}

pub fn read_vertex_columns(path: &Path) -> Result<VertexColumns> {
    let mut stream = BufReader::new(File::open(path)?);
    let ply = parser::Parser::<DefaultElement>::new().read_ply(&mut stream)?;
    let element = ply
        .header
        .elements
        .get("vertex")
        .ok_or(FormatError::MissingVertexElement)?;
    let names: Vec<String> = element.properties.keys().cloned().collect();
    let mut values = vec![Vec::with_capacity(element.count); names.len()];
    if let Some(vertices) = ply.payload.get("vertex") {
        for vertex in vertices {
            for (column, name) in values.iter_mut().zip(&names) {
                let value = vertex
                    .get(name)
                    .ok_or_else(|| FormatError::MissingProperty(name.clone()))?;
                column.push(scalar_value(value).ok_or_else(|| FormatError::NotScalar(name.clone()))?);
            }
        }
    }
    Ok(VertexColumns { names, values })
}

/// Error statistics of one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDiff {
    pub property: String,
    /// Mean of `|original - reconstructed|`, NaN counted as zero.
    pub mean_abs_error: f64,
    pub max_abs_error: f64,
    /// Values that differ at all; a NaN on both sides counts as equal.
    pub differing: usize,
    pub original_nan: usize,
    pub original_inf: usize,
    pub reconstructed_nan: usize,
    pub reconstructed_inf: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloudDiff {
    pub vertex_count: usize,
    /// Properties present in both clouds, in the original's order.
    pub properties: Vec<PropertyDiff>,
    /// Properties present in only one of the two clouds.
    pub unmatched: Vec<String>,
}

fn zero_nan(v: f32) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v as f64
    }
}

fn property_diff(name: &str, original: &[f32], reconstructed: &[f32]) -> PropertyDiff {
    let mut sum = 0.0;
    let mut max: f64 = 0.0;
    let mut differing = 0;
    for (&a, &b) in original.iter().zip(reconstructed) {
        let error = (zero_nan(a) - zero_nan(b)).abs();
        sum += error;
        max = max.max(error);
        if a != b && !(a.is_nan() && b.is_nan()) {
            differing += 1;
        }
    }
    let count = |values: &[f32], pred: fn(&f32) -> bool| values.iter().filter(|v| pred(v)).count();
    PropertyDiff {
        property: name.to_string(),
        mean_abs_error: if original.is_empty() {
            0.0
        } else {
            sum / original.len() as f64
        },
        max_abs_error: max,
        differing,
        original_nan: count(original, |v| v.is_nan()),
        original_inf: count(original, |v| v.is_infinite()),
        reconstructed_nan: count(reconstructed, |v| v.is_nan()),
        reconstructed_inf: count(reconstructed, |v| v.is_infinite()),
    }
}

/// Pairs properties by name. Both clouds must hold the same number of
/// vertices in the same order.
pub fn diff_clouds(original: &VertexColumns, reconstructed: &VertexColumns) -> Result<CloudDiff> {
    if original.vertex_count() != reconstructed.vertex_count() {
        return Err(anyhow::anyhow!(
            "vertex counts differ: {} vs {}",
            original.vertex_count(),
            reconstructed.vertex_count()
        ));
    }
    let mut properties = Vec::new();
    let mut unmatched = Vec::new();
    for (name, values) in original.names.iter().zip(&original.values) {
        match reconstructed.column(name) {
            Some(other) => properties.push(property_diff(name, values, other)),
            None => unmatched.push(name.clone()),
        }
    }
    unmatched.extend(
        reconstructed
            .names
            .iter()
            .filter(|name| original.column(name).is_none())
            .cloned(),
    );
    Ok(CloudDiff {
        vertex_count: original.vertex_count(),
        properties,
        unmatched,
    })
}

/// Rewrites any PLY file with a different encoding, keeping every element.
pub fn reencode_ply(input: &Path, output: &Path, ascii: bool) -> Result<()> {
    let mut stream = BufReader::new(File::open(input)?);
    let mut ply = parser::Parser::<DefaultElement>::new().read_ply(&mut stream)?;
    ply.header.encoding = if ascii {
        Encoding::Ascii
    } else {
        Encoding::BinaryLittleEndian
    };
    let mut out = BufWriter::new(File::create(output)?);
    Writer::new().write_ply(&mut out, &mut ply)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn columns(names: &[&str], values: Vec<Vec<f32>>) -> VertexColumns {
        VertexColumns {
            names: names.iter().map(|n| n.to_string()).collect(),
            values,
        }
    }

    #[test]
    fn test_diff_by_name() {
        let original = columns(
            &["x", "y", "nx"],
            vec![vec![1.0, 2.0, 3.0], vec![0.0, f32::NAN, 1.0], vec![0.0; 3]],
        );
        let reconstructed = columns(
            &["y", "x", "my_nx"],
            vec![vec![0.5, f32::NAN, f32::INFINITY], vec![1.0, 2.5, 3.0], vec![0.0; 3]],
        );
        let diff = diff_clouds(&original, &reconstructed).unwrap();
        assert_eq!(diff.vertex_count, 3);
        assert_eq!(diff.unmatched, vec!["nx".to_string(), "my_nx".to_string()]);

        let x = &diff.properties[0];
        assert_eq!(x.property, "x");
        assert_relative_eq!(x.mean_abs_error, 0.5 / 3.0);
        assert_eq!(x.differing, 1);

        let y = &diff.properties[1];
        assert_eq!(y.differing, 2);
        assert_eq!(y.original_nan, 1);
        assert_eq!(y.reconstructed_nan, 1);
        assert_eq!(y.reconstructed_inf, 1);
        assert!(y.max_abs_error.is_infinite());
    }

    #[test]
    fn test_vertex_count_mismatch() {
        let a = columns(&["x"], vec![vec![1.0]]);
        let b = columns(&["x"], vec![vec![1.0, 2.0]]);
        assert!(diff_clouds(&a, &b).is_err());
    }

    #[test]
    fn test_reencode_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let ascii = dir.path().join("in.ply");
        std::fs::write(
            &ascii,
            "ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty uchar red\nend_header\n1.5 200\n-2 7\n",
        )
        .unwrap();
        let binary = dir.path().join("out.ply");
        reencode_ply(&ascii, &binary, false).unwrap();

        let bytes = std::fs::read(&binary).unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("binary_little_endian"));

        let a = read_vertex_columns(&ascii).unwrap();
        let b = read_vertex_columns(&binary).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.values[1], vec![200.0, 7.0]);
        let diff = diff_clouds(&a, &b).unwrap();
        assert!(diff.properties.iter().all(|p| p.differing == 0));
    }
}
