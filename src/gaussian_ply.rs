use anyhow::Result;
use ply_rs::parser;
use ply_rs::ply;
use ply_rs::ply::{
    Addable, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType, ScalarType,
};
use ply_rs::writer::Writer;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use vek::{Vec3, Vec4};

use crate::error::FormatError;
use crate::spherical_harmonics::{
    rest_from_scalars, rest_scalars, RestCoefficients, SphericalHarmonicsOrder, COLOR_CHANNELS,
};

const SCALE_COUNT: usize = 3;
const ROTATION_COUNT: usize = 4;
const REST_SCALARS: usize = SphericalHarmonicsOrder::Order3.rest_scalar_count();

// Column offsets of the flat compressor layout.
const NORMAL_COLUMN: usize = 3;
const DC_COLUMN: usize = NORMAL_COLUMN + 3;
const REST_COLUMN: usize = DC_COLUMN + COLOR_CHANNELS;
const OPACITY_COLUMN: usize = REST_COLUMN + REST_SCALARS;
const SCALE_COLUMN: usize = OPACITY_COLUMN + 1;
const ROTATION_COLUMN: usize = SCALE_COLUMN + SCALE_COUNT;

/// Number of float properties per vertex in the flat compressor layout.
pub const DRACO_PROPERTY_COUNT: usize = ROTATION_COLUMN + ROTATION_COUNT;

/// `(prefix, first column, count)` of every numbered property family.
const SUFFIXED: [(&str, usize, usize); 4] = [
    ("f_dc_", DC_COLUMN, COLOR_CHANNELS),
    ("f_rest_", REST_COLUMN, REST_SCALARS),
    ("scale_", SCALE_COLUMN, SCALE_COUNT),
    ("rot_", ROTATION_COLUMN, ROTATION_COUNT),
];

/// Per-vertex attributes of a trained Gaussian-Splatting scene, one array per
/// attribute class. All arrays have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussianAttributes {
    pub positions: Vec<Vec3<f32>>,
    /// DC term per colour channel (`f_dc_0..2`).
    pub features_dc: Vec<Vec3<f32>>,
    pub features_rest: Vec<RestCoefficients>,
    /// Opacity before the sigmoid activation, as the trainer stores it.
    pub opacities: Vec<f32>,
    /// Log-space scales.
    pub scales: Vec<Vec3<f32>>,
    /// `rot_0..rot_3` in file order.
    pub rotations: Vec<Vec4<f32>>,
}

impl GaussianAttributes {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            features_dc: Vec::with_capacity(capacity),
            features_rest: Vec::with_capacity(capacity),
            opacities: Vec::with_capacity(capacity),
            scales: Vec::with_capacity(capacity),
            rotations: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn check_lengths(&self) -> Result<()> {
        let n = self.positions.len();
        let lengths = [
            self.features_dc.len(),
            self.features_rest.len(),
            self.opacities.len(),
            self.scales.len(),
            self.rotations.len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            return Err(anyhow::anyhow!(
                "attribute arrays differ in length: positions {} vs {:?}",
                n,
                lengths
            ));
        }
        Ok(())
    }
}

/// Property names of the flat layout, in the order they are written.
pub fn draco_property_names() -> Vec<String> {
    let mut names: Vec<String> = ["x", "y", "z", "nx", "ny", "nz"]
        .iter()
        .map(|name| name.to_string())
        .collect();
    names.extend((0..COLOR_CHANNELS).map(|i| format!("f_dc_{}", i)));
    names.extend((0..REST_SCALARS).map(|i| format!("f_rest_{}", i)));
    names.push("opacity".to_string());
    names.extend((0..SCALE_COUNT).map(|i| format!("scale_{}", i)));
    names.extend((0..ROTATION_COUNT).map(|i| format!("rot_{}", i)));
    names
}

/// Column of a property in the flat layout. Numbered families are placed by
/// their trailing integer, so the order properties appear in never matters.
fn column(name: &str) -> Option<usize> {
    match name {
        "x" => Some(0),
        "y" => Some(1),
        "z" => Some(2),
        "nx" => Some(NORMAL_COLUMN),
        "ny" => Some(NORMAL_COLUMN + 1),
        "nz" => Some(NORMAL_COLUMN + 2),
        "opacity" => Some(OPACITY_COLUMN),
        _ => SUFFIXED.iter().find_map(|&(prefix, first, count)| {
            let index: usize = name.strip_prefix(prefix)?.parse().ok()?;
            (index < count).then_some(first + index)
        }),
    }
}

/// Widens or narrows any numeric scalar to `f32`. Lists yield `None`.
pub(crate) fn scalar_value(property: &Property) -> Option<f32> {
    match property {
        Property::Char(v) => Some(*v as f32),
        Property::UChar(v) => Some(*v as f32),
        Property::Short(v) => Some(*v as f32),
        Property::UShort(v) => Some(*v as f32),
        Property::Int(v) => Some(*v as f32),
        Property::UInt(v) => Some(*v as f32),
        Property::Float(v) => Some(*v),
        Property::Double(v) => Some(*v as f32),
        _ => None,
    }
}

/// One vertex, stored in flat-layout column order.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VertexRecord([f32; DRACO_PROPERTY_COUNT]);

impl ply::PropertyAccess for VertexRecord {
    fn new() -> Self {
        Self([0.0; DRACO_PROPERTY_COUNT])
    }

    fn set_property(&mut self, property_name: String, property: Property) {
        // Properties without a column, and lists, are dropped.
        if let (Some(index), Some(value)) = (column(&property_name), scalar_value(&property)) {
            self.0[index] = value;
        }
    }

    fn get_float(&self, property_name: &String) -> Option<f32> {
        column(property_name).map(|index| self.0[index])
    }
}

fn fill(slots: &mut [f32], values: impl IntoIterator<Item = f32>) {
    for (slot, value) in slots.iter_mut().zip(values) {
        *slot = value;
    }
}

fn vec3(values: &[f32]) -> Vec3<f32> {
    Vec3::new(values[0], values[1], values[2])
}

impl VertexRecord {
    /// Normals stay zero.
    fn from_attributes(attributes: &GaussianAttributes, index: usize) -> Self {
        let mut values = [0.0; DRACO_PROPERTY_COUNT];
        fill(&mut values[..NORMAL_COLUMN], attributes.positions[index].iter().copied());
        fill(
            &mut values[DC_COLUMN..REST_COLUMN],
            attributes.features_dc[index].iter().copied(),
        );
        fill(
            &mut values[REST_COLUMN..OPACITY_COLUMN],
            rest_scalars(&attributes.features_rest[index]),
        );
        values[OPACITY_COLUMN] = attributes.opacities[index];
        fill(
            &mut values[SCALE_COLUMN..ROTATION_COLUMN],
            attributes.scales[index].iter().copied(),
        );
        fill(
            &mut values[ROTATION_COLUMN..],
            attributes.rotations[index].iter().copied(),
        );
        Self(values)
    }

    fn append_to(&self, attributes: &mut GaussianAttributes) -> Result<(), FormatError> {
        let v = &self.0;
        attributes.positions.push(vec3(v));
        attributes.features_dc.push(vec3(&v[DC_COLUMN..]));
        let rest = &v[REST_COLUMN..OPACITY_COLUMN];
        attributes
            .features_rest
            .push(rest_from_scalars(rest).ok_or(FormatError::PropertyCount {
                prefix: "f_rest_",
                expected: REST_SCALARS,
                found: rest.len(),
            })?);
        attributes.opacities.push(v[OPACITY_COLUMN]);
        attributes.scales.push(vec3(&v[SCALE_COLUMN..]));
        let r = &v[ROTATION_COLUMN..];
        attributes.rotations.push(Vec4::new(r[0], r[1], r[2], r[3]));
        Ok(())
    }
}

fn require_scalar(property: &PropertyDef) -> Result<(), FormatError> {
    match property.data_type {
        PropertyType::Scalar(_) => Ok(()),
        PropertyType::List(_, _) => Err(FormatError::NotScalar(property.name.clone())),
    }
}

/// Checks the header before any payload is read: every numbered family must
/// carry exactly the indices `0..count`, each a scalar.
fn validate_vertex_element(element: &ElementDef) -> Result<(), FormatError> {
    for required in ["x", "y", "z", "opacity"] {
        let property = element
            .properties
            .get(required)
            .ok_or_else(|| FormatError::MissingProperty(required.to_string()))?;
        require_scalar(property)?;
    }

    for (prefix, _, expected) in SUFFIXED {
        let mut indexed = Vec::new();
        for property in element.properties.values() {
            if let Some(suffix) = property.name.strip_prefix(prefix) {
                let index: usize = suffix
                    .parse()
                    .map_err(|_| FormatError::BadSuffix(property.name.clone()))?;
                require_scalar(property)?;
                indexed.push((index, &property.name));
            }
        }
        if indexed.len() != expected {
            if prefix == "f_rest_" {
                if let Some(order) = SphericalHarmonicsOrder::order_for_rest_count(indexed.len()) {
                    return Err(FormatError::UnsupportedShDegree(order.degree()));
                }
            }
            return Err(FormatError::PropertyCount {
                prefix,
                expected,
                found: indexed.len(),
            });
        }
        indexed.sort_by_key(|(index, _)| *index);
        let out_of_range = indexed.iter().find(|(index, _)| *index >= expected);
        let duplicate = indexed
            .windows(2)
            .find(|pair| pair[0].0 == pair[1].0)
            .map(|pair| &pair[1]);
        if let Some((_, name)) = out_of_range.or(duplicate) {
            return Err(FormatError::BadSuffix(name.to_string()));
        }
    }
    Ok(())
}

pub fn load_gaussian_ply_stream<T: BufRead>(stream: &mut T) -> Result<GaussianAttributes> {
    let vertex_parser = parser::Parser::<VertexRecord>::new();
    let header = vertex_parser.read_header(stream)?;

    let mut attributes = None;
    for (_ignore_key, element) in &header.elements {
        let is_vertex = element.name == "vertex";
        if is_vertex {
            validate_vertex_element(element)?;
        }
        // Payloads are laid out in header order, so earlier elements must be
        // consumed even when they are not needed.
        let records = vertex_parser.read_payload_for_element(stream, element, &header)?;
        if !is_vertex {
            continue;
        }
        let mut parsed = GaussianAttributes::with_capacity(records.len());
        for record in &records {
            record.append_to(&mut parsed)?;
        }
        attributes = Some(parsed);
    }

    Ok(attributes.ok_or(FormatError::MissingVertexElement)?)
}

/// Writes the flat layout the compressor consumes. Normals are always zero.
pub fn write_draco_ply_stream<W: Write>(
    attributes: &GaussianAttributes,
    stream: &mut W,
    ascii: bool,
) -> Result<()> {
    attributes.check_lengths()?;

    let mut ply = Ply::<VertexRecord>::new();
    ply.header.encoding = if ascii {
        Encoding::Ascii
    } else {
        Encoding::BinaryLittleEndian
    };

    let mut element = ElementDef::new("vertex".to_string());
    for name in draco_property_names() {
        element
            .properties
            .add(PropertyDef::new(name, PropertyType::Scalar(ScalarType::Float)));
    }
    ply.header.elements.add(element);

    let records = (0..attributes.len())
        .map(|i| VertexRecord::from_attributes(attributes, i))
        .collect();
    ply.payload.insert("vertex".to_string(), records);

    let w = Writer::new();
    w.write_ply(stream, &mut ply)?;
    Ok(())
}

pub fn load_gaussian_ply(path: &Path) -> Result<GaussianAttributes> {
    let file = File::open(path)?;
    let mut stream = BufReader::new(file);
    load_gaussian_ply_stream(&mut stream)
}

pub fn write_draco_ply(attributes: &GaussianAttributes, path: &Path, ascii: bool) -> Result<()> {
    let file = File::create(path)?;
    let mut stream = BufWriter::new(file);
    write_draco_ply_stream(attributes, &mut stream, ascii)?;
    stream.flush()?;
    Ok(())
}
