use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;

use crate::combination::ParameterCombination;

/// A quantization column: real bits, or a placeholder token (`x` for gzip,
/// `y` for bzip2, or a per-band `4-5-7`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bits(u32),
    Token(String),
}

impl From<u32> for ParamValue {
    fn from(bits: u32) -> Self {
        ParamValue::Bits(bits)
    }
}

impl From<&str> for ParamValue {
    fn from(token: &str) -> Self {
        ParamValue::Token(token.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bits(bits) => write!(f, "{}", bits),
            ParamValue::Token(token) => f.write_str(token),
        }
    }
}

/// Outcome of one repetition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    #[default]
    Ok,
    /// At least one step was skipped because its artifact already existed;
    /// metrics come from an earlier run's logs.
    Reused,
    EncodeFailed,
    DecodeFailed,
}

/// The quantization columns shared by every table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamColumns {
    pub qp: ParamValue,
    pub qn: ParamValue,
    pub qfd: ParamValue,
    pub qfr: ParamValue,
    pub qo: ParamValue,
    pub qs: ParamValue,
    pub qr: ParamValue,
    pub cl: ParamValue,
}

impl From<&ParameterCombination> for ParamColumns {
    fn from(combination: &ParameterCombination) -> Self {
        let qfr = combination.qfr.to_string();
        Self {
            qp: combination.qp.into(),
            qn: combination.qn.into(),
            qfd: combination.qfd.into(),
            qfr: qfr
                .parse::<u32>()
                .map(ParamValue::Bits)
                .unwrap_or(ParamValue::Token(qfr)),
            qo: combination.qo.into(),
            qs: combination.qs.into(),
            qr: combination.qr.into(),
            cl: combination.cl.into(),
        }
    }
}

impl ParamColumns {
    /// Every quantization column set to `token`; used by generic compressors.
    pub fn placeholder(token: &str, level: u32) -> Self {
        Self {
            qp: token.into(),
            qn: token.into(),
            qfd: token.into(),
            qfr: token.into(),
            qo: token.into(),
            qs: token.into(),
            qr: token.into(),
            cl: level.into(),
        }
    }
}

/// Millisecond and byte columns. Float text such as `123.4` or `1234.0`,
/// as older tables carry it, is rounded to the nearest integer.
fn deserialize_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(value) if value.is_finite() && value >= 0.0 => Ok(Some(value.round() as u64)),
        Some(value) => Err(serde::de::Error::custom(format!(
            "expected a non-negative count, found {}",
            value
        ))),
    }
}

/// One row of a per-combination table. Times are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRow {
    pub i: usize,
    pub qp_value: ParamValue,
    pub qn_value: ParamValue,
    pub qfd_value: ParamValue,
    pub qfr_value: ParamValue,
    pub qo_value: ParamValue,
    pub qs_value: ParamValue,
    pub qr_value: ParamValue,
    pub cl_value: ParamValue,
    #[serde(deserialize_with = "deserialize_count")]
    pub encode_time: Option<u64>,
    #[serde(deserialize_with = "deserialize_count")]
    pub encode_size: Option<u64>,
    #[serde(deserialize_with = "deserialize_count")]
    pub decode_time: Option<u64>,
    pub suffix: String,
    #[serde(default)]
    pub status: RowStatus,
}

impl MetricRow {
    pub fn new(i: usize, params: ParamColumns, suffix: String) -> Self {
        Self {
            i,
            qp_value: params.qp,
            qn_value: params.qn,
            qfd_value: params.qfd,
            qfr_value: params.qfr,
            qo_value: params.qo,
            qs_value: params.qs,
            qr_value: params.qr,
            cl_value: params.cl,
            encode_time: None,
            encode_size: None,
            decode_time: None,
            suffix,
            status: RowStatus::Ok,
        }
    }
}

/// A metric row tagged with its compressor family and scene constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRow {
    pub i: usize,
    pub qp_value: ParamValue,
    pub qn_value: ParamValue,
    pub qfd_value: ParamValue,
    pub qfr_value: ParamValue,
    pub qo_value: ParamValue,
    pub qs_value: ParamValue,
    pub qr_value: ParamValue,
    pub cl_value: ParamValue,
    #[serde(deserialize_with = "deserialize_count")]
    pub encode_time: Option<u64>,
    #[serde(deserialize_with = "deserialize_count")]
    pub encode_size: Option<u64>,
    #[serde(deserialize_with = "deserialize_count")]
    pub decode_time: Option<u64>,
    pub suffix: String,
    pub status: RowStatus,
    pub alg: String,
    pub scene_name: String,
    pub original_size: u64,
    #[serde(rename = "numOf3DGS")]
    pub num_of_3dgs: usize,
}

/// Constants broadcast onto every merged row of a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneInfo {
    pub name: String,
    pub original_size: u64,
    pub point_count: usize,
}

impl MergedRow {
    pub fn new(row: MetricRow, alg: &str, scene: &SceneInfo) -> Self {
        Self {
            i: row.i,
            qp_value: row.qp_value,
            qn_value: row.qn_value,
            qfd_value: row.qfd_value,
            qfr_value: row.qfr_value,
            qo_value: row.qo_value,
            qs_value: row.qs_value,
            qr_value: row.qr_value,
            cl_value: row.cl_value,
            encode_time: row.encode_time,
            encode_size: row.encode_size,
            decode_time: row.decode_time,
            suffix: row.suffix,
            status: row.status,
            alg: alg.to_string(),
            scene_name: scene.name.clone(),
            original_size: scene.original_size,
            num_of_3dgs: scene.point_count,
        }
    }
}

/// Writes `rows` with a header line, replacing any existing file.
pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating table {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_table<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening table {}", path.display()))?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: T = result.with_context(|| format!("reading table {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::{baseline_suffix, RestBits};

    #[test]
    fn test_write_and_read_metric_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let combination = ParameterCombination::tied(16, 1, 16, 16, 7);
        let mut row = MetricRow::new(0, (&combination).into(), combination.suffix());
        row.encode_time = Some(120);
        row.encode_size = Some(99_000);
        let mut missing = MetricRow::new(1, (&combination).into(), combination.suffix());
        missing.status = RowStatus::EncodeFailed;

        write_table(&path, &[row.clone(), missing.clone()]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "i,qp_value,qn_value,qfd_value,qfr_value,qo_value,qs_value,qr_value,cl_value,\
             encode_time,encode_size,decode_time,suffix,status"
        );
        assert_eq!(
            lines.next().unwrap(),
            "0,16,1,16,16,16,16,16,7,120,99000,,qp16_qn1_qfd16_qfr16_qo16_qs16_qr16_cl7,ok"
        );

        let rows: Vec<MetricRow> = read_table(&path).unwrap();
        assert_eq!(rows, vec![row, missing]);
    }

    #[test]
    fn test_read_table_without_status_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(
            &path,
            "i,qp_value,qn_value,qfd_value,qfr_value,qo_value,qs_value,qr_value,cl_value,\
             encode_time,encode_size,decode_time,suffix\n\
             0,x,x,x,x,x,x,x,5,31,2048,12,qpx_qnx_qfdx_qfrx_qox_qsx_qrx_cl5\n",
        )
        .unwrap();
        let rows: Vec<MetricRow> = read_table(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].qp_value, ParamValue::from("x"));
        assert_eq!(rows[0].cl_value, ParamValue::Bits(5));
        assert_eq!(rows[0].status, RowStatus::Ok);
        assert_eq!(rows[0].suffix, baseline_suffix("x", 5));
    }

    #[test]
    fn test_per_band_column() {
        let combination = ParameterCombination {
            qfr: RestBits::PerBand([4, 5, 7]),
            ..ParameterCombination::tied(16, 1, 16, 16, 7)
        };
        let columns = ParamColumns::from(&combination);
        assert_eq!(columns.qfr, ParamValue::from("4-5-7"));
        assert_eq!(columns.qfd, ParamValue::Bits(16));
    }

    #[test]
    fn test_read_float_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(
            &path,
            "i,qp_value,qn_value,qfd_value,qfr_value,qo_value,qs_value,qr_value,cl_value,\
             encode_time,encode_size,decode_time,suffix\n\
             0,16,1,16,16,16,16,16,7,123.4,2048.0,,qp16_qn1_qfd16_qfr16_qo16_qs16_qr16_cl7\n\
             1,16,1,16,16,16,16,16,7,99.6,2050.0,7.0,qp16_qn1_qfd16_qfr16_qo16_qs16_qr16_cl7\n",
        )
        .unwrap();
        let rows: Vec<MetricRow> = read_table(&path).unwrap();
        assert_eq!(rows[0].encode_time, Some(123));
        assert_eq!(rows[0].encode_size, Some(2048));
        assert_eq!(rows[0].decode_time, None);
        assert_eq!(rows[1].encode_time, Some(100));
        assert_eq!(rows[1].decode_time, Some(7));

        std::fs::write(
            &path,
            "i,qp_value,qn_value,qfd_value,qfr_value,qo_value,qs_value,qr_value,cl_value,\
             encode_time,encode_size,decode_time,suffix\n\
             0,16,1,16,16,16,16,16,7,-5,1,1,qp16_qn1_qfd16_qfr16_qo16_qs16_qr16_cl7\n",
        )
        .unwrap();
        assert!(read_table::<MetricRow>(&path).is_err());
    }
}
