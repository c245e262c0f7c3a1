use anyhow::Result;
use itertools::iproduct;
use serde::Deserialize;
use std::fmt;

/// Bit budget for the higher-order SH coefficients: either one value for all
/// bands, or one per band (`-qfr1/-qfr2/-qfr3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestBits {
    Uniform(u32),
    PerBand([u32; 3]),
}

impl fmt::Display for RestBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestBits::Uniform(bits) => write!(f, "{}", bits),
            RestBits::PerBand([a, b, c]) => write!(f, "{}-{}-{}", a, b, c),
        }
    }
}

/// One point of the sweep. Every field maps to one encoder flag.
///
/// Building the struct literally sets every field independently. Use
/// [`ParameterCombination::tied`] for the usual setup where the three feature
/// budgets and the two transform budgets move together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterCombination {
    pub qp: u32,
    pub qn: u32,
    pub qfd: u32,
    pub qfr: RestBits,
    pub qo: u32,
    pub qs: u32,
    pub qr: u32,
    pub cl: u32,
}

impl ParameterCombination {
    /// `qfd = qfr = qo = features` and `qs = qr = transforms`.
    pub fn tied(qp: u32, qn: u32, features: u32, transforms: u32, cl: u32) -> Self {
        Self {
            qp,
            qn,
            qfd: features,
            qfr: RestBits::Uniform(features),
            qo: features,
            qs: transforms,
            qr: transforms,
            cl,
        }
    }

    /// Reads one row of a pre-generated parameter array,
    /// `[qp, qn, qfd, qfr, qo, qs, qr, cl, qt, qg]`. Values are truncated
    /// toward zero. `qt` and `qg` are reserved and ignored.
    pub fn from_row(row: &[f64]) -> Result<Self> {
        if row.len() < 8 {
            return Err(anyhow::anyhow!(
                "parameter row has {} columns, expected at least 8",
                row.len()
            ));
        }
        let mut bits = [0u32; 8];
        for (slot, &value) in bits.iter_mut().zip(row) {
            if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
                return Err(anyhow::anyhow!("invalid parameter value {} in row {:?}", value, row));
            }
            *slot = value.trunc() as u32;
        }
        let [qp, qn, qfd, qfr, qo, qs, qr, cl] = bits;
        Ok(Self {
            qp,
            qn,
            qfd,
            qfr: RestBits::Uniform(qfr),
            qo,
            qs,
            qr,
            cl,
        })
    }

    /// Deterministic file-name fragment. Artifact and table lookups depend on
    /// this exact format.
    pub fn suffix(&self) -> String {
        format!(
            "qp{}_qn{}_qfd{}_qfr{}_qo{}_qs{}_qr{}_cl{}",
            self.qp, self.qn, self.qfd, self.qfr, self.qo, self.qs, self.qr, self.cl
        )
    }

    /// Quantization and level flags for the encoder, in the order it documents.
    pub fn encoder_args(&self) -> Vec<String> {
        let mut args = vec![
            "-qp".to_string(),
            self.qp.to_string(),
            "-qn".to_string(),
            self.qn.to_string(),
            "-qfd".to_string(),
            self.qfd.to_string(),
        ];
        match self.qfr {
            RestBits::Uniform(bits) => args.extend(["-qfr".to_string(), bits.to_string()]),
            RestBits::PerBand(bands) => {
                for (i, bits) in bands.iter().enumerate() {
                    args.push(format!("-qfr{}", i + 1));
                    args.push(bits.to_string());
                }
            }
        }
        for (flag, value) in [("-qo", self.qo), ("-qs", self.qs), ("-qr", self.qr), ("-cl", self.cl)] {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
        args
    }
}

/// Suffix for a generic-compressor run: every quantization field carries the
/// placeholder `token`, only the level is real.
pub fn baseline_suffix(token: &str, level: u32) -> String {
    format!(
        "qp{t}_qn{t}_qfd{t}_qfr{t}_qo{t}_qs{t}_qr{t}_cl{}",
        level,
        t = token
    )
}

/// Cartesian product of small value lists, with the feature and transform
/// budgets tied as in [`ParameterCombination::tied`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParameterGrid {
    pub qp: Vec<u32>,
    pub qn: Vec<u32>,
    /// Shared by `qfd`, `qfr` and `qo`.
    pub features: Vec<u32>,
    /// Shared by `qs` and `qr`.
    pub transforms: Vec<u32>,
    pub cl: Vec<u32>,
}

impl ParameterGrid {
    /// Combinations in nested-loop order, `cl` varying fastest.
    pub fn combinations(&self) -> Vec<ParameterCombination> {
        iproduct!(
            self.qp.iter().copied(),
            self.qn.iter().copied(),
            self.features.iter().copied(),
            self.transforms.iter().copied(),
            self.cl.iter().copied()
        )
        .map(|(qp, qn, features, transforms, cl)| {
            ParameterCombination::tied(qp, qn, features, transforms, cl)
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix() {
        let combination = ParameterCombination::tied(4, 1, 16, 16, 7);
        assert_eq!(
            combination.suffix(),
            "qp4_qn1_qfd16_qfr16_qo16_qs16_qr16_cl7"
        );
        assert_eq!(
            combination.suffix(),
            ParameterCombination::tied(4, 1, 16, 16, 7).suffix()
        );
    }

    #[test]
    fn test_independent_fields() {
        let combination = ParameterCombination {
            qp: 16,
            qn: 1,
            qfd: 9,
            qfr: RestBits::PerBand([4, 5, 7]),
            qo: 23,
            qs: 30,
            qr: 4,
            cl: 3,
        };
        assert_eq!(
            combination.suffix(),
            "qp16_qn1_qfd9_qfr4-5-7_qo23_qs30_qr4_cl3"
        );
        assert_eq!(
            combination.encoder_args().join(" "),
            "-qp 16 -qn 1 -qfd 9 -qfr1 4 -qfr2 5 -qfr3 7 -qo 23 -qs 30 -qr 4 -cl 3"
        );
        assert_ne!(combination, ParameterCombination::tied(16, 1, 9, 30, 3));
    }

    #[test]
    fn test_encoder_args() {
        let args = ParameterCombination::tied(16, 1, 16, 9, 7).encoder_args();
        assert_eq!(
            args.join(" "),
            "-qp 16 -qn 1 -qfd 16 -qfr 16 -qo 16 -qs 9 -qr 9 -cl 7"
        );
    }

    #[test]
    fn test_grid_order() {
        let grid = ParameterGrid {
            qp: vec![4, 16],
            qn: vec![1],
            features: vec![16],
            transforms: vec![4, 9],
            cl: vec![7],
        };
        let suffixes: Vec<String> = grid.combinations().iter().map(|c| c.suffix()).collect();
        assert_eq!(
            suffixes,
            vec![
                "qp4_qn1_qfd16_qfr16_qo16_qs4_qr4_cl7",
                "qp4_qn1_qfd16_qfr16_qo16_qs9_qr9_cl7",
                "qp16_qn1_qfd16_qfr16_qo16_qs4_qr4_cl7",
                "qp16_qn1_qfd16_qfr16_qo16_qs9_qr9_cl7",
            ]
        );
    }

    #[test]
    fn test_from_row() {
        let row = [16.0, 1.0, 9.9, 10.0, 11.0, 12.0, 13.0, 7.0, 0.0, 0.0];
        let combination = ParameterCombination::from_row(&row).unwrap();
        assert_eq!(combination.qfd, 9);
        assert_eq!(combination.qfr, RestBits::Uniform(10));
        assert_eq!(
            combination.suffix(),
            "qp16_qn1_qfd9_qfr10_qo11_qs12_qr13_cl7"
        );

        assert!(ParameterCombination::from_row(&row[..7]).is_err());
        assert!(ParameterCombination::from_row(&[-1.0; 10]).is_err());
    }

    #[test]
    fn test_baseline_suffix() {
        assert_eq!(
            baseline_suffix("x", 5),
            "qpx_qnx_qfdx_qfrx_qox_qsx_qrx_cl5"
        );
    }
}
