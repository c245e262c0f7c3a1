pub const COLOR_CHANNELS: usize = 3;

/// Higher-order coefficients per colour channel for the degree-3 basis the
/// harness works with.
pub const REST_COEFFICIENTS: usize = SphericalHarmonicsOrder::Order3.coefficients_per_channel();

/// Higher-order coefficients of one Gaussian, indexed `[channel][coefficient]`.
pub type RestCoefficients = [[f32; REST_COEFFICIENTS]; COLOR_CHANNELS];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SphericalHarmonicsOrder {
    Order0, // 0 floats
    Order1, // 9 floats
    Order2, // 24 floats
    Order3, // 45 floats
}

impl SphericalHarmonicsOrder {
    pub const fn degree(&self) -> usize {
        match self {
            SphericalHarmonicsOrder::Order0 => 0,
            SphericalHarmonicsOrder::Order1 => 1,
            SphericalHarmonicsOrder::Order2 => 2,
            SphericalHarmonicsOrder::Order3 => 3,
        }
    }

    /// Recovers the order from the number of `f_rest_*` scalars in a file.
    pub fn order_for_rest_count(count: usize) -> Option<Self> {
        [
            SphericalHarmonicsOrder::Order0,
            SphericalHarmonicsOrder::Order1,
            SphericalHarmonicsOrder::Order2,
            SphericalHarmonicsOrder::Order3,
        ]
        .into_iter()
        .find(|order| order.rest_scalar_count() == count)
    }

    /// `(L+1)^2 - 1`: every basis function except DC.
    pub const fn coefficients_per_channel(&self) -> usize {
        let d = self.degree() + 1;
        d * d - 1
    }

    pub const fn rest_scalar_count(&self) -> usize {
        self.coefficients_per_channel() * COLOR_CHANNELS
    }
}

/// Packs channel-major scalars (`f_rest_{c*15+k}` order) into per-channel rows.
pub fn rest_from_scalars(scalars: &[f32]) -> Option<RestCoefficients> {
    if scalars.len() != REST_COEFFICIENTS * COLOR_CHANNELS {
        return None;
    }
    let mut rest = [[0.0; REST_COEFFICIENTS]; COLOR_CHANNELS];
    for (channel, chunk) in rest.iter_mut().zip(scalars.chunks_exact(REST_COEFFICIENTS)) {
        channel.copy_from_slice(chunk);
    }
    Some(rest)
}

/// Inverse of [`rest_from_scalars`].
pub fn rest_scalars(rest: &RestCoefficients) -> impl Iterator<Item = f32> + '_ {
    rest.iter().flat_map(|channel| channel.iter()).copied()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_orders() {
        assert_eq!(SphericalHarmonicsOrder::Order0.rest_scalar_count(), 0);
        assert_eq!(SphericalHarmonicsOrder::Order1.rest_scalar_count(), 9);
        assert_eq!(SphericalHarmonicsOrder::Order2.rest_scalar_count(), 24);
        assert_eq!(SphericalHarmonicsOrder::Order3.rest_scalar_count(), 45);
        assert_eq!(REST_COEFFICIENTS, 15);

        assert_eq!(
            SphericalHarmonicsOrder::order_for_rest_count(24),
            Some(SphericalHarmonicsOrder::Order2)
        );
        assert_eq!(SphericalHarmonicsOrder::order_for_rest_count(44), None);
        assert_eq!(
            SphericalHarmonicsOrder::order_for_rest_count(0).map(|order| order.degree()),
            Some(0)
        );
    }

    #[test]
    fn test_channel_major_packing() {
        let scalars: Vec<f32> = (0..45).map(|n| n as f32).collect();
        let rest = rest_from_scalars(&scalars).unwrap();
        assert_eq!(rest[0][0], 0.0);
        assert_eq!(rest[0][14], 14.0);
        assert_eq!(rest[1][0], 15.0);
        assert_eq!(rest[2][14], 44.0);
        assert_eq!(rest_scalars(&rest).collect::<Vec<_>>(), scalars);

        assert!(rest_from_scalars(&scalars[..44]).is_none());
    }
}
