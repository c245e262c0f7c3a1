use thiserror::Error;

/// A PLY file that does not carry the Gaussian-Splatting vertex layout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("no `vertex` element in PLY header")]
    MissingVertexElement,

    #[error("missing property `{0}`")]
    MissingProperty(String),

    #[error("expected {expected} `{prefix}*` properties, found {found}")]
    PropertyCount {
        prefix: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("property `{0}` does not carry a valid index")]
    BadSuffix(String),

    #[error("spherical harmonics of degree {0}, the flat layout needs degree 3")]
    UnsupportedShDegree(usize),

    #[error("property `{0}` is a list, expected a scalar")]
    NotScalar(String),
}

/// A `.npy` parameter file that cannot be read as a 2-D numeric array.
#[derive(Debug, Error)]
pub enum NpyError {
    #[error("not a .npy file (bad magic)")]
    BadMagic,

    #[error("unsupported .npy version {0}.{1}")]
    UnsupportedVersion(u8, u8),

    #[error("malformed .npy header: {0}")]
    BadHeader(String),

    #[error("unsupported dtype `{0}`")]
    UnsupportedDtype(String),

    #[error("fortran-ordered arrays are not supported")]
    FortranOrder,

    #[error("expected {expected} bytes of array data, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
