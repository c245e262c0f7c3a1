pub mod aggregate;
pub mod baseline;
pub mod combination;
pub mod compare;
pub mod compressor;
pub mod config;
pub mod error;
pub mod gaussian_ply;
pub mod layout;
pub mod materialize;
pub mod npy;
pub mod scraper;
pub mod spherical_harmonics;
pub mod sweep;
pub mod table;
