use derive_more::{Display, From};

pub type Result<T> = core::result::Result<T, FlyGraphError>;

#[derive(Debug, Display, From, Clone, PartialEq)]
#[display("{self:?}")]
pub enum FlyGraphError {
    /// Cell size must be finite and strictly positive.
    #[from(ignore)]
    InvalidCellSize(f32),
    /// Scale must be finite and non-zero.
    #[from(ignore)]
    InvalidScale(f32),
    /// Grid step must be finite and strictly positive.
    #[from(ignore)]
    InvalidGridStep(f32),
    /// `cell_size / grid_step` exceeds [`MAX_SAMPLES_PER_AXIS`](crate::style::MAX_SAMPLES_PER_AXIS).
    #[from(ignore)]
    TooManySamples(usize),
    #[from(ignore)]
    InvalidColor(String),
    /// The surface function panicked while a chunk was sampled.
    #[from(ignore)]
    FunctionPanicked(String),
    /// Options could not be merged or deserialized.
    InvalidOptions(String),
    UnknownFunction(crate::graph::FunctionId),
}

impl std::error::Error for FlyGraphError {}

impl From<toml::de::Error> for FlyGraphError {
    fn from(err: toml::de::Error) -> Self {
        FlyGraphError::InvalidOptions(err.message().to_string())
    }
}

impl From<toml::ser::Error> for FlyGraphError {
    fn from(err: toml::ser::Error) -> Self {
        FlyGraphError::InvalidOptions(err.to_string())
    }
}
