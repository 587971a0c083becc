use thiserror::Error;

/// Why a piece of text is not an anatomical label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelErrorKind {
    /// The label does not consist of exactly three letters.
    Length(usize),
    /// A letter outside of {A,P,L,R,S,I}.
    UnknownLetter(char),
    /// Neither the letter nor its anatomical opposite occurs in the label.
    MissingAxis(char),
    /// The letter or its opposite occurs more than once.
    DuplicateAxis(char),
}

impl std::fmt::Display for LabelErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Length(len) => write!(f, "expected 3 letters, got {len}"),
            Self::UnknownLetter(c) => write!(f, "'{c}' is not one of A, P, L, R, S, I"),
            Self::MissingAxis(c) => write!(f, "neither '{c}' nor its opposite occurs"),
            Self::DuplicateAxis(c) => write!(f, "axis of '{c}' occurs more than once"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid anatomical label {label:?}: {kind}")]
pub struct LabelError {
    pub label: String,
    pub kind: LabelErrorKind,
}

impl LabelError {
    pub(crate) fn new(label: impl Into<String>, kind: LabelErrorKind) -> Self {
        Self {
            label: label.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidMatrixError {
    #[error("the matrix determinant {0} is neither -1 nor 1")]
    Determinant(f64),

    #[error("matrix element {value} at ({row}, {col}) is not in {{-1, 0, 1}}")]
    EntryOutOfDomain { row: usize, col: usize, value: f64 },

    #[error("the matrix does not hold exactly one non-zero element per row and column")]
    NotPermutation,

    #[error("the determinant's absolute value {0} of the rotational part is not close to one")]
    Rotation(f64),

    #[error("the last row contains non-zero values")]
    BottomRow,

    #[error("the bottom right value is not one, but {0}")]
    BottomRight(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VolumeError {
    #[error(transparent)]
    Label(#[from] LabelError),

    #[error(transparent)]
    InvalidMatrix(#[from] InvalidMatrixError),
}

pub type Result<T> = std::result::Result<T, VolumeError>;
