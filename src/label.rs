//! Three-letter anatomical coordinate system labels ("RAS", "LPS", ...).
//!
//! Each letter names the anatomical direction in which the corresponding world
//! axis increases. Every label holds exactly one letter of each of the pairs
//! {R,L}, {A,P} and {S,I}.

use std::fmt;
use std::str::FromStr;

use crate::error::{LabelError, LabelErrorKind};

/// An anatomical direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Right,
    Left,
    Anterior,
    Posterior,
    Superior,
    Inferior,
}

impl Direction {
    /// Canonical positive directions, in canonical axis order.
    pub const POSITIVE: [Direction; 3] = [Self::Right, Self::Anterior, Self::Superior];

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'R' => Some(Self::Right),
            'L' => Some(Self::Left),
            'A' => Some(Self::Anterior),
            'P' => Some(Self::Posterior),
            'S' => Some(Self::Superior),
            'I' => Some(Self::Inferior),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Right => 'R',
            Self::Left => 'L',
            Self::Anterior => 'A',
            Self::Posterior => 'P',
            Self::Superior => 'S',
            Self::Inferior => 'I',
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Right => Self::Left,
            Self::Left => Self::Right,
            Self::Anterior => Self::Posterior,
            Self::Posterior => Self::Anterior,
            Self::Superior => Self::Inferior,
            Self::Inferior => Self::Superior,
        }
    }

    /// Canonical axis this direction lies on: 0 for R/L, 1 for A/P, 2 for S/I.
    pub fn axis(self) -> usize {
        match self {
            Self::Right | Self::Left => 0,
            Self::Anterior | Self::Posterior => 1,
            Self::Superior | Self::Inferior => 2,
        }
    }

    pub fn is_positive(self) -> bool {
        Self::POSITIVE.contains(&self)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Anatomical opposite of a direction letter (R<->L, A<->P, S<->I), case-insensitive.
///
/// The result is always uppercase; `None` for letters that name no direction.
pub fn opposite(letter: char) -> Option<char> {
    Direction::from_char(letter).map(|d| d.opposite().as_char())
}

/// Index of `letter` or of its anatomical opposite in `label`.
///
/// Works on raw text, so it can locate axes in labels that have not been parsed.
///
/// # Errors
///
/// Returns [`LabelError`] if `letter` is not a direction letter or if neither
/// it nor its opposite occurs in `label`.
pub fn axis_position(label: &str, letter: char) -> Result<usize, LabelError> {
    let direction = Direction::from_char(letter)
        .ok_or_else(|| LabelError::new(label, LabelErrorKind::UnknownLetter(letter)))?;
    let upper = label.to_ascii_uppercase();
    upper
        .chars()
        .position(|c| c == direction.as_char())
        .or_else(|| {
            upper
                .chars()
                .position(|c| c == direction.opposite().as_char())
        })
        .ok_or_else(|| {
            LabelError::new(label, LabelErrorKind::MissingAxis(direction.as_char()))
        })
}

/// A validated anatomical coordinate system label such as "RAS" or "LPS".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnatomicalLabel([Direction; 3]);

impl AnatomicalLabel {
    /// Right, Anterior, Superior (NIfTI world convention).
    pub const RAS: Self = Self([Direction::Right, Direction::Anterior, Direction::Superior]);

    /// Left, Posterior, Superior (DICOM patient convention).
    pub const LPS: Self = Self([Direction::Left, Direction::Posterior, Direction::Superior]);

    /// Build a label from three directions, one per canonical axis.
    ///
    /// # Errors
    ///
    /// Returns [`LabelError`] if an anatomical axis is missing or repeated.
    pub fn new(directions: [Direction; 3]) -> Result<Self, LabelError> {
        let text: String = directions.iter().map(|d| d.as_char()).collect();
        let mut seen = [false; 3];
        for d in directions {
            if std::mem::replace(&mut seen[d.axis()], true) {
                return Err(LabelError::new(text, LabelErrorKind::DuplicateAxis(d.as_char())));
            }
        }
        Ok(Self(directions))
    }

    pub fn directions(&self) -> [Direction; 3] {
        self.0
    }

    /// Index at which `direction` or its opposite occurs.
    pub fn axis_position(&self, direction: Direction) -> usize {
        // Every canonical axis occurs exactly once in a validated label.
        self.0
            .iter()
            .position(|d| d.axis() == direction.axis())
            .unwrap_or_default()
    }

    /// Positions of the R/L, A/P and S/I letters, in that order.
    pub fn positions(&self) -> [usize; 3] {
        Direction::POSITIVE.map(|d| self.axis_position(d))
    }

    /// All 48 valid labels.
    pub fn all() -> Vec<Self> {
        const ORDERS: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        let mut labels = Vec::with_capacity(48);
        for order in ORDERS {
            for signs in 0..8u8 {
                let directions = [0, 1, 2].map(|i| {
                    let d = Direction::POSITIVE[order[i]];
                    if signs & (1 << i) == 0 { d } else { d.opposite() }
                });
                labels.push(Self(directions));
            }
        }
        labels
    }
}

impl Default for AnatomicalLabel {
    fn default() -> Self {
        Self::RAS
    }
}

impl FromStr for AnatomicalLabel {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 3 {
            return Err(LabelError::new(s, LabelErrorKind::Length(chars.len())));
        }
        let mut directions = [Direction::Right; 3];
        for (slot, c) in directions.iter_mut().zip(chars) {
            *slot = Direction::from_char(c)
                .ok_or_else(|| LabelError::new(s, LabelErrorKind::UnknownLetter(c)))?;
        }
        Self::new(directions).map_err(|e| LabelError::new(s, e.kind))
    }
}

impl TryFrom<&str> for AnatomicalLabel {
    type Error = LabelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for AnatomicalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in self.0 {
            write!(f, "{d}")?;
        }
        Ok(())
    }
}
