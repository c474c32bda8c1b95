use serde::{
    Deserialize,
    Serialize,
};

/// Closed interval `[start, end]`, guaranteed ordered at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TupleRange<T: Copy + PartialOrd>(T, T);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TupleRangeError<T: Copy + PartialOrd + std::fmt::Debug> {
    ExpectedOrderedRange(T, T),
}

impl<T: Copy + PartialOrd + std::fmt::Debug> std::fmt::Display for TupleRangeError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpectedOrderedRange(l, r) => write!(
                f,
                "Expected the first element to be less than or equal to the second, got ({:?}, {:?})",
                l, r
            ),
        }
    }
}

impl<T: Copy + PartialOrd + std::fmt::Debug> TupleRange<T> {
    /// Fails when `left > right`. Unordered (NaN) pairs fail as well.
    pub fn try_new(left: T, right: T) -> Result<Self, TupleRangeError<T>> {
        match left.partial_cmp(&right) {
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal) => Ok(Self(left, right)),
            _ => Err(TupleRangeError::ExpectedOrderedRange(left, right)),
        }
    }

    pub fn as_tuple(&self) -> (T, T) {
        (self.0, self.1)
    }

    pub fn contains(&self, x: T) -> bool {
        self.0 <= x && x <= self.1
    }

    pub fn start(&self) -> T {
        self.0
    }

    pub fn end(&self) -> T {
        self.1
    }

    pub fn intersects(&self, other: Self) -> bool {
        !(self.end() < other.start() || other.end() < self.start())
    }
}

impl<T: Copy + PartialOrd + std::fmt::Debug> TryFrom<(T, T)> for TupleRange<T> {
    type Error = TupleRangeError<T>;

    fn try_from(value: (T, T)) -> Result<Self, Self::Error> {
        Self::try_new(value.0, value.1)
    }
}
