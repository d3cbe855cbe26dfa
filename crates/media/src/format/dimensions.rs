//! Declares the [Dimensions] type, the size of a video frame.

use std::fmt::{self, Display, Formatter};
use std::num::NonZeroUsize;

use serde::de::{self, Deserialize, Deserializer};
use serde::Serialize;

/// A width and a height, both guaranteed to be non-zero.
///
/// # Example
///
/// [From<(usize, usize)>] is implemented for [Dimensions]. If either side is
/// `0`, the thread will panic. [Into::into] should really only be used if
/// you're providing the side lengths as literals (e.g. `(352, 288).into()`).
///
/// ```
/// use media::format::Dimensions;
///
/// let d: Dimensions = (352, 288).into();
/// assert_eq!(d.width(), 352);
/// assert_eq!(d.height(), 288);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "(usize, usize)")]
pub struct Dimensions {
    width: NonZeroUsize,
    height: NonZeroUsize,
}

impl Dimensions {
    /// Construct from a width and a height.
    ///
    /// This function will return [None] if the width or height are 0. Also see
    /// [Self::from_non_zero].
    pub const fn new(width: usize, height: usize) -> Option<Self> {
        let Some(width) = NonZeroUsize::new(width) else {
            return None;
        };
        let Some(height) = NonZeroUsize::new(height) else {
            return None;
        };

        Some(Self::from_non_zero(width, height))
    }

    /// Like [Self::new], but says which sides were wrong.
    pub const fn try_new(width: usize, height: usize) -> Result<Self, ZeroLengthSideError> {
        match Self::new(width, height) {
            Some(d) => Ok(d),
            None => Err(ZeroLengthSideError(width, height)),
        }
    }

    /// Construct from a non-zero width and a height.
    ///
    /// Unlike [Self::new], this function will always succeed (since
    /// [NonZeroUsize] ensures the sides are both non-zero at compile time).
    pub const fn from_non_zero(width: NonZeroUsize, height: NonZeroUsize) -> Self {
        Self { width, height }
    }

    /// The dimensions' width.
    ///
    /// This will never be `0`.
    pub const fn width(&self) -> usize {
        self.width.get()
    }

    /// The dimensions' height.
    ///
    /// This will never be `0`.
    pub const fn height(&self) -> usize {
        self.height.get()
    }

    /// The area a rectangle would have with the dimensions' width and height.
    ///
    /// This will never be `0`.
    pub const fn area(&self) -> usize {
        self.width.get() * self.height.get()
    }

    /// Half the width and half the height, rounded up (the size of a chroma
    /// plane in a 4:2:0 frame).
    ///
    /// # Example
    ///
    /// ```
    /// use media::format::Dimensions;
    ///
    /// let d: Dimensions = (353, 288).into();
    /// assert_eq!(d.halved(), (177, 144).into());
    /// ```
    pub fn halved(&self) -> Self {
        // Rounding up can't bring a non-zero side down to 0.
        let half = |side: NonZeroUsize| {
            NonZeroUsize::new(side.get().div_ceil(2)).unwrap_or(NonZeroUsize::MIN)
        };

        Self::from_non_zero(half(self.width), half(self.height))
    }
}

/// When displayed, [Dimensions] will look like `<width>x<height>` (e.g.
/// `352x288`).
impl Display for Dimensions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Panics if either side is `0`.
impl From<(usize, usize)> for Dimensions {
    fn from((width, height): (usize, usize)) -> Self {
        Self::new(width, height).expect("`width` and `height` must both be non-zero")
    }
}

impl From<Dimensions> for (usize, usize) {
    fn from(d: Dimensions) -> Self {
        (d.width(), d.height())
    }
}

/// Returned when trying to build [Dimensions] with a side of length `0`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Dimensions can't have a 0-length side ({0}x{1} has no area).")]
pub struct ZeroLengthSideError(pub usize, pub usize);

/// Deserialized from a `[width, height]` pair. A `0` side is an error rather
/// than a panic (unlike [From<(usize, usize)>]).
impl<'de> Deserialize<'de> for Dimensions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (width, height) = <(usize, usize)>::deserialize(deserializer)?;
        Self::try_new(width, height).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sides_are_rejected() {
        assert_eq!(Dimensions::new(0, 288), None);
        assert_eq!(Dimensions::new(352, 0), None);
        assert_eq!(Dimensions::try_new(0, 5), Err(ZeroLengthSideError(0, 5)));
        assert_eq!(Dimensions::try_new(3, 5), Ok((3, 5).into()));
    }

    #[test]
    fn halving_rounds_up() {
        let d: Dimensions = (352, 288).into();
        assert_eq!(d.halved(), (176, 144).into());

        let d: Dimensions = (1, 1).into();
        assert_eq!(d.halved(), (1, 1).into());
    }

    #[test]
    fn display_and_json() {
        let d: Dimensions = (352, 288).into();
        assert_eq!(d.to_string(), "352x288");
        assert_eq!(serde_json::to_string(&d).unwrap(), "[352,288]");
        assert_eq!(serde_json::from_str::<Dimensions>("[352,288]").unwrap(), d);
    }

    #[test]
    fn zero_sides_in_json_are_errors() {
        let e = serde_json::from_str::<Dimensions>("[0,288]").unwrap_err();
        assert!(e.to_string().starts_with(&ZeroLengthSideError(0, 288).to_string()));
        assert!(serde_json::from_str::<Dimensions>("[352]").is_err());
    }
}
