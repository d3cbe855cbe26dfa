//! Exact rational time arithmetic.
//!
//! Every timestamp in the pipeline is an integer count of some [Rational]
//! time base (e.g. `1/25` for 25 fps video, `1/44100` for audio). Moving a
//! timestamp between time bases or comparing timestamps from two different
//! streams is always done here, with [i128] cross-multiplication so that no
//! rounding error can accumulate and no intermediate product can overflow.
//! Floating point is only ever used to *display* a time.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// A rational number with a strictly positive denominator, always stored in
/// lowest terms.
///
/// # Example
///
/// ```
/// use media::time::Rational;
///
/// let tb = Rational::new(2, 50).unwrap();
/// assert_eq!(tb, Rational::new(1, 25).unwrap());
/// assert_eq!(tb.to_string(), "1/25");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(i64, i64)", into = "(i64, i64)")]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    /// One second, as a time base.
    pub const ONE: Self = Self { num: 1, den: 1 };

    /// Construct from a numerator and a denominator.
    ///
    /// [None] is returned if `den` is `0`. The sign is moved to the
    /// numerator and the fraction is reduced.
    pub const fn new(num: i64, den: i64) -> Option<Self> {
        if den == 0 {
            return None;
        }

        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let gcd = greatest_common_divisor(num.unsigned_abs(), den.unsigned_abs());

        // `gcd` can only be 0 if both sides are, and `den` isn't.
        Some(Self {
            num: num / gcd as i64,
            den: den / gcd as i64,
        })
    }

    /// The time base of something that ticks `rate` times per second (e.g. a
    /// sample rate or a frame rate).
    ///
    /// [None] is returned if `rate` is `0`.
    pub const fn per_second(rate: u32) -> Option<Self> {
        Self::new(1, rate as i64)
    }

    /// A whole number.
    pub const fn from_integer(value: i64) -> Self {
        Self { num: value, den: 1 }
    }

    pub const fn num(&self) -> i64 {
        self.num
    }

    pub const fn den(&self) -> i64 {
        self.den
    }

    /// `1 / self`. [None] is returned if `self` is zero.
    pub const fn invert(&self) -> Option<Self> {
        Self::new(self.den, self.num)
    }

    /// Lossy conversion, only meant for displaying things.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

/// When displayed, a [Rational] looks like `num/den` (e.g. `1/44100`).
impl Display for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl TryFrom<(i64, i64)> for Rational {
    type Error = ZeroDenominatorError;

    fn try_from((num, den): (i64, i64)) -> Result<Self, Self::Error> {
        Self::new(num, den).ok_or(ZeroDenominatorError)
    }
}

impl From<Rational> for (i64, i64) {
    fn from(r: Rational) -> Self {
        (r.num, r.den)
    }
}

/// Returned when trying to build a [Rational] with a denominator of `0`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("A rational number can't have a denominator of 0.")]
pub struct ZeroDenominatorError;

/// How to round the result of a rescale that doesn't divide evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rounding {
    /// Toward zero.
    Zero,
    /// Toward negative infinity.
    Down,
    /// Toward positive infinity.
    Up,
    /// To the nearest integer, halfway cases away from zero.
    #[default]
    Nearest,
}

/// Compute `a * b / c` with the given rounding, without overflowing in the
/// intermediate product. The result saturates at the [i64] bounds.
///
/// # Panics
///
/// Panics if `c` is `0`.
pub fn rescale_rnd(a: i64, b: i64, c: i64, rounding: Rounding) -> i64 {
    assert_ne!(c, 0, "Can't rescale with a divisor of 0.");
    saturate(divide(a as i128 * b as i128, c as i128, rounding))
}

/// Move the timestamp `ts` from time base `from` to time base `to`, rounding
/// to the nearest unit of `to`.
///
/// # Example
///
/// ```
/// use media::time::{self, Rational};
///
/// let video = Rational::per_second(25).unwrap();
/// let millis = Rational::new(1, 1000).unwrap();
/// assert_eq!(time::rescale(24, video, millis), 960);
/// ```
pub fn rescale(ts: i64, from: Rational, to: Rational) -> i64 {
    rescale_with(ts, from, to, Rounding::Nearest)
}

/// Like [rescale], but with an explicit [Rounding] mode.
pub fn rescale_with(ts: i64, from: Rational, to: Rational, rounding: Rounding) -> i64 {
    // ts * from.num / from.den = x * to.num / to.den
    // => x = ts * from.num * to.den / (from.den * to.num)
    let numerator = ts as i128 * from.num as i128 * to.den as i128;
    let denominator = from.den as i128 * to.num as i128;
    assert_ne!(denominator, 0, "Can't rescale into a zero time base.");

    saturate(divide(numerator, denominator, rounding))
}

/// Compare the timestamp `a` (in time base `tb_a`) with the timestamp `b` (in
/// time base `tb_b`), exactly.
///
/// # Example
///
/// ```
/// use std::cmp::Ordering;
/// use media::time::{self, Rational};
///
/// let video = Rational::per_second(25).unwrap();
/// let audio = Rational::per_second(44100).unwrap();
///
/// // Frame 1 of the video (40ms) comes after 1000 audio samples (~22.7ms).
/// assert_eq!(time::compare(1, video, 1000, audio), Ordering::Greater);
/// // 1764 samples are exactly 40ms.
/// assert_eq!(time::compare(1, video, 1764, audio), Ordering::Equal);
/// ```
pub fn compare(a: i64, tb_a: Rational, b: i64, tb_b: Rational) -> Ordering {
    let lhs = a as i128 * tb_a.num as i128 * tb_b.den as i128;
    let rhs = b as i128 * tb_b.num as i128 * tb_a.den as i128;
    lhs.cmp(&rhs)
}

/// Format `ts` (in time base `tb`) as seconds, e.g. `0.04`. Only meant for
/// logging.
pub fn seconds_string(ts: i64, tb: Rational) -> String {
    let seconds = ts as f64 * tb.to_f64();
    format!("{seconds:.6}")
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// `n / d` with rounding, for any sign of `n` and `d` (`d != 0`).
fn divide(n: i128, d: i128, rounding: Rounding) -> i128 {
    let (n, d) = if d < 0 { (-n, -d) } else { (n, d) };

    match rounding {
        Rounding::Zero => n / d,
        Rounding::Down => n.div_euclid(d),
        Rounding::Up => -((-n).div_euclid(d)),
        Rounding::Nearest => {
            let half = d / 2;
            if n >= 0 {
                (n + half) / d
            } else {
                -((-n + half) / d)
            }
        }
    }
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

const fn greatest_common_divisor(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (b, a) = (a % b, b)
    }
    a
}
