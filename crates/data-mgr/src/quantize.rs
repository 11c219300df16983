//! Linear quantization of float regions to unsigned integers.

use std::rc::Rc;

use num_traits::{Bounded, NumCast, Unsigned};

use crate::cache::QuantizedData;
use crate::types::RegionKind;

/// Integer payload types a region can be quantized to.
pub trait QuantizedValue: Bounded + NumCast + Unsigned + Copy {
    const KIND: RegionKind;

    fn wrap(data: Rc<Vec<Self>>) -> QuantizedData;

    fn unwrap(data: &QuantizedData) -> Option<Rc<Vec<Self>>>;
}

impl QuantizedValue for u8 {
    const KIND: RegionKind = RegionKind::UInt8;

    fn wrap(data: Rc<Vec<Self>>) -> QuantizedData {
        QuantizedData::UInt8(data)
    }

    fn unwrap(data: &QuantizedData) -> Option<Rc<Vec<Self>>> {
        match data {
            QuantizedData::UInt8(d) => Some(Rc::clone(d)),
            _ => None,
        }
    }
}

impl QuantizedValue for u16 {
    const KIND: RegionKind = RegionKind::UInt16;

    fn wrap(data: Rc<Vec<Self>>) -> QuantizedData {
        QuantizedData::UInt16(data)
    }

    fn unwrap(data: &QuantizedData) -> Option<Rc<Vec<Self>>> {
        match data {
            QuantizedData::UInt16(d) => Some(Rc::clone(d)),
            _ => None,
        }
    }
}

/// Map `v` from `[range[0], range[1]]` onto `0..=T::max_value()`.
///
/// Values below the range map to 0 and values above to the maximum. NaN and
/// degenerate ranges map to 0.
#[inline]
pub fn quantize<T>(v: f32, range: [f32; 2]) -> T
where
    T: Bounded + NumCast + Unsigned + Copy,
{
    let zero = T::min_value();
    let span = (range[1] - range[0]) as f64;
    if v.is_nan() || span <= 0.0 || !span.is_finite() {
        return zero;
    }
    let max: f64 = match NumCast::from(T::max_value()) {
        Some(m) => m,
        None => return zero,
    };
    let scaled = ((v as f64 - range[0] as f64) / span * max).round_ties_even();
    NumCast::from(scaled.clamp(0.0, max)).unwrap_or(zero)
}

/// Quantize every value of `values`.
pub fn quantize_all<T, I>(values: I, range: [f32; 2]) -> Vec<T>
where
    T: Bounded + NumCast + Unsigned + Copy,
    I: IntoIterator<Item = f32>,
{
    values.into_iter().map(|v| quantize(v, range)).collect()
}
