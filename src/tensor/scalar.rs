//! Tagged scalar used to pass literal values into non-generic APIs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dispatch::Element;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Double(f64),
    Int64(i64),
    Bool(bool),
}

impl Scalar {
    pub fn is_double(&self) -> bool {
        matches!(self, Scalar::Double(_))
    }

    pub fn is_int64(&self) -> bool {
        matches!(self, Scalar::Int64(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Scalar::Bool(_))
    }

    pub fn get_double(&self) -> CoreResult<f64> {
        match self {
            Scalar::Double(v) => Ok(*v),
            other => Err(CoreError::InvalidArgument(format!("Scalar {} is not a double", other))),
        }
    }

    pub fn get_int64(&self) -> CoreResult<i64> {
        match self {
            Scalar::Int64(v) => Ok(*v),
            other => Err(CoreError::InvalidArgument(format!("Scalar {} is not an int64", other))),
        }
    }

    pub fn get_bool(&self) -> CoreResult<bool> {
        match self {
            Scalar::Bool(v) => Ok(*v),
            other => Err(CoreError::InvalidArgument(format!("Scalar {} is not a bool", other))),
        }
    }

    /// Convert to `T` with `as` semantics.
    pub fn to<T: Element>(&self) -> T {
        match *self {
            Scalar::Double(v) => T::from_f64(v),
            Scalar::Int64(v) => T::from_i128(v as i128),
            Scalar::Bool(v) => T::from_bool(v),
        }
    }

    /// Value equality under the active tag. A Bool only equals a bool, and
    /// Int64 compares exactly against integers of any width and signedness.
    pub fn equal<T: Element>(&self, value: T) -> bool {
        let value_is_bool = T::DTYPE.is_bool();
        match *self {
            Scalar::Bool(b) => value_is_bool && value.to_bool() == b,
            _ if value_is_bool => false,
            Scalar::Double(d) => value.to_f64() == d,
            Scalar::Int64(i) => {
                if T::DTYPE.is_float() {
                    value.to_f64() == i as f64
                } else {
                    value.to_i128() == i as i128
                }
            }
        }
    }

    pub fn same_type(&self, other: &Scalar) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub(crate) fn to_f64(&self) -> f64 {
        match *self {
            Scalar::Double(v) => v,
            Scalar::Int64(v) => v as f64,
            Scalar::Bool(v) => v as i64 as f64,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Double(v) => write!(f, "{}", v),
            Scalar::Int64(v) => write!(f, "{}", v),
            Scalar::Bool(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! scalar_from {
    ($variant:ident, $target:ty, $($t:ty),*) => {
        $(
            impl From<$t> for Scalar {
                fn from(v: $t) -> Self {
                    Scalar::$variant(v as $target)
                }
            }
        )*
    };
}

scalar_from!(Double, f64, f32, f64);
scalar_from!(Int64, i64, i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Scalar {
    /// Values above `i64::MAX` become doubles instead of wrapping negative.
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => Scalar::Int64(v),
            Err(_) => Scalar::Double(v as f64),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}
