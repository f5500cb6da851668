//! Runtime dtype tags to statically typed kernels
//!
//! Each `dispatch_*` macro matches a [`Dtype`](crate::tensor::Dtype) against one
//! closed set of concrete Rust types, binds the chosen type to the caller's alias
//! and evaluates the body, which must produce a `CoreResult`. Tags outside the set
//! produce [`CoreError::UnsupportedDtype`](crate::error::CoreError::UnsupportedDtype).
//!
//! ```ignore
//! dispatch_dtype!(tensor.dtype(), "Sum", T => sum_kernel::<T>(&tensor))
//! ```

use std::fmt::Debug;

use crate::tensor::{Dtype, Scalar};

/// A scalar type that kernels can be instantiated with.
pub trait Element: Copy + Default + Debug + PartialEq + PartialOrd + Send + Sync + 'static {
    const DTYPE: Dtype;

    fn zero() -> Self;
    fn one() -> Self;
    /// Smallest representable value (`-inf` for floats).
    fn lowest() -> Self;
    /// Largest representable value (`+inf` for floats).
    fn highest() -> Self;

    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
    fn to_i128(self) -> i128;
    fn from_i128(v: i128) -> Self;
    fn from_bool(v: bool) -> Self;
    fn to_bool(self) -> bool {
        self != Self::zero()
    }
    fn to_scalar(self) -> Scalar;

    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    /// Integer division by zero yields zero.
    fn div(self, rhs: Self) -> Self;
    fn neg(self) -> Self;
    fn abs(self) -> Self;

    fn is_nan(self) -> bool {
        false
    }
    fn is_inf(self) -> bool {
        false
    }

    /// Value conversion between element types (`as` semantics).
    fn cast<D: Element>(self) -> D {
        if Self::DTYPE.is_float() || D::DTYPE.is_float() {
            D::from_f64(self.to_f64())
        } else {
            D::from_i128(self.to_i128())
        }
    }
}

/// Floating-point elements, the domain of math functions and linear algebra.
pub trait FloatElement: Element {
    fn epsilon() -> Self;
    fn sqrt(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn floor(self) -> Self;
    fn ceil(self) -> Self;
    fn round(self) -> Self;
    fn trunc(self) -> Self;
}

macro_rules! impl_int_element {
    ($t:ty, $dtype:expr, $abs:expr) => {
        impl Element for $t {
            const DTYPE: Dtype = $dtype;

            fn zero() -> Self { 0 }
            fn one() -> Self { 1 }
            fn lowest() -> Self { <$t>::MIN }
            fn highest() -> Self { <$t>::MAX }

            fn to_f64(self) -> f64 { self as f64 }
            fn from_f64(v: f64) -> Self { v as $t }
            fn to_i128(self) -> i128 { self as i128 }
            fn from_i128(v: i128) -> Self { v as $t }
            fn from_bool(v: bool) -> Self { v as $t }
            fn to_scalar(self) -> Scalar { Scalar::from(self) }

            fn add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
            fn sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
            fn mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
            fn div(self, rhs: Self) -> Self { self.checked_div(rhs).unwrap_or(0) }
            fn neg(self) -> Self { self.wrapping_neg() }
            fn abs(self) -> Self { ($abs)(self) }
        }
    };
}

impl_int_element!(i8, Dtype::INT8, i8::wrapping_abs);
impl_int_element!(i16, Dtype::INT16, i16::wrapping_abs);
impl_int_element!(i32, Dtype::INT32, i32::wrapping_abs);
impl_int_element!(i64, Dtype::INT64, i64::wrapping_abs);
impl_int_element!(u8, Dtype::UINT8, |v: u8| v);
impl_int_element!(u16, Dtype::UINT16, |v: u16| v);
impl_int_element!(u32, Dtype::UINT32, |v: u32| v);
impl_int_element!(u64, Dtype::UINT64, |v: u64| v);

macro_rules! impl_float_element {
    ($t:ident, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: Dtype = $dtype;

            fn zero() -> Self { 0.0 }
            fn one() -> Self { 1.0 }
            fn lowest() -> Self { $t::NEG_INFINITY }
            fn highest() -> Self { $t::INFINITY }

            fn to_f64(self) -> f64 { self as f64 }
            fn from_f64(v: f64) -> Self { v as $t }
            fn to_i128(self) -> i128 { self as i128 }
            fn from_i128(v: i128) -> Self { v as $t }
            fn from_bool(v: bool) -> Self { if v { 1.0 } else { 0.0 } }
            fn to_scalar(self) -> Scalar { Scalar::from(self) }

            fn add(self, rhs: Self) -> Self { self + rhs }
            fn sub(self, rhs: Self) -> Self { self - rhs }
            fn mul(self, rhs: Self) -> Self { self * rhs }
            fn div(self, rhs: Self) -> Self { self / rhs }
            fn neg(self) -> Self { -self }
            fn abs(self) -> Self { $t::abs(self) }

            fn is_nan(self) -> bool { $t::is_nan(self) }
            fn is_inf(self) -> bool { $t::is_infinite(self) }
        }

        impl FloatElement for $t {
            fn epsilon() -> Self { $t::EPSILON }
            fn sqrt(self) -> Self { $t::sqrt(self) }
            fn sin(self) -> Self { $t::sin(self) }
            fn cos(self) -> Self { $t::cos(self) }
            fn exp(self) -> Self { $t::exp(self) }
            fn ln(self) -> Self { $t::ln(self) }
            fn floor(self) -> Self { $t::floor(self) }
            fn ceil(self) -> Self { $t::ceil(self) }
            fn round(self) -> Self { $t::round(self) }
            fn trunc(self) -> Self { $t::trunc(self) }
        }
    };
}

impl_float_element!(f32, Dtype::FLOAT32);
impl_float_element!(f64, Dtype::FLOAT64);

impl Element for bool {
    const DTYPE: Dtype = Dtype::BOOL;

    fn zero() -> Self { false }
    fn one() -> Self { true }
    fn lowest() -> Self { false }
    fn highest() -> Self { true }

    fn to_f64(self) -> f64 { if self { 1.0 } else { 0.0 } }
    fn from_f64(v: f64) -> Self { v != 0.0 }
    fn to_i128(self) -> i128 { self as i128 }
    fn from_i128(v: i128) -> Self { v != 0 }
    fn from_bool(v: bool) -> Self { v }
    fn to_bool(self) -> bool { self }
    fn to_scalar(self) -> Scalar { Scalar::Bool(self) }

    fn add(self, rhs: Self) -> Self { self || rhs }
    fn sub(self, rhs: Self) -> Self { self ^ rhs }
    fn mul(self, rhs: Self) -> Self { self && rhs }
    fn div(self, rhs: Self) -> Self { self && rhs }
    fn neg(self) -> Self { self }
    fn abs(self) -> Self { self }
}

/// Every numeric dtype (Bool and Object excluded).
#[macro_export]
macro_rules! dispatch_dtype {
    ($dtype:expr, $op:expr, $T:ident => $body:expr) => {{
        let dtype: $crate::tensor::Dtype = $dtype;
        match (dtype.code(), dtype.byte_size()) {
            ($crate::tensor::DtypeCode::Float, 4) => { type $T = f32; $body }
            ($crate::tensor::DtypeCode::Float, 8) => { type $T = f64; $body }
            ($crate::tensor::DtypeCode::Int, 1) => { type $T = i8; $body }
            ($crate::tensor::DtypeCode::Int, 2) => { type $T = i16; $body }
            ($crate::tensor::DtypeCode::Int, 4) => { type $T = i32; $body }
            ($crate::tensor::DtypeCode::Int, 8) => { type $T = i64; $body }
            ($crate::tensor::DtypeCode::UInt, 1) => { type $T = u8; $body }
            ($crate::tensor::DtypeCode::UInt, 2) => { type $T = u16; $body }
            ($crate::tensor::DtypeCode::UInt, 4) => { type $T = u32; $body }
            ($crate::tensor::DtypeCode::UInt, 8) => { type $T = u64; $body }
            _ => Err($crate::error::CoreError::unsupported_dtype($op, &dtype.to_string())),
        }
    }};
}

/// Every numeric dtype plus Bool.
#[macro_export]
macro_rules! dispatch_dtype_with_bool {
    ($dtype:expr, $op:expr, $T:ident => $body:expr) => {{
        let dtype: $crate::tensor::Dtype = $dtype;
        if dtype == $crate::tensor::Dtype::BOOL {
            type $T = bool;
            $body
        } else {
            $crate::dispatch_dtype!(dtype, $op, $T => $body)
        }
    }};
}

/// Float32 and Float64 only.
#[macro_export]
macro_rules! dispatch_float_dtype {
    ($dtype:expr, $op:expr, $T:ident => $body:expr) => {{
        let dtype: $crate::tensor::Dtype = $dtype;
        match (dtype.code(), dtype.byte_size()) {
            ($crate::tensor::DtypeCode::Float, 4) => { type $T = f32; $body }
            ($crate::tensor::DtypeCode::Float, 8) => { type $T = f64; $body }
            _ => Err($crate::error::CoreError::unsupported_dtype($op, &dtype.to_string())),
        }
    }};
}

/// Signed and unsigned integers; the key types of the hash map.
#[macro_export]
macro_rules! dispatch_int_dtype {
    ($dtype:expr, $op:expr, $T:ident => $body:expr) => {{
        let dtype: $crate::tensor::Dtype = $dtype;
        match (dtype.code(), dtype.byte_size()) {
            ($crate::tensor::DtypeCode::Int, 1) => { type $T = i8; $body }
            ($crate::tensor::DtypeCode::Int, 2) => { type $T = i16; $body }
            ($crate::tensor::DtypeCode::Int, 4) => { type $T = i32; $body }
            ($crate::tensor::DtypeCode::Int, 8) => { type $T = i64; $body }
            ($crate::tensor::DtypeCode::UInt, 1) => { type $T = u8; $body }
            ($crate::tensor::DtypeCode::UInt, 2) => { type $T = u16; $body }
            ($crate::tensor::DtypeCode::UInt, 4) => { type $T = u32; $body }
            ($crate::tensor::DtypeCode::UInt, 8) => { type $T = u64; $body }
            _ => Err($crate::error::CoreError::unsupported_dtype($op, &dtype.to_string())),
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, CoreResult};

    fn byte_size_of<T: Element>() -> usize {
        std::mem::size_of::<T>()
    }

    #[test]
    fn test_dispatch_selects_matching_type() {
        for dtype in Dtype::CATALOG {
            let size: CoreResult<usize> = dispatch_dtype_with_bool!(dtype, "size", T => {
                assert_eq!(T::DTYPE, dtype);
                Ok(byte_size_of::<T>())
            });
            assert_eq!(size.unwrap(), dtype.byte_size());
        }
    }

    #[test]
    fn test_dispatch_rejects_outside_set() {
        let r: CoreResult<()> = dispatch_dtype!(Dtype::BOOL, "Add", T => Ok(()));
        assert!(matches!(r, Err(CoreError::UnsupportedDtype { .. })));

        let r: CoreResult<()> = dispatch_float_dtype!(Dtype::INT32, "Inverse", T => Ok(()));
        assert_eq!(r.unwrap_err(), CoreError::unsupported_dtype("Inverse", "Int32"));

        let r: CoreResult<()> = dispatch_int_dtype!(Dtype::FLOAT32, "HashMap", T => Ok(()));
        assert!(r.is_err());
    }

    #[test]
    fn test_cast_semantics() {
        assert_eq!((-1i32).cast::<u8>(), 255u8);
        assert_eq!(3.9f64.cast::<i32>(), 3);
        assert_eq!(u64::MAX.cast::<i64>(), -1);
        assert!(2u8.cast::<bool>());
        assert_eq!(true.cast::<f32>(), 1.0);
        assert_eq!(i64::MAX.cast::<i64>(), i64::MAX);
    }

    #[test]
    fn test_integer_division_by_zero() {
        assert_eq!(Element::div(7i32, 0), 0);
        assert_eq!(Element::div(7u8, 2), 3);
        assert!(Element::div(1.0f32, 0.0).is_inf());
    }
}
