//! Shape and stride vectors plus the shape arithmetic used by views and kernels

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::error::{CoreError, CoreResult};

/// Dimension sizes (or strides) of a tensor.
///
/// Most tensors are 0D-4D, so entries live on the stack for the common case.
/// Strides reuse this type and may be zero (broadcast views) or negative.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizeVector(SmallVec<[i64; 4]>);

impl SizeVector {
    pub fn new(dims: &[i64]) -> Self {
        Self(SmallVec::from_slice(dims))
    }

    /// Zero-dimensional shape of a scalar tensor.
    pub fn scalar() -> Self {
        Self(SmallVec::new())
    }

    pub fn filled(len: usize, value: i64) -> Self {
        Self(SmallVec::from_elem(value, len))
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Product of the entries; 1 for an empty vector.
    ///
    /// Callers must have validated the entries (see [`SizeVector::checked_num_elements`]).
    pub fn num_elements(&self) -> i64 {
        self.0.iter().product()
    }

    /// Product of the entries, rejecting negative sizes.
    pub fn checked_num_elements(&self) -> CoreResult<i64> {
        let mut total: i64 = 1;
        for &d in self.0.iter() {
            if d < 0 {
                return Err(CoreError::InvalidArgument(format!(
                    "Shape {} contains a negative dimension",
                    self
                )));
            }
            total = total.checked_mul(d).ok_or_else(|| {
                CoreError::InvalidArgument(format!("Shape {} overflows the element count", self))
            })?;
        }
        Ok(total)
    }

    /// True iff the ranks agree and every concrete dynamic entry matches.
    pub fn is_compatible(&self, dynamic: &DynamicSizeVector) -> bool {
        self.ndim() == dynamic.ndim()
            && self
                .0
                .iter()
                .zip(dynamic.iter())
                .all(|(&s, d)| d.map_or(true, |d| d == s))
    }

    pub fn push(&mut self, value: i64) {
        self.0.push(value);
    }

    pub fn insert(&mut self, index: usize, value: i64) {
        self.0.insert(index, value);
    }

    pub fn remove(&mut self, index: usize) -> i64 {
        self.0.remove(index)
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<i64> {
        self.0.to_vec()
    }
}

impl Deref for SizeVector {
    type Target = [i64];

    fn deref(&self) -> &[i64] {
        &self.0
    }
}

impl DerefMut for SizeVector {
    fn deref_mut(&mut self) -> &mut [i64] {
        &mut self.0
    }
}

impl From<&[i64]> for SizeVector {
    fn from(dims: &[i64]) -> Self {
        SizeVector::new(dims)
    }
}

impl From<Vec<i64>> for SizeVector {
    fn from(dims: Vec<i64>) -> Self {
        Self(SmallVec::from_vec(dims))
    }
}

impl<const N: usize> From<[i64; N]> for SizeVector {
    fn from(dims: [i64; N]) -> Self {
        SizeVector::new(&dims)
    }
}

impl From<&SizeVector> for SizeVector {
    fn from(dims: &SizeVector) -> Self {
        dims.clone()
    }
}

impl FromIterator<i64> for SizeVector {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for SizeVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", "))
    }
}

impl fmt::Debug for SizeVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Shape contract where some dimensions are left unconstrained (`None`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DynamicSizeVector(Vec<Option<i64>>);

impl DynamicSizeVector {
    pub fn new(dims: &[Option<i64>]) -> Self {
        Self(dims.to_vec())
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<i64>> + '_ {
        self.0.iter().copied()
    }

    pub fn is_dynamic(&self) -> bool {
        self.0.iter().any(Option::is_none)
    }

    /// Concrete shape, if every entry is specified.
    pub fn to_size_vector(&self) -> Option<SizeVector> {
        self.0.iter().copied().collect::<Option<Vec<i64>>>().map(SizeVector::from)
    }
}

impl From<&SizeVector> for DynamicSizeVector {
    fn from(shape: &SizeVector) -> Self {
        Self(shape.iter().map(|&d| Some(d)).collect())
    }
}

impl fmt::Display for DynamicSizeVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.iter()
            .map(|d| d.map_or_else(|| "None".to_string(), |d| d.to_string()))
            .collect::<Vec<_>>()
            .join(", "))
    }
}

/// Row-major strides, in elements.
pub fn default_strides(shape: &SizeVector) -> SizeVector {
    let ndim = shape.ndim();
    let mut strides = SizeVector::filled(ndim, 1);
    for i in (0..ndim.saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1].max(1);
    }
    strides
}

/// Wrap a possibly negative dimension into `[0, ndim)`, or `[0, ndim]` when `inclusive`.
pub fn wrap_dim(dim: i64, ndim: usize, inclusive: bool) -> CoreResult<usize> {
    let ndim = ndim as i64;
    let max = if inclusive { ndim + 1 } else { ndim };
    if max == 0 {
        return Err(CoreError::IndexOutOfRange(format!(
            "Dimension {} specified for a 0-dimensional tensor",
            dim
        )));
    }
    if dim < -max || dim >= max {
        return Err(CoreError::IndexOutOfRange(format!(
            "Dimension {} out of range [{}, {}]",
            dim,
            -max,
            max - 1
        )));
    }
    Ok(if dim < 0 { (dim + max) as usize } else { dim as usize })
}

/// Wrap and validate a set of reduction dimensions; duplicates are rejected.
pub fn normalize_dims(dims: &[i64], ndim: usize) -> CoreResult<Vec<usize>> {
    let mut seen = vec![false; ndim];
    let mut out = Vec::with_capacity(dims.len());
    for &d in dims {
        let wrapped = wrap_dim(d, ndim, false)?;
        if seen[wrapped] {
            return Err(CoreError::InvalidArgument(format!(
                "Dimension {} repeated in {:?}",
                wrapped, dims
            )));
        }
        seen[wrapped] = true;
        out.push(wrapped);
    }
    out.sort_unstable();
    Ok(out)
}

/// NumPy broadcast of two shapes: trailing dimensions align, size-1 dimensions stretch.
pub fn broadcasted_shape(lhs: &SizeVector, rhs: &SizeVector) -> CoreResult<SizeVector> {
    let ndim = lhs.ndim().max(rhs.ndim());
    let mut result = SizeVector::filled(ndim, 1);
    for i in 0..ndim {
        let l = if i < lhs.ndim() { lhs[lhs.ndim() - 1 - i] } else { 1 };
        let r = if i < rhs.ndim() { rhs[rhs.ndim() - 1 - i] } else { 1 };
        result[ndim - 1 - i] = if l == r || r == 1 {
            l
        } else if l == 1 {
            r
        } else {
            return Err(CoreError::shape_error(
                &lhs.to_string(),
                &rhs.to_string(),
                Some("shapes are not broadcast-compatible"),
            ));
        };
    }
    Ok(result)
}

pub fn can_be_broadcasted(lhs: &SizeVector, rhs: &SizeVector) -> bool {
    broadcasted_shape(lhs, rhs).is_ok()
}

/// True iff `src` broadcasts to exactly `dst`.
pub fn is_broadcastable_to(src: &SizeVector, dst: &SizeVector) -> bool {
    match broadcasted_shape(src, dst) {
        Ok(shape) => shape == *dst,
        Err(_) => false,
    }
}

/// Output shape of reducing `dims` (already normalized) of `shape`.
pub fn reduction_shape(shape: &SizeVector, dims: &[usize], keepdim: bool) -> SizeVector {
    let mut out = SizeVector::scalar();
    for (i, &d) in shape.iter().enumerate() {
        if dims.contains(&i) {
            if keepdim {
                out.push(1);
            }
        } else {
            out.push(d);
        }
    }
    out
}

/// Resolve at most one `-1` entry against a known element count.
pub fn infer_shape(shape: &SizeVector, num_elements: i64) -> CoreResult<SizeVector> {
    let mut inferred = None;
    let mut known: i64 = 1;
    for (i, &d) in shape.iter().enumerate() {
        if d == -1 {
            if inferred.is_some() {
                return Err(CoreError::InvalidArgument(format!(
                    "Only one dimension can be inferred in {}",
                    shape
                )));
            }
            inferred = Some(i);
        } else if d < 0 {
            return Err(CoreError::InvalidArgument(format!("Invalid shape {}", shape)));
        } else {
            known *= d;
        }
    }

    let mut out = shape.clone();
    if let Some(i) = inferred {
        if known == 0 || num_elements % known != 0 {
            return Err(CoreError::shape_error(
                &format!("a shape with {} elements", num_elements),
                &shape.to_string(),
                None,
            ));
        }
        out[i] = num_elements / known;
    } else if known != num_elements {
        return Err(CoreError::shape_error(
            &format!("a shape with {} elements", num_elements),
            &shape.to_string(),
            None,
        ));
    }
    Ok(out)
}

/// Strides that let a tensor of `old_shape`/`old_strides` be viewed as `new_shape`
/// without copying, or `None` when the memory layout does not allow it.
pub fn compute_view_strides(
    old_shape: &SizeVector,
    old_strides: &SizeVector,
    new_shape: &SizeVector,
) -> Option<SizeVector> {
    if old_shape.num_elements() == 0 || old_shape.ndim() == 0 {
        return if old_shape.num_elements() == new_shape.num_elements() {
            Some(default_strides(new_shape))
        } else {
            None
        };
    }

    let mut new_strides = SizeVector::filled(new_shape.ndim(), 0);
    let mut view_d = new_shape.ndim() as i64 - 1;
    let mut chunk_base_stride = old_strides[old_strides.ndim() - 1];
    let mut tensor_numel: i64 = 1;
    let mut view_numel: i64 = 1;

    for tensor_d in (0..old_shape.ndim()).rev() {
        tensor_numel *= old_shape[tensor_d];
        let chunk_ends = tensor_d == 0
            || (old_shape[tensor_d - 1] != 1
                && old_strides[tensor_d - 1] != tensor_numel * chunk_base_stride);
        if chunk_ends {
            while view_d >= 0
                && (view_numel < tensor_numel || new_shape[view_d as usize] == 1)
            {
                new_strides[view_d as usize] = view_numel * chunk_base_stride;
                view_numel *= new_shape[view_d as usize];
                view_d -= 1;
            }
            if view_numel != tensor_numel {
                return None;
            }
            if tensor_d > 0 {
                chunk_base_stride = old_strides[tensor_d - 1];
                tensor_numel = 1;
                view_numel = 1;
            }
        }
    }
    if view_d != -1 {
        return None;
    }
    Some(new_strides)
}
