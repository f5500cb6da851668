//! Core tensor type: factories, accessors and zero-copy views

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::context::Context;
use crate::dispatch::Element;
use crate::error::{CoreError, CoreResult};
use crate::kernels;
use super::devices::Device;
use super::dtype::Dtype;
use super::scalar::Scalar;
use super::shape::{self, SizeVector};
use super::storage::{Blob, BlobDeleter};

/// A shaped, strided, typed view over a reference-counted [`Blob`].
///
/// `Clone` produces another view of the same blob. Deep copies are explicit:
/// [`Tensor::deep_copy`], [`Tensor::contiguous`], [`Tensor::to`], [`Tensor::to_device`].
#[derive(Clone)]
pub struct Tensor {
    shape: SizeVector,
    strides: SizeVector,
    dtype: Dtype,
    blob: Arc<Blob>,
    byte_offset: i64,
}

/// Bytes backing a contiguous `shape` of `dtype`; must fit in `isize`.
fn storage_bytes(shape: &SizeVector, dtype: Dtype) -> CoreResult<usize> {
    let num_elements = shape.checked_num_elements()?;
    usize::try_from(num_elements)
        .ok()
        .and_then(|n| n.checked_mul(dtype.byte_size()))
        .filter(|&bytes| bytes <= isize::MAX as usize)
        .ok_or_else(|| {
            CoreError::MemoryError(format!(
                "Shape {} of {} exceeds the addressable byte size",
                shape, dtype
            ))
        })
}

impl Tensor {
    /// Allocate an uninitialized contiguous tensor.
    pub fn empty(
        ctx: &Context,
        shape: impl Into<SizeVector>,
        dtype: Dtype,
        device: &Device,
    ) -> CoreResult<Self> {
        let shape = shape.into();
        if !dtype.is_defined() {
            return Err(CoreError::InvalidArgument(
                "Cannot allocate a tensor of Undefined dtype".to_string(),
            ));
        }
        let byte_size = storage_bytes(&shape, dtype)?;
        let blob = Blob::new(ctx, byte_size, device)?;
        Ok(Self {
            strides: shape::default_strides(&shape),
            shape,
            dtype,
            blob: Arc::new(blob),
            byte_offset: 0,
        })
    }

    pub fn full(
        ctx: &Context,
        shape: impl Into<SizeVector>,
        value: impl Into<Scalar>,
        dtype: Dtype,
        device: &Device,
    ) -> CoreResult<Self> {
        let mut tensor = Self::empty(ctx, shape, dtype, device)?;
        tensor.fill(value)?;
        Ok(tensor)
    }

    pub fn zeros(ctx: &Context, shape: impl Into<SizeVector>, dtype: Dtype, device: &Device) -> CoreResult<Self> {
        Self::full(ctx, shape, 0i64, dtype, device)
    }

    pub fn ones(ctx: &Context, shape: impl Into<SizeVector>, dtype: Dtype, device: &Device) -> CoreResult<Self> {
        Self::full(ctx, shape, 1i64, dtype, device)
    }

    /// `n x n` identity matrix.
    pub fn eye(ctx: &Context, n: i64, dtype: Dtype, device: &Device) -> CoreResult<Self> {
        let host = Self::zeros(ctx, [n, n], dtype, &Device::cpu())?;
        let mut diagonal = host.as_strided([n], [n + 1], 0)?;
        diagonal.fill(1i64)?;
        host.to_device(device)
    }

    /// Initialize from host values laid out row-major.
    pub fn from_slice<T: Element>(
        ctx: &Context,
        values: &[T],
        shape: impl Into<SizeVector>,
        device: &Device,
    ) -> CoreResult<Self> {
        let shape = shape.into();
        let expected = shape.checked_num_elements()?;
        if values.len() as i64 != expected {
            return Err(CoreError::shape_error(
                &format!("{} values for shape {}", expected, shape),
                &format!("{} values", values.len()),
                None,
            ));
        }
        let tensor = Self::empty(ctx, shape, T::DTYPE, device)?;
        // SAFETY: the blob holds exactly `values.len()` elements of T.
        unsafe {
            ctx.memory().memcpy(
                tensor.data_ptr_mut(),
                device,
                values.as_ptr() as *const u8,
                &Device::cpu(),
                std::mem::size_of_val(values),
            )?;
        }
        Ok(tensor)
    }

    pub fn from_vec<T: Element>(
        ctx: &Context,
        values: Vec<T>,
        shape: impl Into<SizeVector>,
        device: &Device,
    ) -> CoreResult<Self> {
        Self::from_slice(ctx, &values, shape, device)
    }

    /// Zero-dimensional tensor holding `value`.
    pub fn scalar<T: Element>(ctx: &Context, value: T, device: &Device) -> CoreResult<Self> {
        Self::from_slice(ctx, &[value], SizeVector::scalar(), device)
    }

    /// Contiguous tensor over caller-owned memory released through `deleter`.
    ///
    /// # Safety
    /// `ptr` must stay valid for `shape.num_elements() * dtype.byte_size()` bytes
    /// on `device` until `deleter` runs.
    pub unsafe fn from_external(
        ctx: &Context,
        device: &Device,
        ptr: *mut u8,
        shape: impl Into<SizeVector>,
        dtype: Dtype,
        deleter: BlobDeleter,
    ) -> CoreResult<Self> {
        let shape = shape.into();
        let byte_size = storage_bytes(&shape, dtype)?;
        let blob = Blob::from_external(ctx, device, ptr, byte_size, deleter);
        Ok(Self {
            strides: shape::default_strides(&shape),
            shape,
            dtype,
            blob: Arc::new(blob),
            byte_offset: 0,
        })
    }

    /// Evenly spaced values in `[start, stop)`.
    pub fn arange(
        ctx: &Context,
        start: impl Into<Scalar>,
        stop: impl Into<Scalar>,
        step: impl Into<Scalar>,
        dtype: Dtype,
        device: &Device,
    ) -> CoreResult<Self> {
        kernels::arange(ctx, start.into(), stop.into(), step.into(), dtype, device)
    }

    pub fn shape(&self) -> &SizeVector {
        &self.shape
    }

    pub fn strides(&self) -> &SizeVector {
        &self.strides
    }

    /// Size of one dimension; negative dims count from the back.
    pub fn shape_at(&self, dim: i64) -> CoreResult<i64> {
        Ok(self.shape[shape::wrap_dim(dim, self.ndim(), false)?])
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn device(&self) -> Device {
        self.blob.device()
    }

    pub fn context(&self) -> &Context {
        self.blob.context()
    }

    pub fn blob(&self) -> &Arc<Blob> {
        &self.blob
    }

    pub fn byte_offset(&self) -> i64 {
        self.byte_offset
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn num_elements(&self) -> i64 {
        self.shape.num_elements()
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements() == 0
    }

    /// Address of the first element.
    pub fn data_ptr(&self) -> *const u8 {
        self.data_ptr_mut() as *const u8
    }

    pub fn data_ptr_mut(&self) -> *mut u8 {
        let base = self.blob.data_ptr();
        if base.is_null() {
            return base;
        }
        base.wrapping_offset(self.byte_offset as isize)
    }

    /// Typed address of the first element; fails when `T` does not match the dtype.
    pub fn get_data_ptr<T: Element>(&self) -> CoreResult<*const T> {
        self.assert_dtype(T::DTYPE)?;
        Ok(self.data_ptr() as *const T)
    }

    pub fn get_data_ptr_mut<T: Element>(&self) -> CoreResult<*mut T> {
        self.assert_dtype(T::DTYPE)?;
        Ok(self.data_ptr_mut() as *mut T)
    }

    /// True only for exact row-major strides; a size-1 dim with any other stride
    /// makes the tensor non-contiguous.
    pub fn is_contiguous(&self) -> bool {
        self.strides == shape::default_strides(&self.shape)
    }

    /// Same blob, shape, strides and offset.
    pub fn is_same(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.blob, &other.blob)
            && self.shape == other.shape
            && self.strides == other.strides
            && self.byte_offset == other.byte_offset
            && self.dtype == other.dtype
    }

    pub fn assert_dtype(&self, dtype: Dtype) -> CoreResult<()> {
        if self.dtype != dtype {
            return Err(CoreError::dtype_error(&dtype.to_string(), &self.dtype.to_string()));
        }
        Ok(())
    }

    pub fn assert_device(&self, device: &Device) -> CoreResult<()> {
        if self.device() != *device {
            return Err(CoreError::device_mismatch(&device.to_string(), &self.device().to_string()));
        }
        Ok(())
    }

    pub fn assert_shape(&self, shape: &SizeVector) -> CoreResult<()> {
        if self.shape != *shape {
            return Err(CoreError::shape_error(&shape.to_string(), &self.shape.to_string(), None));
        }
        Ok(())
    }

    /// Copy the elements, in row-major order, to a host vector.
    pub fn to_vec<T: Element>(&self) -> CoreResult<Vec<T>> {
        self.assert_dtype(T::DTYPE)?;
        let host = self.to_device(&Device::cpu())?.contiguous()?;
        let n = host.num_elements() as usize;
        let mut out = vec![T::default(); n];
        // SAFETY: host is a contiguous CPU tensor of n elements of T.
        unsafe {
            std::ptr::copy_nonoverlapping(host.data_ptr(), out.as_mut_ptr() as *mut u8, n * std::mem::size_of::<T>());
        }
        Ok(out)
    }

    /// The only element of a one-element tensor.
    pub fn item<T: Element>(&self) -> CoreResult<T> {
        if self.num_elements() != 1 {
            return Err(CoreError::InvalidArgument(format!(
                "item() requires exactly one element, tensor has shape {}",
                self.shape
            )));
        }
        Ok(self.to_vec::<T>()?[0])
    }

    /// Assemble a view over an existing blob.
    pub(crate) fn from_parts(
        shape: SizeVector,
        strides: SizeVector,
        dtype: Dtype,
        blob: Arc<Blob>,
        byte_offset: i64,
    ) -> Self {
        Self {
            shape,
            strides,
            dtype,
            blob,
            byte_offset,
        }
    }

    /// View with explicit shape, element strides and an element offset from this view.
    pub(crate) fn as_strided(
        &self,
        shape: impl Into<SizeVector>,
        strides: impl Into<SizeVector>,
        element_offset: i64,
    ) -> CoreResult<Tensor> {
        let shape = shape.into();
        let strides = strides.into();
        if shape.ndim() != strides.ndim() {
            return Err(CoreError::InvalidArgument(format!(
                "Shape {} and strides {} differ in rank",
                shape, strides
            )));
        }
        Ok(Tensor {
            shape,
            strides,
            dtype: self.dtype,
            blob: self.blob.clone(),
            byte_offset: self.byte_offset + element_offset * self.dtype.byte_size() as i64,
        })
    }

    /// Zero-copy view when the layout allows it, contiguous copy otherwise.
    pub fn reshape(&self, shape: impl Into<SizeVector>) -> CoreResult<Tensor> {
        let shape = shape::infer_shape(&shape.into(), self.num_elements())?;
        match shape::compute_view_strides(&self.shape, &self.strides, &shape) {
            Some(strides) => self.as_strided(shape, strides, 0),
            None => {
                let copy = self.contiguous()?;
                let strides = shape::default_strides(&shape);
                copy.as_strided(shape, strides, 0)
            }
        }
    }

    /// Zero-copy reshape; fails when the strides cannot express the new shape.
    pub fn view(&self, shape: impl Into<SizeVector>) -> CoreResult<Tensor> {
        let shape = shape::infer_shape(&shape.into(), self.num_elements())?;
        let strides = shape::compute_view_strides(&self.shape, &self.strides, &shape)
            .ok_or_else(|| CoreError::shape_error(
                &format!("a layout viewable as {}", shape),
                &format!("shape {} with strides {}", self.shape, self.strides),
                Some("call reshape() or contiguous() first"),
            ))?;
        self.as_strided(shape, strides, 0)
    }

    /// Python-style `[start:stop:step]` along `dim`; out-of-range bounds are clamped.
    pub fn slice(&self, dim: i64, start: i64, stop: i64, step: i64) -> CoreResult<Tensor> {
        let dim = shape::wrap_dim(dim, self.ndim(), false)?;
        if step <= 0 {
            return Err(CoreError::InvalidArgument(format!(
                "Slice step must be positive, got {}",
                step
            )));
        }
        let size = self.shape[dim];
        let mut start = if start < 0 { start + size } else { start };
        let mut stop = if stop < 0 { stop + size } else { stop };
        start = start.clamp(0, size);
        stop = stop.clamp(start, size);

        let mut new_shape = self.shape.clone();
        let mut new_strides = self.strides.clone();
        new_shape[dim] = (stop - start + step - 1) / step;
        new_strides[dim] = self.strides[dim] * step;
        self.as_strided(new_shape, new_strides, start * self.strides[dim])
    }

    /// Select one index along `dim`, dropping that dimension.
    pub fn index_extract(&self, dim: i64, index: i64) -> CoreResult<Tensor> {
        let dim = shape::wrap_dim(dim, self.ndim(), false)?;
        let size = self.shape[dim];
        let wrapped = if index < 0 { index + size } else { index };
        if wrapped < 0 || wrapped >= size {
            return Err(CoreError::IndexOutOfRange(format!(
                "Index {} out of range for dimension {} of size {}",
                index, dim, size
            )));
        }
        let mut new_shape = self.shape.clone();
        let mut new_strides = self.strides.clone();
        new_shape.remove(dim);
        new_strides.remove(dim);
        self.as_strided(new_shape, new_strides, wrapped * self.strides[dim])
    }

    pub fn transpose(&self, dim0: i64, dim1: i64) -> CoreResult<Tensor> {
        let d0 = shape::wrap_dim(dim0, self.ndim(), false)?;
        let d1 = shape::wrap_dim(dim1, self.ndim(), false)?;
        let mut new_shape = self.shape.clone();
        let mut new_strides = self.strides.clone();
        new_shape.swap(d0, d1);
        new_strides.swap(d0, d1);
        self.as_strided(new_shape, new_strides, 0)
    }

    /// Matrix transpose; 0-D and 1-D tensors are returned as they are.
    pub fn t(&self) -> CoreResult<Tensor> {
        match self.ndim() {
            0 | 1 => Ok(self.clone()),
            2 => self.transpose(0, 1),
            n => Err(CoreError::InvalidArgument(format!(
                "t() expects a tensor with <= 2 dimensions, got {}",
                n
            ))),
        }
    }

    pub fn permute(&self, dims: &[i64]) -> CoreResult<Tensor> {
        if dims.len() != self.ndim() {
            return Err(CoreError::InvalidArgument(format!(
                "Permutation {:?} does not match {} dimensions",
                dims,
                self.ndim()
            )));
        }
        let mut seen = vec![false; self.ndim()];
        let mut new_shape = SizeVector::scalar();
        let mut new_strides = SizeVector::scalar();
        for &d in dims {
            let d = shape::wrap_dim(d, self.ndim(), false)?;
            if seen[d] {
                return Err(CoreError::InvalidArgument(format!("Permutation {:?} repeats {}", dims, d)));
            }
            seen[d] = true;
            new_shape.push(self.shape[d]);
            new_strides.push(self.strides[d]);
        }
        self.as_strided(new_shape, new_strides, 0)
    }

    /// Broadcast view: stretched dimensions get stride 0.
    pub fn expand(&self, shape: impl Into<SizeVector>) -> CoreResult<Tensor> {
        let dst = shape.into();
        if !shape::is_broadcastable_to(&self.shape, &dst) {
            return Err(CoreError::shape_error(
                &format!("a shape broadcastable to {}", dst),
                &self.shape.to_string(),
                None,
            ));
        }
        let lead = dst.ndim() - self.ndim();
        let mut strides = SizeVector::filled(dst.ndim(), 0);
        for d in lead..dst.ndim() {
            let src_d = d - lead;
            if self.shape[src_d] == dst[d] {
                strides[d] = self.strides[src_d];
            }
        }
        self.as_strided(dst, strides, 0)
    }

    /// Insert a size-1 dimension at `dim` (which may equal `ndim`).
    pub fn unsqueeze(&self, dim: i64) -> CoreResult<Tensor> {
        let dim = shape::wrap_dim(dim, self.ndim(), true)?;
        let stride = if dim < self.ndim() {
            self.shape[dim] * self.strides[dim]
        } else {
            1
        };
        let mut new_shape = self.shape.clone();
        let mut new_strides = self.strides.clone();
        new_shape.insert(dim, 1);
        new_strides.insert(dim, stride);
        self.as_strided(new_shape, new_strides, 0)
    }

    /// Contiguous row-major copy that owns a fresh blob.
    pub fn deep_copy(&self) -> CoreResult<Tensor> {
        let dst = Tensor::empty(self.context(), self.shape.clone(), self.dtype, &self.device())?;
        kernels::copy(self, &dst)?;
        Ok(dst)
    }

    /// `self` when already contiguous, a row-major copy otherwise.
    pub fn contiguous(&self) -> CoreResult<Tensor> {
        if self.is_contiguous() {
            Ok(self.clone())
        } else {
            self.deep_copy()
        }
    }

    /// Convert to another dtype; returns `self` when the dtype already matches.
    pub fn to(&self, dtype: Dtype) -> CoreResult<Tensor> {
        if self.dtype == dtype {
            return Ok(self.clone());
        }
        let dst = Tensor::empty(self.context(), self.shape.clone(), dtype, &self.device())?;
        kernels::copy(self, &dst)?;
        Ok(dst)
    }

    /// Move to another device; returns `self` when already there.
    pub fn to_device(&self, device: &Device) -> CoreResult<Tensor> {
        if self.device() == *device {
            return Ok(self.clone());
        }
        let dst = Tensor::empty(self.context(), self.shape.clone(), self.dtype, device)?;
        kernels::copy(self, &dst)?;
        Ok(dst)
    }

    /// Copy `src` into this tensor, broadcasting it and converting dtype and device.
    pub fn copy_from(&mut self, src: &Tensor) -> CoreResult<()> {
        kernels::copy(src, self)
    }

    /// Set every element to `value`.
    pub fn fill(&mut self, value: impl Into<Scalar>) -> CoreResult<()> {
        kernels::fill(self, value.into())
    }
}

impl Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("dtype", &self.dtype)
            .field("device", &self.device())
            .field("byte_offset", &self.byte_offset)
            .finish()
    }
}
