//! Decoded wave payload: a typed, axis-scaled, column-major array.

use std::path::PathBuf;

use serde::Serialize;

use crate::endian::ByteOrder;
use crate::error::{IgorError, Result};
use crate::format::{ElementType, FormatVersion, MAX_DIMS};
use crate::note::NoteMap;

/// One complex element, real part first as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

/// A Rust type that can be the element of a [`TypedArray`].
pub trait Element: Copy + PartialEq + std::fmt::Debug {
    const TYPE: ElementType;

    /// Decode one element from host-order bytes.
    fn read_ne(bytes: &[u8]) -> Self;

    /// Append this element as host-order bytes.
    fn write_ne(self, out: &mut Vec<u8>);
}

macro_rules! real_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const TYPE: ElementType = ElementType::$variant;

            fn read_ne(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_ne_bytes(raw)
            }

            fn write_ne(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

macro_rules! complex_element {
    ($t:ty, $variant:ident) => {
        impl Element for Complex<$t> {
            const TYPE: ElementType = ElementType::$variant;

            fn read_ne(bytes: &[u8]) -> Self {
                let n = std::mem::size_of::<$t>();
                Complex {
                    re: <$t as Element>::read_ne(&bytes[..n]),
                    im: <$t as Element>::read_ne(&bytes[n..2 * n]),
                }
            }

            fn write_ne(self, out: &mut Vec<u8>) {
                self.re.write_ne(out);
                self.im.write_ne(out);
            }
        }
    };
}

real_element!(i8, Int8);
real_element!(u8, UInt8);
real_element!(i16, Int16);
real_element!(u16, UInt16);
real_element!(i32, Int32);
real_element!(u32, UInt32);
real_element!(f32, Float32);
real_element!(f64, Float64);

complex_element!(f32, Complex64);
complex_element!(f64, Complex128);
complex_element!(i8, ComplexInt8);
complex_element!(u8, ComplexUInt8);
complex_element!(i16, ComplexInt16);
complex_element!(u16, ComplexUInt16);
complex_element!(i32, ComplexInt32);
complex_element!(u32, ComplexUInt32);

/// Affine index-to-value map of one dimension: `value = delta * index + offset`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisScale {
    pub delta: f64,
    pub offset: f64,
    pub units: String,
    /// Per-index labels, when the file carries any.
    pub labels: Vec<String>,
}

impl Default for AxisScale {
    fn default() -> Self {
        Self {
            delta: 1.0,
            offset: 0.0,
            units: String::new(),
            labels: Vec::new(),
        }
    }
}

impl AxisScale {
    pub fn new(delta: f64, offset: f64) -> Self {
        Self {
            delta,
            offset,
            ..Self::default()
        }
    }

    pub fn value(&self, index: usize) -> f64 {
        self.delta * index as f64 + self.offset
    }
}

/// Where a decoded array came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub version: FormatVersion,
    pub byte_order: ByteOrder,
    /// Raw note text, `\r` line ends converted to `\n`.
    pub note: String,
    pub formula: String,
    /// Igor timestamps, seconds since 1904-01-01.
    pub creation_date: u32,
    pub mod_date: u32,
    /// `(top, bottom)` when the wave declares valid full-scale bounds.
    pub full_scale: Option<(f64, f64)>,
    pub path: Option<PathBuf>,
}

/// A numeric wave held as host-order bytes in column-major element order.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray {
    pub name: String,
    /// Extent per dimension, at most [`MAX_DIMS`] entries.
    pub shape: Vec<usize>,
    pub element_type: ElementType,
    data: Vec<u8>,
    /// One scale per dimension.
    pub axes: Vec<AxisScale>,
    /// Units of the element values.
    pub units: String,
    pub info: NoteMap,
    pub source: Option<SourceInfo>,
}

impl TypedArray {
    /// Wrap host-order bytes. The byte count must match the shape exactly.
    pub fn from_bytes(element_type: ElementType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        if shape.len() > MAX_DIMS {
            return Err(IgorError::format(format!(
                "{} dimensions requested, at most {MAX_DIMS} supported",
                shape.len()
            )));
        }
        let points = element_count(&shape)?;
        let expected = points
            .checked_mul(element_type.size())
            .ok_or_else(|| IgorError::format("array byte size overflows"))?;
        if data.len() != expected {
            return Err(IgorError::SizeMismatch {
                declared: data.len(),
                points,
                expected,
            });
        }
        let axes = vec![AxisScale::default(); shape.len()];
        Ok(Self {
            name: String::new(),
            shape,
            element_type,
            data,
            axes,
            units: String::new(),
            info: NoteMap::new(),
            source: None,
        })
    }

    /// Build from elements already in column-major order.
    pub fn from_vec<T: Element>(shape: Vec<usize>, values: Vec<T>) -> Result<Self> {
        let mut data = Vec::with_capacity(values.len() * T::TYPE.size());
        for v in values {
            v.write_ne(&mut data);
        }
        Self::from_bytes(T::TYPE, shape, data)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn set_scale(&mut self, dim: usize, delta: f64, offset: f64) {
        if let Some(axis) = self.axes.get_mut(dim) {
            axis.delta = delta;
            axis.offset = offset;
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len() / self.element_type.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Copy the elements out as `T`, which must match the element type.
    pub fn values<T: Element>(&self) -> Result<Vec<T>> {
        if T::TYPE != self.element_type {
            return Err(IgorError::format(format!(
                "array holds {} elements, not {}",
                self.element_type.name(),
                T::TYPE.name()
            )));
        }
        Ok(self
            .data
            .chunks_exact(self.element_type.size())
            .map(T::read_ne)
            .collect())
    }

    /// Column-major flat index of `index`, or `None` if out of bounds.
    pub fn flat_index(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        let mut stride = 1;
        for (&i, &n) in index.iter().zip(&self.shape) {
            if i >= n {
                return None;
            }
            flat += i.checked_mul(stride)?;
            stride = stride.checked_mul(n)?;
        }
        Some(flat)
    }

    /// Value at `index` as `f64`. `None` for complex arrays or out-of-bounds
    /// indices.
    pub fn get_f64(&self, index: &[usize]) -> Option<f64> {
        if self.element_type.is_complex() {
            return None;
        }
        let flat = self.flat_index(index)?;
        let size = self.element_type.size();
        Some(scalar_f64(
            self.element_type,
            &self.data[flat * size..(flat + 1) * size],
        ))
    }

    /// All values as `f64` in storage order. `None` for complex arrays.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        if self.element_type.is_complex() {
            return None;
        }
        Some(
            self.data
                .chunks_exact(self.element_type.size())
                .map(|b| scalar_f64(self.element_type, b))
                .collect(),
        )
    }

    /// Every scalar component as `f64` in storage order; complex elements
    /// contribute `re` then `im`.
    pub fn components_f64(&self) -> Vec<f64> {
        let component = self.element_type.component();
        self.data
            .chunks_exact(component.size())
            .map(|b| scalar_f64(component, b))
            .collect()
    }

    /// Scaled axis value of `index` along `dim`.
    pub fn axis_value(&self, dim: usize, index: usize) -> Option<f64> {
        self.axes.get(dim).map(|a| a.value(index))
    }
}

/// Product of the extents in `shape`; a format error if it overflows.
pub fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or_else(|| IgorError::format(format!("dimension product of {shape:?} overflows")))
}

fn scalar_f64(ty: ElementType, b: &[u8]) -> f64 {
    match ty {
        ElementType::Int8 => i8::read_ne(b) as f64,
        ElementType::UInt8 => u8::read_ne(b) as f64,
        ElementType::Int16 => i16::read_ne(b) as f64,
        ElementType::UInt16 => u16::read_ne(b) as f64,
        ElementType::Int32 => i32::read_ne(b) as f64,
        ElementType::UInt32 => u32::read_ne(b) as f64,
        ElementType::Float32 => f32::read_ne(b) as f64,
        ElementType::Float64 => f64::read_ne(b),
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_major_addressing() {
        // 2 x 3, column-major: (0,0) (1,0) (0,1) (1,1) (0,2) (1,2)
        let a = TypedArray::from_vec(vec![2, 3], vec![0i16, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(a.get_f64(&[1, 0]), Some(1.0));
        assert_eq!(a.get_f64(&[0, 2]), Some(4.0));
        assert_eq!(a.get_f64(&[1, 2]), Some(5.0));
        assert_eq!(a.get_f64(&[2, 0]), None);
        assert_eq!(a.get_f64(&[0]), None);
    }

    #[test]
    fn complex_values_round_trip() {
        let v = vec![Complex::new(1.0f32, -1.0), Complex::new(0.5, 2.0)];
        let a = TypedArray::from_vec(vec![2], v.clone()).unwrap();
        assert_eq!(a.element_type, ElementType::Complex64);
        assert_eq!(a.as_bytes().len(), 16);
        assert_eq!(a.values::<Complex<f32>>().unwrap(), v);
        assert!(a.to_f64().is_none());
        assert_eq!(a.components_f64(), vec![1.0, -1.0, 0.5, 2.0]);
    }

    #[test]
    fn wrong_element_type_is_rejected() {
        let a = TypedArray::from_vec(vec![3], vec![1u8, 2, 3]).unwrap();
        assert!(a.values::<i8>().is_err());
        assert_eq!(a.to_f64().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn shape_must_match_data() {
        let err = TypedArray::from_vec(vec![2, 2], vec![1.0f64; 3]).unwrap_err();
        assert!(matches!(err, IgorError::SizeMismatch { points: 4, .. }));
        assert!(TypedArray::from_vec(vec![1, 1, 1, 1, 1], vec![0u8]).is_err());
    }

    #[test]
    fn overflowing_shapes_are_rejected() {
        let err = TypedArray::from_bytes(ElementType::Float64, vec![usize::MAX, 2], Vec::new())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Format);
        let err = TypedArray::from_bytes(ElementType::Float64, vec![usize::MAX / 2], Vec::new())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Format);
        assert_eq!(element_count(&[3, 0, 7]).unwrap(), 0);
    }

    #[test]
    fn axis_scale_is_affine() {
        let mut a = TypedArray::from_vec(vec![4], vec![0.0f64; 4]).unwrap();
        a.set_scale(0, 0.5, -1.0);
        assert_eq!(a.axis_value(0, 2), Some(0.0));
        assert_eq!(a.axis_value(1, 0), None);
    }
}
