//! Scalar element types

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtypeCode {
    Undefined,
    Bool,
    Int,
    UInt,
    Float,
    Object,
}

/// Runtime tag of a tensor element type: a code plus a byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dtype {
    code: DtypeCode,
    byte_size: usize,
    name: &'static str,
}

impl Dtype {
    pub const UNDEFINED: Dtype = Dtype::new(DtypeCode::Undefined, 1, "Undefined");
    pub const BOOL: Dtype = Dtype::new(DtypeCode::Bool, 1, "Bool");
    pub const INT8: Dtype = Dtype::new(DtypeCode::Int, 1, "Int8");
    pub const INT16: Dtype = Dtype::new(DtypeCode::Int, 2, "Int16");
    pub const INT32: Dtype = Dtype::new(DtypeCode::Int, 4, "Int32");
    pub const INT64: Dtype = Dtype::new(DtypeCode::Int, 8, "Int64");
    pub const UINT8: Dtype = Dtype::new(DtypeCode::UInt, 1, "UInt8");
    pub const UINT16: Dtype = Dtype::new(DtypeCode::UInt, 2, "UInt16");
    pub const UINT32: Dtype = Dtype::new(DtypeCode::UInt, 4, "UInt32");
    pub const UINT64: Dtype = Dtype::new(DtypeCode::UInt, 8, "UInt64");
    pub const FLOAT32: Dtype = Dtype::new(DtypeCode::Float, 4, "Float32");
    pub const FLOAT64: Dtype = Dtype::new(DtypeCode::Float, 8, "Float64");

    /// Every defined dtype of the catalog, `UNDEFINED` excluded.
    pub const CATALOG: [Dtype; 11] = [
        Dtype::BOOL,
        Dtype::INT8,
        Dtype::INT16,
        Dtype::INT32,
        Dtype::INT64,
        Dtype::UINT8,
        Dtype::UINT16,
        Dtype::UINT32,
        Dtype::UINT64,
        Dtype::FLOAT32,
        Dtype::FLOAT64,
    ];

    const fn new(code: DtypeCode, byte_size: usize, name: &'static str) -> Self {
        Self { code, byte_size, name }
    }

    /// Opaque fixed-size element, copied byte-wise by kernels.
    pub fn object(byte_size: usize) -> CoreResult<Self> {
        if byte_size == 0 {
            return Err(CoreError::InvalidArgument(
                "Object dtype must have a positive byte size".to_string(),
            ));
        }
        Ok(Self::new(DtypeCode::Object, byte_size, "Object"))
    }

    /// Parse a catalog name or the `Object(N)` form produced by `Display`.
    pub fn from_name(name: &str) -> CoreResult<Self> {
        if let Some(size) = name
            .strip_prefix("Object(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let byte_size = size
                .trim()
                .parse::<usize>()
                .map_err(|_| CoreError::InvalidArgument(format!("Unknown dtype '{}'", name)))?;
            return Dtype::object(byte_size);
        }
        Dtype::CATALOG
            .iter()
            .copied()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CoreError::InvalidArgument(format!("Unknown dtype '{}'", name)))
    }

    pub const fn code(&self) -> DtypeCode {
        self.code
    }

    pub const fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn is_float(&self) -> bool {
        matches!(self.code, DtypeCode::Float)
    }

    /// Signed or unsigned integer
    pub const fn is_int(&self) -> bool {
        matches!(self.code, DtypeCode::Int | DtypeCode::UInt)
    }

    pub const fn is_uint(&self) -> bool {
        matches!(self.code, DtypeCode::UInt)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self.code, DtypeCode::Bool)
    }

    pub const fn is_object(&self) -> bool {
        matches!(self.code, DtypeCode::Object)
    }

    pub const fn is_numeric(&self) -> bool {
        self.is_float() || self.is_int()
    }

    pub const fn is_defined(&self) -> bool {
        !matches!(self.code, DtypeCode::Undefined)
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_object() {
            write!(f, "Object({})", self.byte_size)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl Serialize for Dtype {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dtype {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Dtype::from_name(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_sizes() {
        for dtype in Dtype::CATALOG {
            assert!(dtype.byte_size() > 0);
        }
        assert_eq!(Dtype::UNDEFINED.byte_size(), 1);
        assert_eq!(Dtype::FLOAT64.byte_size(), 8);
        assert_eq!(Dtype::UINT16.byte_size(), 2);
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Dtype::from_name("float32").unwrap(), Dtype::FLOAT32);
        assert_ne!(Dtype::INT32, Dtype::UINT32);
        assert_ne!(Dtype::INT32, Dtype::FLOAT32);
        assert_eq!(Dtype::object(12).unwrap(), Dtype::object(12).unwrap());
        assert_ne!(Dtype::object(12).unwrap(), Dtype::object(16).unwrap());
    }

    #[test]
    fn test_categories() {
        assert!(Dtype::FLOAT32.is_float());
        assert!(Dtype::INT8.is_int());
        assert!(Dtype::UINT64.is_uint());
        assert!(!Dtype::BOOL.is_numeric());
        assert!(!Dtype::UNDEFINED.is_defined());
        assert!(Dtype::object(3).unwrap().is_object());
        assert!(Dtype::object(0).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Dtype::INT64.to_string(), "Int64");
        assert_eq!(Dtype::object(24).unwrap().to_string(), "Object(24)");
    }

    #[test]
    fn test_serde_keeps_object_size() {
        let object = Dtype::object(24).unwrap();
        let json = serde_json::to_string(&object).unwrap();
        assert_eq!(json, "\"Object(24)\"");
        assert_eq!(serde_json::from_str::<Dtype>(&json).unwrap(), object);
        assert_eq!(serde_json::from_str::<Dtype>("\"Float32\"").unwrap(), Dtype::FLOAT32);
        assert!(Dtype::from_name("Object(0)").is_err());
        assert!(Dtype::from_name("Object(x)").is_err());
    }
}
