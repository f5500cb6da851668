//! Device identification: CPU or an indexed accelerator

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Cpu,
    Cuda,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Cpu => "CPU",
            DeviceType::Cuda => "CUDA",
        }
    }
}

impl FromStr for DeviceType {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CPU" => Ok(DeviceType::Cpu),
            "CUDA" => Ok(DeviceType::Cuda),
            _ => Err(CoreError::InvalidArgument(format!("Unknown device type '{}'", s))),
        }
    }
}

/// A compute target. The CPU is always `CPU:0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Device {
    device_type: DeviceType,
    id: usize,
}

impl Device {
    pub fn new(device_type: DeviceType, id: usize) -> CoreResult<Self> {
        if device_type == DeviceType::Cpu && id != 0 {
            return Err(CoreError::InvalidArgument(format!(
                "CPU has device id 0, but got {}",
                id
            )));
        }
        Ok(Self { device_type, id })
    }

    pub const fn cpu() -> Self {
        Self {
            device_type: DeviceType::Cpu,
            id: 0,
        }
    }

    pub const fn cuda(id: usize) -> Self {
        Self {
            device_type: DeviceType::Cuda,
            id,
        }
    }

    /// Parse `"TYPE:ID"`; the type token is case-insensitive.
    pub fn parse(s: &str) -> CoreResult<Self> {
        let (type_token, id_token) = s.split_once(':').ok_or_else(|| {
            CoreError::InvalidArgument(format!("Invalid device string '{}', expected TYPE:ID", s))
        })?;
        let device_type = type_token.trim().parse::<DeviceType>()?;
        let id = id_token.trim().parse::<usize>().map_err(|_| {
            CoreError::InvalidArgument(format!("Invalid device id in '{}'", s))
        })?;
        Self::new(device_type, id)
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_cpu(&self) -> bool {
        self.device_type == DeviceType::Cpu
    }

    pub fn is_cuda(&self) -> bool {
        self.device_type == DeviceType::Cuda
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::cpu()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device_type.as_str(), self.id)
    }
}

impl FromStr for Device {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Device::parse(s)
    }
}

impl PartialOrd for Device {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Device {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl Serialize for Device {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Device {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Device::parse(&s).map_err(serde::de::Error::custom)
    }
}
