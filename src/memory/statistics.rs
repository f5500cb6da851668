//! Per-device allocation bookkeeping and leak detection

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::tensor::Device;

/// Allocation counters for one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMemoryRecord {
    pub count_malloc: u64,
    pub count_free: u64,
    pub live_bytes: usize,
    pub peak_bytes: usize,
    pub total_bytes: usize,
}

impl DeviceMemoryRecord {
    pub fn has_leaks(&self) -> bool {
        self.count_malloc != self.count_free || self.live_bytes != 0
    }
}

/// Memory usage statistics owned by one memory manager
#[derive(Debug, Default)]
pub struct MemoryStatistic {
    records: Mutex<HashMap<Device, DeviceMemoryRecord>>,
}

impl MemoryStatistic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_malloc(&self, device: &Device, byte_size: usize) {
        if byte_size == 0 {
            return;
        }
        let mut records = self.records.lock();
        let record = records.entry(*device).or_default();
        record.count_malloc += 1;
        record.live_bytes += byte_size;
        record.total_bytes += byte_size;
        record.peak_bytes = record.peak_bytes.max(record.live_bytes);
    }

    pub fn count_free(&self, device: &Device, byte_size: usize) {
        if byte_size == 0 {
            return;
        }
        let mut records = self.records.lock();
        let record = records.entry(*device).or_default();
        record.count_free += 1;
        record.live_bytes = record.live_bytes.saturating_sub(byte_size);
    }

    pub fn record(&self, device: &Device) -> DeviceMemoryRecord {
        self.records.lock().get(device).cloned().unwrap_or_default()
    }

    pub fn has_leaks(&self) -> bool {
        self.records.lock().values().any(DeviceMemoryRecord::has_leaks)
    }

    /// Emit one summary event per device; leaking devices are reported as warnings.
    pub fn log_summary(&self) {
        let records = self.records.lock();
        let mut devices: Vec<_> = records.keys().copied().collect();
        devices.sort();
        for device in devices {
            let record = &records[&device];
            if record.has_leaks() {
                tracing::warn!(
                    %device,
                    count_malloc = record.count_malloc,
                    count_free = record.count_free,
                    live_bytes = record.live_bytes,
                    "memory leak detected"
                );
            } else {
                tracing::debug!(
                    %device,
                    count_malloc = record.count_malloc,
                    peak_bytes = record.peak_bytes,
                    total_bytes = record.total_bytes,
                    "memory statistics"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_peak() {
        let stats = MemoryStatistic::new();
        let cpu = Device::cpu();
        stats.count_malloc(&cpu, 100);
        stats.count_malloc(&cpu, 50);
        stats.count_free(&cpu, 100);

        let record = stats.record(&cpu);
        assert_eq!(record.count_malloc, 2);
        assert_eq!(record.count_free, 1);
        assert_eq!(record.live_bytes, 50);
        assert_eq!(record.peak_bytes, 150);
        assert!(stats.has_leaks());

        stats.count_free(&cpu, 50);
        assert!(!stats.has_leaks());
    }

    #[test]
    fn test_zero_sized_requests_are_ignored() {
        let stats = MemoryStatistic::new();
        stats.count_malloc(&Device::cpu(), 0);
        assert_eq!(stats.record(&Device::cpu()), DeviceMemoryRecord::default());
    }
}
