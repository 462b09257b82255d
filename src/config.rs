use std::collections::HashMap;
use std::env;

use anyhow::Context;

use crate::pricing::{InstanceFamily, ThresholdPolicy};
use crate::provider::PriceFilter;

/// Ceiling applied to every record in the CPU preset.
const CPU_MAX_PRICE: f64 = 1.2;
/// CPU instance types worth bidding on.
const CPU_INSTANCE_TYPES: [&str; 2] = ["c8g.48xlarge", "c8g.metal-48xl"];

/// Acceptable price per GPU hour in the GPU preset.
const MAX_PRICE_PER_GPU_HOUR: f64 = 0.49;
/// g6e outperforms g5 by this factor, so a g5 GPU hour is worth
/// proportionally less.
const G6E_G5_PERF_RATIO: f64 = 2.35;

const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// The two scan presets, each pairing a query filter with the matching
/// threshold policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Exact allow-list of CPU instance types under a flat ceiling.
    Cpu,
    /// Family-wildcard GPU query under a per-GPU-hour ceiling.
    Gpu,
}

impl ScanMode {
    pub fn config(self) -> ScanConfig {
        match self {
            ScanMode::Cpu => ScanConfig {
                filter: PriceFilter::InstanceTypes(
                    CPU_INSTANCE_TYPES.iter().map(|s| s.to_string()).collect(),
                ),
                policy: ThresholdPolicy::Flat {
                    ceiling: CPU_MAX_PRICE,
                },
                channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            },
            ScanMode::Gpu => ScanConfig {
                filter: PriceFilter::FamilyPrefixes(InstanceFamily::ALL.to_vec()),
                policy: ThresholdPolicy::PerUnitScaled {
                    per_unit_rate: MAX_PRICE_PER_GPU_HOUR,
                    family_ratios: HashMap::from([(InstanceFamily::G5, G6E_G5_PERF_RATIO)]),
                },
                channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            },
        }
    }
}

/// Everything one scan run needs besides the provider itself.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub filter: PriceFilter,
    pub policy: ThresholdPolicy,
    pub channel_capacity: usize,
}

impl ScanConfig {
    /// Resolves the configuration from the environment.
    ///
    /// `SCAN_MODE` selects the preset (`cpu`, the default, or `gpu`);
    /// `SPOT_CHANNEL_CAPACITY` overrides the fan-in channel's bound.
    ///
    /// # Errors
    /// Returns an error for an unrecognized mode or an unparseable
    /// capacity.
    pub fn from_env() -> anyhow::Result<Self> {
        let mode = match env::var("SCAN_MODE").as_deref() {
            Ok("gpu") => ScanMode::Gpu,
            Ok("cpu") | Err(_) => ScanMode::Cpu,
            Ok(other) => anyhow::bail!("unrecognized SCAN_MODE {:?} (expected cpu or gpu)", other),
        };

        let mut config = mode.config();
        if let Ok(capacity) = env::var("SPOT_CHANNEL_CAPACITY") {
            config.channel_capacity = capacity
                .parse()
                .with_context(|| format!("invalid SPOT_CHANNEL_CAPACITY {:?}", capacity))?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_preset() {
        let config = ScanMode::Cpu.config();
        assert!(matches!(
            &config.filter,
            PriceFilter::InstanceTypes(types) if types.len() == 2
        ));
        assert!(matches!(
            config.policy,
            ThresholdPolicy::Flat { ceiling } if ceiling == CPU_MAX_PRICE
        ));
    }

    #[test]
    fn test_gpu_preset() {
        let config = ScanMode::Gpu.config();
        assert!(matches!(
            &config.filter,
            PriceFilter::FamilyPrefixes(families) if families.len() == 2
        ));
        match &config.policy {
            ThresholdPolicy::PerUnitScaled {
                per_unit_rate,
                family_ratios,
            } => {
                assert_eq!(*per_unit_rate, MAX_PRICE_PER_GPU_HOUR);
                assert_eq!(family_ratios.get(&InstanceFamily::G5), Some(&G6E_G5_PERF_RATIO));
                assert_eq!(family_ratios.get(&InstanceFamily::G6e), None);
            }
            other => panic!("unexpected policy {:?}", other),
        }
    }
}
