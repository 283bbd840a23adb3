//! Simulation settings.
//!
//! A [`Config`] is plain data: drivers build one (from defaults, a JSON
//! file, command-line flags, or all three) and hand it to
//! [`Simulation::new`]. The simulation validates every change before
//! applying it, so an invalid value never reaches the engine.

use crate::helpe::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Total memory, in KB.
    pub memory_kb:      Kilobytes,
    /// Allocation granularity, in KB.
    pub block_kb:       Kilobytes,
    pub strategy:       Strategy,
    /// Ticks per second requested by the driver. The engine itself never
    /// sleeps; it only uses this to space out generated processes.
    pub speed:          u32,
    /// Round-robin quantum, in ticks of CPU.
    pub quantum:        Ticks,
    /// Ticks lost every time the CPU changes hands.
    pub switch_cost:    Ticks,
    /// Chance, per executed tick, that the running process blocks on I/O.
    pub io_probability: f64,
    pub io_block_min:   Ticks,
    pub io_block_max:   Ticks,
    pub auto_generate:  bool,
    /// Entries kept by the event log.
    pub log_capacity:   usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_kb:      1024,
            block_kb:       16,
            strategy:       Strategy::FirstFit,
            speed:          5,
            quantum:        6,
            switch_cost:    0,
            io_probability: 0.06,
            io_block_min:   2,
            io_block_max:   6,
            auto_generate:  false,
            log_capacity:   200,
        }
    }
}

// Random draws work on signed integers.
const MAX_IO_BLOCK: Ticks = i64::MAX as Ticks;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("memory size must be positive")]
    ZeroMemory,
    #[error("block size must be positive")]
    ZeroBlock,
    #[error("block size ({block_kb}KB) exceeds total memory ({memory_kb}KB)")]
    BlockTooLarge {
        block_kb:   Kilobytes,
        memory_kb:  Kilobytes,
    },
    #[error("quantum must be at least one tick")]
    ZeroQuantum,
    #[error("speed must be at least one tick per second")]
    ZeroSpeed,
    #[error("I/O probability {0} is outside [0, 1]")]
    BadProbability(f64),
    #[error("I/O block range [{min}, {max}] is empty or starts at zero")]
    BadIoRange {
        min:    Ticks,
        max:    Ticks,
    },
    #[error("I/O block duration of {0} ticks is too long (at most {max})", max = MAX_IO_BLOCK)]
    IoBlockTooLong(Ticks),
    #[error("event log must keep at least one entry")]
    ZeroLogCapacity,
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Config {
    /// Checks every field against the ranges the engine supports.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_kb == 0 {
            return Err(ConfigError::ZeroMemory);
        }
        if self.block_kb == 0 {
            return Err(ConfigError::ZeroBlock);
        }
        if self.block_kb > self.memory_kb {
            return Err(ConfigError::BlockTooLarge {
                block_kb:   self.block_kb,
                memory_kb:  self.memory_kb,
            });
        }
        if self.quantum == 0 {
            return Err(ConfigError::ZeroQuantum);
        }
        if self.speed == 0 {
            return Err(ConfigError::ZeroSpeed);
        }
        // Written so that NaN fails too.
        if !(0.0..=1.0).contains(&self.io_probability) {
            return Err(ConfigError::BadProbability(self.io_probability));
        }
        if self.io_block_min == 0 || self.io_block_min > self.io_block_max {
            return Err(ConfigError::BadIoRange {
                min:    self.io_block_min,
                max:    self.io_block_max,
            });
        }
        if self.io_block_max > MAX_IO_BLOCK {
            return Err(ConfigError::IoBlockTooLong(self.io_block_max));
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::ZeroLogCapacity);
        }

        Ok(())
    }

    /// Number of whole blocks this configuration yields.
    pub fn total_blocks(&self) -> usize {
        if self.block_kb == 0 { 0 } else { self.memory_kb / self.block_kb }
    }

    /// Parses a JSON object. Missing fields keep their defaults; unknown
    /// ones are rejected. The result is validated.
    pub fn from_json_str(src: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(src)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        Self::from_json_str(&src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.total_blocks(), 64);
    }

    fn rejects(breakage: impl FnOnce(&mut Config)) -> ConfigError {
        let mut config = Config::default();
        breakage(&mut config);
        config.validate().unwrap_err()
    }

    #[test]
    fn each_rule_is_enforced() {
        assert!(matches!(rejects(|c| c.memory_kb = 0), ConfigError::ZeroMemory));
        assert!(matches!(rejects(|c| c.block_kb = 0), ConfigError::ZeroBlock));
        assert!(matches!(rejects(|c| c.block_kb = 2048), ConfigError::BlockTooLarge { .. }));
        assert!(matches!(rejects(|c| c.quantum = 0), ConfigError::ZeroQuantum));
        assert!(matches!(rejects(|c| c.speed = 0), ConfigError::ZeroSpeed));
        assert!(matches!(rejects(|c| c.io_probability = 1.5), ConfigError::BadProbability(_)));
        assert!(matches!(rejects(|c| c.io_probability = f64::NAN), ConfigError::BadProbability(_)));
        assert!(matches!(rejects(|c| c.io_block_min = 0), ConfigError::BadIoRange { .. }));
        assert!(matches!(rejects(|c| c.io_block_min = 9), ConfigError::BadIoRange { min: 9, max: 6 }));
        assert!(matches!(rejects(|c| c.io_block_max = Ticks::MAX), ConfigError::IoBlockTooLong(Ticks::MAX)));
        assert!(matches!(rejects(|c| c.log_capacity = 0), ConfigError::ZeroLogCapacity));
    }

    #[test]
    fn longest_io_block_still_draws_a_range() {
        let mut config = Config { io_block_max: MAX_IO_BLOCK, ..Config::default() };
        assert!(config.validate().is_ok());
        config.io_block_max += 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = Config::from_json_str(
            r#"{ "memoryKb": 64, "blockKb": 16, "strategy": "worstFit", "switchCost": 2 }"#
        ).unwrap();
        assert_eq!(config.memory_kb, 64);
        assert_eq!(config.strategy, Strategy::WorstFit);
        assert_eq!(config.switch_cost, 2);
        assert_eq!(config.quantum, Config::default().quantum);
    }

    #[test]
    fn bad_json_is_reported() {
        assert!(matches!(
            Config::from_json_str(r#"{ "memoryKb": 64, "colour": "green" }"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{ "quantum": 0 }"#),
            Err(ConfigError::ZeroQuantum)
        ));
        assert!(matches!(
            Config::from_json_path("/definitely/not/here.json"),
            Err(ConfigError::Read { .. })
        ));
    }
}
