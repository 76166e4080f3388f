//! Allow-listed test parameters.
//!
//! Clients tune a test through the query string. Each option accepts only a
//! fixed set of string values; anything else falls back to the default
//! rather than being rejected.

use std::collections::HashMap;
use std::time::Duration;

/// One tunable parameter with its default and accepted values.
#[derive(Debug)]
pub struct TestOption {
    pub name: &'static str,
    pub default: &'static str,
    pub allowed: &'static [&'static str],
}

/// Options shared by the download and upload tests.
pub static TEST_OPTIONS: [TestOption; 3] = [
    TestOption {
        name: "size",
        default: "50",
        allowed: &["5", "10", "20", "50", "100", "200", "300", "400", "500"],
    },
    TestOption {
        name: "chunk",
        default: "16",
        allowed: &["2", "4", "8", "16", "32", "64"],
    },
    TestOption {
        name: "duration",
        default: "10",
        allowed: &["5", "10", "15", "20", "25", "30"],
    },
];

/// Extra time granted beyond the requested test duration.
const DEADLINE_MARGIN_SECS: u64 = 2;

/// Resolve every option in `table` against the supplied parameters.
///
/// First pass keeps supplied values that are allow-listed, second pass fills
/// the rest with defaults, so the result always has one entry per option.
pub fn resolve(
    table: &'static [TestOption],
    params: &HashMap<String, String>,
) -> HashMap<&'static str, u64> {
    let mut resolved = HashMap::with_capacity(table.len());

    for option in table {
        if let Some(value) = params.get(option.name) {
            if option.allowed.contains(&value.as_str()) {
                if let Ok(parsed) = value.parse() {
                    resolved.insert(option.name, parsed);
                }
            }
        }
    }

    for option in table {
        resolved
            .entry(option.name)
            .or_insert_with(|| option.default.parse().unwrap_or_default());
    }

    resolved
}

/// Resolved parameters for one bandwidth test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestOptions {
    pub size_mb: u64,
    pub chunk_kb: u64,
    pub duration_secs: u64,
}

impl TestOptions {
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let resolved = resolve(&TEST_OPTIONS, params);
        let value = |name: &str| resolved.get(name).copied().unwrap_or_default();

        TestOptions {
            size_mb: value("size"),
            chunk_kb: value("chunk"),
            duration_secs: value("duration"),
        }
    }

    /// Payload size in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.size_mb * 1024 * 1024
    }

    /// Chunk size in bytes.
    pub fn chunk_bytes(&self) -> usize {
        (self.chunk_kb * 1024) as usize
    }

    /// Transfer deadline: the requested duration plus a small margin.
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.duration_secs + DEADLINE_MARGIN_SECS)
    }
}
