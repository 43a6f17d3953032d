//! Instrument specification cache.
//!
//! Precision rarely changes, so each symbol is fetched from the venue once
//! and reused. A refresh that changes tick size or lot step is logged.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sigbot_core::{InstrumentSpec, Symbol};
use tracing::warn;

/// Spec cache entry with change tracking.
#[derive(Debug, Clone)]
pub struct SpecCacheEntry {
    pub spec: InstrumentSpec,
    pub last_update: DateTime<Utc>,
    pub version: u64,
}

/// Instrument specification cache.
#[derive(Default)]
pub struct SpecCache {
    specs: DashMap<Symbol, SpecCacheEntry>,
}

impl SpecCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get spec for a symbol.
    pub fn get(&self, symbol: &Symbol) -> Option<InstrumentSpec> {
        self.specs.get(symbol).map(|entry| entry.spec.clone())
    }

    /// Insert or refresh a spec.
    ///
    /// Returns `true` if tick size or lot step differ from the cached entry.
    pub fn update(&self, spec: InstrumentSpec) -> bool {
        let symbol = spec.symbol.clone();
        let (changed, version) = match self.specs.get(&symbol) {
            Some(existing) => {
                let changed = existing.spec.tick_size != spec.tick_size
                    || existing.spec.qty_step != spec.qty_step;
                if changed {
                    warn!(
                        %symbol,
                        old_tick = %existing.spec.tick_size,
                        new_tick = %spec.tick_size,
                        old_step = %existing.spec.qty_step,
                        new_step = %spec.qty_step,
                        "Instrument precision changed"
                    );
                }
                (changed, existing.version + 1)
            }
            None => (false, 1),
        };

        self.specs.insert(
            symbol,
            SpecCacheEntry {
                spec,
                last_update: Utc::now(),
                version,
            },
        );
        changed
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spec(tick: rust_decimal::Decimal) -> InstrumentSpec {
        InstrumentSpec {
            symbol: Symbol::new("BTCUSDT"),
            tick_size: tick,
            qty_step: dec!(0.001),
            min_qty: dec!(0.001),
        }
    }

    #[test]
    fn test_update_tracks_version_and_change() {
        let cache = SpecCache::new();
        assert!(!cache.update(spec(dec!(0.1))));
        assert!(!cache.update(spec(dec!(0.1))));
        assert!(cache.update(spec(dec!(0.5))));

        let entry = cache.specs.get(&Symbol::new("BTCUSDT")).unwrap();
        assert_eq!(entry.version, 3);
        assert_eq!(entry.spec.tick_size, dec!(0.5));
    }

    #[test]
    fn test_get_missing() {
        let cache = SpecCache::new();
        assert!(cache.get(&Symbol::new("ETHUSDT")).is_none());
        assert!(cache.is_empty());
    }
}
