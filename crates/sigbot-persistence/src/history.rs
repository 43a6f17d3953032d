//! JSON Lines trade history.
//!
//! One completed trade per line in `{dir}/trades.jsonl`, opened in append
//! mode. A corrupt line only loses that record: readers skip it with a
//! warning.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigbot_core::{Price, Side, Symbol};
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, PersistenceResult};

const HISTORY_FILE: &str = "trades.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeReason {
    TakeProfit,
    StopLoss,
    Cancel,
}

impl fmt::Display for TradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TakeProfit => write!(f, "TakeProfit"),
            Self::StopLoss => write!(f, "StopLoss"),
            Self::Cancel => write!(f, "Cancel"),
        }
    }
}

/// A completed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub closed_at: DateTime<Utc>,
    pub symbol: Symbol,
    pub side: Side,
    /// Quote balance read right after the close.
    pub balance: Decimal,
    pub reason: TradeReason,
    pub entry_price: Price,
    pub exit_price: Price,
}

/// Destination for completed trades.
pub trait TradeSink: Send + Sync {
    fn record(&self, record: TradeRecord) -> PersistenceResult<()>;
}

/// Append-only trade log.
pub struct TradeLog {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl TradeLog {
    /// Open (or create) the log under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> PersistenceResult<Self> {
        std::fs::create_dir_all(dir.as_ref())
            .map_err(|e| PersistenceError::io(dir.as_ref(), e))?;
        let path = dir.as_ref().join(HISTORY_FILE);
        info!(path = %path.display(), "Trade history opened");
        Ok(Self {
            path,
            writer: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every readable record, oldest first.
    pub fn all(&self) -> PersistenceResult<Vec<TradeRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(&self.path, e)),
        };

        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| PersistenceError::io(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TradeRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = idx + 1, error = %e, "Skipping corrupt history line"),
            }
        }
        Ok(records)
    }

    pub fn last(&self) -> PersistenceResult<Option<TradeRecord>> {
        Ok(self.all()?.pop())
    }

    /// The newest `n` records, oldest first.
    pub fn recent(&self, n: usize) -> PersistenceResult<Vec<TradeRecord>> {
        let mut records = self.all()?;
        let start = records.len().saturating_sub(n);
        Ok(records.split_off(start))
    }

    /// Records closed within `window` of `now`.
    pub fn since(&self, window: Duration, now: DateTime<Utc>) -> PersistenceResult<Vec<TradeRecord>> {
        let cutoff = now - window;
        Ok(self
            .all()?
            .into_iter()
            .filter(|r| r.closed_at >= cutoff)
            .collect())
    }

    fn append(&self, record: &TradeRecord) -> PersistenceResult<()> {
        let mut guard = self.writer.lock();
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| PersistenceError::io(&self.path, e))?;
            *guard = Some(BufWriter::new(file));
        }
        if let Some(writer) = guard.as_mut() {
            let json = serde_json::to_string(record)?;
            writeln!(writer, "{json}")
                .and_then(|()| writer.flush())
                .map_err(|e| PersistenceError::io(&self.path, e))?;
        }
        Ok(())
    }
}

impl TradeSink for TradeLog {
    fn record(&self, record: TradeRecord) -> PersistenceResult<()> {
        self.append(&record)?;
        debug!(
            symbol = %record.symbol,
            side = %record.side,
            reason = %record.reason,
            balance = %record.balance,
            "Trade recorded"
        );
        Ok(())
    }
}

impl Drop for TradeLog {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.get_mut().as_mut() {
            if let Err(e) = writer.flush() {
                warn!(?e, "Failed to flush trade history on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn record(balance: Decimal, reason: TradeReason, closed_at: DateTime<Utc>) -> TradeRecord {
        TradeRecord {
            closed_at,
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Long,
            balance,
            reason,
            entry_price: Price::new(dec!(100)),
            exit_price: Price::new(dec!(102)),
        }
    }

    #[test]
    fn test_record_and_read_back() {
        let dir = TempDir::new().unwrap();
        let log = TradeLog::open(dir.path()).unwrap();
        assert!(log.all().unwrap().is_empty());
        assert!(log.last().unwrap().is_none());

        let now = Utc::now();
        log.record(record(dec!(1000), TradeReason::TakeProfit, now))
            .unwrap();
        log.record(record(dec!(990), TradeReason::StopLoss, now))
            .unwrap();

        let all = log.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].reason, TradeReason::TakeProfit);
        assert_eq!(log.last().unwrap().unwrap().balance, dec!(990));
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        {
            let log = TradeLog::open(dir.path()).unwrap();
            log.record(record(dec!(1), TradeReason::Cancel, now)).unwrap();
        }
        let log = TradeLog::open(dir.path()).unwrap();
        log.record(record(dec!(2), TradeReason::Cancel, now)).unwrap();
        assert_eq!(log.all().unwrap().len(), 2);
    }

    #[test]
    fn test_recent_and_since() {
        let dir = TempDir::new().unwrap();
        let log = TradeLog::open(dir.path()).unwrap();
        let now = Utc::now();
        for days in [40, 20, 1] {
            log.record(record(
                Decimal::from(days),
                TradeReason::TakeProfit,
                now - Duration::days(days),
            ))
            .unwrap();
        }

        let recent = log.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].balance, dec!(20));
        assert_eq!(log.recent(10).unwrap().len(), 3);

        let month = log.since(Duration::days(30), now).unwrap();
        assert_eq!(month.len(), 2);
    }

    #[test]
    fn test_corrupt_line_skipped() {
        let dir = TempDir::new().unwrap();
        let log = TradeLog::open(dir.path()).unwrap();
        log.record(record(dec!(5), TradeReason::StopLoss, Utc::now()))
            .unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .and_then(|mut f| writeln!(f, "{{not json"))
            .unwrap();

        assert_eq!(log.all().unwrap().len(), 1);
    }
}
