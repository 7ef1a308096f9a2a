//! Price History
//!
//! A bounded per-symbol record of accepted prices, oldest first. When full,
//! each new point evicts the oldest one. Candles are aggregated from these
//! points on demand; nothing about a candle is stored.

use std::collections::VecDeque;

use serde::Serialize;

/// Points kept per symbol.
pub const HISTORY_CAPACITY: usize = 1000;

/// One accepted price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    /// Raw price.
    pub price: f64,
    /// Fetch time, Unix seconds.
    pub timestamp: f64,
}

/// OHLC summary of the points inside one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candle {
    /// Bucket start, Unix seconds.
    pub timestamp: u64,
    /// First price in the bucket.
    pub open: f64,
    /// Highest price in the bucket.
    pub high: f64,
    /// Lowest price in the bucket.
    pub low: f64,
    /// Last price in the bucket.
    pub close: f64,
    /// Number of points aggregated.
    pub ticks: usize,
}

impl Candle {
    fn open_at(bucket: u64, price: f64) -> Self {
        Self {
            timestamp: bucket,
            open: price,
            high: price,
            low: price,
            close: price,
            ticks: 1,
        }
    }

    fn push(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.ticks += 1;
    }
}

/// Ring buffer of recent prices for one symbol.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    points: VecDeque<PricePoint>,
    capacity: usize,
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl PriceHistory {
    /// Create an empty history holding at most `capacity` points.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting the oldest when full.
    pub fn push(&mut self, point: PricePoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// Points oldest first.
    #[must_use]
    pub fn points(&self) -> Vec<PricePoint> {
        self.points.iter().copied().collect()
    }

    /// Number of stored points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The most recent `count` candles of `duration_secs` each, oldest first.
    ///
    /// Buckets without points are absent rather than filled in. A point
    /// whose bucket differs from the previous point's starts a new candle.
    #[must_use]
    pub fn candles(&self, duration_secs: u64, count: usize) -> Vec<Candle> {
        let duration = duration_secs.max(1);
        let mut candles: Vec<Candle> = Vec::new();

        for point in &self.points {
            let bucket = bucket_start(point.timestamp, duration);
            match candles.last_mut() {
                Some(current) if current.timestamp == bucket => current.push(point.price),
                _ => candles.push(Candle::open_at(bucket, point.price)),
            }
        }

        let skip = candles.len().saturating_sub(count);
        candles.split_off(skip)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bucket_start(timestamp: f64, duration: u64) -> u64 {
    let secs = timestamp.max(0.0).floor() as u64;
    secs - secs % duration
}
