//! Call statistics.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::util::MovingAverage;

/// Cumulative counters for one stream, as sampled from the media engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSample {
    /// Index of the stream in the result description.
    pub index: usize,
    /// Total bytes received.
    pub bytes_rx: u64,
    /// Total bytes sent.
    pub bytes_tx: u64,
    /// Total packets received.
    pub packets_rx: u64,
    /// Total packets lost, as seen by the receiver.
    pub packets_lost: u64,
    /// Most recent round trip time, if known.
    pub rtt: Option<Duration>,
}

/// Stats of one stream, updated every stats interval.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStats {
    /// Index of the stream in the result description.
    pub index: usize,
    /// Download bitrate over the last interval in kbit/s.
    pub download_bandwidth: f64,
    /// Upload bitrate over the last interval in kbit/s.
    pub upload_bandwidth: f64,
    /// Fraction of packets lost over the last interval, 0.0 to 1.0.
    pub loss_rate: f64,
    /// Most recent round trip time.
    pub rtt: Option<Duration>,
    /// Running average of `download_bandwidth`.
    pub avg_download_bandwidth: f64,
    /// Running average of `upload_bandwidth`.
    pub avg_upload_bandwidth: f64,
    /// Running average of `loss_rate`.
    pub avg_loss_rate: f64,
    /// Number of intervals that went into the averages.
    pub samples: u64,
    /// When these stats were made.
    pub timestamp: Instant,
}

struct StreamStats {
    last: Option<(Instant, StatsSample)>,
    download: MovingAverage,
    upload: MovingAverage,
    loss: MovingAverage,
    current: Option<CallStats>,
}

impl StreamStats {
    fn new(smoothing: f64) -> Self {
        StreamStats {
            last: None,
            download: MovingAverage::new(smoothing),
            upload: MovingAverage::new(smoothing),
            loss: MovingAverage::new(smoothing),
            current: None,
        }
    }

    fn update(&mut self, now: Instant, sample: StatsSample) -> Option<CallStats> {
        let Some((then, prev)) = self.last.replace((now, sample.clone())) else {
            // Rates need two samples.
            return None;
        };

        let secs = now.saturating_duration_since(then).as_secs_f64();
        if secs <= 0.0 {
            return None;
        }

        // Counters going backwards means the engine restarted the stream.
        let rx = sample.bytes_rx.saturating_sub(prev.bytes_rx);
        let tx = sample.bytes_tx.saturating_sub(prev.bytes_tx);
        let received = sample.packets_rx.saturating_sub(prev.packets_rx);
        let lost = sample.packets_lost.saturating_sub(prev.packets_lost);

        let download_bandwidth = rx as f64 * 8.0 / 1000.0 / secs;
        let upload_bandwidth = tx as f64 * 8.0 / 1000.0 / secs;
        let expected = received + lost;
        let loss_rate = if expected == 0 {
            0.0
        } else {
            lost as f64 / expected as f64
        };

        let stats = CallStats {
            index: sample.index,
            download_bandwidth,
            upload_bandwidth,
            loss_rate,
            rtt: sample.rtt,
            avg_download_bandwidth: self.download.update(download_bandwidth),
            avg_upload_bandwidth: self.upload.update(upload_bandwidth),
            avg_loss_rate: self.loss.update(loss_rate),
            samples: self.download.count(),
            timestamp: now,
        };

        self.current = Some(stats.clone());

        Some(stats)
    }
}

/// Turns media engine counters into per stream stats.
///
/// Driven by the session clock: [`wants_timeout()`][Self::wants_timeout] tells when
/// a new sample is due, and [`handle_timeout()`][Self::handle_timeout] takes it. Each
/// stream with updated stats is then returned by [`poll_output()`][Self::poll_output].
pub struct CallStatsCollector {
    last_now: Option<Instant>,
    interval: Duration,
    smoothing: f64,
    streams: BTreeMap<usize, StreamStats>,
    events: VecDeque<CallStats>,
}

impl CallStatsCollector {
    /// Creates a collector sampling every `interval`, averaging with `smoothing`.
    pub fn new(interval: Duration, smoothing: f64) -> Self {
        CallStatsCollector {
            last_now: None,
            interval,
            smoothing,
            streams: BTreeMap::new(),
            events: VecDeque::new(),
        }
    }

    /// Tells if it's time to sample the media engine.
    pub fn wants_timeout(&mut self, now: Instant) -> bool {
        let Some(last_now) = self.last_now else {
            // Learn our first ever `now`
            self.last_now = Some(now);
            return false;
        };

        now >= last_now + self.interval
    }

    /// Takes the counters sampled at `now`.
    pub fn handle_timeout(&mut self, now: Instant, samples: Vec<StatsSample>) {
        for sample in samples {
            let smoothing = self.smoothing;
            let stream = self
                .streams
                .entry(sample.index)
                .or_insert_with(|| StreamStats::new(smoothing));

            if let Some(stats) = stream.update(now, sample) {
                trace!(
                    "Stats stream {}: down {:.1} kbit/s up {:.1} kbit/s loss {:.3}",
                    stats.index,
                    stats.download_bandwidth,
                    stats.upload_bandwidth,
                    stats.loss_rate
                );
                self.events.push_back(stats);
            }
        }

        self.last_now = Some(now);
    }

    /// When the next sample is due.
    pub fn poll_timeout(&self) -> Option<Instant> {
        let last_now = self.last_now?;
        Some(last_now + self.interval)
    }

    /// Stats updated by the last [`handle_timeout()`][Self::handle_timeout].
    pub fn poll_output(&mut self) -> Option<CallStats> {
        self.events.pop_front()
    }

    /// Latest stats for the stream at index.
    pub fn stats(&self, index: usize) -> Option<&CallStats> {
        self.streams.get(&index)?.current.as_ref()
    }

    /// Latest stats for every stream, in stream order.
    pub fn all(&self) -> impl Iterator<Item = &CallStats> {
        self.streams.values().filter_map(|s| s.current.as_ref())
    }

    /// Lowest average download bitrate over the streams, in kbit/s.
    pub fn available_bandwidth(&self) -> Option<f64> {
        self.all()
            .map(|s| s.avg_download_bandwidth)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
    }

    /// Forget everything about a previous set of streams.
    pub fn reset(&mut self) {
        self.streams.clear();
        self.events.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(index: usize, bytes_rx: u64, bytes_tx: u64, rx: u64, lost: u64) -> StatsSample {
        StatsSample {
            index,
            bytes_rx,
            bytes_tx,
            packets_rx: rx,
            packets_lost: lost,
            rtt: None,
        }
    }

    #[test]
    fn timeout_cadence() {
        let now = Instant::now();
        let mut c = CallStatsCollector::new(Duration::from_secs(1), 0.5);

        assert!(!c.wants_timeout(now));
        assert_eq!(c.poll_timeout(), Some(now + Duration::from_secs(1)));
        assert!(!c.wants_timeout(now + Duration::from_millis(500)));
        assert!(c.wants_timeout(now + Duration::from_secs(1)));
    }

    #[test]
    fn rates_from_deltas() {
        let now = Instant::now();
        let mut c = CallStatsCollector::new(Duration::from_secs(1), 0.5);

        c.handle_timeout(now, vec![sample(0, 0, 0, 0, 0)]);
        assert!(c.poll_output().is_none());
        assert!(c.stats(0).is_none());

        let t1 = now + Duration::from_secs(1);
        c.handle_timeout(t1, vec![sample(0, 8_000, 4_000, 90, 10)]);

        let s = c.poll_output().unwrap();
        assert_eq!(s.download_bandwidth, 64.0);
        assert_eq!(s.upload_bandwidth, 32.0);
        assert_eq!(s.loss_rate, 0.1);
        assert_eq!(s.samples, 1);
        assert_eq!(s.timestamp, t1);

        let t2 = t1 + Duration::from_secs(1);
        c.handle_timeout(t2, vec![sample(0, 24_000, 4_000, 190, 10)]);
        let s = c.poll_output().unwrap();
        assert_eq!(s.download_bandwidth, 128.0);
        assert_eq!(s.avg_download_bandwidth, 96.0);
        assert_eq!(s.loss_rate, 0.0);
        assert_eq!(s.avg_loss_rate, 0.05);
        assert_eq!(c.stats(0), Some(&s));
    }

    #[test]
    fn counter_reset_is_not_negative() {
        let now = Instant::now();
        let mut c = CallStatsCollector::new(Duration::from_secs(1), 0.5);
        c.handle_timeout(now, vec![sample(0, 10_000, 0, 100, 0)]);
        c.handle_timeout(now + Duration::from_secs(1), vec![sample(0, 0, 0, 0, 0)]);
        let s = c.poll_output().unwrap();
        assert_eq!(s.download_bandwidth, 0.0);
        assert_eq!(s.loss_rate, 0.0);
    }

    #[test]
    fn available_bandwidth_is_minimum() {
        let now = Instant::now();
        let mut c = CallStatsCollector::new(Duration::from_secs(1), 0.5);
        assert_eq!(c.available_bandwidth(), None);

        c.handle_timeout(now, vec![sample(0, 0, 0, 0, 0), sample(1, 0, 0, 0, 0)]);
        c.handle_timeout(
            now + Duration::from_secs(1),
            vec![sample(0, 8_000, 0, 0, 0), sample(1, 80_000, 0, 0, 0)],
        );

        assert_eq!(c.available_bandwidth(), Some(64.0));
        assert_eq!(c.all().count(), 2);
    }
}
