use std::collections::HashMap;
use std::time::{Duration, Instant};

use xpanel_protocol::{ServerStats, SystemStats};

use crate::buffer::RingBuffer;

/// Chart length: the views plot the last 50 samples.
pub const DEFAULT_CAPACITY: usize = 50;

/// Stats older than this mean the server stopped reporting.
pub const STALE_THRESHOLD: Duration = Duration::from_secs(30);

/// Key under which `system_stats` (the panel host itself) is tracked.
pub const LOCAL_SERVER: &str = "local";

/// Charted series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    CpuUsage,
    MemoryPercent,
    DiskPercent,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::CpuUsage, Metric::MemoryPercent, Metric::DiskPercent];

    pub fn label(&self) -> &'static str {
        match self {
            Self::CpuUsage => "cpu",
            Self::MemoryPercent => "memory",
            Self::DiskPercent => "disk",
        }
    }

    fn sample(&self, stats: &SystemStats) -> Option<f64> {
        match self {
            Self::CpuUsage => stats.cpu.as_ref().map(|c| c.usage),
            Self::MemoryPercent => stats.memory.as_ref().map(|m| m.percent),
            Self::DiskPercent => stats.disk.as_ref().map(|d| d.percent),
        }
    }
}

/// One chart point, labelled with the sample's server timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsPoint {
    pub timestamp: String,
    pub value: f64,
}

/// Latest stats and chart histories for one server.
#[derive(Debug, Clone)]
pub struct ServerHistory {
    latest: Option<SystemStats>,
    last_received: Option<Instant>,
    series: HashMap<Metric, RingBuffer<StatsPoint>>,
    capacity: usize,
}

impl ServerHistory {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            latest: None,
            last_received: None,
            series: HashMap::new(),
            capacity,
        }
    }

    /// Ingests a snapshot. Samples without a timestamp update the latest
    /// snapshot but are not charted; returns whether any point was added.
    pub fn record(&mut self, stats: &SystemStats) -> bool {
        self.record_at(stats, Instant::now())
    }

    /// [`record`](Self::record) with an explicit arrival time.
    pub fn record_at(&mut self, stats: &SystemStats, received: Instant) -> bool {
        self.latest = Some(stats.clone());
        self.last_received = Some(received);

        let Some(timestamp) = stats.timestamp.as_deref() else {
            return false;
        };

        let mut charted = false;
        for metric in Metric::ALL {
            if let Some(value) = metric.sample(stats) {
                self.series
                    .entry(metric)
                    .or_insert_with(|| RingBuffer::new(self.capacity))
                    .push(StatsPoint {
                        timestamp: timestamp.to_string(),
                        value,
                    });
                charted = true;
            }
        }
        charted
    }

    pub fn latest(&self) -> Option<&SystemStats> {
        self.latest.as_ref()
    }

    pub fn history(&self, metric: Metric) -> Option<&RingBuffer<StatsPoint>> {
        self.series.get(&metric)
    }

    /// Whether the server has gone quiet.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Instant::now())
    }

    /// Whether the last sample is older than [`STALE_THRESHOLD`] at `now`.
    /// Never stale before the first sample.
    pub fn is_stale_at(&self, now: Instant) -> bool {
        self.last_received
            .is_some_and(|t| now.saturating_duration_since(t) > STALE_THRESHOLD)
    }

    /// Drops the chart points, keeping the latest snapshot.
    pub fn clear_charts(&mut self) {
        self.series.clear();
    }
}

/// Chart state for every server the client hears about.
///
/// Fed from the live channel's stats events; read by the views. All methods
/// are synchronous.
#[derive(Debug, Clone)]
pub struct FleetMonitor {
    servers: HashMap<String, ServerHistory>,
    capacity: usize,
}

impl FleetMonitor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            servers: HashMap::new(),
            capacity,
        }
    }

    /// Records host stats from a `system_stats` push.
    pub fn record_system(&mut self, stats: &SystemStats) -> bool {
        self.entry(LOCAL_SERVER).record(stats)
    }

    /// Records stats from a `server_stats` push.
    pub fn record_server(&mut self, stats: &ServerStats) -> bool {
        self.entry(&stats.server_id).record(&stats.stats)
    }

    pub fn server(&self, server_id: &str) -> Option<&ServerHistory> {
        self.servers.get(server_id)
    }

    /// Tracked server ids, sorted.
    pub fn server_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.servers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Servers that stopped reporting, sorted.
    pub fn stale_servers(&self) -> Vec<&str> {
        self.stale_servers_at(Instant::now())
    }

    pub fn stale_servers_at(&self, now: Instant) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .servers
            .iter()
            .filter(|(_, h)| h.is_stale_at(now))
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn remove(&mut self, server_id: &str) {
        self.servers.remove(server_id);
    }

    pub fn clear(&mut self) {
        self.servers.clear();
    }

    fn entry(&mut self, server_id: &str) -> &mut ServerHistory {
        self.servers
            .entry(server_id.to_owned())
            .or_insert_with(|| ServerHistory::new(self.capacity))
    }
}

impl Default for FleetMonitor {
    fn default() -> Self {
        Self::new()
    }
}
