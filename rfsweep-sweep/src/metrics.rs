use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Метрики сессии, обновляемые lock-free из callback-потока драйвера.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    pub accepted_bytes: AtomicU64,
    pub sweep_count: AtomicU64,
    pub records_emitted: AtomicU64,
    pub samples_received: AtomicU64,
}

/// Snapshot метрик для отображения / тестирования.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub duration_secs: f64,
    pub sweep_count: u64,
    pub records_emitted: u64,
    pub accepted_bytes: u64,
    pub sweep_rate: f64,
    pub data_rate_mbps: f64,
}

impl SweepMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Циклов свипа в секунду с начала сессии.
    pub fn sweep_rate(
        &self,
        elapsed: &Instant,
    ) -> f64 {
        let secs = elapsed.elapsed().as_secs_f64();

        if secs < 1e-9 {
            return 0.0;
        }

        self.sweep_count.load(Ordering::Relaxed) as f64 / secs
    }

    /// Скорость приёма payload-байт в МБ/с.
    pub fn data_rate_mbps(
        &self,
        elapsed: &Instant,
    ) -> f64 {
        let secs = elapsed.elapsed().as_secs_f64();

        if secs < 1e-9 {
            return 0.0;
        }

        self.accepted_bytes.load(Ordering::Relaxed) as f64 / secs / 1_000_000.0
    }

    /// Итоговая сводка для вывода в конце сессии.
    pub fn summary(
        &self,
        elapsed: &Instant,
    ) -> SessionSummary {
        SessionSummary {
            duration_secs: elapsed.elapsed().as_secs_f64(),
            sweep_count: self.sweep_count.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            accepted_bytes: self.accepted_bytes.load(Ordering::Relaxed),
            sweep_rate: self.sweep_rate(elapsed),
            data_rate_mbps: self.data_rate_mbps(elapsed),
        }
    }
}

impl std::fmt::Display for SessionSummary {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "  Duration      : {:.1}s", self.duration_secs)?;
        writeln!(f, "  Sweeps        : {}", self.sweep_count)?;
        writeln!(f, "  Sweep rate    : {:.2} sweeps/s", self.sweep_rate)?;
        writeln!(f, "  Records       : {}", self.records_emitted)?;
        writeln!(
            f,
            "  Bytes accepted: {:.1} MB",
            self.accepted_bytes as f64 / 1e6
        )?;
        writeln!(f, "  Data rate     : {:.1} MB/s", self.data_rate_mbps)?;
        write!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_initial_metrics_zero() {
        let metrics = SweepMetrics::new();
        let start = Instant::now();
        let summary = metrics.summary(&start);

        assert_eq!(summary.sweep_count, 0);
        assert_eq!(summary.records_emitted, 0);
        assert_eq!(summary.accepted_bytes, 0);
        assert_eq!(summary.sweep_rate, 0.0);
        assert_eq!(summary.data_rate_mbps, 0.0);
    }

    #[test]
    fn test_rates_over_elapsed_time() {
        let metrics = SweepMetrics::new();

        metrics.sweep_count.store(10, Ordering::Relaxed);
        metrics.accepted_bytes.store(10_000_000, Ordering::Relaxed);

        let start = Instant::now() - Duration::from_secs(2);
        let summary = metrics.summary(&start);

        // 10 свипов / 2с = 5 свипов/с; 10 МБ / 2с = 5 МБ/с
        assert!((summary.sweep_rate - 5.0).abs() < 0.1);
        assert!((summary.data_rate_mbps - 5.0).abs() < 0.1);
    }

    #[test]
    fn test_summary_snapshot_consistency() {
        let metrics = SweepMetrics::new();
        metrics.sweep_count.store(3, Ordering::Relaxed);
        metrics.records_emitted.store(600, Ordering::Relaxed);
        metrics.accepted_bytes.store(1_000_000, Ordering::Relaxed);
        metrics.samples_received.store(500_000, Ordering::Relaxed);

        let start = Instant::now() - Duration::from_secs(1);
        let summary = metrics.summary(&start);

        assert_eq!(summary.sweep_count, 3);
        assert_eq!(summary.records_emitted, 600);
        assert_eq!(summary.accepted_bytes, 1_000_000);
        assert!(summary.sweep_rate > 0.0);
    }
}
