use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::{info, warn};
use rfsweep_core::{FramerConfig, FramerStatus, SampleRingBuffer, SweepFramer, SweepSink};
use rfsweep_types::BASEBAND_FILTER_BANDWIDTH_RATIO;

use crate::{
    device::HackrfDevice,
    metrics::SweepMetrics,
    SessionResult, SweepConfig,
};

/// Период опроса устройства в цикле ожидания.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Период отчёта о прогрессе и проверки на залипание потока.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Оркестрирует сессию свипа или сырого приёма.
///
/// Жизненный цикл устройства: открытие → конфигурация → стриминг →
/// опрос → остановка → закрытие. Ошибка закрытия логируется и не
/// мешает завершению.
pub struct TransferSession {
    config: SweepConfig,
    metrics: Arc<SweepMetrics>,
    stop_flag: Arc<AtomicBool>,
}

impl TransferSession {
    /// Создаёт сессию. Возвращает также shared-ссылку на метрики.
    pub fn new(config: SweepConfig) -> (Self, Arc<SweepMetrics>) {
        let metrics = SweepMetrics::new();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let s = Self {
            config,
            metrics: metrics.clone(),
            stop_flag,
        };

        (s, metrics)
    }

    /// Флаг остановки. Устанавливается в `true` для graceful shutdown.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    /// Запускает свип. Блокируется до завершения.
    pub fn run_sweep(
        self,
        mut device: Box<dyn HackrfDevice>,
        sink: SweepSink,
    ) -> SessionResult<()> {
        self.config.validate()?;

        let sample_rate = self.config.normalized_sample_rate();
        if sample_rate != self.config.sample_rate_hz {
            warn!(
                "Sample rate {} Hz is not supported, falling back to {} Hz",
                self.config.sample_rate_hz, sample_rate
            );
        }

        let plan = self.config.build_plan(sample_rate)?;
        for range in &plan.ranges {
            info!(
                "Sweeping from {} MHz to {} MHz",
                range.start_hz / 1_000_000,
                range.stop_hz / 1_000_000
            );
        }

        info!("call set_sample_rate({:.3} MHz)", sample_rate as f64 / 1e6);
        device.set_sample_rate(sample_rate, 1)?;

        let filter_bw = (sample_rate as f64 * BASEBAND_FILTER_BANDWIDTH_RATIO) as u32;
        info!(
            "call set_baseband_filter_bandwidth({:.3} MHz)",
            filter_bw as f64 / 1e6
        );
        device.set_baseband_filter_bandwidth(filter_bw)?;

        device.set_vga_gain(self.config.vga_gain_db)?;
        device.set_lna_gain(self.config.lna_gain_db)?;

        device.init_sweep(&plan)?;

        if self.config.amp_enable {
            info!("call set_amp_enable(true)");
            device.set_amp_enable(true)?;
        }
        if self.config.antenna_enable {
            info!("call set_antenna_enable(true)");
            device.set_antenna_enable(true)?;
        }

        let mut framer_config = FramerConfig::new(
            self.config.style,
            sample_rate,
            self.config.bin_width_hz,
            plan.start_frequency_hz(),
        )?
        .stop_flag(self.stop_flag.clone());

        if self.config.one_shot {
            framer_config = framer_config.one_shot();
        }
        if let Some(n) = self.config.num_sweeps {
            framer_config = framer_config.max_sweeps(n);
        }

        let mut framer = SweepFramer::new(framer_config, sink)?;
        let metrics = self.metrics.clone();

        device.start_rx_sweep(Box::new(move |buffer, valid_length| {
            let status = framer.process_transfer(buffer, valid_length);

            metrics
                .accepted_bytes
                .store(framer.accepted_bytes(), Ordering::Relaxed);
            metrics
                .sweep_count
                .store(framer.sweep_count(), Ordering::Relaxed);
            metrics
                .records_emitted
                .store(framer.records_emitted(), Ordering::Relaxed);

            status
        }))?;

        let session_start = Instant::now();
        self.poll_loop(device.as_mut(), &session_start);

        device.stop();
        if let Err(e) = device.close() {
            warn!("Device close failed: {e}");
        }

        info!("\n{}", self.metrics.summary(&session_start));
        Ok(())
    }

    /// Запускает сырой приём IQ в файл. Блокируется до завершения.
    ///
    /// Выборки проходят через файловый кольцевой буфер: callback драйвера
    /// только дописывает, запись на диск идёт в цикле опроса.
    pub fn run_transfer(
        self,
        mut device: Box<dyn HackrfDevice>,
        center_freq_hz: u64,
        output_path: &Path,
        num_samples: Option<u64>,
    ) -> SessionResult<()> {
        self.config.validate()?;

        let sample_rate = self.config.normalized_sample_rate();
        if sample_rate != self.config.sample_rate_hz {
            warn!(
                "Sample rate {} Hz is not supported, falling back to {} Hz",
                self.config.sample_rate_hz, sample_rate
            );
        }

        info!("call set_sample_rate({:.3} MHz)", sample_rate as f64 / 1e6);
        device.set_sample_rate(sample_rate, 1)?;

        let filter_bw = (sample_rate as f64 * BASEBAND_FILTER_BANDWIDTH_RATIO) as u32;
        device.set_baseband_filter_bandwidth(filter_bw)?;

        info!("call set_freq({:.3} MHz)", center_freq_hz as f64 / 1e6);
        device.set_freq(center_freq_hz)?;

        device.set_vga_gain(self.config.vga_gain_db)?;
        device.set_lna_gain(self.config.lna_gain_db)?;

        if self.config.amp_enable {
            device.set_amp_enable(true)?;
        }
        if self.config.antenna_enable {
            device.set_antenna_enable(true)?;
        }

        let ring: Arc<SampleRingBuffer<i8>> = Arc::new(SampleRingBuffer::new()?);
        let ring_rx = Arc::clone(&ring);
        let metrics = self.metrics.clone();
        let stop_rx = self.stop_flag.clone();

        device.start_rx(Box::new(move |buffer, valid_length| {
            let samples: Vec<i8> = buffer[..valid_length].iter().map(|&b| b as i8).collect();

            if let Err(e) = ring_rx.append(&samples) {
                warn!("Failed to buffer IQ samples: {e}");
                return FramerStatus::Stop;
            }

            metrics
                .accepted_bytes
                .fetch_add(valid_length as u64, Ordering::Relaxed);
            // Одна IQ пара — два байта
            let total_samples = metrics
                .samples_received
                .fetch_add(valid_length as u64 / 2, Ordering::Relaxed)
                + valid_length as u64 / 2;

            if stop_rx.load(Ordering::Relaxed) {
                return FramerStatus::Stop;
            }
            if let Some(limit) = num_samples {
                if total_samples >= limit {
                    return FramerStatus::Stop;
                }
            }

            FramerStatus::Continue
        }))?;

        let session_start = Instant::now();
        let file = File::create(output_path)?;
        let mut writer = BufWriter::new(file);
        let mut last_report = Instant::now();
        let mut prev_bytes: u64 = 0;

        while device.is_streaming() && !self.stop_flag.load(Ordering::Relaxed) {
            thread::sleep(POLL_INTERVAL);

            Self::drain_ring(&ring, &mut writer)?;

            if last_report.elapsed() >= REPORT_INTERVAL {
                let bytes = self.metrics.accepted_bytes.load(Ordering::Relaxed);
                info!(
                    "{:.1} MB received, {:.1} MB/s",
                    bytes as f64 / 1e6,
                    self.metrics.data_rate_mbps(&session_start)
                );

                if bytes == prev_bytes {
                    warn!("Couldn't transfer any data for one second. Stopping...");
                    break;
                }

                prev_bytes = bytes;
                last_report = Instant::now();
            }
        }

        device.stop();
        if let Err(e) = device.close() {
            warn!("Device close failed: {e}");
        }

        // Добираем хвост, попавший в буфер после последнего прохода
        Self::drain_ring(&ring, &mut writer)?;
        writer.flush()?;

        info!("\n{}", self.metrics.summary(&session_start));
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////////
    // Собственные методы
    ////////////////////////////////////////////////////////////////////////////

    fn drain_ring(
        ring: &SampleRingBuffer<i8>,
        writer: &mut impl Write,
    ) -> SessionResult<()> {
        let samples = ring.get_new(false)?;
        if samples.is_empty() {
            return Ok(());
        }

        let bytes: Vec<u8> = samples.iter().map(|&s| s as u8).collect();
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Опрос устройства: прогресс раз в секунду, стоп по залипанию.
    fn poll_loop(
        &self,
        device: &mut dyn HackrfDevice,
        session_start: &Instant,
    ) {
        let mut last_report = Instant::now();
        let mut prev_bytes: u64 = 0;

        while device.is_streaming() && !self.stop_flag.load(Ordering::Relaxed) {
            thread::sleep(POLL_INTERVAL);

            if last_report.elapsed() >= REPORT_INTERVAL {
                let bytes = self.metrics.accepted_bytes.load(Ordering::Relaxed);

                info!(
                    "{} total sweeps completed, {:.2} sweeps/second",
                    self.metrics.sweep_count.load(Ordering::Relaxed),
                    self.metrics.sweep_rate(session_start)
                );

                if bytes == prev_bytes {
                    warn!("Couldn't transfer any data for one second. Stopping...");
                    break;
                }

                prev_bytes = bytes;
                last_report = Instant::now();
            }
        }

        if self.stop_flag.load(Ordering::Relaxed) {
            info!("Exiting...");
        } else if !device.is_streaming() {
            info!("Exiting... [ streaming stopped ]");
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
