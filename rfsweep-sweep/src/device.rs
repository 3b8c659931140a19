// Симулятор воспроизводит транспорт libhackrf: поток USB-передач по 16
// sub-block-ов с маркерами 127,127 и BE-частотой в заголовке, внутренняя
// очередь передач ограниченной глубины (как пул transfer-ов libhackrf).
// Callback вызывается на отдельном потоке диспетчера, как и у настоящего
// драйвера.

use std::{
    f32::consts::PI,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{RecvTimeoutError, TrySendError};
use log::{debug, warn};
use rfsweep_core::FramerStatus;
use rfsweep_types::{SweepPlan, BLOCKS_PER_TRANSFER, BLOCK_MARKER, BYTES_PER_BLOCK};

use crate::{DeviceKind, SessionError, SessionResult, SweepConfig};

/// Callback приёма: буфер передачи + количество валидных байт.
/// Возвращаемый статус останавливает поток при [`FramerStatus::Stop`].
pub type RxCallback = Box<dyn FnMut(&[u8], usize) -> FramerStatus + Send>;

/// Абстракция HackRF-приёмника в режиме свипа.
pub trait HackrfDevice: Send {
    /// Информация об устройстве
    fn info(&self) -> DeviceInfo;

    fn set_sample_rate(
        &mut self,
        hz: u32,
        divider: u32,
    ) -> SessionResult<()>;

    fn set_baseband_filter_bandwidth(&mut self, hz: u32) -> SessionResult<()>;

    fn set_freq(&mut self, hz: u64) -> SessionResult<()>;

    fn set_lna_gain(&mut self, db: u32) -> SessionResult<()>;

    fn set_vga_gain(&mut self, db: u32) -> SessionResult<()>;

    fn set_amp_enable(&mut self, on: bool) -> SessionResult<()>;

    fn set_antenna_enable(&mut self, on: bool) -> SessionResult<()>;

    /// Передаёт устройству проверенный частотный план.
    fn init_sweep(&mut self, plan: &SweepPlan) -> SessionResult<()>;

    /// Запускает свип. Callback вызывается на потоке драйвера,
    /// по одному разу на каждую пришедшую передачу.
    fn start_rx_sweep(&mut self, callback: RxCallback) -> SessionResult<()>;

    /// Запускает обычный приём без перестройки (режим transfer).
    fn start_rx(&mut self, callback: RxCallback) -> SessionResult<()>;

    fn is_streaming(&self) -> bool;

    /// Запрашивает остановку потока; данные в полёте дорабатываются.
    fn stop(&mut self);

    /// Закрывает устройство, дожидаясь рабочих потоков.
    fn close(&mut self) -> SessionResult<()>;
}

/// Информация об устройстве (для логирования и команды `info`).
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub serial: Option<String>,
    pub board_id: String,
    pub firmware_version: String,
}

/// Генерирует синтетический поток sweep-передач без железа.
pub struct SimulatedDevice {
    pub sample_rate_hz: u32,
    pub center_freq_hz: u64,
    /// Смещение тестового тона от частоты настройки (Гц)
    pub tone_offset_hz: f32,
    plan: Option<SweepPlan>,
    streaming: Arc<AtomicBool>,
    generator: Option<thread::JoinHandle<()>>,
    dispatcher: Option<thread::JoinHandle<()>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SimulatedDevice {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            center_freq_hz: 0,
            tone_offset_hz: 1_000_000.0,
            plan: None,
            streaming: Arc::new(AtomicBool::new(false)),
            generator: None,
            dispatcher: None,
        }
    }

    /// Sub-block с маркером, BE-частотой и тональным IQ payload-ом.
    fn fill_block(
        block: &mut [u8],
        frequency_hz: u64,
        sample_rate_hz: u32,
        tone_offset_hz: f32,
    ) {
        block[0] = BLOCK_MARKER;
        block[1] = BLOCK_MARKER;
        block[2..10].copy_from_slice(&frequency_hz.to_be_bytes());

        let rate = sample_rate_hz as f32;
        for (i, iq) in block[10..].chunks_exact_mut(2).enumerate() {
            let phase = 2.0 * PI * tone_offset_hz * i as f32 / rate;
            iq[0] = (64.0 * phase.cos()) as i8 as u8;
            iq[1] = (64.0 * phase.sin()) as i8 as u8;
        }
    }

    /// Частоты настройки одного полного цикла свипа.
    fn cycle_frequencies(plan: &SweepPlan) -> Vec<u64> {
        let mut freqs = Vec::new();
        for range in &plan.ranges {
            for k in 0..range.step_count(plan.tune_step_hz) {
                freqs.push(range.start_hz + k * plan.tune_step_hz);
            }
        }
        freqs
    }

    fn spawn_workers(
        &mut self,
        mut callback: RxCallback,
        sweep_plan: Option<SweepPlan>,
    ) -> SessionResult<()> {
        if self.streaming.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Device("already streaming".to_string()));
        }

        // Глубина очереди передач как у пула libhackrf
        let (tx, rx) = crossbeam_channel::bounded::<Vec<u8>>(4);

        let streaming_gen = self.streaming.clone();
        let sample_rate = self.sample_rate_hz;
        let tone_offset = self.tone_offset_hz;

        self.generator = Some(thread::spawn(move || {
            let freqs = sweep_plan.as_ref().map(Self::cycle_frequencies);
            let mut step: usize = 0;
            let mut dropped: u64 = 0;

            while streaming_gen.load(Ordering::Relaxed) {
                let mut transfer = vec![0u8; BLOCKS_PER_TRANSFER * BYTES_PER_BLOCK];

                for block in transfer.chunks_exact_mut(BYTES_PER_BLOCK) {
                    match &freqs {
                        Some(freqs) => {
                            let frequency = freqs[step % freqs.len()];
                            step += 1;
                            Self::fill_block(block, frequency, sample_rate, tone_offset);
                        }
                        None => {
                            // Режим transfer: сплошной тон без заголовков
                            for (i, iq) in block.chunks_exact_mut(2).enumerate() {
                                let phase =
                                    2.0 * PI * tone_offset * i as f32 / sample_rate as f32;
                                iq[0] = (64.0 * phase.cos()) as i8 as u8;
                                iq[1] = (64.0 * phase.sin()) as i8 as u8;
                            }
                        }
                    }
                }

                match tx.try_send(transfer) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => dropped += 1,
                    Err(TrySendError::Disconnected(_)) => break,
                }

                // pacing — не даём симулятору крутиться вхолостую
                thread::sleep(Duration::from_millis(2));
            }

            if dropped > 0 {
                debug!("Simulated device dropped {dropped} transfers (queue full)");
            }
        }));

        let streaming_disp = self.streaming.clone();

        self.dispatcher = Some(thread::spawn(move || {
            while streaming_disp.load(Ordering::Relaxed) {
                let transfer = match rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(t) => t,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                };

                let valid_length = transfer.len();
                if callback(&transfer, valid_length) == FramerStatus::Stop {
                    break;
                }
            }

            streaming_disp.store(false, Ordering::SeqCst);
        }));

        Ok(())
    }

    fn join_workers(&mut self) {
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                warn!("Simulated dispatcher thread panicked");
            }
        }

        if let Some(handle) = self.generator.take() {
            if handle.join().is_err() {
                warn!("Simulated generator thread panicked");
            }
        }
    }
}

impl HackrfDevice for SimulatedDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Simulated HackRF".to_string(),
            serial: Some("SIM-0001".to_string()),
            board_id: "Simulated".to_string(),
            firmware_version: format!("rfsweep-sim {}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn set_sample_rate(
        &mut self,
        hz: u32,
        _divider: u32,
    ) -> SessionResult<()> {
        self.sample_rate_hz = hz;
        Ok(())
    }

    fn set_baseband_filter_bandwidth(&mut self, _hz: u32) -> SessionResult<()> {
        Ok(())
    }

    fn set_freq(&mut self, hz: u64) -> SessionResult<()> {
        self.center_freq_hz = hz;
        Ok(())
    }

    fn set_lna_gain(&mut self, _db: u32) -> SessionResult<()> {
        Ok(())
    }

    fn set_vga_gain(&mut self, _db: u32) -> SessionResult<()> {
        Ok(())
    }

    fn set_amp_enable(&mut self, _on: bool) -> SessionResult<()> {
        Ok(())
    }

    fn set_antenna_enable(&mut self, _on: bool) -> SessionResult<()> {
        Ok(())
    }

    fn init_sweep(&mut self, plan: &SweepPlan) -> SessionResult<()> {
        self.plan = Some(plan.clone());
        Ok(())
    }

    fn start_rx_sweep(&mut self, callback: RxCallback) -> SessionResult<()> {
        let plan = self
            .plan
            .clone()
            .ok_or_else(|| SessionError::Device("sweep not initialized".to_string()))?;

        self.spawn_workers(callback, Some(plan))
    }

    fn start_rx(&mut self, callback: RxCallback) -> SessionResult<()> {
        self.spawn_workers(callback, None)
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Relaxed)
    }

    fn stop(&mut self) {
        self.streaming.store(false, Ordering::SeqCst);
    }

    fn close(&mut self) -> SessionResult<()> {
        self.stop();
        self.join_workers();
        Ok(())
    }
}

/// Создаёт нужное устройство по конфигурации.
pub fn create_device(config: &SweepConfig) -> SessionResult<Box<dyn HackrfDevice>> {
    match &config.device {
        DeviceKind::Simulated => Ok(Box::new(SimulatedDevice::new(config.sample_rate_hz))),
        DeviceKind::HackRf => {
            #[cfg(feature = "hackrf")]
            {
                // TODO: интеграция с hackrfone crate
                // Пример будущей реализации:
                //   let dev = match &config.serial {
                //       Some(s) => hackrfone::HackRf::open_by_serial(s)?,
                //       None => hackrfone::HackRf::open()?,
                //   };
                //   return Ok(Box::new(HackRfOneDevice { inner: dev }));
                let _ = config; // подавить неиспользуемое предупреждение
                Err(SessionError::DeviceNotFound(
                    "HackRF support compiled in but not yet implemented".to_string(),
                ))
            }
            #[cfg(not(feature = "hackrf"))]
            Err(SessionError::DeviceNotFound(
                "Compiled without HackRF support. \
                 Rebuild with: cargo build --features hackrf"
                    .to_string(),
            ))
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
