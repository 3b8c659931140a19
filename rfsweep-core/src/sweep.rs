//! Конечный автомат кадрирования свипа.
//!
//! [`SweepFramer`] получает сырые USB-передачи HackRF (16 sub-block-ов по
//! 16384 байта), находит частотные маркеры, отслеживает границы цикла свипа
//! и превращает хвостовые IQ-выборки каждого валидного sub-block-а в записи
//! спектра мощности.
//!
//! Весь статус сессии живёт в полях экземпляра: несколько независимых
//! свипов могут идти параллельно, каждый со своим фреймером.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};
use log::warn;
use rfsweep_types::{
    SpectrumRecord, SweepError, SweepResult, SweepStyle, AVAILABLE_SAMPLE_RATES, BLOCK_MARKER,
    BYTES_PER_BLOCK, FREQ_MAX_HZ,
};
use rustfft::num_complex::Complex32;

use crate::codec::SpectrumRecordExt;
use crate::dsp::{derive_fft_size, hann, SpectrumFft};
use crate::queue::FileQueue;

/// Статус, возвращаемый фреймером драйверу после каждой передачи.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerStatus {
    /// Продолжать приём.
    Continue,
    /// Остановить поток (one-shot, лимит свипов или флаг остановки).
    Stop,
}

/// Приёмник записей спектра. На один прогон активен ровно один.
pub enum SweepSink {
    /// Бинарный поток записей формата hackrf_sweep.
    Binary(Box<dyn Write + Send>),
    /// Текстовые CSV-строки, по одной на запись.
    Text(Box<dyn Write + Send>),
    /// Пользовательский callback.
    Callback(Box<dyn FnMut(SpectrumRecord) + Send>),
    /// Файловая очередь записей для отложенного потребителя.
    Queue(Arc<FileQueue<SpectrumRecord>>),
}

/// Параметры кадрирования, проверенные до старта потока.
pub struct FramerConfig {
    pub style: SweepStyle,
    pub sample_rate: u32,
    pub bin_width: u32,
    pub start_frequency_hz: u64,
    pub one_shot: bool,
    pub max_sweeps: Option<u64>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl FramerConfig {
    /// Проверяет частоту дискретизации и ширину бина.
    pub fn new(
        style: SweepStyle,
        sample_rate: u32,
        bin_width: u32,
        start_frequency_hz: u64,
    ) -> SweepResult<Self> {
        if !AVAILABLE_SAMPLE_RATES.contains(&sample_rate) {
            return Err(SweepError::Config(format!(
                "unsupported sample rate: {sample_rate} Hz"
            )));
        }

        // Ширина бина валидируется тем же путём, что и при построении FFT
        derive_fft_size(sample_rate, bin_width)?;

        Ok(Self {
            style,
            sample_rate,
            bin_width,
            start_frequency_hz,
            one_shot: false,
            max_sweeps: None,
            stop_flag: None,
        })
    }

    /// Остановка после первого полного цикла.
    pub fn one_shot(mut self) -> Self {
        self.one_shot = true;
        self
    }

    /// Остановка после `n` полных циклов.
    pub fn max_sweeps(
        mut self,
        n: u64,
    ) -> Self {
        self.max_sweeps = Some(n);
        self
    }

    /// Внешний флаг остановки (Ctrl+C), проверяется на каждом sub-block-е.
    pub fn stop_flag(
        mut self,
        flag: Arc<AtomicBool>,
    ) -> Self {
        self.stop_flag = Some(flag);
        self
    }
}

/// Фреймер одного сеанса свипа.
pub struct SweepFramer {
    style: SweepStyle,
    sample_rate: u32,
    start_frequency_hz: u64,
    one_shot: bool,
    max_sweeps: Option<u64>,
    stop_flag: Option<Arc<AtomicBool>>,

    fft: SpectrumFft,
    fft_size: usize,
    window: Vec<f32>,
    bin_width_hz: f64,
    // Хвост sub-block-а, занятый IQ payload-ом: fft_size * 2 байт
    data_length: usize,

    // Границы четверть-слайсов мощности для INTERLEAVED
    pwr_1_start: usize,
    pwr_2_start: usize,
    // Частотные шаги INTERLEAVED-записей: rate/4, rate/2, 3*rate/4
    frequency_step_1: u64,
    frequency_step_2: u64,
    frequency_step_3: u64,

    sweep_started: bool,
    sweep_count: u64,
    accepted_bytes: u64,
    records_emitted: u64,

    sink: SweepSink,
}

impl SweepFramer {
    pub fn new(
        config: FramerConfig,
        sink: SweepSink,
    ) -> SweepResult<Self> {
        let fft_size = derive_fft_size(config.sample_rate, config.bin_width)?;
        let rate = config.sample_rate as u64;

        Ok(Self {
            style: config.style,
            sample_rate: config.sample_rate,
            start_frequency_hz: config.start_frequency_hz,
            one_shot: config.one_shot,
            max_sweeps: config.max_sweeps,
            stop_flag: config.stop_flag,
            fft: SpectrumFft::new(fft_size),
            fft_size,
            window: hann(fft_size),
            bin_width_hz: config.sample_rate as f64 / fft_size as f64,
            data_length: fft_size * 2,
            pwr_1_start: 1 + (fft_size * 5) / 8,
            pwr_2_start: 1 + fft_size / 8,
            frequency_step_1: rate / 4,
            frequency_step_2: rate / 2,
            frequency_step_3: rate * 3 / 4,
            sweep_started: false,
            sweep_count: 0,
            accepted_bytes: 0,
            records_emitted: 0,
            sink,
        })
    }

    /// Завершённых полных циклов свипа.
    pub fn sweep_count(&self) -> u64 {
        self.sweep_count
    }

    /// Принятых payload-байт за всё время.
    pub fn accepted_bytes(&self) -> u64 {
        self.accepted_bytes
    }

    /// Выпущенных записей спектра.
    pub fn records_emitted(&self) -> u64 {
        self.records_emitted
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Обрабатывает одну USB-передачу.
    ///
    /// `valid_length` — количество валидных байт в `buffer` по данным
    /// драйвера; учитывается в статистике независимо от разметки блоков.
    ///
    /// Sub-block-и без маркера 127,127 молча пропускаются. До первой
    /// встречи стартовой частоты записи не выпускаются, как и для частот
    /// выше максимума перестройки.
    pub fn process_transfer(
        &mut self,
        buffer: &[u8],
        valid_length: usize,
    ) -> FramerStatus {
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();

        for block in buffer.chunks_exact(BYTES_PER_BLOCK) {
            if block[0] != BLOCK_MARKER || block[1] != BLOCK_MARKER {
                continue;
            }

            let frequency = BigEndian::read_u64(&block[2..10]);

            if frequency == self.start_frequency_hz {
                if self.sweep_started {
                    self.sweep_count += 1;

                    let limit_reached = self.max_sweeps == Some(self.sweep_count);
                    if self.one_shot || limit_reached {
                        return FramerStatus::Stop;
                    }
                }

                self.sweep_started = true;
            }

            if let Some(flag) = &self.stop_flag {
                if flag.load(Ordering::Relaxed) {
                    return FramerStatus::Stop;
                }
            }

            if !self.sweep_started {
                continue;
            }

            if frequency > FREQ_MAX_HZ {
                continue;
            }

            let payload = &block[BYTES_PER_BLOCK - self.data_length..];
            let mut samples: Vec<Complex32> = payload
                .chunks_exact(2)
                .zip(&self.window)
                .map(|(iq, &w)| {
                    Complex32::new(
                        iq[0] as i8 as f32 / 128.0 * w,
                        iq[1] as i8 as f32 / 128.0 * w,
                    )
                })
                .collect();

            let pwr = self.fft.power_db(&mut samples);

            match self.style {
                SweepStyle::Interleaved => {
                    let quarter = self.fft_size / 4;
                    let pwr_1 = &pwr[self.pwr_1_start..self.pwr_1_start + quarter];
                    let pwr_2 = &pwr[self.pwr_2_start..self.pwr_2_start + quarter];

                    self.emit(SpectrumRecord::new(
                        timestamp_ns,
                        frequency,
                        frequency + self.frequency_step_1,
                        self.bin_width_hz,
                        self.fft_size as u32,
                        pwr_1.to_vec(),
                    ));
                    self.emit(SpectrumRecord::new(
                        timestamp_ns,
                        frequency + self.frequency_step_2,
                        frequency + self.frequency_step_3,
                        self.bin_width_hz,
                        self.fft_size as u32,
                        pwr_2.to_vec(),
                    ));
                }
                SweepStyle::Linear => {
                    self.emit(SpectrumRecord::new(
                        timestamp_ns,
                        frequency,
                        frequency + self.sample_rate as u64,
                        self.bin_width_hz,
                        self.fft_size as u32,
                        pwr,
                    ));
                }
            }
        }

        self.accepted_bytes += valid_length as u64;

        FramerStatus::Continue
    }

    ////////////////////////////////////////////////////////////////////////////
    // Собственные методы
    ////////////////////////////////////////////////////////////////////////////

    /// Отправляет запись в активный приёмник.
    ///
    /// Ошибка записи не останавливает свип: она логируется, поток
    /// продолжается.
    fn emit(
        &mut self,
        record: SpectrumRecord,
    ) {
        self.records_emitted += 1;

        match &mut self.sink {
            SweepSink::Binary(writer) => {
                if let Err(e) = writer.write_all(&record.encode_binary()) {
                    warn!("Failed to write binary spectrum record: {e}");
                }
            }
            SweepSink::Text(writer) => {
                let line = record.text_line();
                if let Err(e) = writeln!(writer, "{line}") {
                    warn!("Failed to write text spectrum record: {e}");
                }
            }
            SweepSink::Callback(callback) => callback(record),
            SweepSink::Queue(queue) => {
                if let Err(e) = queue.put(&record) {
                    warn!("Failed to enqueue spectrum record: {e}");
                }
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_binary_record;
    use rfsweep_types::BLOCKS_PER_TRANSFER;
    use std::sync::Mutex;

    const RATE: u32 = 20_000_000;
    const BIN_WIDTH: u32 = 100_000;
    const START: u64 = 2_400_000_000;

    /// Sub-block с маркером, BE-частотой и постоянным IQ payload-ом.
    fn block(freq: u64, fill: i8) -> Vec<u8> {
        let mut b = vec![0u8; BYTES_PER_BLOCK];
        b[0] = BLOCK_MARKER;
        b[1] = BLOCK_MARKER;
        b[2..10].copy_from_slice(&freq.to_be_bytes());
        for byte in &mut b[10..] {
            *byte = fill as u8;
        }
        b
    }

    fn blank_block() -> Vec<u8> {
        vec![0u8; BYTES_PER_BLOCK]
    }

    fn transfer(blocks: Vec<Vec<u8>>) -> Vec<u8> {
        assert_eq!(blocks.len(), BLOCKS_PER_TRANSFER);
        blocks.concat()
    }

    fn collecting_framer(
        style: SweepStyle,
        config_mut: impl FnOnce(FramerConfig) -> FramerConfig,
    ) -> (SweepFramer, Arc<Mutex<Vec<SpectrumRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink_records = Arc::clone(&records);
        let sink = SweepSink::Callback(Box::new(move |rec| {
            sink_records.lock().unwrap().push(rec);
        }));

        let cfg = config_mut(FramerConfig::new(style, RATE, BIN_WIDTH, START).unwrap());
        (SweepFramer::new(cfg, sink).unwrap(), records)
    }

    /// Передача: стартовый sub-block, один соседний шаг, остальное без маркера.
    fn one_cycle_transfer() -> Vec<u8> {
        let mut blocks = vec![block(START, 64), block(START + RATE as u64, 64)];
        while blocks.len() < BLOCKS_PER_TRANSFER {
            blocks.push(blank_block());
        }
        transfer(blocks)
    }

    #[test]
    fn test_interleaved_two_records_per_block() {
        let (mut framer, records) = collecting_framer(SweepStyle::Interleaved, |c| c);
        let n = framer.fft_size() as u64;
        assert_eq!(n, 204);

        let status = framer.process_transfer(&one_cycle_transfer(), BYTES_PER_BLOCK * 2);
        assert_eq!(status, FramerStatus::Continue);

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 4, "two records per valid sub-block");

        for rec in records.iter() {
            assert_eq!(rec.power_db.len(), n as usize / 4);
            assert_eq!(rec.fft_size, n as u32);
        }

        // Частотные оси двух записей первого sub-block-а
        let rate = RATE as u64;
        assert_eq!(records[0].start_hz, START);
        assert_eq!(records[0].stop_hz, START + rate / 4);
        assert_eq!(records[1].start_hz, START + rate / 2);
        assert_eq!(records[1].stop_hz, START + rate * 3 / 4);

        // Второй sub-block сдвинут на полный шаг перестройки
        assert_eq!(records[2].start_hz, START + rate);
    }

    #[test]
    fn test_linear_full_spectrum_record() {
        let (mut framer, records) = collecting_framer(SweepStyle::Linear, |c| c);
        let n = framer.fft_size();

        framer.process_transfer(&one_cycle_transfer(), BYTES_PER_BLOCK * 2);

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 2, "one record per valid sub-block");
        assert_eq!(records[0].power_db.len(), n);
        assert_eq!(records[0].start_hz, START);
        assert_eq!(records[0].stop_hz, START + RATE as u64);
    }

    #[test]
    fn test_gating_before_first_cycle() {
        let (mut framer, records) = collecting_framer(SweepStyle::Interleaved, |c| c);

        // Частоты из середины цикла до первой стартовой — подавляются
        let mut blocks = vec![block(START + RATE as u64, 64)];
        while blocks.len() < BLOCKS_PER_TRANSFER {
            blocks.push(blank_block());
        }
        framer.process_transfer(&transfer(blocks), BYTES_PER_BLOCK);

        assert!(records.lock().unwrap().is_empty());

        // После стартовой частоты записи пошли
        framer.process_transfer(&one_cycle_transfer(), BYTES_PER_BLOCK * 2);
        assert_eq!(records.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_frequency_above_max_skipped() {
        let (mut framer, records) = collecting_framer(SweepStyle::Interleaved, |c| c);

        let mut blocks = vec![block(START, 64), block(FREQ_MAX_HZ + 1_000_000, 64)];
        while blocks.len() < BLOCKS_PER_TRANSFER {
            blocks.push(blank_block());
        }
        framer.process_transfer(&transfer(blocks), BYTES_PER_BLOCK * 2);

        // Только стартовый sub-block дал записи
        assert_eq!(records.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_bad_marker_blocks_dropped() {
        let (mut framer, records) = collecting_framer(SweepStyle::Interleaved, |c| c);

        let mut broken = block(START, 64);
        broken[1] = 0;
        let mut blocks = vec![broken];
        while blocks.len() < BLOCKS_PER_TRANSFER {
            blocks.push(blank_block());
        }

        let status = framer.process_transfer(&transfer(blocks), BYTES_PER_BLOCK);
        assert_eq!(status, FramerStatus::Continue);
        assert!(records.lock().unwrap().is_empty());
        assert_eq!(framer.accepted_bytes(), BYTES_PER_BLOCK as u64);
    }

    #[test]
    fn test_one_shot_stops_after_single_cycle() {
        let (mut framer, records) = collecting_framer(SweepStyle::Interleaved, |c| c.one_shot());

        assert_eq!(
            framer.process_transfer(&one_cycle_transfer(), BYTES_PER_BLOCK * 2),
            FramerStatus::Continue
        );
        let after_first = records.lock().unwrap().len();

        // Вторая встреча стартовой частоты закрывает цикл и останавливает поток
        assert_eq!(
            framer.process_transfer(&one_cycle_transfer(), BYTES_PER_BLOCK * 2),
            FramerStatus::Stop
        );
        assert_eq!(framer.sweep_count(), 1);
        assert_eq!(records.lock().unwrap().len(), after_first);
    }

    #[test]
    fn test_max_sweeps_ceiling() {
        let (mut framer, _records) =
            collecting_framer(SweepStyle::Interleaved, |c| c.max_sweeps(2));

        assert_eq!(
            framer.process_transfer(&one_cycle_transfer(), 0),
            FramerStatus::Continue
        );
        assert_eq!(
            framer.process_transfer(&one_cycle_transfer(), 0),
            FramerStatus::Continue
        );
        assert_eq!(framer.sweep_count(), 1);

        assert_eq!(
            framer.process_transfer(&one_cycle_transfer(), 0),
            FramerStatus::Stop
        );
        assert_eq!(framer.sweep_count(), 2);
    }

    #[test]
    fn test_stop_flag_halts_stream() {
        let flag = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&flag);
        let (mut framer, _records) =
            collecting_framer(SweepStyle::Interleaved, move |c| c.stop_flag(stop));

        assert_eq!(
            framer.process_transfer(&one_cycle_transfer(), 0),
            FramerStatus::Continue
        );

        flag.store(true, Ordering::Relaxed);
        assert_eq!(
            framer.process_transfer(&one_cycle_transfer(), 0),
            FramerStatus::Stop
        );
    }

    #[test]
    fn test_binary_sink_stream_parses_back() {
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);

        impl Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let bytes = Arc::new(Mutex::new(Vec::new()));
        let sink = SweepSink::Binary(Box::new(SharedBuf(Arc::clone(&bytes))));
        let cfg = FramerConfig::new(SweepStyle::Interleaved, RATE, BIN_WIDTH, START).unwrap();
        let mut framer = SweepFramer::new(cfg, sink).unwrap();

        framer.process_transfer(&one_cycle_transfer(), BYTES_PER_BLOCK * 2);

        let bytes = bytes.lock().unwrap();
        let mut offset = 0;
        let mut parsed = Vec::new();
        while offset < bytes.len() {
            let (start, stop, bins, used) = decode_binary_record(&bytes[offset..]).unwrap();
            parsed.push((start, stop, bins.len()));
            offset += used;
        }

        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[0].0, START);
        assert_eq!(parsed[0].2, framer.fft_size() / 4);
    }

    #[test]
    fn test_config_rejects_bad_parameters() {
        assert!(FramerConfig::new(SweepStyle::Linear, 19_999_999, BIN_WIDTH, 0).is_err());
        assert!(FramerConfig::new(SweepStyle::Linear, RATE, 6_000_000, 0).is_err());
        assert!(FramerConfig::new(SweepStyle::Linear, RATE, 100, 0).is_err());
    }
}
