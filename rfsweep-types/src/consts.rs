//! Константы протокола HackRF sweep.
//!
//! Значения соответствуют прошивке HackRF и libhackrf: размеры USB-передач,
//! маркеры sub-block-ов и допустимые границы перестройки.

/// Минимальная частота перестройки (МГц)
pub const FREQ_MIN_MHZ: u64 = 0;

/// Максимальная частота перестройки (МГц)
pub const FREQ_MAX_MHZ: u64 = 7_250;

/// Максимальная частота перестройки (Гц)
pub const FREQ_MAX_HZ: u64 = FREQ_MAX_MHZ * 1_000_000;

/// Sub-block-ов в одной USB-передаче
pub const BLOCKS_PER_TRANSFER: usize = 16;

/// Размер одного sub-block в байтах (заголовок + IQ payload)
pub const BYTES_PER_BLOCK: usize = 16_384;

/// Байт-маркер начала заголовка sub-block (два подряд)
pub const BLOCK_MARKER: u8 = 127;

/// Размер заголовка sub-block: 2 байта маркера + 8 байт частоты (BE)
pub const BLOCK_HEADER_LEN: usize = 10;

/// Максимальное количество частотных диапазонов в одном свипе
pub const MAX_SWEEP_RANGES: usize = 10;

/// Поддерживаемые частоты дискретизации (Гц)
pub const AVAILABLE_SAMPLE_RATES: [u32; 10] = [
    2_000_000, 4_000_000, 6_000_000, 8_000_000, 10_000_000, 12_000_000, 14_000_000, 16_000_000,
    18_000_000, 20_000_000,
];

/// Частота дискретизации по умолчанию (Гц)
pub const DEFAULT_SAMPLE_RATE: u32 = 20_000_000;

/// Полоса baseband-фильтра как доля частоты дискретизации
pub const BASEBAND_FILTER_BANDWIDTH_RATIO: f64 = 0.75;

/// Смещение гетеродина как доля частоты дискретизации
pub const OFFSET_RATIO: f64 = 0.375;

/// Минимальный размер FFT (bin_width не более sample_rate / 4)
pub const FFT_SIZE_MIN: usize = 4;

/// Максимальный размер FFT (bin_width не менее sample_rate / 8180)
pub const FFT_SIZE_MAX: usize = 8_180;
