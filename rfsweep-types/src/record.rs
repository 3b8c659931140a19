/// Одна запись спектра — результат обработки одного сегмента FFT.
///
/// Неизменяема после эмиссии; потребляется одним из sink-ов (файл, stdout,
/// callback, очередь записей).
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumRecord {
    /// Unix-время захвата (наносекунды)
    pub timestamp_ns: u64,
    /// Нижняя граница сегмента (Гц)
    pub start_hz: u64,
    /// Верхняя граница сегмента (Гц)
    pub stop_hz: u64,
    /// Ширина одного бина (Гц)
    pub bin_width_hz: f64,
    /// Размер FFT, из которого получен сегмент
    pub fft_size: u32,
    /// Мощность по бинам, дБ
    pub power_db: Vec<f32>,
}

impl SpectrumRecord {
    pub fn new(
        timestamp_ns: u64,
        start_hz: u64,
        stop_hz: u64,
        bin_width_hz: f64,
        fft_size: u32,
        power_db: Vec<f32>,
    ) -> Self {
        Self {
            timestamp_ns,
            start_hz,
            stop_hz,
            bin_width_hz,
            fft_size,
            power_db,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.power_db.len()
    }

    /// Длина бинарной записи проводного формата: 16 служебных байт + бины.
    pub fn record_length(&self) -> u32 {
        16 + 4 * self.power_db.len() as u32
    }
}
