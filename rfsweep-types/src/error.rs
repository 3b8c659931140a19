use thiserror::Error;

/// Результат для операций rfsweep
pub type SweepResult<T> = std::result::Result<T, SweepError>;

/// Типы ошибок ядра rfsweep.
///
/// Остановка потока по one-shot / лимиту свипов и stall-остановка не являются
/// ошибками — это статусы, они не попадают в эту таксономию.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Некорректная конфигурация (bin_width, sample_rate, стиль свипа).
    /// Возникает до запуска стриминга, исправляется повтором с другими параметрами
    #[error("Configuration error: {0}")]
    Config(String),

    /// Некорректный частотный диапазон или нарушение границ интервала
    #[error("Range error: {0}")]
    Range(String),

    /// Ошибка SDR устройства (код статуса драйвера)
    #[error("Device error: {0}")]
    Device(String),

    /// Индекс за пределами записанных данных
    #[error("Index out of range: {index} >= {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Ошибки ввода/вывода (автоконвертируются из std::io::Error)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Повреждённая или неполная запись в очереди
    #[error("Corrupted record: {0}")]
    Corrupted(String),
}

impl SweepError {
    /// Удобные конструкторы
    pub fn config<S: Into<String>>(s: S) -> Self {
        Self::Config(s.into())
    }

    pub fn range<S: Into<String>>(s: S) -> Self {
        Self::Range(s.into())
    }

    pub fn device<S: Into<String>>(s: S) -> Self {
        Self::Device(s.into())
    }

    pub fn corrupted<S: Into<String>>(s: S) -> Self {
        Self::Corrupted(s.into())
    }
}
