use thiserror::Error;

pub type SessionResult<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// HackRF устройство не найдено
    #[error("HackRF device not found: {0}")]
    DeviceNotFound(String),

    /// Ошибка устройства (открытие, конфигурация, стриминг)
    #[error("HackRF device error: {0}")]
    Device(String),

    /// Ошибка записи выходного файла
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка ядра свипа (конфигурация, диапазоны, очереди)
    #[error("Sweep error: {0}")]
    Core(#[from] rfsweep_types::SweepError),
}
