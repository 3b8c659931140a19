use crate::{SweepError, SweepResult};

/// Стиль свипа.
///
/// Сентинельные значения стиля (как `-1` в старых инструментах) не
/// представимы: всё, что не LINEAR и не INTERLEAVED, отклоняется на этапе
/// конфигурации.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SweepStyle {
    /// Один спектральный сегмент на sub-block, полная полоса sample_rate
    Linear = 0,
    /// Два четверть-полосных сегмента на sub-block (схема hackrf_sweep)
    Interleaved = 1,
}

impl SweepStyle {
    pub fn from_u8(v: u8) -> SweepResult<Self> {
        match v {
            0 => Ok(SweepStyle::Linear),
            1 => Ok(SweepStyle::Interleaved),
            _ => Err(SweepError::Config(format!("Unknown sweep style: {v}"))),
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for SweepStyle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            SweepStyle::Linear => write!(f, "linear"),
            SweepStyle::Interleaved => write!(f, "interleaved"),
        }
    }
}

impl std::str::FromStr for SweepStyle {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "l" | "linear" => Ok(SweepStyle::Linear),
            "i" | "interleaved" => Ok(SweepStyle::Interleaved),
            _ => Err(SweepError::Config(format!(
                "Unknown sweep style: '{s}'. Use: L (linear), I (interleaved)"
            ))),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
