use crate::{
    consts::{FREQ_MAX_HZ, MAX_SWEEP_RANGES},
    error::{SweepError, SweepResult},
    style::SweepStyle,
};

/// Один частотный диапазон свипа [start_hz, stop_hz).
///
/// После валидации неизменяем: stop округлён вверх до кратного шагу
/// перестройки, обе границы внутри [0, 7250 МГц].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyRange {
    pub start_hz: u64,
    pub stop_hz: u64,
}

impl FrequencyRange {
    /// Создаёт диапазон без привязки к шагу перестройки. Проверяет только
    /// start < stop; границы проверяются при нормализации в [`SweepPlan`].
    pub fn new(
        start_hz: u64,
        stop_hz: u64,
    ) -> SweepResult<Self> {
        if start_hz >= stop_hz {
            return Err(SweepError::Range(
                "max frequency must be greater than min frequency".to_string(),
            ));
        }

        Ok(Self { start_hz, stop_hz })
    }

    pub fn span_hz(&self) -> u64 {
        self.stop_hz - self.start_hz
    }

    /// Количество шагов перестройки, покрывающих диапазон (ceil).
    pub fn step_count(
        &self,
        tune_step_hz: u64,
    ) -> u64 {
        self.span_hz().div_ceil(tune_step_hz)
    }
}

/// Частотный план свипа: упорядоченный список диапазонов + параметры
/// перестройки. Создаётся один раз на вызов, read-only во время стриминга.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub ranges: Vec<FrequencyRange>,
    pub tune_step_hz: u64,
    pub offset_hz: u64,
    pub style: SweepStyle,
}

impl SweepPlan {
    /// Строит план из "сырых" диапазонов, нормализуя каждый: stop
    /// округляется вверх до `start + step_count * tune_step`.
    ///
    /// Ошибки: пустой список, больше [`MAX_SWEEP_RANGES`] диапазонов,
    /// start >= stop, нормализованный stop выше 7250 МГц.
    pub fn new(
        raw_ranges: Vec<FrequencyRange>,
        tune_step_hz: u64,
        offset_hz: u64,
        style: SweepStyle,
    ) -> SweepResult<Self> {
        if raw_ranges.is_empty() {
            return Err(SweepError::Range(
                "at least one frequency range is required".to_string(),
            ));
        }

        if raw_ranges.len() > MAX_SWEEP_RANGES {
            return Err(SweepError::Range(format!(
                "specify a maximum of {MAX_SWEEP_RANGES} frequency ranges"
            )));
        }

        if tune_step_hz == 0 {
            return Err(SweepError::Config("tune step must be > 0".to_string()));
        }

        let mut ranges = Vec::with_capacity(raw_ranges.len());

        for r in raw_ranges {
            let step_count = r.step_count(tune_step_hz);
            let stop_hz = r.start_hz + step_count * tune_step_hz;

            if stop_hz > FREQ_MAX_HZ {
                return Err(SweepError::Range(format!(
                    "max frequency may not be higher than {} MHz",
                    FREQ_MAX_HZ / 1_000_000
                )));
            }

            ranges.push(FrequencyRange {
                start_hz: r.start_hz,
                stop_hz,
            });
        }

        Ok(Self {
            ranges,
            tune_step_hz,
            offset_hz,
            style,
        })
    }

    /// Частота начала первого диапазона — маркер начала цикла свипа.
    pub fn start_frequency_hz(&self) -> u64 {
        self.ranges[0].start_hz
    }

    pub fn num_ranges(&self) -> usize {
        self.ranges.len()
    }

    /// Суммарное число шагов перестройки за один цикл.
    pub fn total_steps(&self) -> u64 {
        self.ranges
            .iter()
            .map(|r| r.step_count(self.tune_step_hz))
            .sum()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
