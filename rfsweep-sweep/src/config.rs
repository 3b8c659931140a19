use std::path::PathBuf;

use rfsweep_types::{
    FrequencyRange, SweepPlan, SweepResult, SweepStyle, AVAILABLE_SAMPLE_RATES,
    DEFAULT_SAMPLE_RATE, OFFSET_RATIO,
};

use crate::{SessionError, SessionResult};

/// Тип устройства (выбор при старте).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    /// Встроенный симулятор (не требует железа).
    Simulated,
    /// HackRF One (требует feature `hackrf` + libhackrf).
    HackRf,
}

/// Полная конфигурация сессии свипа.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Тип устройства
    pub device: DeviceKind,
    /// Серийный номер (None = первое найденное)
    pub serial: Option<String>,
    /// Частотные диапазоны (МГц), парами min:max
    pub ranges_mhz: Vec<(u64, u64)>,
    /// Усиление LNA (0-40 дБ, шаг 8)
    pub lna_gain_db: u32,
    /// Усиление VGA (0-62 дБ, шаг 2)
    pub vga_gain_db: u32,
    /// Ширина частотного бина (Гц)
    pub bin_width_hz: u32,
    /// Частота дискретизации (Гц)
    pub sample_rate_hz: u32,
    /// Стиль свипа
    pub style: SweepStyle,
    /// Остановка после первого полного цикла
    pub one_shot: bool,
    /// Лимит полных циклов (None = до Ctrl+C)
    pub num_sweeps: Option<u64>,
    /// Внешний усилитель RF (+14 дБ)
    pub amp_enable: bool,
    /// Питание антенного порта
    pub antenna_enable: bool,
    /// Бинарный вывод вместо текстового
    pub binary_output: bool,
    /// Путь к выходному файлу (None = stdout)
    pub output_path: Option<PathBuf>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SweepConfig {
    /// Проверяет усиления до каких-либо обращений к железу.
    pub fn validate(&self) -> SessionResult<()> {
        if self.lna_gain_db > 40 || self.lna_gain_db % 8 != 0 {
            return Err(SessionError::Device(format!(
                "LNA gain must be 0-40 dB in 8 dB steps, got {}",
                self.lna_gain_db
            )));
        }

        if self.vga_gain_db > 62 || self.vga_gain_db % 2 != 0 {
            return Err(SessionError::Device(format!(
                "VGA gain must be 0-62 dB in 2 dB steps, got {}",
                self.vga_gain_db
            )));
        }

        Ok(())
    }

    /// Частота дискретизации из поддерживаемого ряда.
    ///
    /// Неподдерживаемое значение заменяется на 20 МГц — вызывающая сторона
    /// логирует замену.
    pub fn normalized_sample_rate(&self) -> u32 {
        if AVAILABLE_SAMPLE_RATES.contains(&self.sample_rate_hz) {
            self.sample_rate_hz
        } else {
            DEFAULT_SAMPLE_RATE
        }
    }

    /// Строит нормализованный частотный план.
    ///
    /// Шаг перестройки равен частоте дискретизации, смещение гетеродина —
    /// 0.375 от неё.
    pub fn build_plan(
        &self,
        sample_rate_hz: u32,
    ) -> SweepResult<SweepPlan> {
        let mut ranges = Vec::with_capacity(self.ranges_mhz.len());
        for &(min_mhz, max_mhz) in &self.ranges_mhz {
            ranges.push(FrequencyRange::new(
                min_mhz * 1_000_000,
                max_mhz * 1_000_000,
            )?);
        }

        let tune_step_hz = sample_rate_hz as u64;
        let offset_hz = (sample_rate_hz as f64 * OFFSET_RATIO) as u64;

        SweepPlan::new(ranges, tune_step_hz, offset_hz, self.style)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для DeviceKind, SweepConfig
////////////////////////////////////////////////////////////////////////////////

impl std::fmt::Display for DeviceKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            DeviceKind::Simulated => write!(f, "sim"),
            DeviceKind::HackRf => write!(f, "hackrf"),
        }
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sim" | "simulated" => Ok(DeviceKind::Simulated),
            "hackrf" | "hackrf_one" => Ok(DeviceKind::HackRf),
            _ => Err(format!("Unknown device type: '{s}'. Use: sim, hackrf")),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            device: DeviceKind::Simulated,
            serial: None,
            ranges_mhz: vec![(0, 6_000)],
            lna_gain_db: 16,
            vga_gain_db: 20,
            bin_width_hz: 100_000,
            sample_rate_hz: DEFAULT_SAMPLE_RATE,
            style: SweepStyle::Interleaved,
            one_shot: false,
            num_sweeps: None,
            amp_enable: false,
            antenna_enable: false,
            binary_output: false,
            output_path: None,
        }
    }
}

/// Парсит строку частоты в герцы.
///
/// Поддерживает суффиксы: `GHz`, `MHz`, `kHz`, `Hz` (регистронезависимо).
///
/// # Примеры
/// ```
/// use rfsweep_sweep::config::parse_freq_hz;
/// assert_eq!(parse_freq_hz("2.4GHz").unwrap(), 2_400_000_000);
/// assert_eq!(parse_freq_hz("20MHz").unwrap(), 20_000_000);
/// assert_eq!(parse_freq_hz("2000000").unwrap(), 2_000_000);
/// ```
pub fn parse_freq_hz(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let lower = s.to_lowercase();

    let (num_str, mult) = if let Some(v) = lower.strip_suffix("ghz") {
        (v.trim(), 1_000_000_000_f64)
    } else if let Some(v) = lower.strip_suffix("mhz") {
        (v.trim(), 1_000_000_f64)
    } else if let Some(v) = lower.strip_suffix("khz") {
        (v.trim(), 1_000_f64)
    } else if let Some(v) = lower.strip_suffix("hz") {
        (v.trim(), 1_f64)
    } else {
        // Без суффикса — число в герцах
        return s
            .parse::<u64>()
            .map_err(|e| format!("Invalid frequency '{s}': {e}"));
    };

    let n: f64 = num_str
        .parse()
        .map_err(|e| format!("Invalid frequency value '{num_str}': {e}"))?;

    Ok((n * mult).round() as u64)
}

/// Парсит список диапазонов свипа вида `0:6000,8000:9000` (МГц).
pub fn parse_freq_ranges(s: &str) -> Result<Vec<(u64, u64)>, String> {
    let mut ranges = Vec::new();

    for pair in s.split(',') {
        let pair = pair.trim();
        let (min_str, max_str) = pair
            .split_once(':')
            .ok_or_else(|| format!("Invalid range '{pair}': expected min:max in MHz"))?;

        let min: u64 = min_str
            .trim()
            .parse()
            .map_err(|e| format!("Invalid min frequency '{min_str}': {e}"))?;
        let max: u64 = max_str
            .trim()
            .parse()
            .map_err(|e| format!("Invalid max frequency '{max_str}': {e}"))?;

        ranges.push((min, max));
    }

    if ranges.is_empty() {
        return Err("at least one frequency range is required".to_string());
    }

    Ok(ranges)
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_freq_hz() {
        assert_eq!(parse_freq_hz("2.4GHz").unwrap(), 2_400_000_000);
        assert_eq!(parse_freq_hz("20MHz").unwrap(), 20_000_000);
        assert_eq!(parse_freq_hz("100kHz").unwrap(), 100_000);
        assert_eq!(parse_freq_hz("2000000Hz").unwrap(), 2_000_000);
        assert_eq!(parse_freq_hz("2000000").unwrap(), 2_000_000);
        assert!(parse_freq_hz("abc").is_err());
    }

    #[test]
    fn test_parse_freq_ranges() {
        assert_eq!(parse_freq_ranges("0:6000").unwrap(), vec![(0, 6_000)]);
        assert_eq!(
            parse_freq_ranges("100:200, 2400:2500").unwrap(),
            vec![(100, 200), (2_400, 2_500)]
        );
        assert!(parse_freq_ranges("100-200").is_err());
        assert!(parse_freq_ranges("a:b").is_err());
    }

    #[test]
    fn test_device_kind_fromstr() {
        assert_eq!("sim".parse::<DeviceKind>().unwrap(), DeviceKind::Simulated);
        assert_eq!("hackrf".parse::<DeviceKind>().unwrap(), DeviceKind::HackRf);
        assert!("unknown".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn test_validate_gains() {
        let mut config = SweepConfig::default();
        assert!(config.validate().is_ok());

        config.lna_gain_db = 41;
        assert!(config.validate().is_err());
        config.lna_gain_db = 12; // не кратно 8
        assert!(config.validate().is_err());

        config.lna_gain_db = 16;
        config.vga_gain_db = 63;
        assert!(config.validate().is_err());
        config.vga_gain_db = 21; // не кратно 2
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_plan_snaps_ranges() {
        let config = SweepConfig {
            ranges_mhz: vec![(100, 150)],
            ..Default::default()
        };

        let plan = config.build_plan(20_000_000).unwrap();
        assert_eq!(plan.tune_step_hz, 20_000_000);
        assert_eq!(plan.offset_hz, 7_500_000);
        assert_eq!(plan.start_frequency_hz(), 100_000_000);
        // 50 МГц при шаге 20 МГц → 3 шага, stop = 160 МГц
        assert_eq!(plan.ranges[0].stop_hz, 160_000_000);
    }

    #[test]
    fn test_normalized_sample_rate_fallback() {
        let mut config = SweepConfig::default();
        assert_eq!(config.normalized_sample_rate(), 20_000_000);

        config.sample_rate_hz = 12_345_678;
        assert_eq!(config.normalized_sample_rate(), 20_000_000);

        config.sample_rate_hz = 8_000_000;
        assert_eq!(config.normalized_sample_rate(), 8_000_000);
    }
}
