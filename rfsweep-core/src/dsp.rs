//! Оконная функция, прямое FFT и перевод спектра в дБ.
//!
//! FFT берётся готовое из rustfft; здесь только нормировка и лог-шкала,
//! сведённые к схеме hackrf_sweep: power[k] = 10*log10((|X[k]| / N)^2).

use std::sync::Arc;

use rfsweep_types::{SweepError, SweepResult, FFT_SIZE_MAX, FFT_SIZE_MIN};
use rustfft::{num_complex::Complex32, Fft, FftPlanner};

/// Коэффициенты окна Ханна длины `n` (симметричное, как np.hanning).
pub fn hann(n: usize) -> Vec<f32> {
    if n == 1 {
        return vec![1.0];
    }

    (0..n)
        .map(|i| {
            let x = 2.0 * std::f64::consts::PI * i as f64 / (n as f64 - 1.0);
            (0.5 - 0.5 * x.cos()) as f32
        })
        .collect()
}

/// Подбирает размер FFT под запрошенную ширину бина.
///
/// `fft_size = sample_rate / bin_width`, затем инкремент до выполнения
/// аппаратного требования выравнивания `(fft_size + 4) % 8 == 0`.
///
/// Ошибка конфигурации, если bin_width вне [sample_rate/8180, sample_rate/4].
pub fn derive_fft_size(
    sample_rate: u32,
    bin_width: u32,
) -> SweepResult<usize> {
    if bin_width == 0 {
        return Err(SweepError::Config("bin_width must be > 0".to_string()));
    }

    let mut fft_size = (sample_rate / bin_width) as usize;

    if fft_size < FFT_SIZE_MIN {
        return Err(SweepError::Config(format!(
            "bin_width should be no more than {} Hz",
            sample_rate / FFT_SIZE_MIN as u32
        )));
    }

    if fft_size > FFT_SIZE_MAX {
        return Err(SweepError::Config(format!(
            "bin_width should be no less than {} Hz",
            sample_rate / FFT_SIZE_MAX as u32 + 1
        )));
    }

    while (fft_size + 4) % 8 != 0 {
        fft_size += 1;
    }

    Ok(fft_size)
}

/// Спланированное прямое FFT фиксированного размера с переводом в дБ.
pub struct SpectrumFft {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    scratch: Vec<Complex32>,
    norm_factor: f32,
}

impl SpectrumFft {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch_len = fft.get_inplace_scratch_len();

        Self {
            fft,
            size,
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
            norm_factor: 1.0 / size as f32,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// FFT in-place и мощность по бинам в дБ.
    ///
    /// Нулевой бин даёт -inf — это поведение лог-шкалы, не ошибка.
    pub fn power_db(
        &mut self,
        buffer: &mut [Complex32],
    ) -> Vec<f32> {
        debug_assert_eq!(buffer.len(), self.size);

        self.fft.process_with_scratch(buffer, &mut self.scratch);

        buffer
            .iter()
            .map(|c| {
                let magsq = (c.norm() * self.norm_factor).powi(2);
                10.0 * magsq.log10()
            })
            .collect()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_symmetry_and_edges() {
        let w = hann(16);

        assert_eq!(w.len(), 16);
        assert!(w[0].abs() < 1e-7);
        assert!(w[15].abs() < 1e-7);

        for i in 0..8 {
            assert!((w[i] - w[15 - i]).abs() < 1e-6, "window must be symmetric");
        }

        // Центр близок к единице
        let mid = (w[7] + w[8]) / 2.0;
        assert!(mid > 0.97);
    }

    #[test]
    fn test_derive_fft_size_alignment() {
        // 20 МГц / 100 кГц = 200; 200+4=204 не кратно 8 → растим до 204
        let n = derive_fft_size(20_000_000, 100_000).unwrap();
        assert_eq!((n + 4) % 8, 0);
        assert!(n >= 200);
        assert_eq!(n, 204);
    }

    #[test]
    fn test_derive_fft_size_bounds() {
        // Слишком широкий бин: fft_size < 4
        assert!(derive_fft_size(20_000_000, 6_000_000).is_err());
        // Слишком узкий бин: fft_size > 8180
        assert!(derive_fft_size(20_000_000, 100).is_err());
        assert!(derive_fft_size(20_000_000, 0).is_err());
    }

    #[test]
    fn test_power_db_dc_level() {
        // Постоянный сигнал 1.0: X[0] = N, |X[0]|/N = 1 → 0 дБ в нулевом бине
        let size = 64;
        let mut fft = SpectrumFft::new(size);
        let mut buf = vec![Complex32::new(1.0, 0.0); size];

        let pwr = fft.power_db(&mut buf);

        assert_eq!(pwr.len(), size);
        assert!(pwr[0].abs() < 1e-3, "DC bin expected at 0 dB, got {}", pwr[0]);
        for &p in &pwr[1..] {
            assert!(p < -60.0, "non-DC bin expected far below 0 dB, got {p}");
        }
    }

    #[test]
    fn test_power_db_tone_bin() {
        // Комплексная экспонента на k=5 концентрирует энергию в бине 5
        let size = 64;
        let mut fft = SpectrumFft::new(size);

        let mut buf: Vec<Complex32> = (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * 5.0 * i as f32 / size as f32;
                Complex32::new(phase.cos(), phase.sin())
            })
            .collect();

        let pwr = fft.power_db(&mut buf);
        let peak = pwr
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap()
            .0;

        assert_eq!(peak, 5);
    }
}
