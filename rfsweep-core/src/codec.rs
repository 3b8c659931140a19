//! Проводные форматы записей спектра.
//!
//! Бинарная запись (формат hackrf_sweep -B):
//! `u32 record_length | u64 start_hz | u64 stop_hz | f32 x bins`,
//! все поля little-endian, `record_length = 16 + 4 * bins` (само поле длины
//! не учитывается).
//!
//! Текстовая запись — CSV-строка
//! `date, time, start_hz, stop_hz, bin_width, fft_size, db, db, ...`.
//!
//! Для очереди записей используется расширенная рамка с timestamp и
//! параметрами FFT, чтобы round-trip был без потерь.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::DateTime;
use rfsweep_types::{SpectrumRecord, SweepError, SweepResult};

use crate::queue::QueueRecord;

/// Сериализация [`SpectrumRecord`] в проводные форматы.
pub trait SpectrumRecordExt {
    /// Бинарная запись формата hackrf_sweep.
    fn encode_binary(&self) -> Vec<u8>;

    /// CSV-строка с ISO-временем (без завершающего перевода строки).
    fn text_line(&self) -> String;
}

impl SpectrumRecordExt for SpectrumRecord {
    fn encode_binary(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.record_length() as usize);

        // Поля фиксированной ширины: write в Vec не может отказать
        let _ = out.write_u32::<LittleEndian>(self.record_length());
        let _ = out.write_u64::<LittleEndian>(self.start_hz);
        let _ = out.write_u64::<LittleEndian>(self.stop_hz);
        for &db in &self.power_db {
            let _ = out.write_f32::<LittleEndian>(db);
        }

        out
    }

    fn text_line(&self) -> String {
        let ts = format_timestamp(self.timestamp_ns);
        let mut line = format!(
            "{ts}, {}, {}, {:.2}, {}",
            self.start_hz, self.stop_hz, self.bin_width_hz, self.fft_size
        );

        for &db in &self.power_db {
            line.push_str(&format!(", {db:.2}"));
        }

        line
    }
}

/// Unix-наносекунды в строку `YYYY-MM-DD, HH:MM:SS.ffffff` (UTC).
pub fn format_timestamp(timestamp_ns: u64) -> String {
    DateTime::from_timestamp_nanos(timestamp_ns as i64)
        .format("%Y-%m-%d, %H:%M:%S%.6f")
        .to_string()
}

/// Разбирает одну бинарную запись, возвращая (start_hz, stop_hz, бины).
///
/// Возвращает также количество потреблённых байт — записи идут в потоке
/// подряд.
pub fn decode_binary_record(bytes: &[u8]) -> SweepResult<(u64, u64, Vec<f32>, usize)> {
    let mut cur = Cursor::new(bytes);

    let record_length = cur
        .read_u32::<LittleEndian>()
        .map_err(|_| SweepError::corrupted("truncated record length"))?;

    if record_length < 16 || (record_length - 16) % 4 != 0 {
        return Err(SweepError::Corrupted(format!(
            "bad record length: {record_length}"
        )));
    }

    let total = 4 + record_length as usize;
    if bytes.len() < total {
        return Err(SweepError::corrupted("truncated record body"));
    }

    let start_hz = cur.read_u64::<LittleEndian>()?;
    let stop_hz = cur.read_u64::<LittleEndian>()?;

    let bin_count = (record_length as usize - 16) / 4;
    let mut power_db = Vec::with_capacity(bin_count);
    for _ in 0..bin_count {
        power_db.push(cur.read_f32::<LittleEndian>()?);
    }

    Ok((start_hz, stop_hz, power_db, total))
}

impl QueueRecord for SpectrumRecord {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(36 + 4 * self.power_db.len());

        let _ = out.write_u64::<LittleEndian>(self.timestamp_ns);
        let _ = out.write_u64::<LittleEndian>(self.start_hz);
        let _ = out.write_u64::<LittleEndian>(self.stop_hz);
        let _ = out.write_f64::<LittleEndian>(self.bin_width_hz);
        let _ = out.write_u32::<LittleEndian>(self.fft_size);
        let _ = out.write_u32::<LittleEndian>(self.power_db.len() as u32);
        for &db in &self.power_db {
            let _ = out.write_f32::<LittleEndian>(db);
        }

        out
    }

    fn decode(bytes: &[u8]) -> SweepResult<Self> {
        let mut cur = Cursor::new(bytes);

        let timestamp_ns = cur.read_u64::<LittleEndian>()?;
        let start_hz = cur.read_u64::<LittleEndian>()?;
        let stop_hz = cur.read_u64::<LittleEndian>()?;
        let bin_width_hz = cur.read_f64::<LittleEndian>()?;
        let fft_size = cur.read_u32::<LittleEndian>()?;
        let bin_count = cur.read_u32::<LittleEndian>()? as usize;

        if bytes.len() != 40 + bin_count * 4 {
            return Err(SweepError::Corrupted(format!(
                "framed record size mismatch: {} bytes for {bin_count} bins",
                bytes.len()
            )));
        }

        let mut power_db = Vec::with_capacity(bin_count);
        for _ in 0..bin_count {
            power_db.push(cur.read_f32::<LittleEndian>()?);
        }

        Ok(Self {
            timestamp_ns,
            start_hz,
            stop_hz,
            bin_width_hz,
            fft_size,
            power_db,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemQueue;

    fn sample_record() -> SpectrumRecord {
        SpectrumRecord::new(
            1_700_000_000_123_456_789,
            2_400_000_000,
            2_405_000_000,
            98_039.22,
            51,
            vec![-72.25, -68.5, -80.0],
        )
    }

    #[test]
    fn test_binary_layout_exact() {
        let rec = SpectrumRecord::new(0, 100, 200, 50.0, 4, vec![1.5, -2.5]);
        let bytes = rec.encode_binary();

        // length = 16 + 4*2 = 24; всего 4 + 24 байта
        assert_eq!(bytes.len(), 28);
        assert_eq!(&bytes[0..4], &24u32.to_le_bytes());
        assert_eq!(&bytes[4..12], &100u64.to_le_bytes());
        assert_eq!(&bytes[12..20], &200u64.to_le_bytes());
        assert_eq!(&bytes[20..24], &1.5f32.to_le_bytes());
        assert_eq!(&bytes[24..28], &(-2.5f32).to_le_bytes());
    }

    #[test]
    fn test_binary_stream_roundtrip() {
        let rec = sample_record();
        let mut stream = rec.encode_binary();
        stream.extend(rec.encode_binary());

        let (start, stop, bins, used) = decode_binary_record(&stream).unwrap();
        assert_eq!(start, rec.start_hz);
        assert_eq!(stop, rec.stop_hz);
        assert_eq!(bins, rec.power_db);

        // Вторая запись начинается сразу за первой
        let (start2, _, _, used2) = decode_binary_record(&stream[used..]).unwrap();
        assert_eq!(start2, rec.start_hz);
        assert_eq!(used + used2, stream.len());
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let rec = sample_record();
        let bytes = rec.encode_binary();

        assert!(decode_binary_record(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode_binary_record(&bytes[..3]).is_err());
    }

    #[test]
    fn test_text_line_format() {
        let rec = sample_record();
        let line = rec.text_line();

        assert!(line.starts_with("2023-11-14, "));
        assert!(line.contains(", 2400000000, 2405000000, 98039.22, 51, "));
        assert!(line.ends_with("-72.25, -68.50, -80.00"));
    }

    #[test]
    fn test_queue_roundtrip_lossless() {
        let q: MemQueue<SpectrumRecord> = MemQueue::new(256);
        let rec = sample_record();

        q.put(&rec).unwrap();
        assert_eq!(q.get(false).unwrap().unwrap(), rec);
    }
}
