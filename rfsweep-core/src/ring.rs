//! Append-only буфер выборок на временном файле.
//!
//! Передаёт большие массивы выборок из потока захвата потребителям, не
//! держа весь массив в памяти процесса. Курсоры `read_ptr <= write_ptr`
//! монотонны до явного `clear`/`rewind`; backing store только растёт.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    marker::PhantomData,
    ops::Range,
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use rfsweep_types::{SweepError, SweepResult};
use rustfft::num_complex::Complex32;

/// Элемент буфера фиксированного размера с little-endian кодировкой.
pub trait Sample: Copy + Send {
    /// Размер элемента в байтах.
    const SIZE: usize;

    fn write_le(
        &self,
        buf: &mut [u8],
    );

    fn read_le(buf: &[u8]) -> Self;
}

impl Sample for i8 {
    const SIZE: usize = 1;

    fn write_le(
        &self,
        buf: &mut [u8],
    ) {
        buf[0] = *self as u8;
    }

    fn read_le(buf: &[u8]) -> Self {
        buf[0] as i8
    }
}

impl Sample for f32 {
    const SIZE: usize = 4;

    fn write_le(
        &self,
        buf: &mut [u8],
    ) {
        buf[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn read_le(buf: &[u8]) -> Self {
        f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
    }
}

impl Sample for Complex32 {
    const SIZE: usize = 8;

    fn write_le(
        &self,
        buf: &mut [u8],
    ) {
        buf[..4].copy_from_slice(&self.re.to_le_bytes());
        buf[4..8].copy_from_slice(&self.im.to_le_bytes());
    }

    fn read_le(buf: &[u8]) -> Self {
        Complex32::new(
            f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        )
    }
}

struct RingInner {
    file: File,
    read_ptr: u64,
    write_ptr: u64,
}

impl RingInner {
    fn read_elements<T: Sample>(
        &mut self,
        byte_start: u64,
        byte_len: usize,
    ) -> SweepResult<Vec<T>> {
        let mut raw = vec![0u8; byte_len];
        self.file.seek(SeekFrom::Start(byte_start))?;
        self.file.read_exact(&mut raw)?;

        Ok(raw.chunks_exact(T::SIZE).map(T::read_le).collect())
    }
}

/// Разделяемый между потоками буфер выборок поверх временного файла.
pub struct SampleRingBuffer<T: Sample> {
    inner: Mutex<RingInner>,
    has_data: Condvar,
    _element: PhantomData<T>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<T: Sample> SampleRingBuffer<T> {
    pub fn new() -> SweepResult<Self> {
        Ok(Self {
            inner: Mutex::new(RingInner {
                file: tempfile::tempfile()?,
                read_ptr: 0,
                write_ptr: 0,
            }),
            has_data: Condvar::new(),
            _element: PhantomData,
        })
    }

    fn lock(&self) -> MutexGuard<'_, RingInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Дописывает элементы в конец буфера и будит ожидающих читателей.
    pub fn append(
        &self,
        data: &[T],
    ) -> SweepResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut raw = vec![0u8; data.len() * T::SIZE];
        for (chunk, sample) in raw.chunks_exact_mut(T::SIZE).zip(data) {
            sample.write_le(chunk);
        }

        {
            let mut inner = self.lock();
            let write_ptr = inner.write_ptr;

            inner.file.seek(SeekFrom::Start(write_ptr))?;
            inner.file.write_all(&raw)?;
            inner.write_ptr += raw.len() as u64;
        }

        self.has_data.notify_all();
        Ok(())
    }

    /// Весь записанный регион с нулевого смещения; курсор чтения не
    /// трогается.
    pub fn get_all(&self) -> SweepResult<Vec<T>> {
        let mut inner = self.lock();
        let len = inner.write_ptr as usize;

        inner.read_elements(0, len)
    }

    /// Только байты, записанные после последнего чтения. Пустой результат,
    /// если новых данных нет и `wait == false`.
    pub fn get_new(
        &self,
        wait: bool,
    ) -> SweepResult<Vec<T>> {
        let mut inner = self.lock();

        while inner.read_ptr == inner.write_ptr {
            if !wait {
                return Ok(Vec::new());
            }
            inner = self
                .has_data
                .wait(inner)
                .unwrap_or_else(|e| e.into_inner());
        }

        Self::take_new(&mut inner)
    }

    /// [`get_new`](Self::get_new) с ограничением времени ожидания; по
    /// истечении возвращает пустой результат, а не ошибку.
    pub fn get_new_timeout(
        &self,
        timeout: Duration,
    ) -> SweepResult<Vec<T>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();

        while inner.read_ptr == inner.write_ptr {
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            let (guard, _) = self
                .has_data
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
        }

        Self::take_new(&mut inner)
    }

    fn take_new(inner: &mut RingInner) -> SweepResult<Vec<T>> {
        let start = inner.read_ptr;
        let len = (inner.write_ptr - start) as usize;
        let result = inner.read_elements(start, len)?;

        inner.read_ptr = inner.write_ptr;
        Ok(result)
    }

    /// Ровно `count` элементов от курсора чтения. При нехватке данных и
    /// `ring == true` курсор заворачивается на начало буфера и чтение
    /// продолжается (кольцевая семантика); иначе — короткое чтение.
    pub fn get_chunk(
        &self,
        count: usize,
        ring: bool,
    ) -> SweepResult<Vec<T>> {
        let mut inner = self.lock();

        if count == 0 || inner.write_ptr == 0 {
            return Ok(Vec::new());
        }

        let total_bytes = (count * T::SIZE) as u64;
        let available = inner.write_ptr - inner.read_ptr;

        if available >= total_bytes {
            let start = inner.read_ptr;
            let result = inner.read_elements(start, total_bytes as usize)?;
            inner.read_ptr += total_bytes;
            return Ok(result);
        }

        if !ring {
            return Self::take_new(&mut inner);
        }

        let mut result = Vec::with_capacity(count);
        while result.len() < count {
            if inner.read_ptr >= inner.write_ptr {
                inner.read_ptr = 0;
            }

            let remaining_bytes = ((count - result.len()) * T::SIZE) as u64;
            let to_read = remaining_bytes.min(inner.write_ptr - inner.read_ptr);
            let start = inner.read_ptr;

            result.extend(inner.read_elements::<T>(start, to_read as usize)?);
            inner.read_ptr += to_read;
        }

        Ok(result)
    }

    /// Элемент по индексу, без сдвига курсора чтения.
    pub fn index(
        &self,
        index: usize,
    ) -> SweepResult<T> {
        let mut inner = self.lock();
        let len = inner.write_ptr as usize / T::SIZE;

        if index >= len {
            return Err(SweepError::IndexOutOfRange { index, len });
        }

        let mut one = inner.read_elements((index * T::SIZE) as u64, T::SIZE)?;
        Ok(one.remove(0))
    }

    /// Срез [start, end) по индексам элементов, без сдвига курсора чтения.
    pub fn slice(
        &self,
        range: Range<usize>,
    ) -> SweepResult<Vec<T>> {
        let mut inner = self.lock();
        let len = inner.write_ptr as usize / T::SIZE;

        if range.start > range.end || range.end > len {
            return Err(SweepError::IndexOutOfRange {
                index: range.end,
                len,
            });
        }

        inner.read_elements(
            (range.start * T::SIZE) as u64,
            (range.end - range.start) * T::SIZE,
        )
    }

    /// Количество записанных элементов.
    pub fn len(&self) -> usize {
        self.lock().write_ptr as usize / T::SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.lock().write_ptr == 0
    }

    /// Есть ли данные, ещё не прочитанные через `get_new`/`get_chunk`.
    pub fn has_new_data(&self) -> bool {
        let inner = self.lock();
        inner.read_ptr < inner.write_ptr
    }

    /// Возвращает курсор чтения на начало буфера.
    pub fn rewind(&self) {
        self.lock().read_ptr = 0;
    }

    /// Усекает backing store и сбрасывает оба курсора.
    pub fn clear(&self) -> SweepResult<()> {
        let mut inner = self.lock();

        inner.file.set_len(0)?;
        inner.file.seek(SeekFrom::Start(0))?;
        inner.read_ptr = 0;
        inner.write_ptr = 0;

        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_append_then_get_all() {
        let buf = SampleRingBuffer::<f32>::new().unwrap();

        buf.append(&[1.0, 2.0]).unwrap();
        buf.append(&[3.0]).unwrap();

        assert_eq!(buf.get_all().unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_get_new_returns_only_unread() {
        let buf = SampleRingBuffer::<i8>::new().unwrap();

        buf.append(&[1, 2, 3]).unwrap();
        assert_eq!(buf.get_new(false).unwrap(), vec![1, 2, 3]);

        buf.append(&[4, 5]).unwrap();
        assert_eq!(buf.get_new(false).unwrap(), vec![4, 5]);

        // Новых данных нет — сразу пустой результат
        assert_eq!(buf.get_new(false).unwrap(), Vec::<i8>::new());
    }

    #[test]
    fn test_get_chunk_wraps_in_ring_mode() {
        let buf = SampleRingBuffer::<i8>::new().unwrap();
        buf.append(&[10, 20, 30]).unwrap();

        // 8 элементов из 3 записанных: содержимое повторяется по кольцу
        let chunk = buf.get_chunk(8, true).unwrap();
        assert_eq!(chunk, vec![10, 20, 30, 10, 20, 30, 10, 20]);
    }

    #[test]
    fn test_get_chunk_short_read_without_ring() {
        let buf = SampleRingBuffer::<i8>::new().unwrap();
        buf.append(&[1, 2, 3]).unwrap();

        let chunk = buf.get_chunk(10, false).unwrap();
        assert_eq!(chunk, vec![1, 2, 3]);
    }

    #[test]
    fn test_get_chunk_exact_advances_cursor() {
        let buf = SampleRingBuffer::<f32>::new().unwrap();
        buf.append(&[1.0, 2.0, 3.0, 4.0]).unwrap();

        assert_eq!(buf.get_chunk(2, true).unwrap(), vec![1.0, 2.0]);
        assert_eq!(buf.get_chunk(2, true).unwrap(), vec![3.0, 4.0]);
        assert!(buf.has_new_data() == false);
    }

    #[test]
    fn test_index_and_slice() {
        let buf = SampleRingBuffer::<f32>::new().unwrap();
        buf.append(&[5.0, 6.0, 7.0, 8.0]).unwrap();

        assert_eq!(buf.index(2).unwrap(), 7.0);
        assert_eq!(buf.slice(1..3).unwrap(), vec![6.0, 7.0]);

        assert!(buf.index(4).is_err());
        assert!(buf.slice(2..9).is_err());
    }

    #[test]
    fn test_complex_samples_roundtrip() {
        let buf = SampleRingBuffer::<Complex32>::new().unwrap();
        let data = vec![Complex32::new(0.5, -0.5), Complex32::new(1.0, 0.25)];

        buf.append(&data).unwrap();
        assert_eq!(buf.get_all().unwrap(), data);
    }

    #[test]
    fn test_clear_resets_cursors() {
        let buf = SampleRingBuffer::<i8>::new().unwrap();

        buf.append(&[1, 2, 3]).unwrap();
        buf.get_new(false).unwrap();
        buf.clear().unwrap();

        assert!(buf.is_empty());
        assert_eq!(buf.get_all().unwrap(), Vec::<i8>::new());

        buf.append(&[9]).unwrap();
        assert_eq!(buf.get_all().unwrap(), vec![9]);
    }

    #[test]
    fn test_rewind_allows_rereading() {
        let buf = SampleRingBuffer::<i8>::new().unwrap();

        buf.append(&[1, 2]).unwrap();
        buf.get_new(false).unwrap();
        buf.rewind();

        assert_eq!(buf.get_new(false).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_blocking_get_new_wakes_on_append() {
        let buf = Arc::new(SampleRingBuffer::<i8>::new().unwrap());
        let reader = buf.clone();

        let handle = thread::spawn(move || reader.get_new(true).unwrap());

        thread::sleep(Duration::from_millis(50));
        buf.append(&[7, 8]).unwrap();

        assert_eq!(handle.join().unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_get_new_timeout_expires_empty() {
        let buf = SampleRingBuffer::<f32>::new().unwrap();
        let started = Instant::now();

        let got = buf.get_new_timeout(Duration::from_millis(40)).unwrap();

        assert!(got.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
