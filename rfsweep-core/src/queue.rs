//! Дисковая FIFO-очередь бинарных записей переменной длины.
//!
//! Арена — один растущий backing store (временный файл или память),
//! свободное место в котором учитывает [`IntervalAllocator`]. Producer и
//! consumer развязаны: один мьютекс охраняет дерево, FIFO индексов и
//! backing store как единое целое на время операции, блокирующий `get`
//! паркуется на condvar, не удерживая мьютекс.
//!
//! Рост арены монотонный: store никогда не уменьшается, чтобы не
//! инвалидировать выданные (start, end) диапазоны.

use std::{
    collections::VecDeque,
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    marker::PhantomData,
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use rfsweep_types::{SweepError, SweepResult};

use crate::interval::IntervalAllocator;

/// Backing store арены очереди.
pub trait Slab: Send {
    /// Текущий размер арены в байтах.
    fn size(&self) -> u64;

    /// Увеличивает арену на `additional` байт (только рост).
    fn grow(
        &mut self,
        additional: u64,
    ) -> SweepResult<()>;

    fn write_at(
        &mut self,
        offset: u64,
        data: &[u8],
    ) -> SweepResult<()>;

    fn read_at(
        &mut self,
        offset: u64,
        buf: &mut [u8],
    ) -> SweepResult<()>;
}

/// Арена во временном файле (удаляется ОС при закрытии дескриптора).
pub struct FileSlab {
    file: File,
    size: u64,
}

impl FileSlab {
    pub fn new(initial_size: u64) -> SweepResult<Self> {
        let file = tempfile::tempfile()?;
        file.set_len(initial_size)?;

        Ok(Self {
            file,
            size: initial_size,
        })
    }
}

impl Slab for FileSlab {
    fn size(&self) -> u64 {
        self.size
    }

    fn grow(
        &mut self,
        additional: u64,
    ) -> SweepResult<()> {
        self.size += additional;
        self.file.set_len(self.size)?;
        Ok(())
    }

    fn write_at(
        &mut self,
        offset: u64,
        data: &[u8],
    ) -> SweepResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn read_at(
        &mut self,
        offset: u64,
        buf: &mut [u8],
    ) -> SweepResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }
}

/// Арена в памяти — для коротких сессий и окружений без диска
/// (аналог mmap-варианта очереди).
pub struct MemSlab {
    data: Vec<u8>,
}

impl MemSlab {
    pub fn new(initial_size: u64) -> Self {
        Self {
            data: vec![0u8; initial_size as usize],
        }
    }
}

impl Slab for MemSlab {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn grow(
        &mut self,
        additional: u64,
    ) -> SweepResult<()> {
        self.data
            .resize(self.data.len() + additional as usize, 0u8);
        Ok(())
    }

    fn write_at(
        &mut self,
        offset: u64,
        data: &[u8],
    ) -> SweepResult<()> {
        let start = offset as usize;
        let end = start + data.len();

        if end > self.data.len() {
            return Err(SweepError::Range(format!(
                "write past arena end: {end} > {}",
                self.data.len()
            )));
        }

        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_at(
        &mut self,
        offset: u64,
        buf: &mut [u8],
    ) -> SweepResult<()> {
        let start = offset as usize;
        let end = start + buf.len();

        if end > self.data.len() {
            return Err(SweepError::Range(format!(
                "read past arena end: {end} > {}",
                self.data.len()
            )));
        }

        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}

/// Полезная нагрузка очереди: фиксированная бинарная схема вместо
/// сериализации произвольных объектов.
pub trait QueueRecord: Sized {
    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> SweepResult<Self>;
}

impl QueueRecord for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode(bytes: &[u8]) -> SweepResult<Self> {
        Ok(bytes.to_vec())
    }
}

struct QueueInner<S: Slab> {
    tree: IntervalAllocator,
    fifo: VecDeque<(u64, u64)>,
    slab: S,
}

/// FIFO сериализованных записей поверх растущей арены.
pub struct RecordQueue<T: QueueRecord, S: Slab> {
    inner: Mutex<QueueInner<S>>,
    not_empty: Condvar,
    _payload: PhantomData<T>,
}

/// Очередь с ареной во временном файле.
pub type FileQueue<T> = RecordQueue<T, FileSlab>;

/// Очередь с ареной в памяти.
pub type MemQueue<T> = RecordQueue<T, MemSlab>;

impl<T: QueueRecord> FileQueue<T> {
    pub fn new(initial_size: u64) -> SweepResult<Self> {
        Ok(Self::with_slab(FileSlab::new(initial_size)?))
    }
}

impl<T: QueueRecord> MemQueue<T> {
    pub fn new(initial_size: u64) -> Self {
        Self::with_slab(MemSlab::new(initial_size))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<T: QueueRecord, S: Slab> RecordQueue<T, S> {
    pub fn with_slab(slab: S) -> Self {
        let mut tree = IntervalAllocator::new();

        if slab.size() > 0 {
            tree.insert(0, slab.size());
        }

        Self {
            inner: Mutex::new(QueueInner {
                tree,
                fifo: VecDeque::new(),
                slab,
            }),
            not_empty: Condvar::new(),
            _payload: PhantomData,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner<S>> {
        // Восстанавливаемся после паники другого потока: данные очереди
        // консистентны между операциями
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Кладёт запись в очередь, при нехватке места наращивая арену.
    pub fn put(
        &self,
        record: &T,
    ) -> SweepResult<()> {
        let bytes = record.encode();
        let len = bytes.len() as u64;

        if len == 0 {
            return Err(SweepError::Corrupted("empty record".to_string()));
        }

        {
            let mut inner = self.lock();

            let id = match inner.tree.search(len) {
                Some(id) => id,
                None => {
                    // Дорастили арену ровно на недостающую запись; новый
                    // хвост сливается с возможным свободным концом, поэтому
                    // повторный поиск обязан преуспеть
                    let old_size = inner.slab.size();
                    inner.slab.grow(len)?;
                    inner.tree.insert(old_size, old_size + len);
                    inner
                        .tree
                        .search(len)
                        .expect("grown arena must satisfy the request")
                }
            };

            let (node_start, node_end) = inner.tree.range(id);
            let start = node_start;
            let end = start + len;

            if node_end - node_start == len {
                inner.tree.delete(id);
            } else {
                inner.tree.shrink(id, end, node_end)?;
            }

            inner.slab.write_at(start, &bytes)?;
            inner.fifo.push_back((start, end));
        }

        self.not_empty.notify_one();
        Ok(())
    }

    /// Забирает следующую запись. При пустой очереди: `wait == false` —
    /// сразу `None`, иначе блокируется до появления данных.
    pub fn get(
        &self,
        wait: bool,
    ) -> SweepResult<Option<T>> {
        let mut inner = self.lock();

        while inner.fifo.is_empty() {
            if !wait {
                return Ok(None);
            }
            inner = self
                .not_empty
                .wait(inner)
                .unwrap_or_else(|e| e.into_inner());
        }

        Self::pop_locked(&mut *inner).map(Some)
    }

    /// Как [`get`](Self::get) c `wait == true`, но не дольше `timeout`;
    /// по истечении возвращает `None`, а не ошибку.
    pub fn get_timeout(
        &self,
        timeout: Duration,
    ) -> SweepResult<Option<T>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();

        while inner.fifo.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let (guard, _) = self
                .not_empty
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
        }

        Self::pop_locked(&mut *inner).map(Some)
    }

    fn pop_locked(inner: &mut QueueInner<S>) -> SweepResult<T> {
        let (start, end) = inner
            .fifo
            .pop_front()
            .expect("pop_locked on empty fifo");

        let mut buf = vec![0u8; (end - start) as usize];
        inner.slab.read_at(start, &mut buf)?;

        // Возврат диапазона — точка, где происходит слияние со смежными
        // свободными соседями
        inner.tree.insert(start, end);

        T::decode(&buf)
    }

    /// Количество записей в очереди.
    pub fn len(&self) -> usize {
        self.lock().fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().fifo.is_empty()
    }

    /// Текущий размер арены в байтах.
    pub fn arena_size(&self) -> u64 {
        self.lock().slab.size()
    }

    /// Снимок свободных интервалов арены (диагностика).
    pub fn free_ranges(&self) -> Vec<(u64, u64)> {
        self.lock().tree.free_ranges()
    }

    /// Выбрасывает все записи; арена сохраняет достигнутый размер.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let size = inner.slab.size();

        inner.fifo.clear();
        inner.tree.clear();
        if size > 0 {
            inner.tree.insert(0, size);
        }
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
    fn test_put_get_roundtrip() {
        let q: FileQueue<Vec<u8>> = FileQueue::new(1024).unwrap();
        let payload = vec![1u8, 2, 3, 4, 5];

        q.put(&payload).unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q.get(false).unwrap().unwrap(), payload);
        assert!(q.is_empty());
    }

    #[test]
    fn test_get_on_empty_returns_none() {
        let q: MemQueue<Vec<u8>> = MemQueue::new(64);
        assert!(q.get(false).unwrap().is_none());
    }

    #[test]
    fn test_fifo_order() {
        let q: MemQueue<Vec<u8>> = MemQueue::new(1024);

        for i in 0..10u8 {
            q.put(&vec![i; 3]).unwrap();
        }
        for i in 0..10u8 {
            assert_eq!(q.get(false).unwrap().unwrap(), vec![i; 3]);
        }
    }

    #[test]
    fn test_arena_grows_when_full() {
        let q: FileQueue<Vec<u8>> = FileQueue::new(16).unwrap();
        let big = vec![7u8; 64];

        q.put(&big).unwrap();
        assert!(q.arena_size() >= 64);
        assert_eq!(q.get(false).unwrap().unwrap(), big);

        // Всё место вернулось одним непрерывным куском
        assert_eq!(q.free_ranges(), vec![(0, q.arena_size())]);
    }

    #[test]
    fn test_merge_on_free_allows_reuse() {
        let q: MemQueue<Vec<u8>> = MemQueue::new(32);

        // Два куска по 16 байт забивают арену полностью
        q.put(&vec![1u8; 16]).unwrap();
        q.put(&vec![2u8; 16]).unwrap();

        // После освобождения обоих кусков должен пройти put на полные 32
        q.get(false).unwrap().unwrap();
        q.get(false).unwrap().unwrap();
        assert_eq!(q.free_ranges(), vec![(0, 32)]);

        q.put(&vec![3u8; 32]).unwrap();
        assert_eq!(q.arena_size(), 32, "no growth expected after merge");
        assert_eq!(q.get(false).unwrap().unwrap(), vec![3u8; 32]);
    }

    #[test]
    fn test_varied_sizes_against_model() {
        let q: FileQueue<Vec<u8>> = FileQueue::new(64).unwrap();
        let mut model: VecDeque<Vec<u8>> = VecDeque::new();

        for round in 0..100u64 {
            let size = (round % 37 + 1) as usize;
            let payload = vec![(round % 251) as u8; size];

            q.put(&payload).unwrap();
            model.push_back(payload);

            if round % 3 == 0 {
                assert_eq!(q.get(false).unwrap().unwrap(), model.pop_front().unwrap());
            }
        }

        while let Some(expect) = model.pop_front() {
            assert_eq!(q.get(false).unwrap().unwrap(), expect);
        }

        assert!(q.is_empty());
        assert_eq!(q.free_ranges(), vec![(0, q.arena_size())]);
    }

    #[test]
    fn test_blocking_get_wakes_on_put() {
        let q: Arc<MemQueue<Vec<u8>>> = Arc::new(MemQueue::new(128));
        let q_consumer = q.clone();

        let handle = thread::spawn(move || q_consumer.get(true).unwrap().unwrap());

        thread::sleep(Duration::from_millis(50));
        q.put(&vec![42u8; 8]).unwrap();

        assert_eq!(handle.join().unwrap(), vec![42u8; 8]);
    }

    #[test]
    fn test_get_timeout_expires_empty() {
        let q: MemQueue<Vec<u8>> = MemQueue::new(64);
        let started = Instant::now();

        let got = q.get_timeout(Duration::from_millis(50)).unwrap();

        assert!(got.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_clear_resets_arena() {
        let q: MemQueue<Vec<u8>> = MemQueue::new(64);

        q.put(&vec![1u8; 10]).unwrap();
        q.put(&vec![2u8; 10]).unwrap();
        q.clear();

        assert!(q.is_empty());
        assert_eq!(q.free_ranges(), vec![(0, 64)]);
    }

    #[test]
    fn test_empty_record_rejected() {
        let q: MemQueue<Vec<u8>> = MemQueue::new(64);
        assert!(q.put(&Vec::new()).is_err());
    }
}
