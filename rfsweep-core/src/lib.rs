//! Алгоритмическое ядро rfsweep.
//!
//! Превращает поток USB-передач HackRF (8-битные IQ блоки с частотными
//! маркерами) в записи спектра мощности или непрерывные буферы выборок:
//!
//! - [`interval`] — AVL-дерево свободных байтовых интервалов (аллокатор
//!   арены очереди записей);
//! - [`queue`] — FIFO переменных бинарных записей поверх растущей арены;
//! - [`ring`] — append-only буфер выборок на файле с курсорами чтения/записи;
//! - [`dsp`] — окно Ханна, прямое FFT, перевод в дБ;
//! - [`sweep`] — конечный автомат кадрирования свипа;
//! - [`codec`] — бинарный и текстовый формат записей спектра.
//!
//! # Быстрый старт
//!
//! ```no_run
//! use rfsweep_core::{SweepFramer, FramerConfig, SweepSink};
//! use rfsweep_types::SweepStyle;
//!
//! let cfg = FramerConfig::new(SweepStyle::Interleaved, 20_000_000, 100_000, 0)?;
//! let sink = SweepSink::Callback(Box::new(|rec| println!("{} Hz", rec.start_hz)));
//! let mut framer = SweepFramer::new(cfg, sink)?;
//! # Ok::<(), rfsweep_types::SweepError>(())
//! ```

pub mod codec;
pub mod dsp;
pub mod interval;
pub mod queue;
pub mod ring;
pub mod sweep;

pub use codec::*;
pub use dsp::*;
pub use interval::*;
pub use queue::*;
pub use ring::*;
pub use sweep::*;

/// Версия библиотеки.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
