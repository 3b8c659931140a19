use std::{
    fs::File,
    io::BufWriter,
    path::PathBuf,
    sync::atomic::Ordering,
};

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use rfsweep_core::SweepSink;
use rfsweep_sweep::{
    create_device, parse_freq_hz, parse_freq_ranges, DeviceKind, SweepConfig, TransferSession,
};
use rfsweep_types::SweepStyle;

#[derive(Parser, Debug)]
#[command(
    name = "rfsweep",
    version = env!("CARGO_PKG_VERSION"),
    about = "Wideband spectrum sweep and raw IQ transfer for HackRF",
    long_about = None,
)]
struct Cli {
    /// Тихий режим (только ошибки)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Информация об устройстве
    Info {
        /// Устройство: sim, hackrf
        #[arg(short, long, default_value = "sim")]
        device: String,
        /// Серийный номер устройства
        #[arg(short, long)]
        serial: Option<String>,
    },
    /// Свип по частотным диапазонам
    Sweep {
        /// Устройство: sim, hackrf
        #[arg(short, long, default_value = "sim")]
        device: String,
        /// Серийный номер устройства
        #[arg(long)]
        serial: Option<String>,
        /// Диапазоны в МГц, парами min:max (0:6000,8000:9000)
        #[arg(short, long, default_value = "0:6000")]
        freq: String,
        /// Усиление LNA, дБ (0-40, шаг 8)
        #[arg(short, long, default_value = "16")]
        lna_gain: u32,
        /// Усиление VGA, дБ (0-62, шаг 2)
        #[arg(short = 'g', long, default_value = "20")]
        vga_gain: u32,
        /// Ширина частотного бина (100kHz, 100000)
        #[arg(short = 'w', long, default_value = "100kHz")]
        bin_width: String,
        /// Частота дискретизации (20MHz, 20000000)
        #[arg(short = 'r', long, default_value = "20MHz")]
        rate: String,
        /// Стиль свипа: linear, interleaved
        #[arg(long, default_value = "interleaved")]
        style: String,
        /// Включить внешний усилитель RF (+14 дБ)
        #[arg(short, long)]
        amp: bool,
        /// Включить питание антенного порта
        #[arg(long)]
        antenna: bool,
        /// Остановиться после первого полного цикла
        #[arg(short = '1', long)]
        one_shot: bool,
        /// Остановиться после N полных циклов
        #[arg(short = 'n', long)]
        num_sweeps: Option<u64>,
        /// Бинарный вывод вместо текстового
        #[arg(short = 'B', long)]
        binary: bool,
        /// Выходной файл (по умолчанию stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Сырой приём IQ на фиксированной частоте
    Transfer {
        /// Устройство: sim, hackrf
        #[arg(short, long, default_value = "sim")]
        device: String,
        /// Серийный номер устройства
        #[arg(long)]
        serial: Option<String>,
        /// Центральная частота (2.4GHz, 2400000000)
        #[arg(short, long, default_value = "900MHz")]
        freq: String,
        /// Частота дискретизации (20MHz, 20000000)
        #[arg(short = 'r', long, default_value = "20MHz")]
        rate: String,
        /// Усиление LNA, дБ (0-40, шаг 8)
        #[arg(short, long, default_value = "16")]
        lna_gain: u32,
        /// Усиление VGA, дБ (0-62, шаг 2)
        #[arg(short = 'g', long, default_value = "20")]
        vga_gain: u32,
        /// Включить внешний усилитель RF (+14 дБ)
        #[arg(short, long)]
        amp: bool,
        /// Ограничение по числу IQ выборок
        #[arg(short, long)]
        num_samples: Option<u64>,
        /// Выходной файл с сырыми int8 IQ байтами
        #[arg(short, long, default_value = "transfer.iq")]
        output: PathBuf,
    },
}

fn parse_rate(s: &str) -> u32 {
    match parse_freq_hz(s) {
        Ok(r) if r <= u32::MAX as u64 => r as u32,
        Ok(r) => {
            error!("--rate {r} Hz exceeds u32::MAX");
            std::process::exit(1);
        }
        Err(e) => {
            error!("--rate: {e}");
            std::process::exit(1);
        }
    }
}

fn parse_device(s: &str) -> DeviceKind {
    match s.parse() {
        Ok(d) => d,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

fn install_ctrlc(session: &TransferSession) {
    let stop_ctrlc = session.stop_flag();

    if let Err(e) = ctrlc::set_handler(move || {
        if stop_ctrlc.swap(true, Ordering::SeqCst) {
            // Второй Ctrl+C — принудительный выход
            warn!("Force exit");
            std::process::exit(130);
        }
        warn!("Ctrl+C received — finishing current sweep and closing device...");
    }) {
        warn!("Failed to set Ctrl+C handler: {e}");
    }
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.quiet { "error" } else { "info" };

    env_logger::Builder::new()
        .filter_level(level.parse().unwrap())
        .format_target(false)
        .format_timestamp_secs()
        .init();

    match cli.command {
        Command::Info { device, serial } => {
            let config = SweepConfig {
                device: parse_device(&device),
                serial,
                ..Default::default()
            };

            let device = match create_device(&config) {
                Ok(d) => d,
                Err(e) => {
                    error!("Failed to open device: {e}");
                    std::process::exit(1);
                }
            };

            let info = device.info();
            info!("Found {}", info.name);
            info!("  Serial   : {}", info.serial.as_deref().unwrap_or("n/a"));
            info!("  Board ID : {}", info.board_id);
            info!("  Firmware : {}", info.firmware_version);
        }

        Command::Sweep {
            device,
            serial,
            freq,
            lna_gain,
            vga_gain,
            bin_width,
            rate,
            style,
            amp,
            antenna,
            one_shot,
            num_sweeps,
            binary,
            output,
        } => {
            let ranges_mhz = match parse_freq_ranges(&freq) {
                Ok(r) => r,
                Err(e) => {
                    error!("--freq: {e}");
                    std::process::exit(1);
                }
            };

            let bin_width_hz = match parse_freq_hz(&bin_width) {
                Ok(w) if w <= u32::MAX as u64 => w as u32,
                Ok(_) | Err(_) => {
                    error!("--bin-width: invalid value '{bin_width}'");
                    std::process::exit(1);
                }
            };

            let style: SweepStyle = match style.parse() {
                Ok(s) => s,
                Err(e) => {
                    error!("--style: {e}");
                    std::process::exit(1);
                }
            };

            let config = SweepConfig {
                device: parse_device(&device),
                serial,
                ranges_mhz,
                lna_gain_db: lna_gain,
                vga_gain_db: vga_gain,
                bin_width_hz,
                sample_rate_hz: parse_rate(&rate),
                style,
                one_shot,
                num_sweeps,
                amp_enable: amp,
                antenna_enable: antenna,
                binary_output: binary,
                output_path: output.clone(),
            };

            let sink = match make_sink(binary, output.as_ref()) {
                Ok(s) => s,
                Err(e) => {
                    error!("Failed to open output: {e}");
                    std::process::exit(1);
                }
            };

            let device = match create_device(&config) {
                Ok(d) => d,
                Err(e) => {
                    error!("Failed to open device: {e}");
                    std::process::exit(1);
                }
            };

            let (session, _metrics) = TransferSession::new(config);
            install_ctrlc(&session);

            if let Err(e) = session.run_sweep(device, sink) {
                error!("Sweep failed: {e}");
                std::process::exit(1);
            }
        }

        Command::Transfer {
            device,
            serial,
            freq,
            rate,
            lna_gain,
            vga_gain,
            amp,
            num_samples,
            output,
        } => {
            let center_freq_hz = match parse_freq_hz(&freq) {
                Ok(f) => f,
                Err(e) => {
                    error!("--freq: {e}");
                    std::process::exit(1);
                }
            };

            let config = SweepConfig {
                device: parse_device(&device),
                serial,
                lna_gain_db: lna_gain,
                vga_gain_db: vga_gain,
                sample_rate_hz: parse_rate(&rate),
                amp_enable: amp,
                output_path: Some(output.clone()),
                ..Default::default()
            };

            let device = match create_device(&config) {
                Ok(d) => d,
                Err(e) => {
                    error!("Failed to open device: {e}");
                    std::process::exit(1);
                }
            };

            let (session, _metrics) = TransferSession::new(config);
            install_ctrlc(&session);

            if let Err(e) = session.run_transfer(device, center_freq_hz, &output, num_samples) {
                error!("Transfer failed: {e}");
                std::process::exit(1);
            }

            info!("✓ Transfer complete: {:?}", output);
        }
    }
}

/// Выбирает приёмник записей: файл или stdout, бинарный или текстовый.
fn make_sink(
    binary: bool,
    output: Option<&PathBuf>,
) -> std::io::Result<SweepSink> {
    let writer: Box<dyn std::io::Write + Send> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout()),
    };

    Ok(if binary {
        SweepSink::Binary(writer)
    } else {
        SweepSink::Text(writer)
    })
}
