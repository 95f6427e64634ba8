use log::LevelFilter;

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

pub fn init(level: LevelFilter) {
    env_logger::builder()
        .filter_level(level)
        .parse_default_env() // RUST_LOG overrides the flag
        .init();
}
