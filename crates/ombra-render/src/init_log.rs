//! 日志初始化
//!
//! 默认 Info 级别，可以用 RUST_LOG 环境变量覆盖，
//! 例如 `RUST_LOG=ombra_render=debug`。

use std::{io::Write, path::Path};

/// 从编译器给出的源文件路径中取出文件名，路径分隔符由 Path 处理
fn source_file_name(path: &str) -> &str {
    Path::new(path).file_name().and_then(|name| name.to_str()).unwrap_or(path)
}

pub fn init_log() {
    env_logger::Builder::new()
        .format(|buf, record| {
            let level_style = match record.level() {
                log::Level::Error => buf
                    .default_level_style(log::Level::Error)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
                log::Level::Warn => buf
                    .default_level_style(log::Level::Warn)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
                log::Level::Info => buf
                    .default_level_style(log::Level::Info)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
                _ => buf.default_level_style(record.level()),
            };
            let dim_style =
                anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::BrightBlack)));

            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let file = record.file().map(source_file_name).unwrap_or("?");
            let line = record.line().unwrap_or(0);

            writeln!(
                buf,
                "{dim_style}{time}{dim_style:#} {level_style}{:5}{level_style:#} {} {dim_style}{file}:{line}{dim_style:#}",
                record.level(),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_file_name() {
        assert_eq!(source_file_name("crates/ombra-render/src/init_log.rs"), "init_log.rs");
        assert_eq!(source_file_name("lib.rs"), "lib.rs");
        assert_eq!(source_file_name(""), "");
    }
}
