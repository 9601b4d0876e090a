//! Helpers shared by the command line tools of this workspace.

pub use clap;
pub use clap_verbosity_flag as verbose;

use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Help message styles used by every binary.
pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Green.on_default())
        .invalid(AnsiColor::Red.on_default())
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr in a compact human readable form. If `file` is given,
/// logs are written to it as JSON lines instead. Calling this more than once
/// keeps the first subscriber.
pub fn logging_setup<W>(level: &tracing::Level, file: Option<W>)
where
    W: std::io::Write + Send + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_max_level(*level)
        .with_target(false)
        .without_time();

    let result = match file {
        Some(file) => builder
            .json()
            .with_writer(std::sync::Mutex::new(file))
            .try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    if let Err(err) = result {
        eprintln!("logging already initialized: {err}");
    }
}
