//! Log subscriber setup shared by the parkhaus binaries.
//!
//! `RUST_LOG` takes full control when set. Otherwise `PARKHAUS_LOG` picks one
//! level for the listed crates. `LOG_FORMAT=json` switches to JSON lines.
//! Everything goes to stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LEVEL_ENV: &str = "PARKHAUS_LOG";
pub const FORMAT_ENV: &str = "LOG_FORMAT";

fn level(value: Option<&str>) -> &'static str {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn" | "warning") => "warn",
        Some("error") => "error",
        _ => "info",
    }
}

fn directives(crates: &[&str], level: &str) -> String {
    crates
        .iter()
        .map(|name| format!("{}={level}", name.replace('-', "_")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber for `crates`.
///
/// Calling it again after a subscriber is installed does nothing.
pub fn init_tracing(crates: &[&str]) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = level(std::env::var(LEVEL_ENV).ok().as_deref());
            EnvFilter::new(directives(crates, level))
        }
    };

    let json = std::env::var(FORMAT_ENV).is_ok_and(|format| format == "json");

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_defaults_to_info() {
        assert_eq!(level(None), "info");
        assert_eq!(level(Some("verbose")), "info");
    }

    #[test]
    fn level_accepts_aliases() {
        assert_eq!(level(Some("DEBUG")), "debug");
        assert_eq!(level(Some("warning")), "warn");
        assert_eq!(level(Some("error")), "error");
    }

    #[test]
    fn directives_cover_each_crate() {
        assert_eq!(
            directives(&["parkhaus", "parkhaus-server"], "warn"),
            "parkhaus=warn,parkhaus_server=warn"
        );
    }
}
