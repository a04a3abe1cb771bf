use crate::Result;

/// Initialize tracing for the bot.
///
/// Default: info for our crates, warn for everything else. Override with `RUST_LOG`.
/// Logs go to stderr.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}

fn default_directives(service_name: &str) -> String {
    format!("warn,psb=info,psb_core=info,psb_git=info,psb_telegram=info,{service_name}=info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_quiet_outside_our_crates() {
        let directives = default_directives("psb");
        assert!(directives.starts_with("warn,"));
        for target in ["psb_core", "psb_git", "psb_telegram"] {
            assert!(directives.contains(&format!("{target}=info")), "{target}");
        }
        assert!(tracing_subscriber::EnvFilter::try_new(&directives).is_ok());
    }
}
