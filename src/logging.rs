use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Runtime control over the active log filter.
#[derive(Clone)]
pub struct LogControl {
    handle: FilterHandle,
}

/// Installs the global subscriber. `RUST_LOG` wins over the `info` default.
pub fn init() -> LogControl {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    LogControl { handle }
}

impl LogControl {
    /// Replaces the filter with `directive` (`debug`, `abeille=trace,serenity=warn`, ...).
    pub fn set_filter(&self, directive: &str) -> anyhow::Result<()> {
        let filter = EnvFilter::try_new(directive.trim())?;
        self.handle.reload(filter)?;
        Ok(())
    }

    pub fn current_filter(&self) -> String {
        self.handle
            .with_current(|f| f.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_filter() {
        let (layer, handle) = reload::Layer::<EnvFilter, Registry>::new(EnvFilter::new("info"));
        let control = LogControl { handle };

        control.set_filter("debug").unwrap();
        assert_eq!(control.current_filter(), "debug");

        control.set_filter("abeille=trace,serenity=warn").unwrap();
        assert!(control.current_filter().contains("abeille=trace"));

        assert!(control.set_filter("abeille=notalevel").is_err());
        drop(layer);
    }
}
