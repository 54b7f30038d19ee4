mod settings;

pub use settings::{
    Command, Config, DiagnosticsSettings, DiscoverySettings, Settings, WatchSettings,
};
