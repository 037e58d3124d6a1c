use std::time::Duration;

/// Options of a configured controller entry.
#[derive(clap::Parser, Clone, Debug)]
#[group(id = "config::Args")]
pub struct Args {
    /// Open sunblind slats with the short tilt pulse instead of the full one.
    #[arg(long)]
    cover_use_short_tilt: bool,

    /// Expose an additional switch for a `device.field` point not advertised by the controller.
    #[arg(long = "manual-switch", value_name = "DEVICE.FIELD")]
    manual_switches: Vec<String>,

    /// How often the controller state is polled.
    #[arg(long, default_value = "2s")]
    update_interval: humantime::Duration,

    /// Consider a controller read failed if it does not complete in this amount of time.
    #[arg(long, default_value = "10s")]
    request_timeout: humantime::Duration,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryConfig {
    pub cover_use_short_tilt: bool,
    pub manual_switches: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinatorConfig {
    pub update_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { update_interval: Duration::from_secs(2), request_timeout: Duration::from_secs(10) }
    }
}

impl Args {
    pub fn entry(&self) -> EntryConfig {
        EntryConfig {
            cover_use_short_tilt: self.cover_use_short_tilt,
            manual_switches: self.manual_switches.clone(),
        }
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            update_interval: *self.update_interval,
            request_timeout: *self.request_timeout,
        }
    }
}
