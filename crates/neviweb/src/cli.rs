//! Clap derive structures for the `neviweb` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

use neviweb_core::DeviceFamily;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// neviweb -- control Sinopé thermostats, switches and dimmers
#[derive(Debug, Parser)]
#[command(
    name = "neviweb",
    version,
    about = "Control Sinopé devices through Neviweb from the command line",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "NEVIWEB_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API base URL (overrides profile)
    #[arg(long, env = "NEVIWEB_URL", global = true)]
    pub url: Option<String>,

    /// Account e-mail (overrides profile)
    #[arg(long, short = 'u', env = "NEVIWEB_USERNAME", global = true)]
    pub username: Option<String>,

    /// Only discover devices of this location
    #[arg(long, short = 'l', env = "NEVIWEB_LOCATION", global = true)]
    pub location: Option<i64>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "NEVIWEB_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds
    #[arg(long, env = "NEVIWEB_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the account's locations
    #[command(alias = "loc")]
    Locations,

    /// List and inspect supported devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Read a device's current state
    State(StateArgs),

    /// Control a thermostat
    #[command(alias = "th")]
    Thermostat(ThermostatArgs),

    /// Turn a switch or load controller on or off
    #[command(alias = "sw")]
    Switch(SwitchArgs),

    /// Control a dimmer
    #[command(alias = "dm")]
    Dimmer(DimmerArgs),

    /// Poll devices and print every state change until Ctrl-C
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List supported devices
    #[command(alias = "ls")]
    List {
        /// Only devices of this family
        #[arg(long, short = 'f')]
        family: Option<DeviceFamily>,
    },

    /// Show one device
    Get {
        /// Device ID
        id: i64,
    },
}

// ── State ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StateArgs {
    /// Device ID
    pub id: i64,

    /// Bypass the cache and read from the device now
    #[arg(long)]
    pub fresh: bool,
}

// ── Thermostat ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ThermostatArgs {
    #[command(subcommand)]
    pub command: ThermostatCommand,
}

#[derive(Debug, Subcommand)]
pub enum ThermostatCommand {
    /// Set the target temperature
    Setpoint {
        /// Device ID
        id: i64,
        /// Degrees Celsius (5.0 - 30.0)
        celsius: f64,
    },

    /// Set the setpoint mode (off, manual, auto, autoBypass, away, frostProtection)
    Mode {
        /// Device ID
        id: i64,
        mode: String,
    },
}

// ── Switch ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SwitchArgs {
    #[command(subcommand)]
    pub command: SwitchCommand,
}

#[derive(Debug, Subcommand)]
pub enum SwitchCommand {
    /// Turn the load on
    On {
        /// Device ID
        id: i64,
    },
    /// Turn the load off
    Off {
        /// Device ID
        id: i64,
    },
}

// ── Dimmer ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DimmerArgs {
    #[command(subcommand)]
    pub command: DimmerCommand,
}

#[derive(Debug, Subcommand)]
pub enum DimmerCommand {
    /// Turn the light on at its last brightness
    On {
        /// Device ID
        id: i64,
    },
    /// Turn the light off
    Off {
        /// Device ID
        id: i64,
    },
    /// Set the brightness
    Set {
        /// Device ID
        id: i64,
        /// Brightness percentage (0-100)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        intensity: u8,
    },
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only report devices of this family
    #[arg(long, short = 'f')]
    pub family: Option<DeviceFamily>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Show the current configuration (secrets masked)
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// Store a profile's password in the system keyring
    SetPassword {
        /// Profile name (defaults to the active profile)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Print the config file location
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
