//! Configuration module
//!
//! Default parameters for the rig hardware and control loops, plus the
//! runtime configuration assembled from a config file and the command line.

pub mod params;
pub mod settings;

pub use settings::{
    Backend, BrokerConfig, LoadCellConfig, PidConfig, RigConfig, ServoBankConfig, ServoConfig,
    TimingConfig,
};
