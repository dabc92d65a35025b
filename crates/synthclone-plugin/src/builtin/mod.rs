//! Plugins that ship with the host.

mod trimmer;
mod zonegenerator;

pub use trimmer::{TRIMMER_ID, TrimEffect, Trimmer, TrimmerPlugin};
pub use zonegenerator::{
    ZONE_GENERATOR_ID, ZoneGenerator, ZoneGeneratorPlugin, ZoneGeneratorSettings,
};

use crate::runtime::Plugin;

/// Fresh instances of every built-in plugin.
pub fn builtin_plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(ZoneGeneratorPlugin::new()),
        Box::new(TrimmerPlugin::new()),
    ]
}
