//! Illustrative compiled-in extensions
//!
//! Stands in for the third-party extensions a real deployment would load
//! from `WEBINIZER_EXTENSION_PATH`. Demonstrates the three common shapes: an
//! advisor that reacts to a build-option flag, an advisor that reacts to a
//! builder's raw error text, and an action that an advisor's recipe can emit
//! beyond the engine's built-ins.

mod option_advisors;

pub use option_advisors::StandardAdvisorsExtension;
use webinizer_core::extension::Extension;

/// Every extension this binary ships compiled in.
pub fn all() -> Vec<Box<dyn Extension>> {
    vec![Box::new(StandardAdvisorsExtension)]
}
