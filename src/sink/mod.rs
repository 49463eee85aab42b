mod args;
#[allow(clippy::module_inception)]
mod sink;

use args::Args;

pub use sink::Sink;
