//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `detect` | `Detect`         |
//! | `config` | `Config`         |

pub mod config;
pub mod detect;
pub mod serve;

pub use config::{cmd_config, load_config};
pub use detect::cmd_detect;
pub use serve::cmd_serve;
