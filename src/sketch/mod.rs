//! Sketch build orchestration around the external `arduino-cli` tool.
//!
//! ## Module Map
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `builder`   | `SketchBuilder`: compile / upload chains                |
//! | `workspace` | `WorkspaceManager`, scoped `SketchWorkspace` guard      |
//! | `runner`    | `CommandRunner` trait, `ArduinoCli`, `Invocation`       |
//! | `ports`     | Ranked `PortRule`s over `board list` output             |
//! | `locks`     | `PortLocks`: one upload at a time per serial port       |

pub mod builder;
pub mod locks;
pub mod ports;
pub mod runner;
pub mod workspace;

pub use builder::{BuildReport, BuildRequest, SketchBuilder};
pub use ports::{PortRule, PortSelection, PortSelector};
pub use runner::{ArduinoCli, CommandRunner, Invocation, ProcessOutput, RunnerError};
pub use workspace::{SketchWorkspace, WorkspaceManager};
