//! Core library for tide.
//!
//! tide runs a tmux session whose windows host full-screen terminal tools
//! (shell, tree browser, markdown viewer, ...) and binds function keys to
//! them. tmux key bindings live in a server-global table, so every key tide
//! binds must be retracted when the session ends or it keeps pointing at a
//! session that no longer exists. This crate owns that lifecycle:
//!
//! - [`naming`]: session names (`<prefix>-<pid>` or operator supplied)
//! - [`plan`]: the ordered window layout and its hotkeys
//! - [`bindings`]: the single registry of every managed key and its action
//! - [`lifecycle`]: startup / shutdown protocol over a [`Multiplexer`]
//!
//! ```ignore
//! use tide_core::{LaunchSpec, LifecycleController, WindowPlan};
//!
//! let plan = WindowPlan::default_for(&cwd, &PlanDefaults::default())?;
//! let controller = LifecycleController::new(tmux, spec, plan)?;
//! controller.start()?;
//! controller.attach()?;
//! controller.shutdown();
//! ```

pub mod bindings;
pub mod command;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod multiplexer;
pub mod naming;
pub mod plan;
pub mod quote;

pub use bindings::{Auxiliary, Binding, BindingRegistry, KeyAction, KeyTable, ManagedKey};
pub use command::{MenuItem, TmuxCommand};
pub use error::{LaunchError, PlanError};
pub use lifecycle::{
    Appearance, LaunchSpec, LifecycleController, LifecycleState, ShutdownOutcome, StartOutcome,
};
pub use memory::MemoryMultiplexer;
pub use multiplexer::{Multiplexer, OptionScope, SessionCreate};
pub use naming::{derive_session_name, SessionInfo, DEFAULT_PREFIX};
pub use plan::{Hotkey, Launch, PlanDefaults, WindowPlan, WindowSpec};
