//! dirserv Engine
//!
//! The request-processing core of the directory server: operations flow
//! through a fixed phased pipeline (pre-parse plugins, semantic parse,
//! control validation, pre-operation plugins, a cancellation checkpoint,
//! kind-specific core processing, post-operation plugins, post-response
//! plugins) driven by [`Engine::run`].
//!
//! # Modules
//!
//! - [`engine`] - [`Engine`], its builder and the pipeline
//! - [`operation`] - [`Operation`] state and cancellation
//! - [`bind`], [`compare`], [`delete`] - per-kind request payloads and
//!   core processing
//! - [`plugin`] - the phase-keyed plugin chain
//! - [`locks`] - per-DN read/write locks with bounded waits
//! - [`connection`] - connection arena and authenticated-identity
//!   registry
//! - [`backend`] - the storage trait, [`memory`] an in-process impl
//! - [`config`] - the engine configuration surface

pub mod backend;
pub mod bind;
pub mod compare;
pub mod config;
pub mod connection;
pub mod delete;
pub mod engine;
pub mod error;
pub mod locks;
pub mod memory;
pub mod operation;
pub mod plugin;

pub use backend::{Backend, BackendError};
pub use bind::{BindMethod, BindRequest};
pub use compare::CompareRequest;
pub use config::{EngineConfig, WritabilityMode};
pub use connection::{
    AuthType, AuthenticatedIdentity, ConnectionRegistry, DisconnectNotice,
};
pub use delete::{ChangeListener, DeleteRequest};
pub use engine::{Engine, EngineBuilder};
pub use error::EngineError;
pub use locks::{EntryLockManager, LockError};
pub use memory::MemoryBackend;
pub use operation::{
    CancelRequest, CancelResult, Operation, OperationKind, OperationPayload,
};
pub use plugin::{InvocationCounters, Plugin, PluginChain, PluginPhase, PluginResult};
