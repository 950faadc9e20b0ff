//! Webhook simulation domain module
//!
//! Manages the per-flow singleton webhook simulation record.
//!
//! # Architecture
//!
//! - **Entities**: `SimulationResource`, `NewSimulation`, `FlowId`, `ProjectId`
//! - **Repository**: `SimulationRepository` for database operations
//! - **Hooks**: `SimulationHooks` for side effects before each transition
//! - **Service**: `SimulationService` for lock-serialized lifecycle transitions
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use flowsim_core::domain::locking::LockManager;
//! use flowsim_core::domain::simulation::{NoopHooks, SimulationRepository, SimulationService};
//!
//! let service = SimulationService::new(
//!     Arc::new(SimulationRepository::new(pool.clone())),
//!     Arc::new(LockManager::with_lock_dir("/var/run/flowsim")),
//!     Arc::new(NoopHooks),
//! );
//!
//! // Replaces any existing simulation for the flow
//! let sim = service.create(&"flow-1".into(), &"proj-1".into()).await?;
//!
//! service.delete(&sim.flow_id, &sim.project_id).await?;
//! ```

pub mod entity;
pub mod hooks;
pub mod repository;
pub mod repository_trait;
pub mod service;

// Re-export main types
pub use entity::{FlowId, NewSimulation, ProjectId, SimulationResource};
pub use hooks::{LoggingHooks, NoopHooks, SimulationHooks};
pub use repository::SimulationRepository;
pub use repository_trait::SimulationRepositoryTrait;
pub use service::{LockOperation, SimulationService};
