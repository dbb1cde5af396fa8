//! Typed - job descriptors and the handler registry.
//!
//! # Two layers
//! - **Typed**: `Task` trait, `Handler<T>` trait
//! - **Dyn**: `Job` trait - object-safe, what the registry and executor use

pub mod codec;
pub mod context;
pub mod handler;
pub mod registry;
pub mod task;

pub use self::codec::PayloadCodec;
pub use self::context::{JobContext, TaskMeta};
pub use self::handler::{Handler, Job, JobError, TypedJob};
pub use self::registry::HandlerRegistry;
pub use self::task::Task;
