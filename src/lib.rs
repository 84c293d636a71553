//! `swarmrt` is an intrusive, reference-counted object model paired with
//! a small dispatch-queue runtime: the two primitives a COM/WinRT-style
//! component system builds on, rendered in ordinary safe-ish Rust
//! instead of virtual-inheritance C++.
//!
//! # Object model
//!
//! * [`rc::StrongRef<T>`] / [`rc::WeakRef<T>`]: an owning/non-owning
//!   handle to a heap-allocated, intrusively-refcounted `T`, default-null
//!   constructible, with COM-style [`interface::Interface::answers_to`]
//!   query dispatch instead of virtual-inheritance casts.
//! * [`make::make`] / [`make::make_else_null`]: the object factory,
//!   parameterized by a [`policy::RefCountPolicy`],
//!   [`policy::MakePolicy`], and [`policy::FailurePolicy`] chosen at the
//!   call site.
//! * [`swarm`]: groups of heterogeneous objects sharing one control
//!   block — [`swarm::make`] for the common one-member-to-start case,
//!   [`swarm::make_fixed`] for a compile-time-sized group,
//!   [`swarm::make_growable`] for one whose membership grows at runtime.
//!   [`swarm::swarm_of`] hands back an owning [`swarm::SwarmHandle`] for
//!   a given member's swarm.
//!
//! # Dispatch queues
//!
//! [`dispatch::DispatchQueueService`] is the common surface; run it on a
//! worker-thread pool with [`dispatch::ThreadPoolScheduler`], or hand it
//! to a host's own event loop with [`dispatch::UiScheduler`].
//!
//! # Deriving identity
//!
//! `#[derive(swarmrt_derive::Object)]` gives a type a deterministic
//! [`interface::TypeId`] so it can participate in `query_interface`
//! without hand-writing one.

// The derive macro in `swarmrt_derive` emits absolute `swarmrt::interface::...`
// paths; this alias lets it resolve from within this crate's own tests too.
extern crate self as swarmrt;

pub mod dispatch;
pub mod error;
pub mod interface;
pub mod make;
pub mod policy;
pub mod rc;
pub mod swarm;
pub mod sys_alloc;
pub mod util;

#[cfg(test)]
mod fixtures;

pub use error::{ConstructError, Tag};
pub use interface::{Interface, Opaque, TypeId, TypeIdentified};
pub use make::{make, make_else_null};
pub use policy::{
    AbortOnFailure, DirectConstruct, FailurePolicy, InitializeThis, MakePolicy, PropagateFailure,
    RefCountPolicy, StrongAndWeak, StrongOnly, TwoPhaseConstruct,
};
pub use rc::{StrongRef, WeakRef};

pub use swarmrt_derive::Object;
