//! Resource abstraction layer
//!
//! This module turns Schoology REST documents into lazily loaded,
//! identity-cached objects. Resource types are declared in JSON files
//! embedded at compile time, so adding a type or a property needs no code.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and validates resource-type declarations
//! - [`coerce`] - Converts raw wire values into typed fields
//! - [`path`] - Builds REST paths from templates and realms
//! - [`object`] - [`Resource`] instances and their lazy properties
//! - [`cache`] - One identity cache per type behind [`ResourceRegistry`]
//!
//! # Resource Declarations
//!
//! Declarations live under `src/resources/`:
//! - `directory.json` - schools, buildings, roles, users, groups, collections
//! - `courses.json` - grading periods, courses, sections, enrollments, assignments, grades
//! - `messages.json` - messages and message threads
//!
//! # Example
//!
//! ```ignore
//! use lms::resource::{ResourceKind, ResourceRegistry};
//!
//! async fn enrollments(registry: &ResourceRegistry) -> lms::Result<()> {
//!     let section = registry.get_or_fetch(ResourceKind::Section, 42, None).await?;
//!     let title: Option<String> = section.get("title").await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod coerce;
pub mod enums;
pub mod identity;
pub mod kind;
pub mod object;
pub mod path;
pub mod registry;

pub use cache::ResourceRegistry;
pub use coerce::{Field, FromField};
pub use identity::{Identity, Realm, RefTarget, ResourceRef};
pub use kind::ResourceKind;
pub use object::Resource;
pub use registry::{Property, Relation, TypeDef, TypeRegistry};
