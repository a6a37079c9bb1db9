//! Pure floor-plan allocation logic for ProgPlan.
//!
//! This crate subdivides a polygon into a hierarchy of regions (territory →
//! building → floor → section → apartment → room) that satisfy a quota table.
//! Functions take plain data (vertex lists, quota tables, configuration) and
//! return plain data, with no rendering, persistence or UI state, so every
//! stage is unit-testable on its own.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`allocator`] | Contiguous region growth by prioritised BFS with rollback |
//! | [`config`] | Planner, engine, policy and feasibility configuration |
//! | [`constants`] | Apartment and room categories, geometric tolerances |
//! | [`error`] | `PlanError` and the crate `Result` alias |
//! | [`geometry`] | Polygon construction, unions, clipping, section cuts |
//! | [`grid`] | Polygon rasterisation into a cell adjacency arena |
//! | [`hierarchy`] | Territory/building/floor/section/apartment composition |
//! | [`layout`] | Generate → validate → score → retry engine per level |
//! | [`observer`] | Injectable telemetry hooks (no-op by default) |
//! | [`policy`] | Q-learning category selection |
//! | [`quota`] | Quota tables, floor/section distribution, patterns, feasibility |
//! | [`rooms`] | Room programmes per apartment type |
//! | [`shape`] | Rectangularity, contact length, side classification |
//! | [`stats`] | Per-category area and count statistics |
//! | [`validation`] | Structural checks on generated plans |

pub mod allocator;
pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod hierarchy;
pub mod layout;
pub mod observer;
pub mod policy;
pub mod quota;
pub mod rooms;
pub mod shape;
pub mod stats;
pub mod validation;

pub use config::PlannerConfig;
pub use error::{PlanError, Result};
pub use hierarchy::{generate_building, generate_territory, BuildingInput, TerritoryInput, TerritoryPlan};
pub use observer::{LogObserver, NoopObserver, PlanObserver};
pub use quota::{CategoryQuota, QuotaTable};
