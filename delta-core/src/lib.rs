//! Core 2-D river delta growth library.
//!
//! Main components:
//! - [`geometry`] - points, polar steps and vector helpers.
//! - [`branch`] - a single river branch as a tagged polyline.
//! - [`tree`] - arena of branches and their bifurcations.
//! - [`boundary`] - closed tagged polygons and their splicing.
//! - [`region`] - named boundaries, source anchors and boundary conditions.
//! - [`boundary_generator`] - ribbons around branches, spliced into the region.
//! - [`model`] - growth and bifurcation rules.
//! - [`config`] - model and region parameters.
//! - [`series`] - per-branch coefficient history.
//! - [`phases`] - simulation steps driven by an external series solver.
//! - [`error`] - the crate error type.
//! - [`types`] - shared type aliases and IDs.

pub mod boundary;
pub mod boundary_generator;
pub mod branch;
pub mod config;
pub mod error;
pub mod geometry;
pub mod model;
pub mod phases;
pub mod region;
pub mod series;
pub mod tree;
pub mod types;
