//! Filter-aggregate pipeline behind the claims and service-visits dashboards.
//!
//! A [`data::model::Dataset`] is loaded once, narrowed by a
//! [`data::filter::FilterCriteria`] into a [`pipeline::FilteredResult`], and
//! reduced to the KPIs and tables of a [`dashboard`] summary.

pub mod config;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod state;

pub use error::Error;
