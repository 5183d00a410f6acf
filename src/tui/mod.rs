//! Interactive terminal dashboard

mod app;
mod keys;
mod messages;
mod model;
mod update;
mod view;

pub use app::DashboardOutput;
