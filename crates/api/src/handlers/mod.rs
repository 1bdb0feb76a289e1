//! Request handlers.
//!
//! Handlers delegate to the [`Dispatcher`](browserflow_engine::Dispatcher)
//! and map errors via [`AppError`](crate::error::AppError).

pub mod project;
