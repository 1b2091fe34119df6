//! Presentation layer: HTTP middleware, controllers and routing

pub mod controllers;
pub mod middleware;
pub mod models;
pub mod routes;
