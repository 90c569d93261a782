pub mod group;
pub mod model;
pub mod observe;
pub mod service;
